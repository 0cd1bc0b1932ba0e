//! The construction aggregate.
//!
//! A construction tracks *references* into the live world: a set of absolute
//! block coordinates and a set of entity identities. Block states and entity
//! data are always read from the world when needed, never stored here.
//!
//! Bounds grow incrementally on every add. Block and entity removals finish
//! with a full recompute (one removed corner can move several faces).
//! [`Construction::clear_entities`] is the exception: it only forgets
//! identities, for callers that re-track the same entities under fresh ids.
//!
//! Statistics are advisory caches: adjusted on add/remove, recomputed in full
//! by [`Construction::update_cached_stats`] before anything publishes them.

use crate::bounds::{Anchors, ConstructionBounds, Entrance};
use crate::error::ValidationError;
use crate::placement::Transform;
use crate::room::Room;
use crate::text::LocalizedText;
use crate::types::{BlockPos, BlockState, ConstructionStats, EntityId, ResourceId};
use crate::world::World;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub const MIN_ID_SEGMENTS: usize = 3;

/// Validate a construction id: at least three dot-separated segments, each
/// matching `[a-z][a-z0-9_]*` (e.g. `it.example.tower`).
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    let segments: Vec<&str> = id.split('.').collect();
    let valid = segments.len() >= MIN_ID_SEGMENTS
        && segments.iter().all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidConstructionId(id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Mob classification
// ---------------------------------------------------------------------------

/// Entity kinds that are never counted as mobs. Everything else is, including
/// kinds added by content packs.
pub const NON_MOB_ENTITIES: [&str; 24] = [
    "minecraft:armor_stand",
    "minecraft:item_frame",
    "minecraft:glow_item_frame",
    "minecraft:painting",
    "minecraft:leash_knot",
    "minecraft:item",
    "minecraft:experience_orb",
    "minecraft:falling_block",
    "minecraft:tnt",
    "minecraft:end_crystal",
    "minecraft:marker",
    "minecraft:interaction",
    "minecraft:block_display",
    "minecraft:item_display",
    "minecraft:text_display",
    "minecraft:boat",
    "minecraft:chest_boat",
    "minecraft:minecart",
    "minecraft:chest_minecart",
    "minecraft:furnace_minecart",
    "minecraft:hopper_minecart",
    "minecraft:tnt_minecart",
    "minecraft:spawner_minecart",
    "minecraft:command_block_minecart",
];

pub fn is_mob_entity(kind: &str) -> bool {
    !NON_MOB_ENTITIES.contains(&kind)
}

// ---------------------------------------------------------------------------
// Required content packs
// ---------------------------------------------------------------------------

/// A non-core content pack the construction needs to be reproduced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredMod {
    pub block_count: usize,
    pub entity_count: usize,
    /// Pack display name; the namespace itself when the pack is not loaded.
    pub display_name: String,
    pub version: Option<String>,
    pub link: Option<String>,
}

impl RequiredMod {
    fn new(namespace: &str) -> Self {
        Self {
            block_count: 0,
            entity_count: 0,
            display_name: namespace.to_string(),
            version: None,
            link: None,
        }
    }

    pub fn total(&self) -> usize {
        self.block_count + self.entity_count
    }
}

// ---------------------------------------------------------------------------
// Persisted metadata
// ---------------------------------------------------------------------------

/// Everything about a construction that is not world content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionMetadata {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: i64,
    #[serde(default)]
    pub titles: LocalizedText,
    #[serde(default)]
    pub short_descriptions: LocalizedText,
    #[serde(default)]
    pub descriptions: LocalizedText,
    pub bounds: ConstructionBounds,
    #[serde(default)]
    pub anchors: Anchors,
    #[serde(default)]
    pub stats: ConstructionStats,
    #[serde(default)]
    pub required_mods: BTreeMap<String, RequiredMod>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Construction {
    id: String,
    author_id: String,
    author_name: String,
    /// Epoch milliseconds.
    created_at: i64,

    titles: LocalizedText,
    short_descriptions: LocalizedText,
    descriptions: LocalizedText,

    /// Absolute world coordinates.
    tracked_blocks: HashSet<BlockPos>,
    tracked_entities: HashSet<EntityId>,

    bounds: ConstructionBounds,
    anchors: Anchors,
    stats: ConstructionStats,
    required_mods: BTreeMap<String, RequiredMod>,
    rooms: BTreeMap<String, Room>,
}

impl Construction {
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self {
            id,
            author_id: author_id.into(),
            author_name: author_name.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
            titles: LocalizedText::new(),
            short_descriptions: LocalizedText::new(),
            descriptions: LocalizedText::new(),
            tracked_blocks: HashSet::new(),
            tracked_entities: HashSet::new(),
            bounds: ConstructionBounds::new(),
            anchors: Anchors::new(),
            stats: ConstructionStats::default(),
            required_mods: BTreeMap::new(),
            rooms: BTreeMap::new(),
        })
    }

    /// Rebuild from storage. Bounds and stats are trusted as stored; blocks go
    /// through the raw path so nothing is recomputed per insert.
    pub fn from_metadata(
        metadata: ConstructionMetadata,
        blocks: impl IntoIterator<Item = BlockPos>,
        entities: impl IntoIterator<Item = EntityId>,
        rooms: impl IntoIterator<Item = Room>,
    ) -> Result<Self, ValidationError> {
        validate_id(&metadata.id)?;
        let mut construction = Self {
            id: metadata.id,
            author_id: metadata.author_id,
            author_name: metadata.author_name,
            created_at: metadata.created_at,
            titles: metadata.titles,
            short_descriptions: metadata.short_descriptions,
            descriptions: metadata.descriptions,
            tracked_blocks: HashSet::new(),
            tracked_entities: HashSet::new(),
            bounds: metadata.bounds,
            anchors: metadata.anchors,
            stats: metadata.stats,
            required_mods: metadata.required_mods,
            rooms: BTreeMap::new(),
        };
        for pos in blocks {
            construction.add_block_raw(pos);
        }
        for id in entities {
            construction.add_entity_raw(id);
        }
        for room in rooms {
            construction.rooms.insert(room.id().to_string(), room);
        }
        Ok(construction)
    }

    pub fn metadata(&self) -> ConstructionMetadata {
        ConstructionMetadata {
            id: self.id.clone(),
            author_id: self.author_id.clone(),
            author_name: self.author_name.clone(),
            created_at: self.created_at,
            titles: self.titles.clone(),
            short_descriptions: self.short_descriptions.clone(),
            descriptions: self.descriptions.clone(),
            bounds: self.bounds,
            anchors: self.anchors.clone(),
            stats: self.stats,
            required_mods: self.required_mods.clone(),
        }
    }

    /// Independent aggregate under `new_id`; content, authorship, anchors,
    /// caches and rooms are copied by value.
    pub fn copy_with_new_id(&self, new_id: impl Into<String>) -> Result<Self, ValidationError> {
        let new_id = new_id.into();
        validate_id(&new_id)?;
        let mut copy = self.clone();
        copy.id = new_id;
        Ok(copy)
    }

    // -----------------------------------------------------------------------
    // Identity & metadata
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn titles(&self) -> &LocalizedText {
        &self.titles
    }

    pub fn set_title(&mut self, lang: &str, title: &str) {
        self.titles.set(lang, title);
    }

    pub fn title_with_fallback(&self, lang: &str) -> Option<&str> {
        self.titles.get_with_fallback(lang)
    }

    pub fn short_descriptions(&self) -> &LocalizedText {
        &self.short_descriptions
    }

    pub fn set_short_description(&mut self, lang: &str, text: &str) {
        self.short_descriptions.set(lang, text);
    }

    pub fn short_description_with_fallback(&self, lang: &str) -> Option<&str> {
        self.short_descriptions.get_with_fallback(lang)
    }

    pub fn descriptions(&self) -> &LocalizedText {
        &self.descriptions
    }

    pub fn set_description(&mut self, lang: &str, text: &str) {
        self.descriptions.set(lang, text);
    }

    pub fn description_with_fallback(&self, lang: &str) -> Option<&str> {
        self.descriptions.get_with_fallback(lang)
    }

    /// Publishing needs at least one non-empty title and some content.
    pub fn validate_for_publish(&self) -> Result<(), ValidationError> {
        if !self.titles.has_any() {
            return Err(ValidationError::MissingTitle(self.id.clone()));
        }
        if self.is_empty() {
            return Err(ValidationError::EmptyConstruction(self.id.clone()));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    /// Track `pos` without touching bounds or stats (storage load path).
    pub fn add_block_raw(&mut self, pos: BlockPos) -> bool {
        self.tracked_blocks.insert(pos)
    }

    /// Track `pos`, expand bounds and count its current state.
    pub fn add_block(&mut self, pos: BlockPos, world: &dyn World) -> bool {
        if !self.tracked_blocks.insert(pos) {
            return false;
        }
        self.bounds.expand(pos);
        let state = world.block_state(pos);
        if world.is_solid(&state) {
            self.stats.solid_blocks += 1;
        }
        if world.is_command_block(&state) {
            self.stats.command_blocks += 1;
        }
        true
    }

    /// Stop tracking `pos`. Must run before the world changes at `pos` so the
    /// pre-removal state can be uncounted. Bounds are fully recomputed.
    pub fn remove_block(&mut self, pos: BlockPos, world: &dyn World) -> bool {
        let state = world.block_state(pos);
        self.remove_block_with_state(pos, &state, world)
    }

    /// As [`Construction::remove_block`] once the world already changed;
    /// `state` is what stood at `pos` before.
    pub fn remove_block_with_state(
        &mut self,
        pos: BlockPos,
        state: &BlockState,
        world: &dyn World,
    ) -> bool {
        if !self.tracked_blocks.remove(&pos) {
            return false;
        }
        if world.is_solid(state) {
            self.stats.solid_blocks = self.stats.solid_blocks.saturating_sub(1);
        }
        if world.is_command_block(state) {
            self.stats.command_blocks = self.stats.command_blocks.saturating_sub(1);
        }
        self.recalculate_bounds_with(world);
        true
    }

    pub fn contains_block(&self, pos: BlockPos) -> bool {
        self.tracked_blocks.contains(&pos)
    }

    pub fn tracked_blocks(&self) -> &HashSet<BlockPos> {
        &self.tracked_blocks
    }

    pub fn block_count(&self) -> usize {
        self.tracked_blocks.len()
    }

    /// Untrack every coordinate whose current block is `block`, clearing it in
    /// the world. Stats and bounds are recomputed in full afterwards.
    pub fn remove_blocks_by_type(&mut self, block: &ResourceId, world: &mut dyn World) -> usize {
        let matching: Vec<BlockPos> = self
            .tracked_blocks
            .iter()
            .copied()
            .filter(|pos| &world.block_state(*pos).block == block)
            .collect();
        if matching.is_empty() {
            return 0;
        }

        let air = BlockState::air();
        for pos in &matching {
            self.tracked_blocks.remove(pos);
            if world.block_entity(*pos).is_some() {
                world.clear_block_entity_contents(*pos);
            }
            world.set_block_state(*pos, &air, crate::world::PlaceFlags::NORMAL);
        }

        self.update_cached_stats(world);
        self.recalculate_bounds_with(world);
        info!(
            "Removed {} '{}' blocks from construction '{}'",
            matching.len(),
            block,
            self.id
        );
        matching.len()
    }

    pub fn count_blocks_by_type(&self, block: &ResourceId, world: &dyn World) -> usize {
        self.tracked_blocks
            .iter()
            .filter(|pos| &world.block_state(**pos).block == block)
            .count()
    }

    /// Tracked block count per resolved block kind.
    pub fn block_counts(&self, world: &dyn World) -> BTreeMap<ResourceId, usize> {
        let mut counts = BTreeMap::new();
        for pos in &self.tracked_blocks {
            *counts.entry(world.block_state(*pos).block).or_insert(0) += 1;
        }
        counts
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    pub fn add_entity_raw(&mut self, id: EntityId) -> bool {
        self.tracked_entities.insert(id)
    }

    /// Track a live entity, expanding bounds to its position.
    pub fn add_entity(&mut self, id: EntityId, world: &dyn World) -> bool {
        if !self.tracked_entities.insert(id) {
            return false;
        }
        if let Some(entity) = world.entity(id) {
            self.bounds.expand_vec(entity.pos);
            self.stats.entities += 1;
            if is_mob_entity(entity.kind.as_str()) {
                self.stats.mobs += 1;
            }
        }
        true
    }

    pub fn remove_entity(&mut self, id: EntityId, world: &dyn World) -> bool {
        if !self.tracked_entities.remove(&id) {
            return false;
        }
        if let Some(entity) = world.entity(id) {
            self.stats.entities = self.stats.entities.saturating_sub(1);
            if is_mob_entity(entity.kind.as_str()) {
                self.stats.mobs = self.stats.mobs.saturating_sub(1);
            }
        }
        self.recalculate_bounds_with(world);
        true
    }

    /// Forget every tracked entity without touching the world or the bounds.
    /// Callers re-track the replacements and refold if the footprint changed.
    pub fn clear_entities(&mut self) {
        self.tracked_entities.clear();
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.tracked_entities.contains(&id)
    }

    pub fn tracked_entities(&self) -> &HashSet<EntityId> {
        &self.tracked_entities
    }

    pub fn entity_count(&self) -> usize {
        self.tracked_entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked_blocks.is_empty() && self.tracked_entities.is_empty()
    }

    // -----------------------------------------------------------------------
    // Bounds & anchors
    // -----------------------------------------------------------------------

    pub fn bounds(&self) -> &ConstructionBounds {
        &self.bounds
    }

    /// Refold bounds from tracked blocks only, then revalidate anchors.
    pub fn recalculate_bounds(&mut self) {
        self.bounds.reset();
        for pos in &self.tracked_blocks {
            self.bounds.expand(*pos);
        }
        self.anchors.validate(&self.bounds);
    }

    /// Refold bounds from tracked blocks and resolvable tracked entities.
    pub fn recalculate_bounds_with(&mut self, world: &dyn World) {
        self.bounds.reset();
        for pos in &self.tracked_blocks {
            self.bounds.expand(*pos);
        }
        for id in &self.tracked_entities {
            if let Some(entity) = world.entity(*id) {
                self.bounds.expand_vec(entity.pos);
            }
        }
        self.anchors.validate(&self.bounds);
    }

    pub fn anchors(&self) -> &Anchors {
        &self.anchors
    }

    pub fn entrance(&self) -> Option<&Entrance> {
        self.anchors.entrance()
    }

    /// Set the entrance from an absolute world position.
    pub fn set_entrance(&mut self, world_pos: BlockPos, yaw: f32) -> Result<(), ValidationError> {
        let rel = self.bounds.to_relative(world_pos);
        self.anchors.set_entrance(Entrance::new(rel, yaw), &self.bounds)
    }

    pub fn clear_entrance(&mut self) {
        self.anchors.clear_entrance();
    }

    /// Drop anchors that no longer fit the current bounds.
    pub fn validate_anchors(&mut self) -> bool {
        self.anchors.validate(&self.bounds)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> ConstructionStats {
        self.stats
    }

    /// Authoritative recompute of every cached counter from the world.
    pub fn update_cached_stats(&mut self, world: &dyn World) {
        let mut stats = ConstructionStats::default();
        for pos in &self.tracked_blocks {
            let state = world.block_state(*pos);
            if world.is_solid(&state) {
                stats.solid_blocks += 1;
            }
            if world.is_command_block(&state) {
                stats.command_blocks += 1;
            }
        }
        for id in &self.tracked_entities {
            if let Some(entity) = world.entity(*id) {
                stats.entities += 1;
                if is_mob_entity(entity.kind.as_str()) {
                    stats.mobs += 1;
                }
            }
        }
        debug!("Stats for '{}': {:?}", self.id, stats);
        self.stats = stats;
    }

    pub fn required_mods(&self) -> &BTreeMap<String, RequiredMod> {
        &self.required_mods
    }

    /// Bucket tracked blocks and entities by non-default namespace, then
    /// enrich each bucket from the loaded content pack when available.
    pub fn compute_required_mods(&mut self, world: &dyn World) {
        let mut mods: BTreeMap<String, RequiredMod> = BTreeMap::new();
        for pos in &self.tracked_blocks {
            let state = world.block_state(*pos);
            if !state.block.is_default_namespace() {
                let ns = state.block.namespace();
                mods.entry(ns.to_string())
                    .or_insert_with(|| RequiredMod::new(ns))
                    .block_count += 1;
            }
        }
        for id in &self.tracked_entities {
            if let Some(entity) = world.entity(*id) {
                if !entity.kind.is_default_namespace() {
                    let ns = entity.kind.namespace();
                    mods.entry(ns.to_string())
                        .or_insert_with(|| RequiredMod::new(ns))
                        .entity_count += 1;
                }
            }
        }
        for (namespace, required) in mods.iter_mut() {
            if let Some(info) = world.mod_info(namespace) {
                required.display_name = info.display_name;
                required.version = info.version;
                required.link = info.homepage;
            }
        }
        self.required_mods = mods;
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    pub fn rooms(&self) -> &BTreeMap<String, Room> {
        &self.rooms
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn room_mut(&mut self, id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    pub fn has_room(&self, id: &str) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn add_room(&mut self, room: Room) -> Result<(), ValidationError> {
        if self.rooms.contains_key(room.id()) {
            return Err(ValidationError::RoomExists(room.id().to_string()));
        }
        self.rooms.insert(room.id().to_string(), room);
        Ok(())
    }

    pub fn remove_room(&mut self, id: &str) -> Option<Room> {
        self.rooms.remove(id)
    }

    // -----------------------------------------------------------------------
    // Relocation
    // -----------------------------------------------------------------------

    /// Adopt a new footprint after an authoritative placement: tracked sets are
    /// replaced, room overrides and the entrance follow `transform`, bounds
    /// and stats are recomputed.
    pub fn relocate(
        &mut self,
        transform: &Transform,
        blocks: HashSet<BlockPos>,
        entities: HashSet<EntityId>,
        world: &dyn World,
    ) {
        self.tracked_blocks = blocks;
        self.tracked_entities = entities;
        for room in self.rooms.values_mut() {
            room.apply_transform(transform);
        }
        if let Some(entrance) = self.anchors.entrance().copied() {
            let rotated = entrance.rotated(transform.rotation, transform.size);
            self.anchors.restore_entrance(Some(rotated));
        }
        self.recalculate_bounds_with(world);
        self.update_cached_stats(world);
        info!(
            "Construction '{}' relocated to {} ({})",
            self.id,
            self.bounds.min(),
            self.bounds.size_string()
        );
    }
}
