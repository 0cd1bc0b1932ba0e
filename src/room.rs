//! Delta rooms: named variants of a construction.
//!
//! A room stores only what differs from the base construction: block
//! overrides keyed by absolute world position (the same space as the
//! construction's tracked blocks), optional block-entity data for those
//! positions, and its own entity list relative to the construction bounds.
//! Restoring base content after an override is the editing session's job.

use crate::bounds::ConstructionBounds;
use crate::placement::Transform;
use crate::types::{pos_map, BlockPos, BlockState, Compound, EntityData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_ROOM_ID_LEN: usize = 50;
const ROOM_ID_PREFIX: &str = "room_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    id: String,
    name: String,
    /// Creation time, epoch milliseconds.
    created_at: i64,
    #[serde(with = "pos_map", default)]
    block_changes: BTreeMap<BlockPos, BlockState>,
    #[serde(with = "pos_map", default)]
    block_entity_changes: BTreeMap<BlockPos, Compound>,
    #[serde(default)]
    entities: Vec<EntityData>,
}

impl Room {
    /// New empty room; the id is derived from `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: Self::generate_id(&name),
            name,
            created_at: chrono::Utc::now().timestamp_millis(),
            block_changes: BTreeMap::new(),
            block_entity_changes: BTreeMap::new(),
            entities: Vec::new(),
        }
    }

    /// New empty room with an explicit id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut room = Self::new(name);
        room.id = id.into();
        room
    }

    /// Derive a room id from a display name.
    ///
    /// Lowercased and trimmed; whitespace and hyphens become underscores;
    /// anything outside `[a-z0-9_]` is dropped; runs of underscores collapse
    /// and edge underscores are stripped. Ids starting with a digit get the
    /// `room_` prefix, empty ids become `room_<millis>`. Capped at 50 chars.
    pub fn generate_id(name: &str) -> String {
        let lowered = name.trim().to_lowercase();
        let mut id = String::with_capacity(lowered.len());
        for c in lowered.chars() {
            let c = if c.is_whitespace() || c == '-' { '_' } else { c };
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
                continue;
            }
            if c == '_' && id.ends_with('_') {
                continue;
            }
            id.push(c);
        }
        let mut id = id.trim_matches('_').to_string();

        if id.is_empty() {
            id = format!("{}{}", ROOM_ID_PREFIX, chrono::Utc::now().timestamp_millis());
        } else if id.starts_with(|c: char| c.is_ascii_digit()) {
            id = format!("{}{}", ROOM_ID_PREFIX, id);
        }
        id.truncate(MAX_ROOM_ID_LEN);
        id
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Change the display name. The id follows the name unless `id` is given.
    pub fn rename(&mut self, name: impl Into<String>, id: Option<&str>) {
        self.name = name.into();
        self.id = match id {
            Some(id) => id.to_string(),
            None => Self::generate_id(&self.name),
        };
    }

    /// Independent copy under a new name (and derived id), same creation time.
    pub fn copy_with_new_name(&self, new_name: impl Into<String>) -> Room {
        let name = new_name.into();
        Room {
            id: Self::generate_id(&name),
            name,
            created_at: self.created_at,
            block_changes: self.block_changes.clone(),
            block_entity_changes: self.block_entity_changes.clone(),
            entities: self.entities.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Block delta
    // -----------------------------------------------------------------------

    /// Upsert the override at `pos`. Passing no data clears stale data.
    pub fn set_block_change(&mut self, pos: BlockPos, state: BlockState, data: Option<Compound>) {
        self.block_changes.insert(pos, state);
        match data {
            Some(data) => {
                self.block_entity_changes.insert(pos, data);
            }
            None => {
                self.block_entity_changes.remove(&pos);
            }
        }
    }

    /// Forget the override at `pos`; the world is left untouched.
    pub fn remove_block_change(&mut self, pos: BlockPos) -> bool {
        self.block_entity_changes.remove(&pos);
        self.block_changes.remove(&pos).is_some()
    }

    pub fn block_change(&self, pos: BlockPos) -> Option<&BlockState> {
        self.block_changes.get(&pos)
    }

    pub fn block_changes(&self) -> &BTreeMap<BlockPos, BlockState> {
        &self.block_changes
    }

    pub fn block_entity_changes(&self) -> &BTreeMap<BlockPos, Compound> {
        &self.block_entity_changes
    }

    pub fn change_count(&self) -> usize {
        self.block_changes.len()
    }

    pub fn clear_block_changes(&mut self) {
        self.block_changes.clear();
        self.block_entity_changes.clear();
    }

    /// Re-key every override through `map` (construction moved).
    pub fn remap_positions(&mut self, map: impl Fn(BlockPos) -> BlockPos) {
        self.block_changes = std::mem::take(&mut self.block_changes)
            .into_iter()
            .map(|(p, s)| (map(p), s))
            .collect();
        self.block_entity_changes = std::mem::take(&mut self.block_entity_changes)
            .into_iter()
            .map(|(p, d)| (map(p), d))
            .collect();
    }

    /// Follow an authoritative placement: overrides are re-keyed and their
    /// states turned, entities are rotated inside the footprint.
    pub fn apply_transform(&mut self, transform: &Transform) {
        self.remap_positions(|pos| transform.apply_absolute(pos));
        for state in self.block_changes.values_mut() {
            *state = state.rotated(transform.rotation);
        }
        for entity in &mut self.entities {
            entity.pos = transform.rotation.rotate_vec(entity.pos, transform.size);
            entity.yaw = transform.apply_yaw(entity.yaw);
        }
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    pub fn entities(&self) -> &[EntityData] {
        &self.entities
    }

    pub fn set_entities(&mut self, entities: Vec<EntityData>) {
        self.entities = entities;
    }

    pub fn add_entity(&mut self, entity: EntityData) {
        self.entities.push(entity);
    }

    pub fn clear_entities(&mut self) {
        self.entities.clear();
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn has_changes(&self) -> bool {
        self.block_changes.len() + self.entities.len() > 0
    }

    /// `"WxHxD"` extent of the room's own content: block overrides normalised
    /// against `construction_bounds` unioned with floored entity positions.
    pub fn bounds_string(&self, construction_bounds: &ConstructionBounds) -> String {
        let origin = construction_bounds.min();
        let mut extent = ConstructionBounds::new();
        for pos in self.block_changes.keys() {
            extent.expand(*pos - origin);
        }
        for entity in &self.entities {
            extent.expand_vec(entity.pos);
        }
        extent.size_string()
    }
}
