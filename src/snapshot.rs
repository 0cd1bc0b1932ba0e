//! Point-in-time materialisation of a construction.
//!
//! A [`Snapshot`] is a value: relative coordinate → state, relative
//! coordinate → block-entity data, captured entities, and one
//! [`RoomSnapshot`] per room. It is either read out of a live world
//! ([`Snapshot::from_world`]) or wrapped around data that arrived from disk or
//! from the remote catalog ([`Snapshot::from_deserialized`]).
//!
//! Room entities are never resident in the world outside active room editing,
//! so a world-sourced snapshot always has empty room entity lists. Use one of
//! the backfill methods before publishing or moving.

use crate::construction::Construction;
use crate::error::StoreError;
use crate::room::Room;
use crate::store::ConstructionStore;
use crate::types::{pos_map, BlockPos, BlockState, Compound, EntityData, ResourceId};
use crate::world::World;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Block-entity keys that tie data to a position or block kind.
pub const BLOCK_ENTITY_POSITION_KEYS: [&str; 4] = ["x", "y", "z", "id"];

/// Copy of block-entity data with position/type fields removed so it can be
/// replayed at any origin.
pub fn strip_block_entity(data: &Compound) -> Compound {
    let mut out = data.clone();
    for key in BLOCK_ENTITY_POSITION_KEYS {
        out.remove(key);
    }
    out
}

/// Total order over captured entities, independent of tracking order.
fn entity_order(a: &EntityData, b: &EntityData) -> Ordering {
    a.kind
        .cmp(&b.kind)
        .then_with(|| a.pos.x.total_cmp(&b.pos.x))
        .then_with(|| a.pos.y.total_cmp(&b.pos.y))
        .then_with(|| a.pos.z.total_cmp(&b.pos.z))
        .then_with(|| a.yaw.total_cmp(&b.yaw))
        .then_with(|| a.pitch.total_cmp(&b.pitch))
        .then_with(|| {
            let a = serde_json::to_string(&a.data).unwrap_or_default();
            let b = serde_json::to_string(&b.data).unwrap_or_default();
            a.cmp(&b)
        })
}

// ---------------------------------------------------------------------------
// Room snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    /// Overrides keyed by position relative to the construction origin.
    #[serde(with = "pos_map", default)]
    pub blocks: BTreeMap<BlockPos, BlockState>,
    #[serde(with = "pos_map", default)]
    pub block_entities: BTreeMap<BlockPos, Compound>,
    #[serde(default)]
    pub entities: Vec<EntityData>,
}

impl RoomSnapshot {
    /// Normalise a room's overrides against `origin`. Entities are left empty.
    fn from_room(room: &Room, origin: BlockPos) -> Self {
        Self {
            id: room.id().to_string(),
            name: room.name().to_string(),
            created_at: room.created_at(),
            blocks: room
                .block_changes()
                .iter()
                .map(|(pos, state)| (*pos - origin, state.clone()))
                .collect(),
            block_entities: room
                .block_entity_changes()
                .iter()
                .map(|(pos, data)| (*pos - origin, strip_block_entity(data)))
                .collect(),
            entities: Vec::new(),
        }
    }

    /// Rebuild a live room whose overrides are anchored at `origin`.
    pub fn to_room(&self, origin: BlockPos) -> Room {
        let mut room = Room::with_id(self.id.clone(), self.name.clone());
        for (rel, state) in &self.blocks {
            room.set_block_change(
                *rel + origin,
                state.clone(),
                self.block_entities.get(rel).cloned(),
            );
        }
        room.set_entities(self.entities.clone());
        room
    }

    pub fn has_changes(&self) -> bool {
        !self.blocks.is_empty() || !self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    construction_id: String,
    /// Absolute bounds minimum at capture time.
    origin: BlockPos,
    size: BlockPos,
    #[serde(with = "pos_map", default)]
    blocks: BTreeMap<BlockPos, BlockState>,
    #[serde(with = "pos_map", default)]
    block_entities: BTreeMap<BlockPos, Compound>,
    #[serde(default)]
    entities: Vec<EntityData>,
    #[serde(default)]
    rooms: BTreeMap<String, RoomSnapshot>,
}

impl Snapshot {
    /// Capture the construction's current content from `world`.
    pub fn from_world(construction: &Construction, world: &dyn World) -> Self {
        let bounds = construction.bounds();
        let origin = bounds.min();
        let origin_vec = origin.as_vec3();

        let mut blocks = BTreeMap::new();
        let mut block_entities = BTreeMap::new();
        for pos in construction.tracked_blocks() {
            let rel = *pos - origin;
            blocks.insert(rel, world.block_state(*pos));
            if let Some(data) = world.block_entity(*pos) {
                block_entities.insert(rel, strip_block_entity(&data));
            }
        }

        let mut entities = Vec::new();
        for id in construction.tracked_entities() {
            let Some(entity) = world.entity(*id) else {
                continue;
            };
            if !world.is_persistent_entity(&entity) {
                continue;
            }
            entities.push(EntityData {
                kind: entity.kind,
                pos: entity.pos - origin_vec,
                yaw: entity.yaw,
                pitch: entity.pitch,
                data: entity.data,
            });
        }
        entities.sort_by(entity_order);

        let rooms = construction
            .rooms()
            .values()
            .map(|room| (room.id().to_string(), RoomSnapshot::from_room(room, origin)))
            .collect();

        debug!(
            "Captured '{}': {} blocks, {} block entities, {} entities",
            construction.id(),
            blocks.len(),
            block_entities.len(),
            entities.len()
        );

        Self {
            construction_id: construction.id().to_string(),
            origin,
            size: bounds.size(),
            blocks,
            block_entities,
            entities,
            rooms,
        }
    }

    /// Wrap externally supplied data; missing parts become empty.
    pub fn from_deserialized(
        construction_id: impl Into<String>,
        origin: BlockPos,
        size: BlockPos,
        blocks: Option<BTreeMap<BlockPos, BlockState>>,
        block_entities: Option<BTreeMap<BlockPos, Compound>>,
        entities: Option<Vec<EntityData>>,
        rooms: Option<BTreeMap<String, RoomSnapshot>>,
    ) -> Self {
        Self {
            construction_id: construction_id.into(),
            origin,
            size,
            blocks: blocks.unwrap_or_default(),
            block_entities: block_entities.unwrap_or_default(),
            entities: entities.unwrap_or_default(),
            rooms: rooms.unwrap_or_default(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn construction_id(&self) -> &str {
        &self.construction_id
    }

    pub fn origin(&self) -> BlockPos {
        self.origin
    }

    pub fn size(&self) -> BlockPos {
        self.size
    }

    pub fn blocks(&self) -> &BTreeMap<BlockPos, BlockState> {
        &self.blocks
    }

    pub fn block_entities(&self) -> &BTreeMap<BlockPos, Compound> {
        &self.block_entities
    }

    pub fn entities(&self) -> &[EntityData] {
        &self.entities
    }

    pub fn rooms(&self) -> &BTreeMap<String, RoomSnapshot> {
        &self.rooms
    }

    pub fn room(&self, id: &str) -> Option<&RoomSnapshot> {
        self.rooms.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.entities.is_empty()
    }

    // -----------------------------------------------------------------------
    // Room entity backfill
    // -----------------------------------------------------------------------

    /// Replace one room's entity list. Returns `false` for an unknown room.
    pub fn set_room_entities(&mut self, room_id: &str, entities: Vec<EntityData>) -> bool {
        match self.rooms.get_mut(room_id) {
            Some(room) => {
                room.entities = entities;
                true
            }
            None => false,
        }
    }

    /// Merge room entity lists from durable storage.
    pub fn backfill_room_entities(
        &mut self,
        store: &dyn ConstructionStore,
    ) -> Result<usize, StoreError> {
        let mut merged = 0;
        for (room_id, room) in self.rooms.iter_mut() {
            if let Some(entities) = store.load_room_entities(&self.construction_id, room_id)? {
                merged += entities.len();
                room.entities = entities;
            }
        }
        Ok(merged)
    }

    /// Merge room entity lists held in memory by the construction's rooms.
    pub fn backfill_room_entities_from(&mut self, construction: &Construction) -> usize {
        let mut merged = 0;
        for (room_id, room) in self.rooms.iter_mut() {
            if let Some(live) = construction.room(room_id) {
                merged += live.entity_count();
                room.entities = live.entities().to_vec();
            }
        }
        merged
    }

    // -----------------------------------------------------------------------
    // Derived queries
    // -----------------------------------------------------------------------

    pub fn solid_block_count(&self) -> usize {
        self.blocks.values().filter(|s| !s.is_air()).count()
    }

    pub fn block_counts(&self) -> BTreeMap<ResourceId, usize> {
        let mut counts = BTreeMap::new();
        for state in self.blocks.values() {
            *counts.entry(state.block.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Hex md5 of the serialized snapshot; identical content gives identical
    /// fingerprints.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", md5::compute(bytes)))
    }
}
