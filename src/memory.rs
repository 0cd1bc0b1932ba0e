//! In-memory [`World`] implementation.
//!
//! Sparse block map (unset positions read as air), entity table keyed by
//! identity, and a content-pack table. Used by tests and by tools that replay
//! snapshots without a running host.

use crate::error::WorldError;
use crate::types::{BlockPos, BlockState, Compound, EntityId, ResourceId, Vec3};
use crate::world::{EntitySpawn, EntityView, ModInfo, PlaceFlags, World};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct MemoryWorld {
    blocks: HashMap<BlockPos, BlockState>,
    block_entities: HashMap<BlockPos, Compound>,
    entities: HashMap<EntityId, EntityView>,
    mods: HashMap<String, ModInfo>,
    rejected_kinds: HashSet<ResourceId>,
    /// Every block write in order, with the flags it used.
    write_log: Vec<(BlockPos, PlaceFlags)>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_block(&mut self, pos: BlockPos, state: BlockState) {
        self.set_block_state(pos, &state, PlaceFlags::NORMAL);
    }

    /// Insert an entity with a fresh identity and return it.
    pub fn add_entity(&mut self, kind: &str, pos: Vec3, data: Compound) -> EntityId {
        let id = EntityId::new_v4();
        self.entities.insert(
            id,
            EntityView {
                id,
                kind: ResourceId::new(kind),
                pos,
                yaw: 0.0,
                pitch: 0.0,
                data,
            },
        );
        id
    }

    pub fn register_mod(&mut self, namespace: &str, info: ModInfo) {
        self.mods.insert(namespace.to_string(), info);
    }

    /// Make [`World::spawn_entity`] fail for this kind (malformed state).
    pub fn reject_kind(&mut self, kind: &str) {
        self.rejected_kinds.insert(ResourceId::new(kind));
    }

    /// Positions holding a non-air block.
    pub fn non_air_positions(&self) -> HashSet<BlockPos> {
        self.blocks
            .iter()
            .filter(|(_, s)| !s.is_air())
            .map(|(p, _)| *p)
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn write_log(&self) -> &[(BlockPos, PlaceFlags)] {
        &self.write_log
    }

    pub fn clear_write_log(&mut self) {
        self.write_log.clear();
    }
}

impl World for MemoryWorld {
    fn block_state(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).cloned().unwrap_or_else(BlockState::air)
    }

    fn set_block_state(&mut self, pos: BlockPos, state: &BlockState, flags: PlaceFlags) {
        self.write_log.push((pos, flags));
        // Replacing a block drops whatever block entity it carried.
        self.block_entities.remove(&pos);
        if state.is_air() {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, state.clone());
        }
    }

    fn block_entity(&self, pos: BlockPos) -> Option<Compound> {
        self.block_entities.get(&pos).cloned()
    }

    fn set_block_entity(&mut self, pos: BlockPos, data: Compound) {
        self.block_entities.insert(pos, data);
    }

    fn clear_block_entity_contents(&mut self, pos: BlockPos) {
        if let Some(data) = self.block_entities.get_mut(&pos) {
            data.remove("Items");
        }
    }

    fn entity(&self, id: EntityId) -> Option<EntityView> {
        self.entities.get(&id).cloned()
    }

    fn entities_within(&self, min: BlockPos, max: BlockPos) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| {
                let p = e.pos.floor();
                p.x >= min.x
                    && p.x <= max.x
                    && p.y >= min.y
                    && p.y <= max.y
                    && p.z >= min.z
                    && p.z <= max.z
            })
            .map(|e| e.id)
            .collect()
    }

    fn spawn_entity(&mut self, spawn: EntitySpawn) -> Result<EntityId, WorldError> {
        if self.rejected_kinds.contains(&spawn.kind) {
            return Err(WorldError::EntityRejected {
                kind: spawn.kind.to_string(),
                reason: "malformed entity data".into(),
            });
        }
        let id = spawn.id;
        self.entities.insert(
            id,
            EntityView {
                id,
                kind: spawn.kind,
                pos: spawn.pos,
                yaw: spawn.yaw,
                pitch: spawn.pitch,
                data: spawn.data,
            },
        );
        Ok(id)
    }

    fn discard_entity(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }

    fn mod_info(&self, namespace: &str) -> Option<ModInfo> {
        self.mods.get(namespace).cloned()
    }
}
