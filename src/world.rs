//! Host world capability.
//!
//! Every operation that reads or writes live state takes a `&dyn World` /
//! `&mut dyn World` instead of reaching for ambient state. The host owns the
//! real block and entity storage; this crate only references it.

use crate::error::WorldError;
use crate::types::{BlockPos, BlockState, Compound, EntityId, ResourceId, Vec3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Read-only view of a live entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    pub id: EntityId,
    pub kind: ResourceId,
    pub pos: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Full serialized state as the host would persist it.
    pub data: Compound,
}

/// Request to insert a recreated entity under a caller-chosen identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpawn {
    pub id: EntityId,
    pub kind: ResourceId,
    pub pos: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub data: Compound,
}

// ---------------------------------------------------------------------------
// Placement flags
// ---------------------------------------------------------------------------

/// How a block write propagates inside the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceFlags {
    /// Send the change to clients immediately.
    pub notify_clients: bool,
    /// Run neighbour updates / placement side effects.
    pub trigger_updates: bool,
}

impl PlaceFlags {
    /// Interactive edit: full updates.
    pub const NORMAL: PlaceFlags = PlaceFlags {
        notify_clients: true,
        trigger_updates: true,
    };

    /// Replaying captured content: no transient client updates, no side effects.
    pub const RECREATE: PlaceFlags = PlaceFlags {
        notify_clients: false,
        trigger_updates: false,
    };
}

// ---------------------------------------------------------------------------
// Content packs
// ---------------------------------------------------------------------------

/// Metadata for a loaded content pack, looked up by namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInfo {
    pub display_name: String,
    pub version: Option<String>,
    pub homepage: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

const COMMAND_BLOCKS: [&str; 3] = [
    "minecraft:command_block",
    "minecraft:chain_command_block",
    "minecraft:repeating_command_block",
];

/// Everything the construction model consumes from the host world.
///
/// Block writes are infallible: the host's world mutation is synchronous and
/// callers only write coordinates they already validated.
pub trait World {
    fn block_state(&self, pos: BlockPos) -> BlockState;
    fn set_block_state(&mut self, pos: BlockPos, state: &BlockState, flags: PlaceFlags);

    /// Block-scoped auxiliary data (container contents, sign text …).
    fn block_entity(&self, pos: BlockPos) -> Option<Compound>;
    fn set_block_entity(&mut self, pos: BlockPos, data: Compound);
    /// Empty any inventory held at `pos` so removing the block drops nothing.
    fn clear_block_entity_contents(&mut self, pos: BlockPos);

    fn entity(&self, id: EntityId) -> Option<EntityView>;
    /// Entities whose position lies inside the inclusive block box.
    fn entities_within(&self, min: BlockPos, max: BlockPos) -> Vec<EntityId>;
    fn spawn_entity(&mut self, spawn: EntitySpawn) -> Result<EntityId, WorldError>;
    /// Returns `false` when the entity no longer exists.
    fn discard_entity(&mut self, id: EntityId) -> bool;

    /// Persistence-eligibility filter applied when capturing entities.
    fn is_persistent_entity(&self, entity: &EntityView) -> bool {
        entity.kind.as_str() != "minecraft:player"
    }

    fn is_solid(&self, state: &BlockState) -> bool {
        !state.is_air()
    }

    fn is_command_block(&self, state: &BlockState) -> bool {
        COMMAND_BLOCKS.contains(&state.block.as_str())
    }

    /// Loaded content pack for `namespace`, if any.
    fn mod_info(&self, _namespace: &str) -> Option<ModInfo> {
        None
    }
}
