//! Placement / replay engine.
//!
//! ## Placement
//!
//! 1. Compute a [`Transform`] (offset + quarter-turn rotation) from the
//!    requested [`PlacementMode`] and [`PlacementTarget`].
//! 2. Write non-air states in ascending relative Y with
//!    [`PlaceFlags::RECREATE`], so supports exist before attached blocks.
//! 3. Re-apply block-entity data with position fields injected.
//! 4. Recreate entities under fresh identities. Each identity is registered
//!    with the [`SpawnTracker`] before insertion. A failing entity is logged
//!    and skipped.
//! 5. Overlay a room, if requested, only after the base is complete.
//!
//! ## Removal
//!
//! | Mode        | Effect                                                  |
//! |-------------|---------------------------------------------------------|
//! | `Hide`      | tracked blocks → air, entities discarded (undo: `Show`) |
//! | `Destroy`   | inventories emptied first, then as `Hide`; permanent    |
//! | `MoveClear` | clears the old footprint before a `Move` writes the new |

use crate::bounds::{ConstructionBounds, Entrance};
use crate::construction::Construction;
use crate::error::{ValidationError, WorldError};
use crate::snapshot::{RoomSnapshot, Snapshot};
use crate::spawn::SpawnTracker;
use crate::types::{BlockPos, BlockState, Compound, EntityData, EntityId, Facing, Rotation, Vec3};
use crate::world::{EntitySpawn, PlaceFlags, World};
use log::{debug, info, warn};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Entity keys dropped before recreation (position, motion, identity).
pub const ENTITY_STRIPPED_KEYS: [&str; 5] = ["Pos", "Motion", "UUID", "UUIDMost", "UUIDLeast"];

/// How far in front of the actor a test placement lands.
pub const SPAWN_DISTANCE: i32 = 2;

// ---------------------------------------------------------------------------
// Modes & targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// Re-display at the recorded position; coordinates are not updated.
    Show,
    /// Place at a new origin and make it the construction's position.
    Move,
    /// As `Move`, with a snapshot fetched from the remote catalog.
    Pull,
    /// Test placement in front of an actor; nothing is tracked.
    ArchitectSpawn,
}

impl PlacementMode {
    pub fn is_authoritative(&self) -> bool {
        matches!(self, PlacementMode::Move | PlacementMode::Pull)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalMode {
    Hide,
    Destroy,
    MoveClear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementTarget {
    /// Where the snapshot was captured.
    Original,
    At { origin: BlockPos, rotation: Rotation },
    InFrontOf { actor_pos: Vec3, actor_yaw: f32 },
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Maps snapshot-relative coordinates onto the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Absolute origin the snapshot was captured at.
    pub source_origin: BlockPos,
    /// Unrotated footprint size.
    pub size: BlockPos,
    pub rotation: Rotation,
    /// Absolute minimum corner of the placed (rotated) footprint.
    pub target_origin: BlockPos,
}

impl Transform {
    /// Compute the transform for placing `snapshot` at `target`.
    pub fn for_target(
        snapshot: &Snapshot,
        target: PlacementTarget,
        entrance: Option<&Entrance>,
    ) -> Self {
        let size = snapshot.size();
        match target {
            PlacementTarget::Original => Self {
                source_origin: snapshot.origin(),
                size,
                rotation: Rotation::None,
                target_origin: snapshot.origin(),
            },
            PlacementTarget::At { origin, rotation } => Self {
                source_origin: snapshot.origin(),
                size,
                rotation,
                target_origin: origin,
            },
            PlacementTarget::InFrontOf {
                actor_pos,
                actor_yaw,
            } => Self::in_front_of(snapshot, actor_pos, actor_yaw, entrance),
        }
    }

    fn in_front_of(
        snapshot: &Snapshot,
        actor_pos: Vec3,
        actor_yaw: f32,
        entrance: Option<&Entrance>,
    ) -> Self {
        let size = snapshot.size();
        let facing = Facing::from_yaw(actor_yaw);
        let (dx, dz) = facing.step();
        let actor = actor_pos.floor();

        let Some(entrance) = entrance else {
            let origin = match facing {
                Facing::South => {
                    BlockPos::new(actor.x - size.x / 2, actor.y, actor.z + SPAWN_DISTANCE)
                }
                Facing::North => BlockPos::new(
                    actor.x - size.x / 2,
                    actor.y,
                    actor.z - SPAWN_DISTANCE - (size.z - 1),
                ),
                Facing::East => {
                    BlockPos::new(actor.x + SPAWN_DISTANCE, actor.y, actor.z - size.z / 2)
                }
                Facing::West => BlockPos::new(
                    actor.x - SPAWN_DISTANCE - (size.x - 1),
                    actor.y,
                    actor.z - size.z / 2,
                ),
            };
            return Self {
                source_origin: snapshot.origin(),
                size,
                rotation: Rotation::None,
                target_origin: origin,
            };
        };

        // Turn the construction so arriving through the entrance faces the
        // same way as the actor, then put the entrance just ahead of them.
        let rotation = Rotation::between(Facing::from_yaw(entrance.yaw), facing);
        let rotated_entrance = entrance.rotated(rotation, size);
        let entrance_target = actor.offset(dx * SPAWN_DISTANCE, 0, dz * SPAWN_DISTANCE);
        Self {
            source_origin: snapshot.origin(),
            size,
            rotation,
            target_origin: entrance_target - rotated_entrance.pos,
        }
    }

    pub fn apply(&self, rel: BlockPos) -> BlockPos {
        self.target_origin + self.rotation.rotate_pos(rel, self.size)
    }

    pub fn apply_vec(&self, rel: Vec3) -> Vec3 {
        self.target_origin.as_vec3() + self.rotation.rotate_vec(rel, self.size)
    }

    /// Map a position captured at `source_origin` to its placed position.
    pub fn apply_absolute(&self, pos: BlockPos) -> BlockPos {
        self.apply(pos - self.source_origin)
    }

    pub fn apply_yaw(&self, yaw: f32) -> f32 {
        (yaw + self.rotation.yaw_delta()).rem_euclid(360.0)
    }

    /// Absolute footprint of the placed snapshot.
    pub fn footprint(&self) -> ConstructionBounds {
        let rotated = self.rotation.rotate_size(self.size);
        if rotated.x <= 0 || rotated.y <= 0 || rotated.z <= 0 {
            return ConstructionBounds::new();
        }
        ConstructionBounds::from_corners(
            self.target_origin,
            self.target_origin + rotated.offset(-1, -1, -1),
        )
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PlacementReport {
    pub blocks_placed: usize,
    pub block_entities_applied: usize,
    /// Fresh identities of recreated base entities.
    pub entities: Vec<EntityId>,
    /// Fresh identities of recreated room entities.
    pub room_entities: Vec<EntityId>,
    pub entity_failures: usize,
    pub room: Option<String>,
    /// Every snapshot coordinate mapped to the world (air included).
    pub positions: HashSet<BlockPos>,
    pub footprint: ConstructionBounds,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub blocks_cleared: usize,
    pub entities_discarded: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PlacementEngine {
    spawns: SpawnTracker,
}

impl PlacementEngine {
    pub fn new(spawns: SpawnTracker) -> Self {
        Self { spawns }
    }

    pub fn spawns(&self) -> &SpawnTracker {
        &self.spawns
    }

    /// Place `snapshot` through `transform`, optionally overlaying `room`.
    pub fn place(
        &self,
        snapshot: &Snapshot,
        transform: &Transform,
        room: Option<&str>,
        world: &mut dyn World,
    ) -> Result<PlacementReport, ValidationError> {
        let room_snapshot = match room {
            Some(id) => Some(
                snapshot
                    .room(id)
                    .ok_or_else(|| ValidationError::UnknownRoom(id.to_string()))?,
            ),
            None => None,
        };

        let mut report = PlacementReport {
            footprint: transform.footprint(),
            room: room.map(str::to_string),
            ..Default::default()
        };

        report.positions = snapshot.blocks().keys().map(|rel| transform.apply(*rel)).collect();
        report.blocks_placed = write_blocks(snapshot.blocks(), transform, world, true);
        report.block_entities_applied =
            write_block_entities(snapshot.block_entities(), transform, world);

        for entity in snapshot.entities() {
            match self.recreate_entity(entity, transform, world) {
                Ok(id) => report.entities.push(id),
                Err(e) => {
                    warn!("Skipping entity during placement: {}", e);
                    report.entity_failures += 1;
                }
            }
        }

        if let Some(room_snapshot) = room_snapshot {
            self.overlay_room(room_snapshot, transform, world, &mut report);
        }

        info!(
            "Placed '{}' at {}: {} blocks, {} entities ({} failed){}",
            snapshot.construction_id(),
            transform.target_origin,
            report.blocks_placed,
            report.entities.len() + report.room_entities.len(),
            report.entity_failures,
            room.map(|r| format!(", room '{}'", r)).unwrap_or_default()
        );
        Ok(report)
    }

    /// Layer a room's overrides (air included) and entities on top of a
    /// placed base.
    fn overlay_room(
        &self,
        room: &RoomSnapshot,
        transform: &Transform,
        world: &mut dyn World,
        report: &mut PlacementReport,
    ) {
        report.blocks_placed += write_blocks(&room.blocks, transform, world, false);
        report.block_entities_applied +=
            write_block_entities(&room.block_entities, transform, world);
        for entity in &room.entities {
            match self.recreate_entity(entity, transform, world) {
                Ok(id) => report.room_entities.push(id),
                Err(e) => {
                    warn!("Skipping room '{}' entity: {}", room.id, e);
                    report.entity_failures += 1;
                }
            }
        }
    }

    /// Place a construction for display or as its new authoritative position.
    ///
    /// `Show` re-tracks the recreated entities but leaves coordinates alone.
    /// `Move`/`Pull` clear the old footprint first, then adopt the new one.
    /// Entities the construction tracks afterwards leave the spawn-ignore set.
    pub fn place_construction(
        &self,
        construction: &mut Construction,
        snapshot: &Snapshot,
        mode: PlacementMode,
        target: PlacementTarget,
        world: &mut dyn World,
    ) -> Result<PlacementReport, ValidationError> {
        let transform = Transform::for_target(snapshot, target, construction.entrance());
        match mode {
            PlacementMode::Show => {
                let report = self.place(snapshot, &transform, None, world)?;
                construction.clear_entities();
                for id in &report.entities {
                    construction.add_entity_raw(*id);
                    self.spawns.release(*id);
                }
                Ok(report)
            }
            PlacementMode::Move | PlacementMode::Pull => {
                self.remove(construction, RemovalMode::MoveClear, world);
                let report = self.place(snapshot, &transform, None, world)?;
                construction.relocate(
                    &transform,
                    report.positions.clone(),
                    report.entities.iter().copied().collect(),
                    world,
                );
                for id in &report.entities {
                    self.spawns.release(*id);
                }
                Ok(report)
            }
            PlacementMode::ArchitectSpawn => self.place(snapshot, &transform, None, world),
        }
    }

    /// Test placement in front of an actor, optionally with a room overlay.
    pub fn spawn_preview(
        &self,
        snapshot: &Snapshot,
        entrance: Option<&Entrance>,
        actor_pos: Vec3,
        actor_yaw: f32,
        room: Option<&str>,
        world: &mut dyn World,
    ) -> Result<PlacementReport, ValidationError> {
        let transform = Transform::for_target(
            snapshot,
            PlacementTarget::InFrontOf {
                actor_pos,
                actor_yaw,
            },
            entrance,
        );
        self.place(snapshot, &transform, room, world)
    }

    /// Pick a room with changes at random for a test placement.
    pub fn random_room<'a, R: Rng + ?Sized>(
        snapshot: &'a Snapshot,
        rng: &mut R,
    ) -> Option<&'a str> {
        let candidates: Vec<&str> = snapshot
            .rooms()
            .values()
            .filter(|r| r.has_changes())
            .map(|r| r.id.as_str())
            .collect();
        candidates.choose(rng).copied()
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Clear the construction's footprint from the world.
    pub fn remove(
        &self,
        construction: &mut Construction,
        mode: RemovalMode,
        world: &mut dyn World,
    ) -> RemovalReport {
        let mut positions: Vec<BlockPos> = construction.tracked_blocks().iter().copied().collect();
        // Top-down so attached blocks go before their supports.
        positions.sort_by_key(|p| (std::cmp::Reverse(p.y), p.x, p.z));

        if mode == RemovalMode::Destroy {
            for pos in &positions {
                if world.block_entity(*pos).is_some() {
                    world.clear_block_entity_contents(*pos);
                }
            }
        }

        let air = BlockState::air();
        let mut report = RemovalReport::default();
        for pos in &positions {
            if !world.block_state(*pos).is_air() {
                report.blocks_cleared += 1;
            }
            world.set_block_state(*pos, &air, PlaceFlags::RECREATE);
        }

        let entities: Vec<EntityId> = construction.tracked_entities().iter().copied().collect();
        report.entities_discarded = self.discard_entities(&entities, world);
        if mode == RemovalMode::Destroy {
            construction.clear_entities();
        }

        debug!(
            "Removed '{}' ({:?}): {} blocks, {} entities",
            construction.id(),
            mode,
            report.blocks_cleared,
            report.entities_discarded
        );
        report
    }

    /// Discard live entities and drop them from spawn-ignore tracking.
    pub fn discard_entities(&self, ids: &[EntityId], world: &mut dyn World) -> usize {
        let mut discarded = 0;
        for id in ids {
            self.spawns.release(*id);
            if world.discard_entity(*id) {
                discarded += 1;
            }
        }
        discarded
    }

    // -----------------------------------------------------------------------
    // Entity recreation
    // -----------------------------------------------------------------------

    /// Recreate a captured entity under a fresh identity.
    pub fn recreate_entity(
        &self,
        entity: &EntityData,
        transform: &Transform,
        world: &mut dyn World,
    ) -> Result<EntityId, WorldError> {
        let data = prepare_entity_data(entity, transform);
        let id = EntityId::new_v4();
        // Must be ignored before it exists, or auto-pickup could claim it.
        self.spawns.ignore(id);
        let spawn = EntitySpawn {
            id,
            kind: entity.kind.clone(),
            pos: transform.apply_vec(entity.pos),
            yaw: transform.apply_yaw(entity.yaw),
            pitch: entity.pitch,
            data,
        };
        match world.spawn_entity(spawn) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.spawns.release(id);
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write states bottom-up. Base placement skips air; room overlays write air
/// too since an override may remove a base block.
fn write_blocks(
    blocks: &BTreeMap<BlockPos, BlockState>,
    transform: &Transform,
    world: &mut dyn World,
    skip_air: bool,
) -> usize {
    let mut ordered: Vec<(&BlockPos, &BlockState)> = blocks
        .iter()
        .filter(|(_, state)| !(skip_air && state.is_air()))
        .collect();
    ordered.sort_by_key(|(p, _)| (p.y, p.x, p.z));

    for (rel, state) in &ordered {
        let state = state.rotated(transform.rotation);
        world.set_block_state(transform.apply(**rel), &state, PlaceFlags::RECREATE);
    }
    ordered.len()
}

fn write_block_entities(
    block_entities: &BTreeMap<BlockPos, Compound>,
    transform: &Transform,
    world: &mut dyn World,
) -> usize {
    for (rel, data) in block_entities {
        let pos = transform.apply(*rel);
        world.set_block_entity(pos, with_position(data, pos));
    }
    block_entities.len()
}

/// Block-entity data with `x`/`y`/`z` set to `pos`.
pub fn with_position(data: &Compound, pos: BlockPos) -> Compound {
    let mut out = data.clone();
    out.insert("x".into(), Value::from(pos.x));
    out.insert("y".into(), Value::from(pos.y));
    out.insert("z".into(), Value::from(pos.z));
    out
}

/// Serialized entity state ready for recreation: position/motion/identity
/// stripped, kind injected if missing, block-position fields remapped.
pub fn prepare_entity_data(entity: &EntityData, transform: &Transform) -> Compound {
    let mut data = entity.data.clone();
    for key in ENTITY_STRIPPED_KEYS {
        data.remove(key);
    }
    data.entry("id")
        .or_insert_with(|| Value::from(entity.kind.as_str()));

    // Hanging entities (frames, paintings) anchor on a block.
    let tile = (
        data.get("TileX").and_then(Value::as_i64),
        data.get("TileY").and_then(Value::as_i64),
        data.get("TileZ").and_then(Value::as_i64),
    );
    if let (Some(x), Some(y), Some(z)) = tile {
        let moved = transform.apply_absolute(BlockPos::new(x as i32, y as i32, z as i32));
        data.insert("TileX".into(), Value::from(moved.x));
        data.insert("TileY".into(), Value::from(moved.y));
        data.insert("TileZ".into(), Value::from(moved.z));
    }

    let block_pos: Option<Vec<i64>> = data
        .get("block_pos")
        .and_then(Value::as_array)
        .map(|coords| coords.iter().filter_map(Value::as_i64).collect());
    if let Some(ints) = block_pos {
        if let [x, y, z] = ints[..] {
            let moved = transform.apply_absolute(BlockPos::new(x as i32, y as i32, z as i32));
            data.insert(
                "block_pos".into(),
                Value::from(vec![moved.x, moved.y, moved.z]),
            );
        }
    }
    data
}
