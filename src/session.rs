//! Per-actor editing session.
//!
//! A session edits one construction, either its base content or one room at
//! a time. Moving between the two goes through [`EditingSession::transition`]:
//!
//! ```text
//!            enter(r)                      enter(r2) = exit + enter
//!   Base ─────────────────▶ InRoom(r) ─────────────────▶ InRoom(r2)
//!    ▲                          │
//!    └──────── exit ────────────┘
//! ```
//!
//! Entering hides the base entities (captured, then discarded), saves the
//! world at every coordinate the room overrides, applies the overrides and
//! recreates the room's entities. Exiting captures and discards the room
//! entities, restores the saved base state verbatim and recreates the hidden
//! base entities under fresh identities. None of this transient state is
//! persisted; [`EditingSession::end`] always exits before saving.

use crate::construction::Construction;
use crate::error::{Result, ValidationError};
use crate::placement::{with_position, PlacementEngine, Transform};
use crate::room::Room;
use crate::spawn::SpawnTracker;
use crate::store::{ConstructionRecord, ConstructionStore};
use crate::types::{BlockPos, BlockState, Compound, EntityData, EntityId, Rotation};
use crate::world::{PlaceFlags, World};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    #[default]
    Add,
    Remove,
}

/// World content at one coordinate, as it was before a room overrode it.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedBlock {
    pub state: BlockState,
    pub data: Option<Compound>,
}

/// Transient bookkeeping for the entered room.
#[derive(Debug, Clone)]
pub struct RoomEntry {
    room_id: String,
    /// Construction origin when the room was entered; entity positions are
    /// relative to it.
    origin: BlockPos,
    size: BlockPos,
    hidden_entities: Vec<EntityData>,
    saved_base: BTreeMap<BlockPos, SavedBlock>,
    spawned: Vec<EntityId>,
}

impl RoomEntry {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn hidden_entities(&self) -> &[EntityData] {
        &self.hidden_entities
    }

    pub fn saved_base(&self) -> &BTreeMap<BlockPos, SavedBlock> {
        &self.saved_base
    }

    pub fn spawned(&self) -> &[EntityId] {
        &self.spawned
    }

    fn transform(&self) -> Transform {
        Transform {
            source_origin: self.origin,
            size: self.size,
            rotation: Rotation::None,
            target_origin: self.origin,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Base,
    InRoom(RoomEntry),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct EditingSession {
    actor_id: String,
    construction_id: String,
    mode: EditMode,
    state: SessionState,
    engine: PlacementEngine,
}

impl EditingSession {
    pub fn new(
        actor_id: impl Into<String>,
        construction_id: impl Into<String>,
        spawns: SpawnTracker,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            construction_id: construction_id.into(),
            mode: EditMode::Add,
            state: SessionState::Base,
            engine: PlacementEngine::new(spawns),
        }
    }

    /// Start editing `construction`: adopt stray entities already standing in
    /// its volume.
    pub fn start(
        actor_id: impl Into<String>,
        construction: &mut Construction,
        world: &dyn World,
        spawns: SpawnTracker,
    ) -> Self {
        let session = Self::new(actor_id, construction.id(), spawns);
        let adopted = adopt_entities_in_bounds(construction, world, session.engine.spawns());
        info!(
            "'{}' started editing '{}' ({} entities adopted)",
            session.actor_id,
            construction.id(),
            adopted
        );
        session
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn construction_id(&self) -> &str {
        &self.construction_id
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: EditMode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) -> EditMode {
        self.mode = match self.mode {
            EditMode::Add => EditMode::Remove,
            EditMode::Remove => EditMode::Add,
        };
        self.mode
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_room(&self) -> Option<&str> {
        match &self.state {
            SessionState::InRoom(entry) => Some(&entry.room_id),
            SessionState::Base => None,
        }
    }

    pub fn is_in_room(&self) -> bool {
        matches!(self.state, SessionState::InRoom(_))
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    /// Move to `target` (`None` = base). Validates before touching the world.
    pub fn transition(
        &mut self,
        target: Option<&str>,
        construction: &mut Construction,
        world: &mut dyn World,
    ) -> std::result::Result<(), ValidationError> {
        if let Some(room_id) = target {
            if !construction.has_room(room_id) {
                return Err(ValidationError::UnknownRoom(room_id.to_string()));
            }
        }
        if self.current_room() == target {
            return Ok(());
        }

        if let SessionState::InRoom(entry) = std::mem::replace(&mut self.state, SessionState::Base)
        {
            self.leave_room(entry, construction, world);
        }
        if let Some(room_id) = target {
            let entry = self.enter(room_id, construction, world);
            self.state = SessionState::InRoom(entry);
        }
        Ok(())
    }

    pub fn enter_room(
        &mut self,
        room_id: &str,
        construction: &mut Construction,
        world: &mut dyn World,
    ) -> std::result::Result<(), ValidationError> {
        self.transition(Some(room_id), construction, world)
    }

    pub fn exit_room(
        &mut self,
        construction: &mut Construction,
        world: &mut dyn World,
    ) -> std::result::Result<(), ValidationError> {
        self.transition(None, construction, world)
    }

    fn enter(
        &mut self,
        room_id: &str,
        construction: &mut Construction,
        world: &mut dyn World,
    ) -> RoomEntry {
        let bounds = *construction.bounds();
        let mut entry = RoomEntry {
            room_id: room_id.to_string(),
            origin: bounds.min(),
            size: bounds.size(),
            hidden_entities: Vec::new(),
            saved_base: BTreeMap::new(),
            spawned: Vec::new(),
        };
        let origin_vec = entry.origin.as_vec3();

        // 1. Hide base entities: capture, then discard.
        let base_ids: Vec<EntityId> = construction.tracked_entities().iter().copied().collect();
        for id in &base_ids {
            if let Some(entity) = world.entity(*id) {
                entry.hidden_entities.push(EntityData {
                    kind: entity.kind,
                    pos: entity.pos - origin_vec,
                    yaw: entity.yaw,
                    pitch: entity.pitch,
                    data: entity.data,
                });
            }
        }
        self.engine.discard_entities(&base_ids, world);
        construction.clear_entities();

        let Some(room) = construction.room(room_id) else {
            return entry;
        };

        // 2. Save base state at every overridden coordinate, before step 3.
        for pos in room.block_changes().keys() {
            entry.saved_base.insert(
                *pos,
                SavedBlock {
                    state: world.block_state(*pos),
                    data: world.block_entity(*pos),
                },
            );
        }

        // 3. Apply the overrides.
        let mut overrides: Vec<(&BlockPos, &BlockState)> = room.block_changes().iter().collect();
        overrides.sort_by_key(|(p, _)| (p.y, p.x, p.z));
        for (pos, state) in overrides {
            world.set_block_state(*pos, state, PlaceFlags::RECREATE);
        }
        for (pos, data) in room.block_entity_changes() {
            world.set_block_entity(*pos, with_position(data, *pos));
        }

        // 4. Recreate the room's own entities.
        let transform = entry.transform();
        for entity in room.entities() {
            match self.engine.recreate_entity(entity, &transform, world) {
                Ok(id) => entry.spawned.push(id),
                Err(e) => warn!("Skipping entity of room '{}': {}", room_id, e),
            }
        }

        info!(
            "'{}' entered room '{}' of '{}' ({} overrides, {} base entities hidden)",
            self.actor_id,
            room_id,
            construction.id(),
            entry.saved_base.len(),
            entry.hidden_entities.len()
        );
        entry
    }

    fn leave_room(
        &mut self,
        entry: RoomEntry,
        construction: &mut Construction,
        world: &mut dyn World,
    ) {
        let origin_vec = entry.origin.as_vec3();

        // 1. Capture room entities (edits persist), then discard them.
        let captured: Vec<EntityData> = entry
            .spawned
            .iter()
            .filter_map(|id| world.entity(*id))
            .map(|entity| EntityData {
                kind: entity.kind,
                pos: entity.pos - origin_vec,
                yaw: entity.yaw,
                pitch: entity.pitch,
                data: entity.data,
            })
            .collect();
        self.engine.discard_entities(&entry.spawned, world);
        if let Some(room) = construction.room_mut(&entry.room_id) {
            room.set_entities(captured);
        }

        // 2. Restore the exact pre-overlay base state.
        let mut saved: Vec<(&BlockPos, &SavedBlock)> = entry.saved_base.iter().collect();
        saved.sort_by_key(|(p, _)| (p.y, p.x, p.z));
        for (pos, block) in saved {
            world.set_block_state(*pos, &block.state, PlaceFlags::RECREATE);
            if let Some(data) = &block.data {
                world.set_block_entity(*pos, data.clone());
            }
        }

        // 3. Bring back the hidden base entities under fresh identities.
        let transform = entry.transform();
        for entity in &entry.hidden_entities {
            match self.engine.recreate_entity(entity, &transform, world) {
                Ok(id) => {
                    construction.add_entity_raw(id);
                    self.engine.spawns().release(id);
                }
                Err(e) => warn!("Could not restore base entity: {}", e),
            }
        }

        info!(
            "'{}' left room '{}' of '{}'",
            self.actor_id,
            entry.room_id,
            construction.id()
        );
    }

    // -----------------------------------------------------------------------
    // Room management
    // -----------------------------------------------------------------------

    /// Create an empty room named `name`; returns its id.
    pub fn create_room(
        &mut self,
        name: &str,
        construction: &mut Construction,
    ) -> std::result::Result<String, ValidationError> {
        let room = Room::new(name);
        let id = room.id().to_string();
        construction.add_room(room)?;
        debug!("Created room '{}' in '{}'", id, construction.id());
        Ok(id)
    }

    /// Delete a room, exiting it first if it is the entered one.
    pub fn delete_room(
        &mut self,
        room_id: &str,
        construction: &mut Construction,
        world: &mut dyn World,
    ) -> std::result::Result<Room, ValidationError> {
        if !construction.has_room(room_id) {
            return Err(ValidationError::UnknownRoom(room_id.to_string()));
        }
        if self.current_room() == Some(room_id) {
            self.exit_room(construction, world)?;
        }
        construction
            .remove_room(room_id)
            .ok_or_else(|| ValidationError::UnknownRoom(room_id.to_string()))
    }

    /// Rename a room (its id follows the name). Returns the new id.
    pub fn rename_room(
        &mut self,
        room_id: &str,
        new_name: &str,
        construction: &mut Construction,
    ) -> std::result::Result<String, ValidationError> {
        let room = construction
            .room(room_id)
            .ok_or_else(|| ValidationError::UnknownRoom(room_id.to_string()))?;
        let renamed = room.copy_with_new_name(new_name);
        let new_id = renamed.id().to_string();
        if new_id != room_id && construction.has_room(&new_id) {
            return Err(ValidationError::RoomExists(new_id));
        }
        construction.remove_room(room_id);
        construction.add_room(renamed)?;
        if let SessionState::InRoom(entry) = &mut self.state {
            if entry.room_id == room_id {
                entry.room_id = new_id.clone();
            }
        }
        Ok(new_id)
    }

    // -----------------------------------------------------------------------
    // Edit hooks
    // -----------------------------------------------------------------------

    /// A block was placed at `pos`. In base editing with ADD mode it becomes
    /// tracked; inside a room the change is recorded as an override.
    pub fn on_block_placed(
        &mut self,
        pos: BlockPos,
        previous: SavedBlock,
        construction: &mut Construction,
        world: &dyn World,
    ) {
        if self.is_in_room() {
            self.record_block_change(pos, previous, construction, world);
        } else if self.mode == EditMode::Add {
            construction.add_block(pos, world);
        }
    }

    /// A block at `pos` was broken. Outside rooms it stops being tracked;
    /// inside a room the change is recorded as an override.
    pub fn on_block_broken(
        &mut self,
        pos: BlockPos,
        previous: SavedBlock,
        construction: &mut Construction,
        world: &dyn World,
    ) {
        if self.is_in_room() {
            self.record_block_change(pos, previous, construction, world);
        } else {
            construction.remove_block_with_state(pos, &previous.state, world);
        }
    }

    /// An entity appeared through the actor's edit. Inside a room it belongs
    /// to the room and is captured on exit; otherwise it is tracked.
    pub fn on_entity_spawned(
        &mut self,
        id: EntityId,
        construction: &mut Construction,
        world: &dyn World,
    ) {
        match &mut self.state {
            SessionState::InRoom(entry) => {
                if !entry.spawned.contains(&id) {
                    entry.spawned.push(id);
                }
            }
            SessionState::Base => {
                construction.add_entity(id, world);
            }
        }
    }

    /// Explicit selection of an existing block: ADD tracks it, REMOVE untracks it.
    pub fn select_block(
        &mut self,
        pos: BlockPos,
        construction: &mut Construction,
        world: &dyn World,
    ) -> bool {
        match self.mode {
            EditMode::Add => construction.add_block(pos, world),
            EditMode::Remove => construction.remove_block(pos, world),
        }
    }

    /// Record the world's current content at `pos` into the entered room.
    /// `previous` is what was there before the edit; it becomes the saved base
    /// unless one was already saved. A change back to the base removes the
    /// override.
    pub fn record_block_change(
        &mut self,
        pos: BlockPos,
        previous: SavedBlock,
        construction: &mut Construction,
        world: &dyn World,
    ) {
        let SessionState::InRoom(entry) = &mut self.state else {
            return;
        };
        let base = entry.saved_base.entry(pos).or_insert(previous).clone();
        let Some(room) = construction.room_mut(&entry.room_id) else {
            return;
        };

        let current = world.block_state(pos);
        let data = world.block_entity(pos);
        if current == base.state && data == base.data {
            room.remove_block_change(pos);
            entry.saved_base.remove(&pos);
        } else {
            let data = data.as_ref().map(crate::snapshot::strip_block_entity);
            room.set_block_change(pos, current, data);
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Finish the session: leave any room, recompute caches and persist the
    /// construction if it has content. Returns whether it was saved.
    pub fn end(
        mut self,
        construction: &mut Construction,
        world: &mut dyn World,
        store: &dyn ConstructionStore,
    ) -> Result<bool> {
        self.exit_room(construction, world)?;
        if construction.is_empty() {
            info!("'{}' ended session on empty '{}'", self.actor_id, construction.id());
            return Ok(false);
        }
        construction.update_cached_stats(world);
        construction.compute_required_mods(world);
        store.save(&ConstructionRecord::capture(construction, world))?;
        info!("'{}' saved '{}'", self.actor_id, construction.id());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Entity adoption
// ---------------------------------------------------------------------------

/// Track every persistent entity inside the construction's bounds that is
/// neither tracked already nor registered as a managed spawn.
pub fn adopt_entities_in_bounds(
    construction: &mut Construction,
    world: &dyn World,
    spawns: &SpawnTracker,
) -> usize {
    let bounds = *construction.bounds();
    if !bounds.is_valid() {
        return 0;
    }
    let mut adopted = 0;
    for id in world.entities_within(bounds.min(), bounds.max()) {
        if construction.contains_entity(id) || spawns.is_ignored(id) {
            continue;
        }
        let Some(entity) = world.entity(id) else {
            continue;
        };
        if !world.is_persistent_entity(&entity) {
            continue;
        }
        construction.add_entity(id, world);
        adopted += 1;
    }
    adopted
}
