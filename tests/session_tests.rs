//! Editing session tests

#[cfg(test)]
mod tests {
    use struttura::construction::Construction;
    use struttura::error::ValidationError;
    use struttura::memory::MemoryWorld;
    use struttura::publish::PublishRequest;
    use struttura::session::{
        adopt_entities_in_bounds, EditMode, EditingSession, SavedBlock, SessionState,
    };
    use struttura::spawn::SpawnTracker;
    use struttura::store::{ConstructionStore, MemoryStore};
    use struttura::types::{BlockPos, BlockState, Compound, Vec3};
    use struttura::world::World;

    const GLASS_POS: BlockPos = BlockPos { x: 1, y: 1, z: 0 };
    const ANNEX_POS: BlockPos = BlockPos { x: 3, y: 0, z: 0 };

    fn glass() -> BlockState {
        BlockState::new("minecraft:glass")
    }

    fn saved(state: BlockState) -> SavedBlock {
        SavedBlock { state, data: None }
    }

    /// Stone floor (0..=2, 0, 0), glass on top of the middle, one armor stand.
    fn house(world: &mut MemoryWorld) -> Construction {
        let mut construction = Construction::new("it.test.house", "u1", "Builder").unwrap();
        for x in 0..3 {
            world.set_block(BlockPos::new(x, 0, 0), BlockState::new("minecraft:stone"));
            construction.add_block(BlockPos::new(x, 0, 0), world);
        }
        world.set_block(GLASS_POS, glass());
        construction.add_block(GLASS_POS, world);
        let stand = world.add_entity(
            "minecraft:armor_stand",
            Vec3::new(0.5, 1.0, 0.5),
            Compound::new(),
        );
        construction.add_entity(stand, world);
        construction
    }

    fn start(construction: &mut Construction, world: &MemoryWorld) -> EditingSession {
        EditingSession::start("actor-1", construction, world, SpawnTracker::new())
    }

    /// Inside the entered room: break the glass and build an annex block.
    fn edit_ruin(
        session: &mut EditingSession,
        construction: &mut Construction,
        world: &mut MemoryWorld,
    ) {
        world.set_block(GLASS_POS, BlockState::air());
        session.on_block_broken(GLASS_POS, saved(glass()), construction, &*world);
        world.set_block(ANNEX_POS, BlockState::new("minecraft:cobblestone"));
        session.on_block_placed(ANNEX_POS, saved(BlockState::air()), construction, &*world);
    }

    // -----------------------------------------------------------------------
    // Enter / exit
    // -----------------------------------------------------------------------

    #[test]
    fn enter_hides_base_entities() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Ruin", &mut construction).unwrap();
        assert_eq!(room, "ruin");

        session.enter_room(&room, &mut construction, &mut world).unwrap();
        assert_eq!(session.current_room(), Some("ruin"));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(construction.entity_count(), 0);
    }

    #[test]
    fn exit_restores_base_exactly() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let before_blocks = world.non_air_positions();
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Ruin", &mut construction).unwrap();

        session.enter_room(&room, &mut construction, &mut world).unwrap();
        edit_ruin(&mut session, &mut construction, &mut world);
        assert_eq!(construction.room(&room).unwrap().change_count(), 2);
        // Room edits never touch base tracking.
        assert_eq!(construction.block_count(), 4);

        session.exit_room(&mut construction, &mut world).unwrap();
        assert!(!session.is_in_room());
        assert_eq!(world.block_state(GLASS_POS), glass());
        assert!(world.block_state(ANNEX_POS).is_air());
        assert_eq!(world.non_air_positions(), before_blocks);

        // Base entity back, under a new identity, and tracked.
        assert_eq!(world.entity_count(), 1);
        assert_eq!(construction.entity_count(), 1);
        let id = *construction.tracked_entities().iter().next().unwrap();
        assert_eq!(world.entity(id).unwrap().pos, Vec3::new(0.5, 1.0, 0.5));
    }

    #[test]
    fn exit_releases_entities_back_to_pickup() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let spawns = SpawnTracker::new();
        let mut session =
            EditingSession::start("actor-1", &mut construction, &world, spawns.clone());
        let room = session.create_room("Den", &mut construction).unwrap();

        session.enter_room(&room, &mut construction, &mut world).unwrap();
        let cat = world.add_entity("minecraft:cat", Vec3::new(1.5, 1.0, 0.5), Compound::new());
        session.on_entity_spawned(cat, &mut construction, &world);
        session.exit_room(&mut construction, &mut world).unwrap();
        assert!(spawns.is_empty());

        // The room's cat is managed only while the room is entered.
        session.enter_room(&room, &mut construction, &mut world).unwrap();
        assert_eq!(spawns.len(), 1);
        session.exit_room(&mut construction, &mut world).unwrap();
        assert!(spawns.is_empty());

        let id = *construction.tracked_entities().iter().next().unwrap();
        assert!(world.entity(id).is_some());
        assert!(!spawns.is_ignored(id));
    }

    #[test]
    fn reentering_reapplies_overrides() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Ruin", &mut construction).unwrap();

        session.enter_room(&room, &mut construction, &mut world).unwrap();
        edit_ruin(&mut session, &mut construction, &mut world);
        session.exit_room(&mut construction, &mut world).unwrap();

        session.enter_room(&room, &mut construction, &mut world).unwrap();
        assert!(world.block_state(GLASS_POS).is_air());
        assert_eq!(
            world.block_state(ANNEX_POS).block.as_str(),
            "minecraft:cobblestone"
        );
        session.exit_room(&mut construction, &mut world).unwrap();
        assert_eq!(world.block_state(GLASS_POS), glass());
    }

    #[test]
    fn switching_rooms_exits_first() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        let ruin = session.create_room("Ruin", &mut construction).unwrap();
        let garden = session.create_room("Garden", &mut construction).unwrap();

        session.enter_room(&ruin, &mut construction, &mut world).unwrap();
        edit_ruin(&mut session, &mut construction, &mut world);

        session.enter_room(&garden, &mut construction, &mut world).unwrap();
        assert_eq!(session.current_room(), Some("garden"));
        // Garden has no overrides: the base shows through.
        assert_eq!(world.block_state(GLASS_POS), glass());
        assert!(world.block_state(ANNEX_POS).is_air());
        // Base entities hidden again for the new room.
        assert_eq!(world.entity_count(), 0);

        session.exit_room(&mut construction, &mut world).unwrap();
        assert_eq!(world.entity_count(), 1);
        assert_eq!(construction.entity_count(), 1);
    }

    #[test]
    fn unknown_room_leaves_state_alone() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);

        let err = session
            .enter_room("nowhere", &mut construction, &mut world)
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownRoom("nowhere".into()));
        assert!(!session.is_in_room());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn reverting_an_edit_drops_the_override() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Ruin", &mut construction).unwrap();
        session.enter_room(&room, &mut construction, &mut world).unwrap();

        world.set_block(GLASS_POS, BlockState::air());
        session.on_block_broken(GLASS_POS, saved(glass()), &mut construction, &world);
        assert_eq!(construction.room(&room).unwrap().change_count(), 1);

        world.set_block(GLASS_POS, glass());
        session.on_block_placed(GLASS_POS, saved(BlockState::air()), &mut construction, &world);
        assert_eq!(construction.room(&room).unwrap().change_count(), 0);
    }

    #[test]
    fn room_entities_are_captured_on_exit() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Stable", &mut construction).unwrap();
        session.enter_room(&room, &mut construction, &mut world).unwrap();

        let horse = world.add_entity("minecraft:horse", Vec3::new(2.5, 1.0, 0.5), Compound::new());
        session.on_entity_spawned(horse, &mut construction, &world);
        session.exit_room(&mut construction, &mut world).unwrap();

        let stable = construction.room(&room).unwrap();
        assert_eq!(stable.entity_count(), 1);
        assert_eq!(stable.entities()[0].pos, Vec3::new(2.5, 1.0, 0.5));
        assert!(world.entity(horse).is_none());
        // Only the restored base entity remains.
        assert_eq!(world.entity_count(), 1);

        session.enter_room(&room, &mut construction, &mut world).unwrap();
        assert_eq!(world.entity_count(), 1);
        let id = world.entity_ids()[0];
        assert_eq!(world.entity(id).unwrap().kind.as_str(), "minecraft:horse");
    }

    #[test]
    fn removed_room_entity_stays_removed_on_publish() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        construction.set_title("en", "House");
        let store = MemoryStore::new();

        let mut session = start(&mut construction, &world);
        let den = session.create_room("Den", &mut construction).unwrap();
        session.enter_room(&den, &mut construction, &mut world).unwrap();
        let cat = world.add_entity("minecraft:cat", Vec3::new(2.5, 1.0, 0.5), Compound::new());
        session.on_entity_spawned(cat, &mut construction, &world);
        assert!(session.end(&mut construction, &mut world, &store).unwrap());

        let mut reloaded = store
            .load("it.test.house")
            .unwrap()
            .unwrap()
            .into_construction()
            .unwrap();
        assert_eq!(reloaded.room(&den).unwrap().entity_count(), 1);

        let mut session = start(&mut reloaded, &world);
        session.enter_room(&den, &mut reloaded, &mut world).unwrap();
        let SessionState::InRoom(entry) = session.state() else {
            panic!("expected to be inside '{}'", den);
        };
        let recreated = entry.spawned()[0];
        assert!(world.discard_entity(recreated));
        session.exit_room(&mut reloaded, &mut world).unwrap();
        assert_eq!(reloaded.room(&den).unwrap().entity_count(), 0);

        let request = PublishRequest::prepare(&mut reloaded, &world).unwrap();
        assert!(request.snapshot.room(&den).unwrap().entities.is_empty());
    }

    // -----------------------------------------------------------------------
    // Room management
    // -----------------------------------------------------------------------

    #[test]
    fn rename_entered_room_follows_new_id() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Ruin", &mut construction).unwrap();
        session.create_room("Garden", &mut construction).unwrap();
        session.enter_room(&room, &mut construction, &mut world).unwrap();
        edit_ruin(&mut session, &mut construction, &mut world);

        assert_eq!(
            session.rename_room(&room, "garden", &mut construction),
            Err(ValidationError::RoomExists("garden".into()))
        );
        let renamed = session
            .rename_room(&room, "Old Ruin", &mut construction)
            .unwrap();
        assert_eq!(renamed, "old_ruin");
        assert_eq!(session.current_room(), Some("old_ruin"));
        assert!(!construction.has_room("ruin"));
        assert_eq!(construction.room("old_ruin").unwrap().change_count(), 2);

        session.exit_room(&mut construction, &mut world).unwrap();
        assert_eq!(world.block_state(GLASS_POS), glass());
    }

    #[test]
    fn deleting_entered_room_exits_first() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Ruin", &mut construction).unwrap();
        session.enter_room(&room, &mut construction, &mut world).unwrap();
        edit_ruin(&mut session, &mut construction, &mut world);

        let removed = session
            .delete_room(&room, &mut construction, &mut world)
            .unwrap();
        assert_eq!(removed.change_count(), 2);
        assert!(!session.is_in_room());
        assert_eq!(construction.room_count(), 0);
        assert_eq!(world.block_state(GLASS_POS), glass());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn duplicate_room_name_is_rejected() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        session.create_room("Ruin", &mut construction).unwrap();
        assert!(session.create_room("ruin", &mut construction).is_err());
    }

    // -----------------------------------------------------------------------
    // Base editing
    // -----------------------------------------------------------------------

    #[test]
    fn base_edits_follow_mode() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        assert_eq!(session.mode(), EditMode::Add);

        world.set_block(ANNEX_POS, BlockState::new("minecraft:stone"));
        session.on_block_placed(ANNEX_POS, saved(BlockState::air()), &mut construction, &world);
        assert!(construction.contains_block(ANNEX_POS));
        assert_eq!(construction.bounds().size_string(), "4x2x1");

        assert_eq!(session.toggle_mode(), EditMode::Remove);
        let outside = BlockPos::new(5, 0, 0);
        world.set_block(outside, BlockState::new("minecraft:stone"));
        session.on_block_placed(outside, saved(BlockState::air()), &mut construction, &world);
        assert!(!construction.contains_block(outside));

        assert!(session.select_block(ANNEX_POS, &mut construction, &world));
        assert!(!construction.contains_block(ANNEX_POS));
        assert_eq!(world.block_state(ANNEX_POS).block.as_str(), "minecraft:stone");
    }

    #[test]
    fn breaking_a_tracked_block_uncounts_its_old_state() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let mut session = start(&mut construction, &world);
        assert_eq!(construction.stats().solid_blocks, 4);

        world.set_block(GLASS_POS, BlockState::air());
        session.on_block_broken(GLASS_POS, saved(glass()), &mut construction, &world);
        assert!(!construction.contains_block(GLASS_POS));
        assert_eq!(construction.stats().solid_blocks, 3);
    }

    // -----------------------------------------------------------------------
    // Adoption & teardown
    // -----------------------------------------------------------------------

    #[test]
    fn start_adopts_stray_entities_in_bounds() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let cow = world.add_entity("minecraft:cow", Vec3::new(2.5, 1.0, 0.5), Compound::new());
        let player =
            world.add_entity("minecraft:player", Vec3::new(1.5, 1.0, 0.5), Compound::new());
        let far = world.add_entity("minecraft:pig", Vec3::new(40.0, 1.0, 0.5), Compound::new());

        let _session = start(&mut construction, &world);
        assert!(construction.contains_entity(cow));
        assert!(!construction.contains_entity(player));
        assert!(!construction.contains_entity(far));
        assert_eq!(construction.entity_count(), 2);
    }

    #[test]
    fn adoption_skips_ignored_spawns() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let spawns = SpawnTracker::new();
        let managed = world.add_entity("minecraft:cow", Vec3::new(2.5, 1.0, 0.5), Compound::new());
        spawns.ignore(managed);

        assert_eq!(adopt_entities_in_bounds(&mut construction, &world, &spawns), 0);
        assert!(!construction.contains_entity(managed));
    }

    #[test]
    fn end_exits_room_and_saves() {
        let mut world = MemoryWorld::new();
        let mut construction = house(&mut world);
        let store = MemoryStore::new();
        let mut session = start(&mut construction, &world);
        let room = session.create_room("Ruin", &mut construction).unwrap();
        session.enter_room(&room, &mut construction, &mut world).unwrap();
        edit_ruin(&mut session, &mut construction, &mut world);

        assert!(session.end(&mut construction, &mut world, &store).unwrap());
        assert_eq!(world.block_state(GLASS_POS), glass());

        let record = store.load("it.test.house").unwrap().unwrap();
        assert_eq!(record.snapshot.blocks().len(), 4);
        assert_eq!(record.snapshot.room("ruin").unwrap().blocks.len(), 2);
        assert_eq!(record.metadata.stats.solid_blocks, 4);
        assert_eq!(record.metadata.stats.entities, 1);
    }

    #[test]
    fn end_on_empty_construction_does_not_save() {
        let mut world = MemoryWorld::new();
        let mut construction = Construction::new("it.test.empty", "u1", "Builder").unwrap();
        let store = MemoryStore::new();
        let session = start(&mut construction, &world);
        assert!(!session.end(&mut construction, &mut world, &store).unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
