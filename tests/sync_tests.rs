//! Remote catalog coordinator tests
#![cfg(feature = "server")]

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;
    use struttura::construction::Construction;
    use struttura::error::{StrutturaError, SyncError};
    use struttura::memory::MemoryWorld;
    use struttura::placement::{PlacementEngine, PlacementTarget};
    use struttura::publish::PublishRequest;
    use struttura::registry::ConstructionRegistry;
    use struttura::room::Room;
    use struttura::snapshot::Snapshot;
    use struttura::spawn::SpawnTracker;
    use struttura::store::{ConstructionStore, MemoryStore};
    use struttura::sync::{
        apply_pulled, CatalogClient, PulledConstruction, PushReceipt, SyncCompletion,
        SyncCoordinator,
    };
    use struttura::types::{BlockPos, BlockState, Rotation};
    use struttura::world::World;
    use tokio::sync::Semaphore;
    use tokio_test::{assert_err, assert_ok};

    /// Catalog whose calls block until the test hands out permits.
    struct GatedCatalog {
        gate: Arc<Semaphore>,
        pushed: Arc<Mutex<Vec<String>>>,
        remote: HashMap<String, PulledConstruction>,
    }

    impl GatedCatalog {
        fn new() -> Self {
            Self {
                gate: Arc::new(Semaphore::new(0)),
                pushed: Arc::new(Mutex::new(Vec::new())),
                remote: HashMap::new(),
            }
        }

        fn open(&self) {
            self.gate.add_permits(64);
        }
    }

    impl CatalogClient for GatedCatalog {
        fn push(
            &self,
            request: PublishRequest,
        ) -> impl Future<Output = Result<PushReceipt, SyncError>> + Send {
            let gate = self.gate.clone();
            let pushed = self.pushed.clone();
            async move {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| SyncError::Remote(e.to_string()))?;
                pushed.lock().push(request.construction_id().to_string());
                Ok(PushReceipt {
                    construction_id: request.construction_id().to_string(),
                    fingerprint: request.fingerprint,
                    unchanged: false,
                })
            }
        }

        fn pull(
            &self,
            construction_id: String,
        ) -> impl Future<Output = Result<PulledConstruction, SyncError>> + Send {
            let gate = self.gate.clone();
            let found = self.remote.get(&construction_id).cloned();
            async move {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| SyncError::Remote(e.to_string()))?;
                found.ok_or_else(|| SyncError::Remote(format!("'{}' not found", construction_id)))
            }
        }
    }

    /// Three stone blocks in a row at (0, 64, 0) with one room.
    fn row(id: &str, world: &mut MemoryWorld) -> Construction {
        let mut construction = Construction::new(id, "u1", "Builder").unwrap();
        for x in 0..3 {
            let pos = BlockPos::new(x, 64, 0);
            world.set_block(pos, BlockState::new("minecraft:stone"));
            construction.add_block(pos, world);
        }
        let mut room = Room::new("Broken");
        room.set_block_change(BlockPos::new(1, 64, 0), BlockState::air(), None);
        construction.add_room(room).unwrap();
        construction.set_title("en", "Row");
        construction
    }

    fn request(id: &str) -> PublishRequest {
        let mut world = MemoryWorld::new();
        let mut construction = row(id, &mut world);
        PublishRequest::prepare(&mut construction, &world).unwrap()
    }

    fn pulled(id: &str) -> PulledConstruction {
        let mut world = MemoryWorld::new();
        let construction = row(id, &mut world);
        PulledConstruction {
            metadata: construction.metadata(),
            snapshot: Snapshot::from_world(&construction, &world),
        }
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn second_push_is_rejected_not_queued() {
        let mut coordinator = SyncCoordinator::new(GatedCatalog::new());
        assert_ok!(coordinator.push(request("it.test.a")));
        assert!(coordinator.is_busy());

        let err = assert_err!(coordinator.push(request("it.test.b")));
        assert!(matches!(err, SyncError::Busy));

        coordinator.client().open();
        match coordinator.next_completion().await {
            Some(SyncCompletion::Pushed {
                construction_id,
                result,
            }) => {
                assert_eq!(construction_id, "it.test.a");
                assert!(!result.unwrap().unchanged);
            }
            other => panic!("unexpected completion {:?}", other),
        }
        assert!(!coordinator.is_busy());
        assert_eq!(*coordinator.client().pushed.lock(), vec!["it.test.a"]);
        assert!(coordinator.drain_completions().is_empty());
    }

    // -----------------------------------------------------------------------
    // Pull
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pull_is_refused_while_editing() {
        let coordinator = SyncCoordinator::new(GatedCatalog::new());
        let mut registry = ConstructionRegistry::new();
        registry.begin_edit("it.test.a", "alice").unwrap();

        let err = assert_err!(coordinator.pull("it.test.a", &registry));
        assert!(matches!(err, SyncError::UnderEdit(id) if id == "it.test.a"));
        assert!(!coordinator.is_busy());
    }

    #[tokio::test]
    async fn pull_guards_per_id_then_globally() {
        let mut catalog = GatedCatalog::new();
        catalog.remote.insert("it.test.a".into(), pulled("it.test.a"));
        let mut coordinator = SyncCoordinator::new(catalog);
        let registry = ConstructionRegistry::new();

        assert_ok!(coordinator.pull("it.test.a", &registry));
        assert!(coordinator.is_pulling("it.test.a"));
        let err = assert_err!(coordinator.pull("it.test.a", &registry));
        assert!(matches!(err, SyncError::PullInProgress(_)));
        let err = assert_err!(coordinator.pull("it.test.b", &registry));
        assert!(matches!(err, SyncError::Busy));

        coordinator.client().open();
        match coordinator.next_completion().await {
            Some(SyncCompletion::Pulled {
                construction_id,
                result,
            }) => {
                assert_eq!(construction_id, "it.test.a");
                assert_eq!(result.unwrap().metadata.id, "it.test.a");
            }
            other => panic!("unexpected completion {:?}", other),
        }
        assert!(!coordinator.is_pulling("it.test.a"));
        assert!(!coordinator.is_busy());
    }

    #[tokio::test]
    async fn failed_pull_still_releases_guards() {
        let mut coordinator = SyncCoordinator::new(GatedCatalog::new());
        coordinator.client().open();
        assert_ok!(coordinator.pull("it.test.missing", &ConstructionRegistry::new()));

        match coordinator.next_completion().await {
            Some(SyncCompletion::Pulled { result, .. }) => {
                assert!(matches!(result, Err(SyncError::Remote(_))));
            }
            other => panic!("unexpected completion {:?}", other),
        }
        assert!(!coordinator.is_pulling("it.test.missing"));
        assert!(!coordinator.is_busy());
    }

    // -----------------------------------------------------------------------
    // Batch publish
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn batch_publishes_in_order() {
        let mut coordinator =
            SyncCoordinator::with_retry_delay(GatedCatalog::new(), Duration::from_millis(10));
        coordinator.client().open();
        coordinator.publish_batch(vec![request("it.test.a"), request("it.test.b")]);

        match coordinator.next_completion().await {
            Some(SyncCompletion::BatchPushed { results }) => {
                let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
                assert_eq!(ids, vec!["it.test.a", "it.test.b"]);
                assert!(results.iter().all(|(_, r)| r.is_ok()));
            }
            other => panic!("unexpected completion {:?}", other),
        }
        assert_eq!(
            *coordinator.client().pushed.lock(),
            vec!["it.test.a", "it.test.b"]
        );
    }

    #[tokio::test]
    async fn batch_gives_up_after_one_retry() {
        let mut coordinator =
            SyncCoordinator::with_retry_delay(GatedCatalog::new(), Duration::from_millis(10));
        assert_ok!(coordinator.push(request("it.test.held")));
        coordinator.publish_batch(vec![request("it.test.a"), request("it.test.b")]);

        match coordinator.next_completion().await {
            Some(SyncCompletion::BatchPushed { results }) => {
                assert_eq!(results.len(), 2);
                assert!(results
                    .iter()
                    .all(|(_, r)| matches!(r, Err(SyncError::Busy))));
            }
            other => panic!("unexpected completion {:?}", other),
        }

        coordinator.client().open();
        assert!(matches!(
            coordinator.next_completion().await,
            Some(SyncCompletion::Pushed { .. })
        ));
        assert_eq!(*coordinator.client().pushed.lock(), vec!["it.test.held"]);
    }

    // -----------------------------------------------------------------------
    // Applying a pull
    // -----------------------------------------------------------------------

    #[test]
    fn apply_pulled_places_registers_and_saves() {
        let mut world = MemoryWorld::new();
        let mut registry = ConstructionRegistry::new();
        let store = MemoryStore::new();
        let engine = PlacementEngine::new(SpawnTracker::new());

        let report = apply_pulled(
            pulled("it.test.row"),
            PlacementTarget::At {
                origin: BlockPos::new(100, 70, 100),
                rotation: Rotation::None,
            },
            &mut registry,
            &engine,
            &mut world,
            &store,
        )
        .unwrap();
        assert_eq!(report.blocks_placed, 3);
        assert_eq!(
            world.block_state(BlockPos::new(102, 70, 100)).block.as_str(),
            "minecraft:stone"
        );

        let construction = registry.get("it.test.row").unwrap();
        assert_eq!(construction.bounds().min(), BlockPos::new(100, 70, 100));
        assert!(construction.contains_block(BlockPos::new(101, 70, 100)));
        // Room overrides follow the construction.
        let room = construction.room("broken").unwrap();
        assert!(room.block_change(BlockPos::new(101, 70, 100)).is_some());
        assert_eq!(store.list().unwrap(), vec!["it.test.row"]);
    }

    #[test]
    fn apply_pulled_replaces_the_loaded_footprint() {
        let mut world = MemoryWorld::new();
        let mut registry = ConstructionRegistry::new();
        let store = MemoryStore::new();
        let engine = PlacementEngine::new(SpawnTracker::new());
        registry.insert(row("it.test.row", &mut world)).unwrap();

        apply_pulled(
            pulled("it.test.row"),
            PlacementTarget::At {
                origin: BlockPos::new(0, 80, 0),
                rotation: Rotation::None,
            },
            &mut registry,
            &engine,
            &mut world,
            &store,
        )
        .unwrap();

        assert!(world.block_state(BlockPos::new(0, 64, 0)).is_air());
        assert_eq!(world.non_air_positions().len(), 3);
        assert_eq!(registry.len(), 1);
        assert!(!registry
            .get("it.test.row")
            .unwrap()
            .contains_block(BlockPos::new(0, 64, 0)));
    }

    #[test]
    fn apply_pulled_refuses_a_construction_under_edit() {
        let mut world = MemoryWorld::new();
        let mut registry = ConstructionRegistry::new();
        let store = MemoryStore::new();
        let engine = PlacementEngine::new(SpawnTracker::new());
        registry.insert(row("it.test.row", &mut world)).unwrap();
        // The edit starts after the pull was requested.
        registry.begin_edit("it.test.row", "alice").unwrap();

        let err = apply_pulled(
            pulled("it.test.row"),
            PlacementTarget::At {
                origin: BlockPos::new(0, 80, 0),
                rotation: Rotation::None,
            },
            &mut registry,
            &engine,
            &mut world,
            &store,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            StrutturaError::Sync(SyncError::UnderEdit(id)) if id == "it.test.row"
        ));
        assert_eq!(registry.editor_of("it.test.row"), Some("alice"));
        assert!(registry
            .get("it.test.row")
            .unwrap()
            .contains_block(BlockPos::new(0, 64, 0)));
        assert!(world.block_state(BlockPos::new(0, 80, 0)).is_air());
        assert!(store.list().unwrap().is_empty());
    }
}
