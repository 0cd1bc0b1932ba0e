//! Struttura
//!
//! Capture, edit, persist and re-place voxel constructions against a host
//! world. A construction is a set of *references* into the world (block
//! coordinates and entity identities) plus named delta rooms; snapshots
//! materialise it into a portable value that can be placed back anywhere,
//! at any quarter-turn rotation.
//!
//! ## Architecture
//!
//! ```text
//! SyncCoordinator  (sync.rs)        ← background push/pull, completion queue
//!   └── ConstructionRegistry  (registry.rs)  ← loaded constructions, edit locks
//!         ├── EditingSession  (session.rs)   ← base/room state machine
//!         ├── Construction  (construction.rs)
//!         │     ├── ConstructionBounds / Anchors  (bounds.rs)
//!         │     └── Room  (room.rs)
//!         ├── Snapshot  (snapshot.rs) ──▶ PlacementEngine  (placement.rs)
//!         └── ConstructionStore  (store.rs)
//!
//! World  (world.rs)  ← host capability, MemoryWorld (memory.rs) for tests
//! ```
//!
//! All mutation of constructions and the world happens on the caller's
//! (world) thread. Only [`sync`] spawns tasks, and those hand their results
//! back through a queue instead of touching shared state.

pub mod bounds;
pub mod config;
pub mod construction;
pub mod error;
pub mod memory;
pub mod placement;
pub mod publish;
pub mod registry;
pub mod room;
pub mod session;
pub mod snapshot;
pub mod spawn;
pub mod store;
pub mod text;
pub mod types;
pub mod world;

// Background remote sync requires the `server` feature.
#[cfg(feature = "server")]
pub mod sync;

pub use bounds::{Anchors, ConstructionBounds, Entrance};
pub use config::StrutturaConfig;
pub use construction::{Construction, ConstructionMetadata, RequiredMod};
pub use error::{Result, StoreError, StrutturaError, SyncError, ValidationError, WorldError};
pub use memory::MemoryWorld;
pub use placement::{
    PlacementEngine, PlacementMode, PlacementReport, PlacementTarget, RemovalMode, RemovalReport,
    Transform,
};
pub use publish::PublishRequest;
pub use registry::ConstructionRegistry;
pub use room::Room;
pub use session::{EditMode, EditingSession, SavedBlock};
pub use snapshot::{RoomSnapshot, Snapshot};
pub use spawn::SpawnTracker;
pub use store::{ConstructionRecord, ConstructionStore, JsonDirStore, MemoryStore};
#[cfg(feature = "server")]
pub use sync::{CatalogClient, PulledConstruction, PushReceipt, SyncCompletion, SyncCoordinator};
pub use text::LocalizedText;
pub use types::{
    BlockPos, BlockState, Compound, ConstructionStats, EntityData, EntityId, Facing, ResourceId,
    Rotation, Vec3,
};
pub use world::{EntitySpawn, EntityView, ModInfo, PlaceFlags, World};
