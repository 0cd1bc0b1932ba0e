//! Durable storage for constructions.
//!
//! A stored construction is a [`ConstructionRecord`]: metadata, the tracked
//! entity identities, and a full snapshot (room entities included). The
//! [`ConstructionStore`] trait is the collaborator seam; [`JsonDirStore`]
//! keeps one JSON file per construction and [`MemoryStore`] keeps records in
//! memory.

use crate::construction::{Construction, ConstructionMetadata};
use crate::error::{StoreError, ValidationError};
use crate::snapshot::Snapshot;
use crate::types::{EntityData, EntityId};
use crate::world::World;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionRecord {
    pub metadata: ConstructionMetadata,
    #[serde(default)]
    pub entities: Vec<EntityId>,
    pub snapshot: Snapshot,
}

impl ConstructionRecord {
    /// Capture a construction for saving. Room entity lists come from the
    /// construction's rooms, since they are not resident in the world.
    pub fn capture(construction: &Construction, world: &dyn World) -> Self {
        let mut snapshot = Snapshot::from_world(construction, world);
        snapshot.backfill_room_entities_from(construction);
        Self {
            metadata: construction.metadata(),
            entities: construction.tracked_entities().iter().copied().collect(),
            snapshot,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Rebuild the live aggregate (raw load path: stored bounds and stats kept).
    pub fn into_construction(self) -> Result<Construction, ValidationError> {
        let origin = self.snapshot.origin();
        let blocks: Vec<_> = self.snapshot.blocks().keys().map(|rel| *rel + origin).collect();
        let rooms: Vec<_> = self
            .snapshot
            .rooms()
            .values()
            .map(|room| room.to_room(origin))
            .collect();
        Construction::from_metadata(self.metadata, blocks, self.entities, rooms)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

pub trait ConstructionStore {
    fn load(&self, id: &str) -> Result<Option<ConstructionRecord>, StoreError>;
    fn save(&self, record: &ConstructionRecord) -> Result<(), StoreError>;
    /// Returns `false` when nothing was stored under `id`.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
    fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Entity list of one room, `None` when the construction or room is unknown.
    fn load_room_entities(
        &self,
        id: &str,
        room_id: &str,
    ) -> Result<Option<Vec<EntityData>>, StoreError> {
        Ok(self
            .load(id)?
            .and_then(|record| record.snapshot.room(room_id).map(|r| r.entities.clone())))
    }
}

// ---------------------------------------------------------------------------
// JSON directory store
// ---------------------------------------------------------------------------

pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl ConstructionStore for JsonDirStore {
    fn load(&self, id: &str) -> Result<Option<ConstructionRecord>, StoreError> {
        let path = self.path_for(id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring unreadable construction file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, record: &ConstructionRecord) -> Result<(), StoreError> {
        let path = self.path_for(record.id());
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)?;
        std::fs::rename(&tmp, &path)?;
        debug!("Saved construction '{}' to {}", record.id(), path.display());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ConstructionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConstructionStore for MemoryStore {
    fn load(&self, id: &str) -> Result<Option<ConstructionRecord>, StoreError> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn save(&self, record: &ConstructionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(record.id().to_string(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.records.lock().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
