//! Spawn-ignore tracking.
//!
//! Entities recreated by placement or room editing are registered here
//! *before* they are inserted into the world, so automatic adoption
//! ([`crate::session::adopt_entities_in_bounds`]) never claims them.

use crate::types::EntityId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Shared set of entity identities that automatic pickup must skip.
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct SpawnTracker {
    ignored: Arc<Mutex<HashSet<EntityId>>>,
}

impl SpawnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore(&self, id: EntityId) {
        self.ignored.lock().insert(id);
    }

    pub fn release(&self, id: EntityId) -> bool {
        self.ignored.lock().remove(&id)
    }

    pub fn is_ignored(&self, id: EntityId) -> bool {
        self.ignored.lock().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ignored.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ignored.lock().is_empty()
    }
}
