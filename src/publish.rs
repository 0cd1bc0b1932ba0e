//! Publish preparation.
//!
//! Everything the remote catalog receives is assembled here on the world
//! thread: the construction is validated, its cached statistics and
//! required-mod list are recomputed (never trusted as cached), a snapshot is
//! taken from the world, the live room entity lists are merged in, and the
//! content is fingerprinted. The resulting [`PublishRequest`] is a plain value
//! that can be handed to a background task.

use crate::construction::{Construction, ConstructionMetadata};
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::world::World;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub metadata: ConstructionMetadata,
    pub snapshot: Snapshot,
    /// Hex md5 of `snapshot`.
    pub fingerprint: String,
}

impl PublishRequest {
    /// Build a publish request for `construction`.
    ///
    /// Room entities come from the live rooms only: a loaded construction
    /// carries every room's entity list, so an empty list is an edit, not a
    /// gap to fill from storage.
    pub fn prepare(construction: &mut Construction, world: &dyn World) -> Result<Self> {
        construction.validate_for_publish()?;
        construction.update_cached_stats(world);
        construction.compute_required_mods(world);

        let mut snapshot = Snapshot::from_world(construction, world);
        snapshot.backfill_room_entities_from(construction);

        let fingerprint = snapshot.fingerprint().map_err(crate::error::StoreError::from)?;
        debug!(
            "Prepared publish of '{}' ({} blocks, fingerprint {})",
            construction.id(),
            snapshot.blocks().len(),
            fingerprint
        );
        Ok(Self {
            metadata: construction.metadata(),
            snapshot,
            fingerprint,
        })
    }

    pub fn construction_id(&self) -> &str {
        &self.metadata.id
    }
}
