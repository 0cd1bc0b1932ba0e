//! Remote catalog synchronisation.
//!
//! ## Threading
//!
//! ```text
//!   world thread                      tokio tasks
//!   ────────────                      ───────────
//!   PublishRequest::prepare ──push──▶ client.push(..).await
//!   pull(id) ────────────────────────▶ client.pull(..).await
//!                                           │
//!   drain_completions() ◀── mpsc ───────────┘
//!   apply_pulled(..)   (mutates constructions + world)
//! ```
//!
//! Background tasks never touch a construction or the world: they only send a
//! [`SyncCompletion`] back through the queue, which the world thread drains.
//!
//! ## Guards
//!
//! - One remote operation in flight globally; a second request is rejected
//!   with [`SyncError::Busy`], never queued.
//! - A construction id can be pulled once at a time, and never while it is
//!   being edited.
//! - Batch publish retries the global guard once after `retry_delay`.
//! - No cancellation: a started operation runs to success or failure.

use crate::construction::{Construction, ConstructionMetadata};
use crate::error::{Result, SyncError};
use crate::placement::{PlacementEngine, PlacementMode, PlacementReport, PlacementTarget};
use crate::publish::PublishRequest;
use crate::registry::ConstructionRegistry;
use crate::snapshot::Snapshot;
use crate::store::ConstructionStore;
use crate::types::{BlockPos, EntityId};
use crate::world::World;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Default pause before the single batch-publish retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub construction_id: String,
    pub fingerprint: String,
    /// The catalog already held identical content.
    #[serde(default)]
    pub unchanged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulledConstruction {
    pub metadata: ConstructionMetadata,
    pub snapshot: Snapshot,
}

// ---------------------------------------------------------------------------
// Client seam
// ---------------------------------------------------------------------------

/// Transport to the remote catalog. Implementations own retries/timeouts of
/// the transport itself; the coordinator adds none.
pub trait CatalogClient: Send + Sync + 'static {
    fn push(
        &self,
        request: PublishRequest,
    ) -> impl Future<Output = std::result::Result<PushReceipt, SyncError>> + Send;

    fn pull(
        &self,
        construction_id: String,
    ) -> impl Future<Output = std::result::Result<PulledConstruction, SyncError>> + Send;
}

// ---------------------------------------------------------------------------
// Completions
// ---------------------------------------------------------------------------

/// Outcome of a background operation, delivered to the world thread.
#[derive(Debug)]
pub enum SyncCompletion {
    Pushed {
        construction_id: String,
        result: std::result::Result<PushReceipt, SyncError>,
    },
    Pulled {
        construction_id: String,
        result: std::result::Result<PulledConstruction, SyncError>,
    },
    BatchPushed {
        results: Vec<(String, std::result::Result<PushReceipt, SyncError>)>,
    },
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Holds the global in-flight flag; released on drop.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Holds one construction id in the pull set; released on drop.
struct PullGuard {
    pulling: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for PullGuard {
    fn drop(&mut self) {
        self.pulling.lock().remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Starts remote operations from the world thread and queues their results.
///
/// Operation starters call `tokio::spawn` and must run inside a Tokio runtime.
pub struct SyncCoordinator<C: CatalogClient> {
    client: Arc<C>,
    in_flight: Arc<AtomicBool>,
    pulling: Arc<Mutex<HashSet<String>>>,
    completions_tx: mpsc::UnboundedSender<SyncCompletion>,
    completions_rx: mpsc::UnboundedReceiver<SyncCompletion>,
    retry_delay: Duration,
}

impl<C: CatalogClient> SyncCoordinator<C> {
    pub fn new(client: C) -> Self {
        Self::with_retry_delay(client, DEFAULT_RETRY_DELAY)
    }

    pub fn with_retry_delay(client: C, retry_delay: Duration) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            client: Arc::new(client),
            in_flight: Arc::new(AtomicBool::new(false)),
            pulling: Arc::new(Mutex::new(HashSet::new())),
            completions_tx,
            completions_rx,
            retry_delay,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_pulling(&self, construction_id: &str) -> bool {
        self.pulling.lock().contains(construction_id)
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Publish one construction in the background.
    pub fn push(&self, request: PublishRequest) -> std::result::Result<(), SyncError> {
        let guard = InFlightGuard::try_acquire(&self.in_flight).ok_or(SyncError::Busy)?;
        let client = self.client.clone();
        let tx = self.completions_tx.clone();
        let construction_id = request.construction_id().to_string();
        let span = tracing::info_span!("catalog_push", construction = %construction_id);

        tokio::spawn(
            async move {
                let result = client.push(request).await;
                drop(guard);
                if let Err(e) = &result {
                    warn!("Push of '{}' failed: {}", construction_id, e);
                }
                send(&tx, SyncCompletion::Pushed {
                    construction_id,
                    result,
                });
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Fetch a construction in the background. Rejected while the id is being
    /// edited or already being pulled, or while any operation is in flight.
    pub fn pull(
        &self,
        construction_id: &str,
        registry: &ConstructionRegistry,
    ) -> std::result::Result<(), SyncError> {
        if registry.is_being_edited(construction_id) {
            return Err(SyncError::UnderEdit(construction_id.to_string()));
        }
        if self.is_pulling(construction_id) {
            return Err(SyncError::PullInProgress(construction_id.to_string()));
        }
        let guard = InFlightGuard::try_acquire(&self.in_flight).ok_or(SyncError::Busy)?;
        self.pulling.lock().insert(construction_id.to_string());
        let pull_guard = PullGuard {
            pulling: self.pulling.clone(),
            id: construction_id.to_string(),
        };

        let client = self.client.clone();
        let tx = self.completions_tx.clone();
        let construction_id = construction_id.to_string();
        let span = tracing::info_span!("catalog_pull", construction = %construction_id);

        tokio::spawn(
            async move {
                let result = client.pull(construction_id.clone()).await;
                drop(pull_guard);
                drop(guard);
                if let Err(e) = &result {
                    warn!("Pull of '{}' failed: {}", construction_id, e);
                }
                send(&tx, SyncCompletion::Pulled {
                    construction_id,
                    result,
                });
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Publish several constructions sequentially under one guard. If another
    /// operation holds the guard, waits `retry_delay` and tries once more;
    /// if still busy every item completes with [`SyncError::Busy`].
    pub fn publish_batch(&self, requests: Vec<PublishRequest>) {
        let in_flight = self.in_flight.clone();
        let client = self.client.clone();
        let tx = self.completions_tx.clone();
        let delay = self.retry_delay;
        let span = tracing::info_span!("catalog_publish_batch", count = requests.len());

        tokio::spawn(
            async move {
                let guard = match InFlightGuard::try_acquire(&in_flight) {
                    Some(guard) => Some(guard),
                    None => {
                        debug!("Catalog busy, retrying batch in {:?}", delay);
                        tokio::time::sleep(delay).await;
                        InFlightGuard::try_acquire(&in_flight)
                    }
                };
                let Some(guard) = guard else {
                    warn!("Catalog still busy, batch of {} not published", requests.len());
                    let results = requests
                        .iter()
                        .map(|r| (r.construction_id().to_string(), Err(SyncError::Busy)))
                        .collect();
                    send(&tx, SyncCompletion::BatchPushed { results });
                    return;
                };

                let mut results = Vec::with_capacity(requests.len());
                for request in requests {
                    let id = request.construction_id().to_string();
                    let result = client.push(request).await;
                    results.push((id, result));
                }
                drop(guard);
                info!(
                    "Batch publish finished: {}/{} succeeded",
                    results.iter().filter(|(_, r)| r.is_ok()).count(),
                    results.len()
                );
                send(&tx, SyncCompletion::BatchPushed { results });
            }
            .instrument(span),
        );
    }

    // -----------------------------------------------------------------------
    // World-thread side
    // -----------------------------------------------------------------------

    /// Everything completed since the last call, without blocking.
    pub fn drain_completions(&mut self) -> Vec<SyncCompletion> {
        let mut out = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            out.push(completion);
        }
        out
    }

    /// Wait for the next completion.
    pub async fn next_completion(&mut self) -> Option<SyncCompletion> {
        self.completions_rx.recv().await
    }
}

fn send(tx: &mpsc::UnboundedSender<SyncCompletion>, completion: SyncCompletion) {
    if tx.send(completion).is_err() {
        debug!("Sync completion dropped: coordinator gone");
    }
}

// ---------------------------------------------------------------------------
// Applying a pull
// ---------------------------------------------------------------------------

/// Apply a fetched construction on the world thread with `Pull` semantics:
/// the previously tracked footprint (if the id is loaded) is cleared, the
/// fetched snapshot is placed at `target` and becomes authoritative, and the
/// result is saved. Refused with [`SyncError::UnderEdit`] if an edit began
/// after the pull was requested; nothing is touched in that case.
pub fn apply_pulled(
    pulled: PulledConstruction,
    target: PlacementTarget,
    registry: &mut ConstructionRegistry,
    engine: &PlacementEngine,
    world: &mut dyn World,
    store: &dyn ConstructionStore,
) -> Result<PlacementReport> {
    let PulledConstruction { metadata, snapshot } = pulled;
    let id = metadata.id.clone();
    // An edit may have started while the request was in flight.
    if registry.is_being_edited(&id) {
        warn!("Discarding pulled '{}': it is being edited", id);
        return Err(SyncError::UnderEdit(id).into());
    }
    let origin = snapshot.origin();
    let rooms = snapshot.rooms().values().map(|room| room.to_room(origin));

    let previous = registry.remove(&id);
    let (blocks, entities): (Vec<BlockPos>, Vec<EntityId>) = match &previous {
        Some(existing) => (
            existing.tracked_blocks().iter().copied().collect(),
            existing.tracked_entities().iter().copied().collect(),
        ),
        None => (Vec::new(), Vec::new()),
    };
    let mut construction = Construction::from_metadata(metadata, blocks, entities, rooms)?;

    let report = engine.place_construction(
        &mut construction,
        &snapshot,
        PlacementMode::Pull,
        target,
        world,
    )?;
    info!(
        "Pulled '{}' placed at {} ({} blocks)",
        id,
        construction.bounds().min(),
        report.blocks_placed
    );
    registry.insert(construction)?;
    registry.save(&id, store, world)?;
    Ok(report)
}
