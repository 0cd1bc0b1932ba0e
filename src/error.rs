//! Error types.

use crate::types::BlockPos;
use thiserror::Error;

/// Rejected input; surfaced to the initiating caller with no partial mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "invalid construction id '{0}': expected at least three dotted [a-z][a-z0-9_]* segments"
    )]
    InvalidConstructionId(String),
    #[error("construction '{0}' has no title")]
    MissingTitle(String),
    #[error("construction '{0}' is empty")]
    EmptyConstruction(String),
    #[error("anchor {pos} is outside the construction bounds")]
    AnchorOutOfBounds { pos: BlockPos },
    #[error("construction has no bounds")]
    NoBounds,
    #[error("room '{0}' not found")]
    UnknownRoom(String),
    #[error("room '{0}' already exists")]
    RoomExists(String),
    #[error("construction '{0}' not found")]
    UnknownConstruction(String),
    #[error("construction '{0}' already exists")]
    ConstructionExists(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by the host world.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("cannot recreate entity of kind '{kind}': {reason}")]
    EntityRejected { kind: String, reason: String },
}

/// Remote catalog synchronisation failures.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("another remote operation is already in progress")]
    Busy,
    #[error("construction '{0}' is already being pulled")]
    PullInProgress(String),
    #[error("construction '{0}' is being edited")]
    UnderEdit(String),
    #[error("remote catalog error: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum StrutturaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, StrutturaError>;
