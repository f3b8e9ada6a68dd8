//! Error types for the sync engine.

use geomirror_catalog::CatalogError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while running or managing sync tasks.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A catalog or cache call failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The run was stopped.
    #[error("sync cancelled")]
    Cancelled,

    /// The worker thread for a task could not be started.
    #[error("failed to spawn sync worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// No task is registered under the id.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// The options could not be decoded.
    #[error("invalid sync options: {0}")]
    InvalidOptions(#[from] serde_json::Error),
}

impl SyncError {
    /// Returns true if this error only reports a cooperative stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
