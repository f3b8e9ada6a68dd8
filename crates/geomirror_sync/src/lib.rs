//! # geomirror sync
//!
//! Mirrors the resource graph of a source catalog server onto a destination
//! catalog server over their management APIs.
//!
//! This crate provides:
//! - `SyncManager`, the registry that starts, stops and forgets runs
//! - `Task`, the lock-guarded status, counters and log of one run
//! - `Executor`, the catalog walk and per-resource transfer strategies
//! - `SyncOptions`, the resource kinds and strategy a run uses
//!
//! ## Architecture
//!
//! ```text
//! SyncManager ──start_sync──▶ thread ──▶ Executor::execute ──▶ CatalogClient (source)
//!      │                                   │   │                CatalogClient (destination)
//!      └── stop_task ──▶ CancelToken ──────┘   └──▶ ContentCache (optional)
//! ```
//!
//! ## Key Invariants
//!
//! - `done + skipped + failed <= total` at every observation
//! - A terminal status never changes
//! - Only failing to list the source's workspaces fails a task
//! - "Already exists" on the destination counts as skipped, never failed
//! - Cancellation is checked between resources, never mid-request

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cancel;
mod error;
mod executor;
mod manager;
mod options;
mod task;

pub use cancel::CancelToken;
pub use error::{SyncError, SyncResult};
pub use executor::{CatalogEndpoint, Executor};
pub use manager::SyncManager;
pub use options::{DataStoreStrategy, SyncOptions};
pub use task::{Task, TaskCounters, TaskSnapshot, TaskStatus};
