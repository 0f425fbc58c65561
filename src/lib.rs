//! Watch local paths and mirror their changes into an S3-compatible bucket.
//!
//! Raw filesystem notifications flow through a deduplicating filter into a
//! debounced, size-bounded accumulator; flushed batches are queued for a single
//! dispatcher that uploads or deletes objects. See [`engine`].

pub mod canonical;
pub mod config;
pub mod digest;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod walker;
pub mod watcher;

pub use engine::{EngineConfig, Ingested, SyncEngine};
pub use model::{ChangeEvent, ChangeOp, FileDigest, PendingEvent, SyncTask, TaskKind};
