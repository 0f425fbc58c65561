//! Remote object store abstraction.
//!
//! The engine talks to the bucket only through [`RemoteStore`]: an existence
//! check used for deduplication, and the two batch operations the dispatcher
//! drives.

pub mod memory;
pub mod s3;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{FileDigest, PendingEvent};

/// Result for a single object within a batch.
#[derive(Debug)]
pub struct ItemOutcome {
    pub key: String,
    pub result: Result<(), StoreError>,
}

impl ItemOutcome {
    pub fn ok(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            result: Ok(()),
        }
    }

    pub fn failed(key: impl Into<String>, error: StoreError) -> Self {
        Self {
            key: key.into(),
            result: Err(error),
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether `key` already holds an object whose content matches `digest`.
    async fn exists(&self, key: &str, digest: &FileDigest) -> Result<bool, StoreError>;

    /// Upload every event's file under its canonical key.
    ///
    /// `Err` means the whole batch failed to reach the store; partial failures
    /// are reported per item.
    async fn batch_upload(&self, events: &[PendingEvent]) -> Result<Vec<ItemOutcome>, StoreError>;

    /// Delete every event's canonical key.
    async fn batch_delete(&self, events: &[PendingEvent]) -> Result<Vec<ItemOutcome>, StoreError>;
}
