use std::sync::Arc;

use crate::canonical::canonical_key_for;
use crate::digest::Digester;
use crate::error::DigestError;
use crate::model::{ChangeEvent, ChangeOp, PendingEvent};
use crate::store::RemoteStore;

/// Why an event was not worth syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedundantReason {
    /// The bucket already holds this content under this key.
    AlreadyRemote,
    /// The file was gone by the time it could be hashed.
    Vanished,
    /// The file could not be read.
    Unreadable,
}

#[derive(Debug)]
pub enum Classification {
    Novel(PendingEvent),
    Redundant(RedundantReason),
    /// Operation the engine does not sync (renames).
    Ignored,
}

/// Decides whether a change has to reach the bucket.
///
/// Read-only with respect to the engine: it hashes files and asks the store,
/// nothing else.
pub struct DedupFilter {
    digester: Arc<dyn Digester>,
    store: Arc<dyn RemoteStore>,
}

impl DedupFilter {
    pub fn new(digester: Arc<dyn Digester>, store: Arc<dyn RemoteStore>) -> Self {
        Self { digester, store }
    }

    pub async fn classify(&self, event: ChangeEvent) -> Classification {
        match event.op {
            ChangeOp::Remove => {
                let canonical_key = canonical_key_for(&event.path);
                Classification::Novel(PendingEvent {
                    event,
                    canonical_key,
                    digest: None,
                })
            }
            ChangeOp::RenameOrMove => {
                tracing::debug!(path = %event.path.display(), "rename events are not synced");
                Classification::Ignored
            }
            ChangeOp::Create | ChangeOp::Write => self.classify_content(event).await,
        }
    }

    async fn classify_content(&self, event: ChangeEvent) -> Classification {
        let digest = match self.digester.digest(&event.path).await {
            Ok(digest) => digest,
            Err(DigestError::NotFound(path)) => {
                tracing::warn!(
                    path = %path.display(),
                    op = %event.op,
                    "file vanished before it could be hashed, dropping event"
                );
                return Classification::Redundant(RedundantReason::Vanished);
            }
            Err(err) => {
                tracing::warn!(
                    path = %event.path.display(),
                    op = %event.op,
                    error = %err,
                    "could not hash file, dropping event"
                );
                return Classification::Redundant(RedundantReason::Unreadable);
            }
        };

        let key = digest.canonical_key.clone();
        match self.store.exists(&key, &digest).await {
            Ok(true) => {
                tracing::debug!(key = %key, md5 = %digest.hex(), "already in bucket, skipping");
                return Classification::Redundant(RedundantReason::AlreadyRemote);
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(
                    key = %key,
                    path = %event.path.display(),
                    error = %err,
                    "existence check failed, syncing anyway"
                );
            }
        }

        Classification::Novel(PendingEvent {
            event,
            canonical_key: key,
            digest: Some(digest),
        })
    }
}
