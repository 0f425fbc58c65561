//! In-process store. Backs `watch --dry-run` and the test suite.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{ItemOutcome, RemoteStore};
use crate::error::StoreError;
use crate::model::{FileDigest, PendingEvent, TaskKind};

/// A batch call as the store saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: TaskKind,
    pub keys: Vec<String>,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// key -> hex digest
    objects: HashMap<String, String>,
    /// `None` unless built with [`MemoryStore::recording`].
    calls: Option<Vec<RecordedCall>>,
    failing_keys: HashSet<String>,
    unavailable: bool,
    exists_queries: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that also logs every batch call, for assertions on batching.
    pub fn recording() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                calls: Some(Vec::new()),
                ..MemoryState::default()
            }),
        }
    }

    /// Seed an object as if it had been uploaded earlier.
    pub async fn insert(&self, key: impl Into<String>, hex_digest: impl Into<String>) {
        self.state
            .lock()
            .await
            .objects
            .insert(key.into(), hex_digest.into());
    }

    /// Make every upload or delete of `key` fail.
    pub async fn fail_key(&self, key: impl Into<String>) {
        self.state.lock().await.failing_keys.insert(key.into());
    }

    /// Simulate the store being unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Batch calls seen so far; always empty unless built with [`MemoryStore::recording`].
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().await.calls.clone().unwrap_or_default()
    }

    pub async fn objects(&self) -> HashMap<String, String> {
        self.state.lock().await.objects.clone()
    }

    pub async fn exists_queries(&self) -> usize {
        self.state.lock().await.exists_queries
    }
}

fn record(state: &mut MemoryState, kind: TaskKind, events: &[PendingEvent]) {
    let Some(calls) = &mut state.calls else {
        return;
    };
    calls.push(RecordedCall {
        kind,
        keys: events.iter().map(|e| e.canonical_key.clone()).collect(),
        at: Instant::now(),
    });
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn exists(&self, key: &str, digest: &FileDigest) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.exists_queries += 1;
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(state.objects.get(key) == Some(&digest.hex()))
    }

    async fn batch_upload(&self, events: &[PendingEvent]) -> Result<Vec<ItemOutcome>, StoreError> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        record(&mut state, TaskKind::Upload, events);

        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            let key = event.canonical_key.clone();
            if state.failing_keys.contains(&key) {
                outcomes.push(ItemOutcome::failed(
                    key.clone(),
                    StoreError::Object {
                        key,
                        message: "injected failure".into(),
                    },
                ));
                continue;
            }
            match &event.digest {
                Some(digest) => {
                    tracing::debug!(key = %key, size = digest.size_bytes, "memory store: upload");
                    state.objects.insert(key.clone(), digest.hex());
                    outcomes.push(ItemOutcome::ok(key));
                }
                None => outcomes.push(ItemOutcome::failed(
                    key.clone(),
                    StoreError::Object {
                        key,
                        message: "upload without digest".into(),
                    },
                )),
            }
        }
        Ok(outcomes)
    }

    async fn batch_delete(&self, events: &[PendingEvent]) -> Result<Vec<ItemOutcome>, StoreError> {
        let mut state = self.state.lock().await;
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        record(&mut state, TaskKind::Delete, events);

        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            let key = event.canonical_key.clone();
            if state.failing_keys.contains(&key) {
                outcomes.push(ItemOutcome::failed(
                    key.clone(),
                    StoreError::Object {
                        key,
                        message: "injected failure".into(),
                    },
                ));
                continue;
            }
            tracing::debug!(key = %key, "memory store: delete");
            state.objects.remove(&key);
            outcomes.push(ItemOutcome::ok(key));
        }
        Ok(outcomes)
    }
}
