use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{SyncTask, TaskKind};
use crate::store::RemoteStore;

/// Producer half of the dispatch queue. Only the engine's flush holds one.
pub type TaskSender = mpsc::UnboundedSender<SyncTask>;
pub type TaskReceiver = mpsc::UnboundedReceiver<SyncTask>;

/// FIFO between flushes and the dispatcher. Unbounded: a flush never waits
/// on the network.
pub fn queue() -> (TaskSender, TaskReceiver) {
    mpsc::unbounded_channel()
}

/// Outcome of one dispatched task.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub succeeded: usize,
    pub failed: usize,
    /// The store could not be reached; nothing in the task was synced.
    pub unavailable: bool,
}

/// Running totals for the dispatcher's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unavailable: usize,
}

impl DispatchStats {
    fn record(&mut self, report: TaskReport) {
        self.tasks += 1;
        self.succeeded += report.succeeded;
        self.failed += report.failed;
        if report.unavailable {
            self.unavailable += 1;
        }
    }
}

/// Single consumer of the dispatch queue.
pub struct Dispatcher {
    store: Arc<dyn RemoteStore>,
    rx: TaskReceiver,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn RemoteStore>, rx: TaskReceiver) -> Self {
        Self { store, rx }
    }

    pub fn spawn(self) -> JoinHandle<DispatchStats> {
        tokio::spawn(self.run())
    }

    /// Pop and run tasks until every sender is gone and the queue is empty.
    pub async fn run(mut self) -> DispatchStats {
        let mut stats = DispatchStats::default();
        while let Some(task) = self.rx.recv().await {
            let report = dispatch_task(self.store.as_ref(), &task).await;
            stats.record(report);
        }
        tracing::info!(
            tasks = stats.tasks,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "dispatcher stopped"
        );
        stats
    }
}

/// Run one task against the store. Failures are logged, never retried.
pub async fn dispatch_task(store: &dyn RemoteStore, task: &SyncTask) -> TaskReport {
    let count = task.events.len();
    tracing::info!(kind = %task.kind, count, "dispatching batch");

    let result = match task.kind {
        TaskKind::Upload => store.batch_upload(&task.events).await,
        TaskKind::Delete => store.batch_delete(&task.events).await,
    };

    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err(err) => {
            tracing::error!(
                kind = %task.kind,
                count,
                keys = ?task.keys(),
                error = %err,
                "batch failed, store unreachable"
            );
            return TaskReport {
                succeeded: 0,
                failed: count,
                unavailable: true,
            };
        }
    };

    let paths: HashMap<&str, &std::path::Path> = task
        .events
        .iter()
        .map(|e| (e.canonical_key.as_str(), e.path()))
        .collect();

    let mut report = TaskReport::default();
    for outcome in outcomes {
        match outcome.result {
            Ok(()) => report.succeeded += 1,
            Err(err) => {
                report.failed += 1;
                tracing::error!(
                    kind = %task.kind,
                    key = %outcome.key,
                    path = %paths
                        .get(outcome.key.as_str())
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    error = %err,
                    "object failed to sync"
                );
            }
        }
    }

    tracing::info!(
        kind = %task.kind,
        succeeded = report.succeeded,
        failed = report.failed,
        "batch finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonical_key;
    use crate::error::StoreError;
    use crate::model::{ChangeEvent, FileDigest, PendingEvent};
    use crate::store::memory::MemoryStore;

    fn upload(paths: &[&str]) -> SyncTask {
        SyncTask {
            kind: TaskKind::Upload,
            events: paths
                .iter()
                .map(|p| PendingEvent {
                    event: ChangeEvent::create(*p),
                    canonical_key: canonical_key(p),
                    digest: Some(FileDigest {
                        canonical_key: canonical_key(p),
                        content_hash: md5::compute(p.as_bytes()).0,
                        size_bytes: 1,
                    }),
                })
                .collect(),
        }
    }

    fn delete(paths: &[&str]) -> SyncTask {
        SyncTask {
            kind: TaskKind::Delete,
            events: paths
                .iter()
                .map(|p| PendingEvent {
                    event: ChangeEvent::remove(*p),
                    canonical_key: canonical_key(p),
                    digest: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn partial_failure_consumes_the_task() {
        let store = MemoryStore::new();
        store.fail_key("/b").await;

        let report = dispatch_task(&store, &upload(&["/a", "/b", "/c"])).await;
        assert_eq!(
            report,
            TaskReport {
                succeeded: 2,
                failed: 1,
                unavailable: false
            }
        );
        let objects = store.objects().await;
        assert!(objects.contains_key("/a") && objects.contains_key("/c"));
    }

    #[tokio::test]
    async fn unreachable_store_is_reported_not_fatal() {
        let store = MemoryStore::new();
        store.set_unavailable(true).await;

        let report = dispatch_task(&store, &delete(&["/x"])).await;
        assert!(report.unavailable);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn dispatcher_drains_queue_in_order() {
        let store = Arc::new(MemoryStore::recording());
        let (tx, rx) = queue();
        tx.send(upload(&["/1", "/2"])).unwrap();
        tx.send(delete(&["/0"])).unwrap();
        tx.send(upload(&["/3"])).unwrap();
        drop(tx);

        let stats = Dispatcher::new(store.clone(), rx).run().await;
        assert_eq!(stats.tasks, 3);
        assert_eq!(stats.succeeded, 4);

        let calls = store.calls().await;
        let order: Vec<(TaskKind, Vec<String>)> =
            calls.into_iter().map(|c| (c.kind, c.keys)).collect();
        assert_eq!(
            order,
            vec![
                (TaskKind::Upload, vec!["/1".to_string(), "/2".to_string()]),
                (TaskKind::Delete, vec!["/0".to_string()]),
                (TaskKind::Upload, vec!["/3".to_string()]),
            ]
        );
    }

    /// Fails its first batch as unreachable, then behaves.
    #[derive(Default)]
    struct FlakyStore {
        calls: std::sync::atomic::AtomicUsize,
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl RemoteStore for FlakyStore {
        async fn exists(&self, key: &str, digest: &FileDigest) -> Result<bool, StoreError> {
            self.inner.exists(key, digest).await
        }

        async fn batch_upload(
            &self,
            events: &[PendingEvent],
        ) -> Result<Vec<crate::store::ItemOutcome>, StoreError> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            self.inner.batch_upload(events).await
        }

        async fn batch_delete(
            &self,
            events: &[PendingEvent],
        ) -> Result<Vec<crate::store::ItemOutcome>, StoreError> {
            self.inner.batch_delete(events).await
        }
    }

    #[tokio::test]
    async fn dispatcher_keeps_going_after_an_outage() {
        let store = Arc::new(FlakyStore::default());
        let (tx, rx) = queue();
        tx.send(upload(&["/lost"])).unwrap();
        tx.send(upload(&["/kept"])).unwrap();
        drop(tx);

        let stats = Dispatcher::new(store.clone(), rx).spawn().await.unwrap();
        assert_eq!(
            stats,
            DispatchStats {
                tasks: 2,
                succeeded: 1,
                failed: 1,
                unavailable: 1
            }
        );
        let objects = store.inner.objects().await;
        assert!(objects.contains_key("/kept"));
        assert!(!objects.contains_key("/lost"));
    }
}
