//! Change-to-sync batching engine.
//!
//! Three lanes share one [`SyncEngine`]:
//! - ingestion: [`SyncEngine::ingest`] classifies an event, then appends it to
//!   the accumulator and re-arms the idle timer, both under the engine lock;
//! - timer: one spawned task per armed timer, which takes the same lock and
//!   flushes only if nothing was appended or flushed since it was armed;
//! - dispatch: a spawned [`Dispatcher`] draining the task queue. It never
//!   touches the engine lock, so ingestion continues during slow uploads.

pub mod accumulator;
pub mod dedup;
pub mod dispatch;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::digest::Digester;
use crate::model::{ChangeEvent, PendingEvent, TaskKind};
use crate::store::RemoteStore;

use accumulator::{Accumulator, Push, categorize};
use dedup::{Classification, DedupFilter};
use dispatch::{DispatchStats, Dispatcher, TaskSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub idle_timeout: Duration,
}

impl From<&SyncConfig> for EngineConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// What [`SyncEngine::ingest`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Buffered; the idle timer was re-armed.
    Buffered,
    /// Buffered and the batch filled up: flushed into `tasks` tasks.
    Flushed { tasks: usize },
    /// Redundant or unsupported; never entered the buffer.
    Skipped,
}

/// Everything guarded by the engine lock.
struct EngineState {
    accumulator: Accumulator,
    timer: Option<JoinHandle<()>>,
    /// `None` once the engine has shut down.
    queue: Option<TaskSender>,
}

impl EngineState {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Categorize drained events and hand the tasks to the dispatcher.
    fn enqueue(&mut self, events: Vec<PendingEvent>, trigger: &'static str) -> usize {
        if events.is_empty() {
            return 0;
        }
        let drained = events.len();
        let tasks = categorize(events);
        let count = tasks.len();
        tracing::info!(
            trigger,
            events = drained,
            uploads = tasks.iter().filter(|t| t.kind == TaskKind::Upload).count(),
            deletes = tasks.iter().filter(|t| t.kind == TaskKind::Delete).count(),
            "flushing batch"
        );

        for task in tasks {
            let Some(queue) = &self.queue else {
                tracing::warn!(kind = %task.kind, keys = ?task.keys(), "engine stopped, batch dropped");
                continue;
            };
            if let Err(err) = queue.send(task) {
                let task = err.0;
                tracing::error!(kind = %task.kind, keys = ?task.keys(), "dispatcher gone, batch dropped");
            }
        }
        count
    }
}

struct EngineInner {
    config: EngineConfig,
    dedup: DedupFilter,
    state: Mutex<EngineState>,
    dispatcher: Mutex<Option<JoinHandle<DispatchStats>>>,
}

impl EngineInner {
    async fn append(self: &Arc<Self>, event: PendingEvent) -> Ingested {
        let mut state = self.state.lock().await;
        state.cancel_timer();
        match state.accumulator.push(event) {
            Push::Full(events) => {
                let tasks = state.enqueue(events, "size");
                Ingested::Flushed { tasks }
            }
            Push::Buffered { generation } => {
                state.timer = Some(self.arm_timer(generation));
                Ingested::Buffered
            }
        }
    }

    fn arm_timer(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.idle_timeout).await;
            inner.flush_if_current(generation).await;
        })
    }

    async fn flush_if_current(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if !state.accumulator.is_current(generation) {
            return;
        }
        // This task is the armed timer; dropping the handle just detaches it.
        state.timer = None;
        let events = state.accumulator.drain();
        state.enqueue(events, "idle");
    }

    async fn flush(&self, trigger: &'static str) -> usize {
        let mut state = self.state.lock().await;
        state.cancel_timer();
        let events = state.accumulator.drain();
        state.enqueue(events, trigger)
    }
}

/// Handle to a running engine. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Create the engine and spawn its dispatcher. Must run inside a tokio runtime.
    pub fn start(
        config: EngineConfig,
        store: Arc<dyn RemoteStore>,
        digester: Arc<dyn Digester>,
    ) -> Self {
        let (tx, rx) = dispatch::queue();
        let dispatcher = Dispatcher::new(Arc::clone(&store), rx).spawn();

        tracing::info!(
            batch_size = config.batch_size,
            idle_timeout_ms = config.idle_timeout.as_millis() as u64,
            "sync engine started"
        );

        Self {
            inner: Arc::new(EngineInner {
                config,
                dedup: DedupFilter::new(digester, store),
                state: Mutex::new(EngineState {
                    accumulator: Accumulator::new(config.batch_size),
                    timer: None,
                    queue: Some(tx),
                }),
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// Feed one watcher notification into the engine.
    pub async fn ingest(&self, event: ChangeEvent) -> Ingested {
        tracing::debug!(path = %event.path.display(), op = %event.op, "event received");
        match self.inner.dedup.classify(event).await {
            Classification::Novel(pending) => self.inner.append(pending).await,
            Classification::Redundant(_) | Classification::Ignored => Ingested::Skipped,
        }
    }

    /// Flush whatever is buffered right now. Returns the number of tasks queued;
    /// zero when the buffer was already empty.
    pub async fn flush(&self) -> usize {
        self.inner.flush("manual").await
    }

    /// Events waiting for the next flush.
    pub async fn buffered(&self) -> usize {
        self.inner.state.lock().await.accumulator.len()
    }

    /// Flush the buffer, close the queue, and wait for the dispatcher to
    /// finish every queued task. Later calls return empty stats.
    pub async fn shutdown(&self) -> DispatchStats {
        let queue = {
            let mut state = self.inner.state.lock().await;
            state.cancel_timer();
            let events = state.accumulator.drain();
            state.enqueue(events, "shutdown");
            state.queue.take()
        };
        drop(queue);

        let handle = self.inner.dispatcher.lock().await.take();
        match handle {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                tracing::error!(error = %err, "dispatcher task failed");
                DispatchStats::default()
            }),
            None => DispatchStats::default(),
        }
    }
}
