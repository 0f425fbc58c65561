use std::collections::HashSet;

use crate::model::{ChangeOp, PendingEvent, SyncTask, TaskKind};

/// What an append did to the buffer.
#[derive(Debug)]
pub enum Push {
    /// The event is buffered; an idle timer must be (re)armed for `generation`.
    Buffered { generation: u64 },
    /// The batch threshold was reached; the whole buffer was drained.
    Full(Vec<PendingEvent>),
}

/// Buffer of novel events awaiting a flush.
///
/// Pure state: timers and the dispatch queue live in the engine, which holds
/// this behind its lock. The generation counter advances on every append and
/// every drain, so a timer armed for an older generation can tell it has been
/// superseded.
#[derive(Debug)]
pub struct Accumulator {
    buffer: Vec<PendingEvent>,
    batch_size: usize,
    generation: u64,
}

impl Accumulator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            batch_size: batch_size.max(1),
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a timer armed at `generation` may still flush.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && !self.buffer.is_empty()
    }

    pub fn push(&mut self, event: PendingEvent) -> Push {
        self.buffer.push(event);
        self.generation += 1;
        if self.buffer.len() >= self.batch_size {
            Push::Full(self.drain())
        } else {
            Push::Buffered {
                generation: self.generation,
            }
        }
    }

    /// Take everything buffered so far. Draining an empty buffer yields nothing.
    pub fn drain(&mut self) -> Vec<PendingEvent> {
        self.generation += 1;
        std::mem::take(&mut self.buffer)
    }
}

/// Split a drained buffer into at most one upload and one delete task.
///
/// Repeated events for the same key collapse to the latest one, so a file
/// removed and recreated within one flush is uploaded and not deleted. The
/// upload task, when present, always comes first.
pub fn categorize(events: Vec<PendingEvent>) -> Vec<SyncTask> {
    let mut seen = HashSet::new();
    let mut latest: Vec<PendingEvent> = Vec::with_capacity(events.len());
    for event in events.into_iter().rev() {
        if seen.insert(event.canonical_key.clone()) {
            latest.push(event);
        } else {
            tracing::debug!(
                key = %event.canonical_key,
                op = %event.op(),
                "superseded by a later event in the same batch"
            );
        }
    }
    latest.reverse();

    let mut uploads = Vec::new();
    let mut deletes = Vec::new();
    for event in latest {
        match event.op() {
            ChangeOp::Create | ChangeOp::Write => uploads.push(event),
            ChangeOp::Remove => deletes.push(event),
            ChangeOp::RenameOrMove => {
                tracing::warn!(path = %event.path().display(), "rename reached a batch, dropping");
            }
        }
    }

    let mut tasks = Vec::with_capacity(2);
    if !uploads.is_empty() {
        tasks.push(SyncTask {
            kind: TaskKind::Upload,
            events: uploads,
        });
    }
    if !deletes.is_empty() {
        tasks.push(SyncTask {
            kind: TaskKind::Delete,
            events: deletes,
        });
    }
    tasks
}
