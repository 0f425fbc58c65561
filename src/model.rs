use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    Create,
    Write,
    Remove,
    /// Reported by some watchers for renames. Not synced: renames are only
    /// mirrored when they arrive as a `Remove` + `Create`/`Write` pair.
    RenameOrMove,
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Write => write!(f, "write"),
            Self::Remove => write!(f, "remove"),
            Self::RenameOrMove => write!(f, "rename"),
        }
    }
}

/// A raw notification from the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub op: ChangeOp,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
            observed_at: Utc::now(),
        }
    }

    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeOp::Create)
    }

    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeOp::Write)
    }

    pub fn remove(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeOp::Remove)
    }
}

/// Content fingerprint of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub canonical_key: String,
    /// MD5 of the file bytes.
    pub content_hash: [u8; 16],
    pub size_bytes: u64,
}

impl FileDigest {
    /// Lowercase hex form of the hash, as S3 reports it in ETags.
    pub fn hex(&self) -> String {
        format!("{:x}", md5::Digest(self.content_hash))
    }
}

/// A change that must be mirrored, waiting in the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub event: ChangeEvent,
    pub canonical_key: String,
    /// Absent for removals: there is no content to compare.
    pub digest: Option<FileDigest>,
}

impl PendingEvent {
    pub fn path(&self) -> &Path {
        &self.event.path
    }

    pub fn op(&self) -> ChangeOp {
        self.event.op
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Upload,
    Delete,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One batch handed to the dispatcher. Never modified after it is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub kind: TaskKind,
    pub events: Vec<PendingEvent>,
}

impl SyncTask {
    pub fn keys(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.canonical_key.as_str()).collect()
    }
}
