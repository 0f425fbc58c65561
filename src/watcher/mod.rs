use std::path::Path;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::config::WatchPath;
use crate::error::ConfigError;
use crate::model::ChangeEvent;

/// Handle to a running watcher. Keeps the debouncer alive (dropping stops watching).
pub struct WatcherHandle {
    /// Keep alive: dropping the debouncer stops the OS watcher.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// The bridge task forwarding events from std channel to tokio channel.
    _bridge_task: JoinHandle<()>,
    watched: Vec<WatchPath>,
}

impl WatcherHandle {
    /// Paths that were successfully registered.
    pub fn watched(&self) -> &[WatchPath] {
        &self.watched
    }
}

/// Start a debounced watcher over `paths`.
///
/// Returns a `WatcherHandle` (must be kept alive) and a tokio mpsc receiver
/// yielding one `ChangeEvent` per debounced path. Paths that cannot be
/// registered are logged and skipped; if none can be registered the watch set
/// is unusable and a `ConfigError` is returned.
pub fn start_watcher(
    paths: &[WatchPath],
    interval: Duration,
) -> anyhow::Result<(WatcherHandle, tokio_mpsc::Receiver<ChangeEvent>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();

    let mut debouncer = new_debouncer(interval, move |res| {
        let _ = std_tx.send(res);
    })?;

    let mut watched = Vec::new();
    for path in paths {
        let mode = if path.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        match debouncer.watcher().watch(&path.root, mode) {
            Ok(()) => {
                tracing::info!(
                    path = %path.root.display(),
                    recursive = path.recursive,
                    "watching"
                );
                watched.push(path.clone());
            }
            Err(err) => {
                tracing::warn!(path = %path.root.display(), error = %err, "failed to watch path, skipping");
            }
        }
    }

    if watched.is_empty() {
        return Err(ConfigError::Invalid(
            "none of the configured paths could be watched".into(),
        )
        .into());
    }

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<ChangeEvent>(256);

    // Bridge: spawn_blocking to receive from std channel, classify, forward to tokio
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(events) => {
                    for debounced_event in events {
                        if let Some(event) = classify_path(&debounced_event.path) {
                            if tokio_tx.blocking_send(event).is_err() {
                                return; // receiver dropped, shutdown
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(error = ?err, "watcher error");
                }
            }
        }
    });

    Ok((
        WatcherHandle {
            _debouncer: debouncer,
            _bridge_task: bridge_task,
            watched,
        },
        tokio_rx,
    ))
}

/// Turn a debounced path into a change event, or None if it should be ignored.
///
/// The debouncer does not say what happened, so the current state of the
/// path decides: directories are ignored, an existing file was written, a
/// missing path was removed. A rename surfaces as a removal of the old path
/// plus a write of the new one.
pub fn classify_path(path: &Path) -> Option<ChangeEvent> {
    if path.is_dir() {
        return None;
    }
    if path.exists() {
        Some(ChangeEvent::write(path))
    } else {
        Some(ChangeEvent::remove(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangeOp;

    #[test]
    fn existing_file_is_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();
        let event = classify_path(&path).unwrap();
        assert_eq!(event.op, ChangeOp::Write);
        assert_eq!(event.path, path);
    }

    #[test]
    fn missing_path_is_a_remove() {
        let dir = tempfile::tempdir().unwrap();
        let event = classify_path(&dir.path().join("gone.txt")).unwrap();
        assert_eq!(event.op, ChangeOp::Remove);
    }

    #[test]
    fn directories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(classify_path(dir.path()).is_none());
    }

    #[tokio::test]
    async fn unwatchable_paths_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![WatchPath {
            root: dir.path().join("does-not-exist"),
            recursive: true,
        }];
        let err = start_watcher(&paths, Duration::from_millis(50)).err().unwrap();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[tokio::test]
    async fn reports_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![WatchPath {
            root: dir.path().to_path_buf(),
            recursive: true,
        }];
        let (handle, mut rx) = start_watcher(&paths, Duration::from_millis(50)).unwrap();
        assert_eq!(handle.watched().len(), 1);

        let file = dir.path().join("new.txt");
        std::fs::write(&file, "hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(event) if event.path.ends_with("new.txt") => return Some(event),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
        .expect("watcher should report the new file");
        assert_eq!(event.op, ChangeOp::Write);
    }
}
