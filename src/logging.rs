use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "syncs3=info";

/// Where log output ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File,
    /// A log file was configured but could not be used.
    StderrFallback(String),
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// With a usable `log_file` output is appended there without ANSI colors;
/// otherwise it goes to stderr. Call once, at startup.
pub fn init(log_file: Option<&Path>) -> LogTarget {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let target = match log_file.map(open_log_file) {
        Some(Ok(file)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
            LogTarget::File
        }
        Some(Err(reason)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            LogTarget::StderrFallback(reason)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            LogTarget::Stderr
        }
    };

    if let LogTarget::StderrFallback(reason) = &target {
        tracing::warn!(reason = %reason, "not logging to file");
    }
    target
}

fn open_log_file(path: &Path) -> Result<std::fs::File, String> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.is_dir() {
        return Err(format!(
            "log directory {} does not exist",
            parent.display()
        ));
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("cannot open {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_in_missing_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_log_file(&dir.path().join("nope").join("syncs3.log")).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn log_file_is_opened_for_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncs3.log");
        std::fs::write(&path, "earlier\n").unwrap();

        use std::io::Write;
        let mut file = open_log_file(&path).unwrap();
        file.write_all(b"later\n").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }
}
