//! Error types shared across the engine and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to read or hash a local file.
///
/// Both variants are transient from the engine's point of view: the event is
/// dropped from the current cycle and the next notification for the same path
/// gets a fresh attempt.
#[derive(Error, Debug)]
pub enum DigestError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DigestError {
    pub(crate) fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

/// Failure talking to the remote store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached at all (network, credentials, endpoint).
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected a single object.
    #[error("object {key}: {message}")]
    Object { key: String, message: String },

    /// The local file backing an upload could not be opened.
    #[error("cannot read {} for upload: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

/// Invalid or unreadable configuration. Only ever raised at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
