use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "syncs3.toml";

/// Largest accepted `batch_size`.
pub const MAX_BATCH_SIZE: usize = 10_000;

fn default_batch_size() -> usize {
    50
}

fn default_idle_timeout_secs() -> u64 {
    4
}

fn default_scan_interval_ms() -> u64 {
    100
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Configuration loaded from `syncs3.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Events per batch before a flush is forced.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Quiet period after the last change before a partial batch is flushed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Debounce interval of the filesystem watcher.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Push every file under the watched paths once at startup.
    #[serde(default)]
    pub initial_sync: bool,
    pub log_file: Option<PathBuf>,
    /// Paths to watch. A trailing `*` watches the directory recursively.
    pub paths: Vec<String>,
    pub bucket: BucketConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, Ceph, ...).
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
}

/// A watched path with its recursion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchPath {
    pub root: PathBuf,
    pub recursive: bool,
}

impl WatchPath {
    /// Parse a configured path entry. `/data/*` watches `/data/` recursively.
    /// Blank entries yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.strip_suffix('*') {
            Some("") => None,
            Some(root) => Some(Self {
                root: PathBuf::from(root),
                recursive: true,
            }),
            None => Some(Self {
                root: PathBuf::from(trimmed),
                recursive: false,
            }),
        }
    }
}

impl SyncConfig {
    /// Load and validate configuration from `path`.
    ///
    /// Any problem here is fatal: the engine never starts on a bad config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ParseFailure::Invalid(err) => err,
        })?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Invalid(source.to_string()),
            ParseFailure::Invalid(err) => err,
        })
    }

    fn parse(contents: &str) -> Result<Self, ParseFailure> {
        let config: Self = toml::from_str(contents).map_err(ParseFailure::Toml)?;
        config.validate().map_err(ParseFailure::Invalid)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be at most {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "idle_timeout_secs must be at least 1".into(),
            ));
        }
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scan_interval_ms must be at least 1".into(),
            ));
        }
        if self.watch_paths().is_empty() {
            return Err(ConfigError::Invalid(
                "paths must name at least one file or directory to watch".into(),
            ));
        }
        if self.bucket.name.trim().is_empty() {
            return Err(ConfigError::Invalid("bucket.name must not be empty".into()));
        }
        if self.bucket.access_key_id.is_some() != self.bucket.secret_access_key.is_some() {
            return Err(ConfigError::Invalid(
                "bucket.access_key_id and bucket.secret_access_key must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Parsed watch entries, skipping blank ones.
    pub fn watch_paths(&self) -> Vec<WatchPath> {
        self.paths
            .iter()
            .filter_map(|entry| {
                let parsed = WatchPath::parse(entry);
                if parsed.is_none() {
                    tracing::warn!(entry = %entry, "skipping blank watch path");
                }
                parsed
            })
            .collect()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
paths = ["/srv/data*"]

[bucket]
name = "backups"
"#;

    #[test]
    fn defaults_apply_to_minimal_config() {
        let config = SyncConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.idle_timeout(), Duration::from_secs(4));
        assert_eq!(config.scan_interval(), Duration::from_millis(100));
        assert!(!config.initial_sync);
        assert_eq!(config.bucket.region, "us-east-1");
        assert_eq!(
            config.watch_paths(),
            vec![WatchPath {
                root: PathBuf::from("/srv/data"),
                recursive: true
            }]
        );
    }

    #[test]
    fn trailing_star_means_recursive() {
        assert_eq!(
            WatchPath::parse("/home/me/docs/*"),
            Some(WatchPath {
                root: PathBuf::from("/home/me/docs/"),
                recursive: true
            })
        );
        assert_eq!(
            WatchPath::parse("/etc/hosts"),
            Some(WatchPath {
                root: PathBuf::from("/etc/hosts"),
                recursive: false
            })
        );
        assert_eq!(WatchPath::parse("   "), None);
        assert_eq!(WatchPath::parse("*"), None);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let toml = format!("batch_size = 0\n{MINIMAL}");
        let err = SyncConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn oversized_batch_size_is_rejected() {
        let toml = format!("batch_size = 9223372036854775807\n{MINIMAL}");
        let err = SyncConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("batch_size"));

        let toml = format!("batch_size = {MAX_BATCH_SIZE}\n{MINIMAL}");
        assert_eq!(SyncConfig::from_toml(&toml).unwrap().batch_size, MAX_BATCH_SIZE);
    }

    #[test]
    fn empty_watch_set_is_rejected() {
        let toml = r#"
paths = ["", "  "]

[bucket]
name = "backups"
"#;
        let err = SyncConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("paths"));
    }

    #[test]
    fn half_credentials_are_rejected() {
        let toml = format!("{MINIMAL}access_key_id = \"AKIA\"\n");
        let err = SyncConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("secret_access_key"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = format!("batch_sise = 3\n{MINIMAL}");
        assert!(SyncConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncs3.toml");
        std::fs::write(&path, "paths = [").unwrap();
        let err = SyncConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
