//! Run configuration (`muster.toml`).
//!
//! Everything has a sensible default; a missing file is not an error. The
//! file is looked up next to the inventory unless an explicit path is given.
//!
//! ```toml
//! [run]
//! workers = 8
//! probe_timeout_secs = 30
//! connect_timeout_secs = 10
//! retry_backoff_secs = 2
//!
//! [remote]
//! staging_path = "/tmp/vcs-probe.py"
//! interpreter = "python3"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// File name searched for next to the inventory.
pub const CONFIG_FILE_NAME: &str = "muster.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level muster configuration. Missing fields use defaults; a missing
/// file means all defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MusterConfig {
    /// Worker pool and deadline settings.
    #[serde(default)]
    pub run: RunSettings,

    /// Remote staging and interpreter settings.
    #[serde(default)]
    pub remote: RemoteSettings,
}

impl MusterConfig {
    /// Load from an explicit path, or from `muster.toml` beside the
    /// inventory file. Absent files yield the default configuration.
    pub fn load(explicit: Option<&Path>, inventory: &Path) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let sibling = inventory
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(CONFIG_FILE_NAME);
                if !sibling.exists() {
                    return Ok(Self::default());
                }
                sibling
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|err| ConfigError {
            path: Some(path.clone()),
            message: err.to_string(),
        })?;
        toml::from_str(&content).map_err(|err| ConfigError {
            path: Some(path),
            message: err.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// RunSettings
// ---------------------------------------------------------------------------

/// Worker pool and deadline settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    /// Concurrent probe workers (each owns one SSH session at a time).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-unit deadline covering connect, negotiate, and probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// TCP connect window within the per-unit deadline.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Pause before the single retry of a connect/timeout-class failure.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            probe_timeout_secs: default_probe_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            retry_backoff_secs: default_retry_backoff(),
        }
    }
}

impl RunSettings {
    /// The per-unit deadline as a [`Duration`].
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// The connect window as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The retry backoff as a [`Duration`].
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

const fn default_workers() -> usize {
    8
}

const fn default_probe_timeout() -> u64 {
    30
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_retry_backoff() -> u64 {
    2
}

// ---------------------------------------------------------------------------
// RemoteSettings
// ---------------------------------------------------------------------------

/// Where the payload is staged and what runs it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSettings {
    /// Fixed temporary path the payload is uploaded to.
    #[serde(default = "default_staging_path")]
    pub staging_path: String,

    /// Interpreter command expected to run the payload.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            staging_path: default_staging_path(),
            interpreter: default_interpreter(),
        }
    }
}

fn default_staging_path() -> String {
    "/tmp/vcs-probe.py".to_owned()
}

fn default_interpreter() -> String {
    "python3".to_owned()
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be read or parsed.
#[derive(Debug)]
pub struct ConfigError {
    /// The file involved, when known.
    pub path: Option<PathBuf>,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in '{}': {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}
