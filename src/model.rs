//! Probe targets and per-unit results.
//!
//! A [`HostUnit`] is one `(cluster, host, user)` probe target, built from the
//! inventory document at run start and immutable thereafter. A
//! [`UnitOutcome`] is what one run records for one unit: a full status, an
//! explicit "nothing checked out here", or a typed error. There is no
//! half-filled state in between.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use muster_vcs::{ProbeReport, VcsStatus};

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A `host[:port]` pair from an inventory record. Port defaults to 22.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Bare host name or address, without the port suffix.
    pub host: String,
    /// SSH port.
    pub port: u16,
}

impl Endpoint {
    /// Parse `"host"` or `"host:port"`.
    pub fn parse(value: &str) -> Result<Self, EndpointError> {
        let (host, port) = match value.split_once(':') {
            None => (value, 22),
            Some((host, port)) => {
                let port = port.parse().map_err(|_| EndpointError {
                    value: value.to_owned(),
                    reason: format!("port {port:?} is not a number in 1..=65535"),
                })?;
                (host, port)
            }
        };
        if host.is_empty() {
            return Err(EndpointError {
                value: value.to_owned(),
                reason: "host part is empty".to_owned(),
            });
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 22 {
            f.write_str(&self.host)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Error from parsing a `host[:port]` string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid endpoint {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for EndpointError {}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// How to authenticate a unit's SSH session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Password authentication.
    Password(String),
    /// A specific private key file.
    PrivateKey(PathBuf),
    /// Try the user's default key files (`~/.ssh/id_*`).
    Agent,
}

/// The optional `auth` field of an inventory record.
///
/// Either a bare mode string (`"agent"`, `"password"`) or a key reference
/// (`{"key": "/path/to/id_ed25519"}`). An absent field means password
/// authentication with the password equal to the username — the convention
/// the inventory format started with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthSpec {
    /// `{"key": "/path"}`
    Key {
        /// Path to the private key file.
        key: PathBuf,
    },
    /// `"agent"` or `"password"`
    Mode(AuthMode),
}

/// Bare authentication modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Default key files.
    Agent,
    /// Password equal to the username.
    Password,
}

impl Credential {
    /// Resolve a record's `auth` field (or its absence) into a credential.
    #[must_use]
    pub fn from_spec(spec: Option<&AuthSpec>, username: &str) -> Self {
        match spec {
            None | Some(AuthSpec::Mode(AuthMode::Password)) => {
                Self::Password(username.to_owned())
            }
            Some(AuthSpec::Mode(AuthMode::Agent)) => Self::Agent,
            Some(AuthSpec::Key { key }) => Self::PrivateKey(key.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// HostUnit
// ---------------------------------------------------------------------------

/// One probe target.
///
/// `(cluster, hostname, username)` uniquely identifies a unit within one
/// reconciliation run. Units are created when the inventory is parsed and
/// discarded when the run ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostUnit {
    /// Grouping key in the inventory document.
    pub cluster: String,
    /// Raw `host[:port]` value from the record.
    pub hostname: String,
    /// Login user.
    pub username: String,
    /// How to authenticate.
    pub credential: Credential,
}

impl fmt::Display for HostUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}@{}", self.username, self.hostname, self.cluster)
    }
}

// ---------------------------------------------------------------------------
// RemoteCapability
// ---------------------------------------------------------------------------

/// What the negotiator decided about a remote's runtime. Transient — never
/// persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCapability {
    /// The remote can run the probe payload with the named interpreter.
    StructuredInterpreter {
        /// Interpreter command, e.g. `"python3"`.
        interpreter: String,
    },
    /// No structured execution path. A PowerShell runtime may have been
    /// detected, but no payload exists for it, so it is never selected.
    UnsupportedShell {
        /// Whether a PowerShell runtime answered during negotiation.
        powershell_detected: bool,
    },
}

// ---------------------------------------------------------------------------
// UnitError
// ---------------------------------------------------------------------------

/// Why one unit's probe produced no status.
///
/// Every variant is recorded in the unit's `vcs` field and never aborts the
/// batch. [`code`](Self::code) gives the stable string written to disk.
#[derive(Debug, Error)]
pub enum UnitError {
    /// The remote offers no structured execution path. Not retried — a
    /// shell-native re-implementation of VCS detection is out of scope, and
    /// guessing would produce wrong data.
    #[error("no structured execution path on remote: {detail}")]
    UnsupportedRemote {
        /// What the negotiation actually found.
        detail: String,
    },

    /// Probe output did not match the protocol (handshake mismatch or
    /// unparsable report line).
    #[error("probe protocol violation: {detail}")]
    ProtocolViolation {
        /// What was received instead.
        detail: String,
    },

    /// The probe ran but produced no usable status (non-empty stderr, empty
    /// stdout, or a transport failure mid-probe).
    #[error("probe failed: {detail}")]
    ProbeFailure {
        /// stderr excerpt or transport error.
        detail: String,
    },

    /// The remote rejected our credentials.
    #[error("authentication failed for user '{username}'")]
    AuthenticationFailed {
        /// The login user that was rejected.
        username: String,
    },

    /// TCP or SSH setup failed before authentication.
    #[error("connect failed: {detail}")]
    ConnectFailed {
        /// Transport error description.
        detail: String,
    },

    /// TCP connect did not complete within the configured window.
    #[error("connect timed out after {seconds}s")]
    ConnectTimeout {
        /// The window that elapsed.
        seconds: u64,
    },

    /// The whole connect+negotiate+probe sequence exceeded the per-unit
    /// deadline.
    #[error("probe timed out after {seconds}s")]
    ProbeTimeout {
        /// The deadline that elapsed.
        seconds: u64,
    },
}

impl UnitError {
    /// Stable error code written into the inventory document.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedRemote { .. } => "unsupported-remote",
            Self::ProtocolViolation { .. } => "protocol-violation",
            Self::ProbeFailure { .. } => "probe-failure",
            Self::AuthenticationFailed { .. } => "auth-failed",
            Self::ConnectFailed { .. } => "connect-failed",
            Self::ConnectTimeout { .. } => "connect-timeout",
            Self::ProbeTimeout { .. } => "probe-timeout",
        }
    }

    /// Whether a single bounded retry is worthwhile. Only connect/timeout
    /// class errors are transient; `UnsupportedRemote` and
    /// `ProtocolViolation` will fail identically on a second attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::ConnectTimeout { .. } | Self::ProbeTimeout { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// UnitOutcome
// ---------------------------------------------------------------------------

/// What one run records for one unit.
#[derive(Debug)]
pub enum UnitOutcome {
    /// Probed successfully; a VCS is checked out.
    Status(VcsStatus),
    /// Probed successfully; no VCS in the working directory.
    Absent,
    /// The probe produced no status; the error is recorded in its place.
    Failed(UnitError),
}

impl UnitOutcome {
    /// The wire/document form of this outcome.
    #[must_use]
    pub fn to_field(&self) -> VcsField {
        match self {
            Self::Status(status) => VcsField::Report(ProbeReport::from(status.clone())),
            Self::Absent => VcsField::Report(ProbeReport::absent()),
            Self::Failed(err) => VcsField::Error {
                error: err.code().to_owned(),
                detail: err.to_string(),
            },
        }
    }

    /// Short label for logs and the run summary.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Status(_) => "ok",
            Self::Absent => "absent",
            Self::Failed(_) => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// VcsField
// ---------------------------------------------------------------------------

/// The `vcs` field of an enriched host record: either a probe report or an
/// explicit error marker. Downstream consumers can always tell "probed,
/// clean/absent VCS" from "not probed due to error".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VcsField {
    /// `{"type": "git"|"svn"|"none", "branch": ..., "rev": ...}`
    Report(ProbeReport),
    /// `{"error": "<code>", "detail": "..."}`
    Error {
        /// Stable code from [`UnitError::code`].
        error: String,
        /// Human-readable description.
        #[serde(default)]
        detail: String,
    },
}
