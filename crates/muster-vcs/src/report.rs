//! The probe wire format.
//!
//! A probe run emits exactly one JSON object on one stdout line:
//!
//! ```json
//! {"type": "git", "branch": "main", "rev": "abc123"}
//! ```
//!
//! `type` is `"git"`, `"svn"`, or `"none"` (probed cleanly, no VCS present).
//! Anything on stderr, or an empty stdout, means the run produced no usable
//! status — callers must never parse partial output.
//!
//! The payload staged onto remote hosts is embedded here as [`PAYLOAD`] so
//! the wire format, the handshake token, and the program that speaks them
//! version together. Before trusting probe output, callers invoke the staged
//! payload with `--handshake` and require the exact [`HANDSHAKE_TOKEN`].

use serde::{Deserialize, Serialize};

use crate::status::{VcsKind, VcsStatus};

/// Probe protocol version. Bump when the wire format or the payload's
/// invocation contract changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Exact token the payload prints for `--handshake`.
pub const HANDSHAKE_TOKEN: &str = "vcs-probe/1";

/// The fixed working directory the probe inspects, relative to the remote
/// user's home. Path-fixed so the payload can run on an unknown host with
/// zero configuration exchange.
pub const WORK_DIR: &str = "bw";

/// The self-contained probe program staged onto remote hosts and run with
/// the negotiated interpreter.
pub const PAYLOAD: &str = include_str!("payload.py");

// ---------------------------------------------------------------------------
// ProbeReport
// ---------------------------------------------------------------------------

/// `type` field of a probe report: the detected kind, or `none`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedKind {
    /// Working copy owned by git.
    Git,
    /// Working copy owned by Subversion.
    Svn,
    /// Probe ran cleanly and found no VCS marker.
    None,
}

/// One parsed probe line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeReport {
    /// Detected kind, or `none`.
    #[serde(rename = "type")]
    pub kind: ReportedKind,
    /// Branch / relative URL. Empty when `kind` is `none`.
    #[serde(default)]
    pub branch: String,
    /// Revision. Empty when `kind` is `none`.
    #[serde(default)]
    pub rev: String,
}

impl ProbeReport {
    /// The report for "probed cleanly, nothing checked out here."
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            kind: ReportedKind::None,
            branch: String::new(),
            rev: String::new(),
        }
    }

    /// Parse one probe output. Leading/trailing whitespace is tolerated;
    /// anything beyond the single JSON object is a parse error.
    pub fn parse(output: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(output.trim())
    }

    /// Render as the single wire line (no trailing newline).
    #[must_use]
    pub fn render(&self) -> String {
        // Struct-to-JSON of plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Convert into a [`VcsStatus`], or `None` for a `none` report.
    #[must_use]
    pub fn into_status(self) -> Option<VcsStatus> {
        let kind = match self.kind {
            ReportedKind::Git => VcsKind::Git,
            ReportedKind::Svn => VcsKind::Svn,
            ReportedKind::None => return None,
        };
        Some(VcsStatus {
            kind,
            branch: self.branch,
            rev: self.rev,
        })
    }
}

impl From<VcsStatus> for ProbeReport {
    fn from(status: VcsStatus) -> Self {
        let kind = match status.kind {
            VcsKind::Git => ReportedKind::Git,
            VcsKind::Svn => ReportedKind::Svn,
        };
        Self {
            kind,
            branch: status.branch,
            rev: status.rev,
        }
    }
}
