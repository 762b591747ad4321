//! Remote execution negotiation.
//!
//! Given an open session, decide how (whether) the probe payload can run
//! there. The checks run in a fixed order, and the order matters: more than
//! one runtime may nominally be present.
//!
//! 1. A PowerShell runtime answering `$PSVersionTable.PSVersion` is noted
//!    but never selected — no payload exists for it. Known limitation.
//! 2. The configured interpreter reporting `Python 3.` is the selected
//!    execution path.
//! 3. Anything else is an unsupported shell; probing fails fast rather than
//!    guessing at shell-native VCS detection.
//!
//! Negotiation is deterministic: the same capability profile always yields
//! the same result.

use tracing::debug;

use crate::model::{RemoteCapability, UnitError};
use crate::session::RemoteSession;

/// Command whose multi-line answer identifies a PowerShell runtime.
const POWERSHELL_CHECK: &str = "$PSVersionTable.PSVersion";

/// Version-banner prefix the payload's runtime must report.
const INTERPRETER_BANNER: &str = "Python 3.";

/// Classify the remote's execution capability.
///
/// # Errors
///
/// Only transport failures error here; "no usable runtime" is a valid
/// classification, not an error.
pub async fn negotiate(
    session: &dyn RemoteSession,
    interpreter: &str,
) -> Result<RemoteCapability, UnitError> {
    let transport = |err| UnitError::ProbeFailure {
        detail: format!("negotiation failed: {err}"),
    };

    // PowerShell prints a version table (several lines); a POSIX shell
    // mangles the expression into an error with empty stdout.
    let out = session.exec(POWERSHELL_CHECK).await.map_err(transport)?;
    let powershell_detected = out.stdout.lines().count() > 1;
    if powershell_detected {
        debug!("PowerShell runtime detected; no payload for it, continuing");
    }

    let out = session
        .exec(&format!("{interpreter} --version"))
        .await
        .map_err(transport)?;
    // Old interpreters print the version banner to stderr.
    let banner = if out.stdout.trim().is_empty() {
        out.stderr
    } else {
        out.stdout
    };
    if banner.trim_start().starts_with(INTERPRETER_BANNER) {
        debug!(interpreter, banner = banner.trim(), "selected structured interpreter");
        return Ok(RemoteCapability::StructuredInterpreter {
            interpreter: interpreter.to_owned(),
        });
    }

    debug!(powershell_detected, "no structured execution path");
    Ok(RemoteCapability::UnsupportedShell {
        powershell_detected,
    })
}
