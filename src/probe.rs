//! Running the probe on a negotiated session.
//!
//! Stage → handshake → execute → parse. The payload is the versioned blob
//! embedded in `muster-vcs`; it is uploaded to a fixed staging path and run
//! with the interpreter the negotiator selected. Before any probe output is
//! trusted, the staged payload must answer the handshake with the exact
//! protocol token — a stale or truncated upload fails loudly instead of
//! producing plausible garbage.
//!
//! Output discipline (the probe protocol's one rule): a non-empty error
//! stream means failure regardless of what standard output contains.
//! Partial output is never parsed.

use tracing::{debug, instrument};

use muster_vcs::{HANDSHAKE_TOKEN, PAYLOAD, ProbeReport};

use crate::config::RemoteSettings;
use crate::model::{RemoteCapability, UnitError, UnitOutcome};
use crate::negotiate::negotiate;
use crate::session::RemoteSession;

/// Negotiate and, if the remote can run the payload, probe it.
///
/// The session is borrowed: this function opens command channels on it but
/// never closes it — lifetime is the caller's.
///
/// # Errors
///
/// [`UnitError::UnsupportedRemote`] when negotiation finds no structured
/// interpreter; otherwise the probe/protocol error classes.
#[instrument(skip_all)]
pub async fn probe_session(
    session: &dyn RemoteSession,
    remote: &RemoteSettings,
) -> Result<UnitOutcome, UnitError> {
    let interpreter = match negotiate(session, &remote.interpreter).await? {
        RemoteCapability::StructuredInterpreter { interpreter } => interpreter,
        RemoteCapability::UnsupportedShell {
            powershell_detected,
        } => {
            let detail = if powershell_detected {
                "PowerShell detected but no payload exists for it".to_owned()
            } else {
                format!("no usable '{}' interpreter", remote.interpreter)
            };
            return Err(UnitError::UnsupportedRemote { detail });
        }
    };

    stage_and_handshake(session, remote, &interpreter).await?;

    let out = session
        .exec(&format!("{interpreter} '{}'", remote.staging_path))
        .await
        .map_err(|err| UnitError::ProbeFailure {
            detail: format!("probe execution failed: {err}"),
        })?;

    if !out.stderr.trim().is_empty() {
        return Err(UnitError::ProbeFailure {
            detail: excerpt(&out.stderr),
        });
    }
    if out.stdout.trim().is_empty() {
        return Err(UnitError::ProbeFailure {
            detail: "probe produced no output".to_owned(),
        });
    }

    let report =
        ProbeReport::parse(&out.stdout).map_err(|err| UnitError::ProtocolViolation {
            detail: format!("unparsable probe report: {err}"),
        })?;
    debug!(?report, "probe report received");

    Ok(report
        .into_status()
        .map_or(UnitOutcome::Absent, UnitOutcome::Status))
}

/// Upload the payload and verify the staged copy speaks our protocol.
async fn stage_and_handshake(
    session: &dyn RemoteSession,
    remote: &RemoteSettings,
    interpreter: &str,
) -> Result<(), UnitError> {
    session
        .upload(PAYLOAD.as_bytes(), &remote.staging_path)
        .await
        .map_err(|err| UnitError::ProbeFailure {
            detail: format!("payload staging failed: {err}"),
        })?;

    let out = session
        .exec(&format!("{interpreter} '{}' --handshake", remote.staging_path))
        .await
        .map_err(|err| UnitError::ProbeFailure {
            detail: format!("handshake failed: {err}"),
        })?;

    let token = out.stdout.trim();
    if token != HANDSHAKE_TOKEN {
        return Err(UnitError::ProtocolViolation {
            detail: format!("handshake answered {token:?}, expected {HANDSHAKE_TOKEN:?}"),
        });
    }
    Ok(())
}

/// First line of an error stream, bounded, for recording in the document.
fn excerpt(stderr: &str) -> String {
    const MAX: usize = 200;
    let line = stderr.lines().next().unwrap_or("").trim();
    let mut out = String::with_capacity(line.len().min(MAX));
    out.extend(line.chars().take(MAX));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::script::ScriptedSession;
    use muster_vcs::{VcsKind, WORK_DIR};

    const STAGED: &str = "/tmp/vcs-probe.py";

    fn remote() -> RemoteSettings {
        RemoteSettings::default()
    }

    /// A session scripted for the full happy path.
    fn git_host() -> ScriptedSession {
        ScriptedSession::new()
            .on("python3 --version", "Python 3.10.4\n", "", 0)
            .on(
                &format!("python3 '{STAGED}' --handshake"),
                "vcs-probe/1\n",
                "",
                0,
            )
            .on(
                &format!("python3 '{STAGED}'"),
                "{\"type\": \"git\", \"branch\": \"main\", \"rev\": \"abc123\"}\n",
                "",
                0,
            )
    }

    #[tokio::test]
    async fn happy_path_yields_status() {
        let session = git_host();
        let outcome = probe_session(&session, &remote()).await.unwrap();
        match outcome {
            UnitOutcome::Status(status) => {
                assert_eq!(status.kind, VcsKind::Git);
                assert_eq!(status.branch, "main");
                assert_eq!(status.rev, "abc123");
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn payload_is_staged_to_the_fixed_path() {
        let session = git_host();
        probe_session(&session, &remote()).await.unwrap();

        let uploads = session.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, STAGED);
        assert_eq!(uploads[0].1, PAYLOAD.as_bytes());
        // The staged program inspects the fixed working directory.
        assert!(PAYLOAD.contains(WORK_DIR));
    }

    #[tokio::test]
    async fn unsupported_shell_fails_fast() {
        let session = ScriptedSession::new();
        let err = probe_session(&session, &remote()).await.unwrap_err();
        assert!(matches!(err, UnitError::UnsupportedRemote { .. }));
        assert!(
            session.uploads.lock().unwrap().is_empty(),
            "nothing may be staged on an unsupported remote"
        );
    }

    #[tokio::test]
    async fn handshake_mismatch_is_protocol_violation() {
        let session = ScriptedSession::new()
            .on("python3 --version", "Python 3.10.4\n", "", 0)
            .on(
                &format!("python3 '{STAGED}' --handshake"),
                "vcs-probe/0\n",
                "",
                0,
            );
        let err = probe_session(&session, &remote()).await.unwrap_err();
        match err {
            UnitError::ProtocolViolation { detail } => assert!(detail.contains("vcs-probe/0")),
            other => panic!("expected ProtocolViolation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stderr_wins_over_stdout() {
        let session = ScriptedSession::new()
            .on("python3 --version", "Python 3.10.4\n", "", 0)
            .on(
                &format!("python3 '{STAGED}' --handshake"),
                "vcs-probe/1\n",
                "",
                0,
            )
            .on(
                &format!("python3 '{STAGED}'"),
                "{\"type\": \"git\", \"branch\": \"m\", \"rev\": \"r\"}\n",
                "probe failed: ambiguous vcs markers: git, svn\n",
                1,
            );
        let err = probe_session(&session, &remote()).await.unwrap_err();
        match err {
            UnitError::ProbeFailure { detail } => assert!(detail.contains("ambiguous")),
            other => panic!("expected ProbeFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_output_is_probe_failure() {
        let session = ScriptedSession::new()
            .on("python3 --version", "Python 3.10.4\n", "", 0)
            .on(
                &format!("python3 '{STAGED}' --handshake"),
                "vcs-probe/1\n",
                "",
                0,
            )
            .on(&format!("python3 '{STAGED}'"), "", "", 0);
        let err = probe_session(&session, &remote()).await.unwrap_err();
        assert!(matches!(err, UnitError::ProbeFailure { .. }));
    }

    #[tokio::test]
    async fn garbage_output_is_protocol_violation() {
        let session = ScriptedSession::new()
            .on("python3 --version", "Python 3.10.4\n", "", 0)
            .on(
                &format!("python3 '{STAGED}' --handshake"),
                "vcs-probe/1\n",
                "",
                0,
            )
            .on(&format!("python3 '{STAGED}'"), "not json at all\n", "", 0);
        let err = probe_session(&session, &remote()).await.unwrap_err();
        assert!(matches!(err, UnitError::ProtocolViolation { .. }));
    }

    #[tokio::test]
    async fn none_report_is_absent() {
        let session = ScriptedSession::new()
            .on("python3 --version", "Python 3.10.4\n", "", 0)
            .on(
                &format!("python3 '{STAGED}' --handshake"),
                "vcs-probe/1\n",
                "",
                0,
            )
            .on(
                &format!("python3 '{STAGED}'"),
                "{\"type\": \"none\", \"branch\": \"\", \"rev\": \"\"}\n",
                "",
                0,
            );
        let outcome = probe_session(&session, &remote()).await.unwrap();
        assert!(matches!(outcome, UnitOutcome::Absent));
    }
}
