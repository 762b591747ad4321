//! SSH transport: sessions, authentication, and the dial seam.
//!
//! Everything above this module talks to remotes through two object-safe
//! traits. [`RemoteSession`] is an open session that can run commands and
//! upload bytes; [`Dial`] turns a [`HostUnit`] into a session. Production
//! code uses the russh-backed [`SshDialer`]; tests substitute scripted
//! doubles.
//!
//! A session belongs to exactly one unit's probe. The dialer hands out an
//! owned boxed session and the worker drops it when the probe ends — release
//! on every exit path, including timeout cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::model::{Credential, Endpoint, HostUnit, UnitError};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Output of one remote command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status, if the remote reported one.
    pub exit_code: Option<u32>,
}

impl ExecOutput {
    /// Whether the command reported a zero exit status.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Transport-level failure on an open session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The channel or connection broke mid-operation.
    #[error("transport error: {0}")]
    Transport(String),
}

/// An open session on one remote host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a command and collect its output. A non-zero exit status is not
    /// an `Err` — callers inspect [`ExecOutput`] themselves.
    async fn exec(&self, command: &str) -> Result<ExecOutput, SessionError>;

    /// Write `content` to `remote_path` on the host.
    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), SessionError>;
}

/// Opens sessions for probe targets.
#[async_trait]
pub trait Dial: Send + Sync {
    /// Connect and authenticate a fresh session for `unit`.
    async fn dial(&self, unit: &HostUnit) -> Result<Box<dyn RemoteSession>, UnitError>;
}

// ---------------------------------------------------------------------------
// russh client handler
// ---------------------------------------------------------------------------

struct AcceptingHandler;

#[async_trait]
impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are accepted unconditionally, matching the inventory
        // format's trust model: the fleet is provisioned, not discovered.
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// SshDialer
// ---------------------------------------------------------------------------

/// The production [`Dial`] implementation.
pub struct SshDialer {
    connect_timeout: Duration,
}

impl SshDialer {
    /// Create a dialer with the given TCP connect window.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect(&self, unit: &HostUnit) -> Result<SshSession, UnitError> {
        let endpoint = Endpoint::parse(&unit.hostname).map_err(|err| UnitError::ConnectFailed {
            detail: err.to_string(),
        })?;

        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| UnitError::ConnectTimeout {
            seconds: self.connect_timeout.as_secs(),
        })?
        .map_err(|err| UnitError::ConnectFailed {
            detail: format!("{endpoint}: {err}"),
        })?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.connect_timeout * 3),
            ..client::Config::default()
        });

        let mut handle = client::connect_stream(config, stream, AcceptingHandler)
            .await
            .map_err(|err| UnitError::ConnectFailed {
                detail: format!("{endpoint}: {err}"),
            })?;

        let authenticated = authenticate(&mut handle, unit).await?;
        if !authenticated {
            return Err(UnitError::AuthenticationFailed {
                username: unit.username.clone(),
            });
        }

        debug!(unit = %unit, "SSH session established");
        Ok(SshSession { handle })
    }
}

#[async_trait]
impl Dial for SshDialer {
    async fn dial(&self, unit: &HostUnit) -> Result<Box<dyn RemoteSession>, UnitError> {
        Ok(Box::new(self.connect(unit).await?))
    }
}

async fn authenticate(
    handle: &mut client::Handle<AcceptingHandler>,
    unit: &HostUnit,
) -> Result<bool, UnitError> {
    let transport = |err: russh::Error| UnitError::ConnectFailed {
        detail: format!("authentication transport error: {err}"),
    };

    match &unit.credential {
        Credential::Password(password) => handle
            .authenticate_password(&unit.username, password)
            .await
            .map_err(transport),
        Credential::PrivateKey(path) => {
            let key = load_private_key(path)?;
            handle
                .authenticate_publickey(&unit.username, Arc::new(key))
                .await
                .map_err(transport)
        }
        Credential::Agent => {
            let Some(home) = dirs::home_dir() else {
                return Err(UnitError::ConnectFailed {
                    detail: "cannot resolve home directory for default keys".to_owned(),
                });
            };
            for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let path = home.join(".ssh").join(name);
                if !path.exists() {
                    continue;
                }
                let Ok(key) = load_private_key(&path) else {
                    warn!(key = %path.display(), "skipping unreadable private key");
                    continue;
                };
                match handle
                    .authenticate_publickey(&unit.username, Arc::new(key))
                    .await
                {
                    Ok(true) => return Ok(true),
                    Ok(false) => continue,
                    Err(err) => return Err(transport(err)),
                }
            }
            Ok(false)
        }
    }
}

fn load_private_key(path: &Path) -> Result<russh_keys::key::KeyPair, UnitError> {
    let content = std::fs::read_to_string(path).map_err(|err| UnitError::ConnectFailed {
        detail: format!("cannot read key file {}: {err}", path.display()),
    })?;
    russh_keys::decode_secret_key(&content, None).map_err(|err| UnitError::ConnectFailed {
        detail: format!("cannot decode key file {}: {err}", path.display()),
    })
}

// ---------------------------------------------------------------------------
// SshSession
// ---------------------------------------------------------------------------

/// A live russh session. Dropping it tears the connection down.
pub struct SshSession {
    handle: client::Handle<AcceptingHandler>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str) -> Result<ExecOutput, SessionError> {
        let transport = |err: russh::Error| SessionError::Transport(err.to_string());

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(transport)?;
        channel.exec(true, command).await.map_err(transport)?;

        let mut output = ExecOutput::default();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        loop {
            match channel.wait().await {
                Some(russh::ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(russh::ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                Some(russh::ChannelMsg::ExitStatus { exit_status }) => {
                    output.exit_code = Some(exit_status);
                }
                Some(russh::ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        output.stdout = String::from_utf8_lossy(&stdout).into_owned();
        output.stderr = String::from_utf8_lossy(&stderr).into_owned();
        Ok(output)
    }

    async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), SessionError> {
        let transport = |err: russh::Error| SessionError::Transport(err.to_string());

        // No SFTP needed: stream the bytes through `cat` on a command
        // channel, exactly as wide as the probe payload requires.
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(transport)?;
        channel
            .exec(true, format!("cat > '{remote_path}'"))
            .await
            .map_err(transport)?;
        channel.data(content).await.map_err(transport)?;
        channel.eof().await.map_err(transport)?;

        loop {
            match channel.wait().await {
                Some(russh::ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted session (test support)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod script {
    //! A [`RemoteSession`] double driven by a command → response table.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{ExecOutput, RemoteSession, SessionError};
    use async_trait::async_trait;

    /// Scripted session: responds to `exec` by longest matching command
    /// prefix and records uploads.
    #[derive(Default)]
    pub struct ScriptedSession {
        responses: HashMap<String, ExecOutput>,
        pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ScriptedSession {
        pub fn new() -> Self {
            Self::default()
        }

        /// Respond to any command starting with `prefix`.
        pub fn on(mut self, prefix: &str, stdout: &str, stderr: &str, exit: u32) -> Self {
            self.responses.insert(
                prefix.to_owned(),
                ExecOutput {
                    stdout: stdout.to_owned(),
                    stderr: stderr.to_owned(),
                    exit_code: Some(exit),
                },
            );
            self
        }
    }

    #[async_trait]
    impl RemoteSession for ScriptedSession {
        async fn exec(&self, command: &str) -> Result<ExecOutput, SessionError> {
            let hit = self
                .responses
                .iter()
                .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len());
            match hit {
                Some((_, output)) => Ok(output.clone()),
                // Unknown commands behave like a shell that has no such
                // binary: noise on stderr, non-zero exit.
                None => Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: format!("{command}: command not found"),
                    exit_code: Some(127),
                }),
            }
        }

        async fn upload(&self, content: &[u8], remote_path: &str) -> Result<(), SessionError> {
            self.uploads
                .lock()
                .expect("uploads lock")
                .push((remote_path.to_owned(), content.to_vec()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_output_success_requires_zero_exit() {
        let ok = ExecOutput {
            stdout: "x".into(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(ok.success());

        let failed = ExecOutput {
            exit_code: Some(1),
            ..ExecOutput::default()
        };
        assert!(!failed.success());

        let unknown = ExecOutput::default();
        assert!(!unknown.success());
    }

    #[tokio::test]
    async fn scripted_session_matches_longest_prefix() {
        use script::ScriptedSession;

        let session = ScriptedSession::new()
            .on("python3 --version", "Python 3.11.2\n", "", 0)
            .on("python3", "{}", "", 0);

        let out = session.exec("python3 --version").await.unwrap();
        assert_eq!(out.stdout, "Python 3.11.2\n");

        let out = session.exec("python3 /tmp/x.py").await.unwrap();
        assert_eq!(out.stdout, "{}");

        let out = session.exec("pwsh").await.unwrap();
        assert_eq!(out.exit_code, Some(127));
    }
}
