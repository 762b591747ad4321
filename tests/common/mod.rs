//! Shared test harness: scripted sessions and dialers built purely on the
//! public `muster` API, so these tests prove the library surface is enough
//! to substitute the whole SSH layer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use muster::model::{HostUnit, UnitError};
use muster::session::{Dial, ExecOutput, RemoteSession, SessionError};

/// Where the default configuration stages the payload.
pub const STAGED: &str = "/tmp/vcs-probe.py";

/// A session answering from a fixed command→output table (longest prefix
/// wins). Commands outside the table act like a missing binary.
#[derive(Default)]
pub struct FakeSession {
    responses: HashMap<String, ExecOutput>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
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

    /// A host that negotiates python3 and reports a git checkout.
    #[must_use]
    pub fn git_host(branch: &str, rev: &str) -> Self {
        Self::new()
            .on("python3 --version", "Python 3.11.2\n", "", 0)
            .on(
                &format!("python3 '{STAGED}' --handshake"),
                "vcs-probe/1\n",
                "",
                0,
            )
            .on(
                &format!("python3 '{STAGED}'"),
                &format!("{{\"type\": \"git\", \"branch\": \"{branch}\", \"rev\": \"{rev}\"}}\n"),
                "",
                0,
            )
    }

    /// A host that negotiates python3 and reports no VCS at all.
    #[must_use]
    pub fn empty_host() -> Self {
        Self::new()
            .on("python3 --version", "Python 3.8.10\n", "", 0)
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
            )
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn exec(&self, command: &str) -> Result<ExecOutput, SessionError> {
        let hit = self
            .responses
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        Ok(hit.map_or_else(
            || ExecOutput {
                stdout: String::new(),
                stderr: format!("{command}: command not found"),
                exit_code: Some(127),
            },
            |(_, output)| output.clone(),
        ))
    }

    async fn upload(&self, _content: &[u8], _remote_path: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Dialer mapping hostnames to session factories.
pub struct FakeFleet {
    hosts: HashMap<String, Box<dyn Fn() -> FakeSession + Send + Sync>>,
}

impl FakeFleet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hosts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn host(
        mut self,
        name: &str,
        factory: impl Fn() -> FakeSession + Send + Sync + 'static,
    ) -> Self {
        self.hosts.insert(name.to_owned(), Box::new(factory));
        self
    }

    #[must_use]
    pub fn into_dialer(self) -> Arc<dyn Dial> {
        Arc::new(self)
    }
}

impl Default for FakeFleet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dial for FakeFleet {
    async fn dial(&self, unit: &HostUnit) -> Result<Box<dyn RemoteSession>, UnitError> {
        match self.hosts.get(&unit.hostname) {
            Some(factory) => Ok(Box::new(factory())),
            None => Err(UnitError::ConnectFailed {
                detail: format!("no route to {}", unit.hostname),
            }),
        }
    }
}
