//! Subversion working-copy state, via `svn info`.
//!
//! Unlike git, svn working-copy metadata has no stable on-disk format worth
//! parsing by hand — the `.svn` wc.db schema changes between releases. The
//! probe therefore asks the installed client itself, one `--show-item` per
//! field.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::VcsError;
use crate::status::{VcsKind, VcsStatus};

/// A directory owned by Subversion.
#[derive(Debug)]
pub struct SvnWorkingCopy {
    root: PathBuf,
}

impl SvnWorkingCopy {
    pub(crate) const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Read the repository-relative URL (as "branch") and the numeric
    /// revision from `svn info`.
    pub(crate) fn status(&self) -> Result<VcsStatus, VcsError> {
        let branch = show_item(&self.root, "relative-url")?;
        let rev = show_item(&self.root, "revision")?;

        // The revision item must be numeric; anything else means the
        // client's output is not what we think it is.
        if rev.parse::<u64>().is_err() {
            return Err(VcsError::ProbeFailure {
                message: format!("svn revision {rev:?} is not numeric"),
            });
        }

        Ok(VcsStatus {
            kind: VcsKind::Svn,
            branch,
            rev,
        })
    }
}

/// Run `svn info --show-item <item>` in the working copy and return the
/// trimmed single-line output. Non-zero exit or empty output is a
/// [`VcsError::ProbeFailure`].
fn show_item(root: &Path, item: &str) -> Result<String, VcsError> {
    let output = Command::new("svn")
        .args(["info", "--show-item", item])
        .current_dir(root)
        .output()
        .map_err(|err| VcsError::ProbeFailure {
            message: format!("cannot run svn: {err}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(item, %stderr, "svn info failed");
        return Err(VcsError::ProbeFailure {
            message: format!("svn info --show-item {item} exited with {}", output.status),
        });
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    if value.is_empty() {
        return Err(VcsError::ProbeFailure {
            message: format!("svn info --show-item {item} returned nothing"),
        });
    }
    Ok(value)
}
