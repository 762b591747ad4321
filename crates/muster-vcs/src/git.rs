//! Git working-copy state, read from loose files.
//!
//! No git library and no `git` subprocess: the checked-out branch and
//! revision are read straight from `.git/HEAD` and the ref file it points
//! at. That is all the probe needs, and it works on hosts where git itself
//! is not installed.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::VcsError;
use crate::status::{VcsKind, VcsStatus};

const SYMREF_PREFIX: &str = "ref: ";
const HEADS_PREFIX: &str = "refs/heads/";

/// A directory owned by git.
#[derive(Debug)]
pub struct GitWorkingCopy {
    root: PathBuf,
}

impl GitWorkingCopy {
    pub(crate) const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Read branch and revision from `HEAD`.
    ///
    /// `HEAD` is either a symbolic ref (`ref: refs/heads/<name>`), in which
    /// case the branch is `<name>` and the revision comes from the ref file,
    /// or a raw commit id (detached), in which case both branch and revision
    /// report that id.
    pub(crate) fn status(&self) -> Result<VcsStatus, VcsError> {
        let head = first_line(&self.root.join(".git").join("HEAD"))?;

        let Some(target) = head.strip_prefix(SYMREF_PREFIX) else {
            // Detached HEAD: the commit id stands in for both fields.
            return Ok(VcsStatus {
                kind: VcsKind::Git,
                branch: head.clone(),
                rev: head,
            });
        };

        let branch = target.strip_prefix(HEADS_PREFIX).unwrap_or(target);
        let ref_path = self.root.join(".git").join(target);
        let rev = first_line(&ref_path).map_err(|_| VcsError::ProbeFailure {
            message: format!("ref file {target} is missing or empty"),
        })?;

        Ok(VcsStatus {
            kind: VcsKind::Git,
            branch: branch.to_owned(),
            rev,
        })
    }
}

/// First line of a file, trimmed. Empty or unreadable files are probe
/// failures — `HEAD` and ref files always carry exactly one useful line.
fn first_line(path: &Path) -> Result<String, VcsError> {
    let content = fs::read_to_string(path).map_err(|err| VcsError::ProbeFailure {
        message: format!("cannot read {}: {err}", path.display()),
    })?;
    let line = content.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return Err(VcsError::ProbeFailure {
            message: format!("{} is empty", path.display()),
        });
    }
    Ok(line.to_owned())
}
