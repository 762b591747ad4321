//! Working-copy detection.
//!
//! [`detect`] scans a directory for VCS markers in a fixed priority order
//! (git before svn) and returns a [`WorkingCopy`] ready to be probed.
//! Exactly one marker must be present: zero markers is [`VcsError::NoVcs`],
//! two or more is [`VcsError::AmbiguousVcs`]. Detection never mutates the
//! directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::VcsError;
use crate::git::GitWorkingCopy;
use crate::status::{VcsKind, VcsStatus};
use crate::svn::SvnWorkingCopy;

/// Marker scan priority. Order matters: it is part of the probe contract
/// and must match the remote payload.
const PRIORITY: [VcsKind; 2] = [VcsKind::Git, VcsKind::Svn];

// ---------------------------------------------------------------------------
// WorkingCopy
// ---------------------------------------------------------------------------

/// A detected working copy.
///
/// Closed variant set over the supported VCS kinds. Every variant exposes the
/// same capability — [`status`](Self::status) — so callers never branch on
/// the kind themselves.
#[derive(Debug)]
pub enum WorkingCopy {
    /// The directory is owned by git.
    Git(GitWorkingCopy),
    /// The directory is owned by Subversion.
    Svn(SvnWorkingCopy),
}

impl WorkingCopy {
    /// Which VCS owns this working copy.
    #[must_use]
    pub const fn kind(&self) -> VcsKind {
        match self {
            Self::Git(_) => VcsKind::Git,
            Self::Svn(_) => VcsKind::Svn,
        }
    }

    /// Read the checked-out branch and revision.
    ///
    /// Read-only: inspects loose files (git) or invokes the VCS's own
    /// introspection command (svn), never alters the working copy.
    pub fn status(&self) -> Result<VcsStatus, VcsError> {
        match self {
            Self::Git(wc) => wc.status(),
            Self::Svn(wc) => wc.status(),
        }
    }
}

// ---------------------------------------------------------------------------
// detect / probe
// ---------------------------------------------------------------------------

/// Identify which VCS owns the working copy at `dir`.
///
/// # Errors
///
/// [`VcsError::NoVcs`] if no marker is present, [`VcsError::AmbiguousVcs`]
/// if more than one is.
pub fn detect(dir: &Path) -> Result<WorkingCopy, VcsError> {
    let found: Vec<VcsKind> = PRIORITY
        .into_iter()
        .filter(|kind| dir.join(kind.marker()).exists())
        .collect();

    debug!(dir = %dir.display(), markers = found.len(), "scanned for VCS markers");

    match found.as_slice() {
        [] => Err(VcsError::NoVcs),
        [kind] => Ok(working_copy(*kind, dir.to_path_buf())),
        _ => Err(VcsError::AmbiguousVcs { found }),
    }
}

/// Detect and read status in one step.
pub fn probe(dir: &Path) -> Result<VcsStatus, VcsError> {
    detect(dir)?.status()
}

fn working_copy(kind: VcsKind, root: PathBuf) -> WorkingCopy {
    match kind {
        VcsKind::Git => WorkingCopy::Git(GitWorkingCopy::new(root)),
        VcsKind::Svn => WorkingCopy::Svn(SvnWorkingCopy::new(root)),
    }
}
