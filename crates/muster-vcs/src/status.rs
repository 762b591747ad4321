//! Value types shared across the VCS layer.
//!
//! [`VcsStatus`] is the unit of information muster moves around: which VCS,
//! which branch, which revision. It is never partially constructed — a probe
//! either yields a full status or an error.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// VcsKind
// ---------------------------------------------------------------------------

/// The version-control systems muster recognizes.
///
/// A closed set: adding support for another VCS means adding a variant here
/// and a working-copy module beside [`crate::detect`], not an impl of some
/// open trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    /// A git working copy (`.git` marker).
    Git,
    /// A Subversion working copy (`.svn` marker).
    Svn,
}

impl VcsKind {
    /// The lowercase name used in markers and on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Svn => "svn",
        }
    }

    /// The directory marker that identifies this kind (`.git`, `.svn`).
    #[must_use]
    pub const fn marker(&self) -> &'static str {
        match self {
            Self::Git => ".git",
            Self::Svn => ".svn",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// VcsStatus
// ---------------------------------------------------------------------------

/// A fully-probed working-copy status.
///
/// `branch` and `rev` are free-form strings whose meaning depends on `kind`:
/// for git they are the short branch name and the commit id (identical when
/// `HEAD` is detached); for svn they are the repository-relative URL and the
/// numeric revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsStatus {
    /// Which VCS owns the working copy.
    pub kind: VcsKind,
    /// Checked-out branch (git) or relative URL (svn). May be empty.
    pub branch: String,
    /// Checked-out revision. May be empty.
    pub rev: String,
}

impl fmt::Display for VcsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}@{}", self.kind, self.branch, self.rev)
    }
}
