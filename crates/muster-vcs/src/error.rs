//! Error types for VCS detection and probing.
//!
//! [`VcsError`] is the single error type returned by everything in this
//! crate. It uses rich enum variants so callers can match on specific
//! failure modes (no markers, conflicting markers, a broken working copy)
//! without parsing error messages.

use thiserror::Error;

use crate::status::VcsKind;

/// Errors returned by VCS detection and status probing.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The working directory carries no recognized VCS marker.
    #[error("no VCS marker found in working directory")]
    NoVcs,

    /// More than one VCS marker is present, so ownership of the working
    /// copy is undecidable.
    #[error("ambiguous working copy: found markers for {}", fmt_kinds(found))]
    AmbiguousVcs {
        /// Every kind whose marker was present, in priority order.
        found: Vec<VcsKind>,
    },

    /// A marker was present but the working copy could not be read —
    /// a missing ref file, an empty `HEAD`, or a failing `svn info`.
    #[error("probe failed: {message}")]
    ProbeFailure {
        /// Human-readable description of what could not be read.
        message: String,
    },

    /// An I/O error occurred while reading working-copy state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_kinds(kinds: &[VcsKind]) -> String {
    let names: Vec<&str> = kinds.iter().map(VcsKind::as_str).collect();
    names.join(", ")
}
