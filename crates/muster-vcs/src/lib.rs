//! VCS layer for muster.
//!
//! This crate answers one question: *which version-control system owns the
//! working copy at a given path, and what is checked out there?* The rest of
//! muster never inspects `.git` or shells out to `svn` directly — it depends
//! on this crate and programs against [`detect`] and [`WorkingCopy`].
//!
//! # Crate layout
//!
//! - [`detect`] — marker scan and the [`WorkingCopy`] variant set.
//! - [`status`] — value types ([`VcsKind`], [`VcsStatus`]).
//! - [`report`] — the probe wire format: one JSON line, a protocol version,
//!   and the embedded payload staged onto remote hosts.
//! - [`error`] — the [`VcsError`] enum returned by all operations.

pub mod detect;
pub mod error;
pub mod report;
pub mod status;

mod git;
mod svn;

// Re-export the common vocabulary at the crate root for ergonomic imports:
// `use muster_vcs::{detect, VcsKind, VcsStatus, VcsError};`
pub use detect::{WorkingCopy, detect, probe};
pub use error::VcsError;
pub use report::{HANDSHAKE_TOKEN, PAYLOAD, PROTOCOL_VERSION, ProbeReport, ReportedKind, WORK_DIR};
pub use status::{VcsKind, VcsStatus};
