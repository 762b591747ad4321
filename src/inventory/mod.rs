//! The inventory document: hosts grouped by cluster.
//!
//! The persisted tree is `{"hosts": {<cluster>: <record> | [<record>, ...]}}`.
//! A cluster maps to either a single host record or an ordered sequence of
//! them, and that shape is preserved across load/modify/save — merging never
//! flips one into the other, never reorders a sequence, and never adds or
//! removes records. Unknown record fields (titles, annotations) ride along
//! untouched.

mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::model::{AuthSpec, Credential, HostUnit, VcsField};

pub use store::{InventoryError, InventoryStore};

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

/// The whole inventory file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct InventoryDocument {
    /// Cluster name → record(s). `None` when the file lacks the `hosts`
    /// key entirely; such a document yields no units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<BTreeMap<String, ClusterEntry>>,

    /// Unrecognized top-level fields, preserved through a round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One cluster's value: a single record or an ordered sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterEntry {
    /// `{"host": ..., "user": ...}`
    Single(HostRecord),
    /// `[{"host": ...}, ...]`
    Many(Vec<HostRecord>),
}

/// One host record inside a cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    /// `host[:port]`, port defaulting to 22.
    pub host: String,
    /// Login user.
    pub user: String,
    /// Optional authentication override; absent means password = user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSpec>,
    /// Probe result from the last reconciliation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs: Option<VcsField>,
    /// Unrecognized fields (e.g. `title`), preserved through a round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HostRecord {
    fn unit(&self, cluster: &str) -> HostUnit {
        HostUnit {
            cluster: cluster.to_owned(),
            hostname: self.host.clone(),
            username: self.user.clone(),
            credential: Credential::from_spec(self.auth.as_ref(), &self.user),
        }
    }
}

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

/// A merge could not find the record a unit came from.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    /// The cluster key is gone. Merge itself never removes clusters, so
    /// this indicates the document was replaced mid-run.
    #[error("cluster '{cluster}' not found in document")]
    ClusterNotFound {
        /// The missing grouping key.
        cluster: String,
    },

    /// A sequence-shaped cluster has no record with the unit's
    /// `(host, user)`. Surfaced rather than silently dropped so the probe
    /// result is never lost without a trace.
    #[error("no record matching {user}@{host} in cluster '{cluster}'")]
    NoMatchingRecord {
        /// The grouping key that was searched.
        cluster: String,
        /// The unit's `host[:port]`.
        host: String,
        /// The unit's login user.
        user: String,
    },
}

// ---------------------------------------------------------------------------
// Units and merging
// ---------------------------------------------------------------------------

impl InventoryDocument {
    /// Build the run's probe targets, in document order (clusters sorted by
    /// name, sequence entries in sequence order).
    ///
    /// A document without a `hosts` key yields no units; that is logged as
    /// an error rather than failing the run, matching the file format's
    /// tolerance for sparse documents.
    #[must_use]
    pub fn units(&self) -> Vec<HostUnit> {
        let Some(hosts) = &self.hosts else {
            error!("inventory has no 'hosts' key; nothing to probe");
            return Vec::new();
        };

        let mut units = Vec::new();
        for (cluster, entry) in hosts {
            match entry {
                ClusterEntry::Single(record) => units.push(record.unit(cluster)),
                ClusterEntry::Many(records) => {
                    units.extend(records.iter().map(|r| r.unit(cluster)));
                }
            }
        }
        debug!(count = units.len(), "built probe units from inventory");
        units
    }

    /// Attach `field` to the record `unit` was built from.
    ///
    /// Single-record clusters attach by cluster identity alone. Sequence
    /// clusters attach to the first record whose `(host, user)` equals the
    /// unit's. Only the record's `vcs` field changes; order and siblings
    /// are untouched, and merging the same field twice is a no-op.
    pub fn merge(&mut self, unit: &HostUnit, field: VcsField) -> Result<(), MergeError> {
        let entry = self
            .hosts
            .as_mut()
            .and_then(|hosts| hosts.get_mut(&unit.cluster))
            .ok_or_else(|| MergeError::ClusterNotFound {
                cluster: unit.cluster.clone(),
            })?;

        match entry {
            ClusterEntry::Single(record) => {
                record.vcs = Some(field);
                Ok(())
            }
            ClusterEntry::Many(records) => {
                let record = records
                    .iter_mut()
                    .find(|r| r.host == unit.hostname && r.user == unit.username)
                    .ok_or_else(|| MergeError::NoMatchingRecord {
                        cluster: unit.cluster.clone(),
                        host: unit.hostname.clone(),
                        user: unit.username.clone(),
                    })?;
                record.vcs = Some(field);
                Ok(())
            }
        }
    }
}
