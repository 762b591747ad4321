//! The reconciliation run.
//!
//! `Loaded → Probing → Merged → Persisted`. Load the inventory, build the
//! unit list, probe every unit through a bounded worker pool, fold the
//! results back into the document in original unit order, rotate the backup,
//! write. Per-unit failures are recorded in the document and never abort the
//! batch; only inventory load/write failures are fatal.
//!
//! Concurrency model: each worker owns exactly one SSH session for the
//! lifetime of one unit's probe — sessions are never shared. Results are
//! buffered by unit index and applied sequentially after the pool drains, so
//! the on-disk document is identical regardless of completion order. A
//! per-unit deadline keeps one unreachable host from stalling the batch, and
//! connect/timeout-class failures get a single retry with backoff.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{MusterConfig, RemoteSettings, RunSettings};
use crate::inventory::{InventoryError, InventoryStore, MergeError};
use crate::model::{HostUnit, UnitError, UnitOutcome};
use crate::probe::probe_session;
use crate::session::Dial;

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// What one reconciliation run did, unit by unit, in document order.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Every unit with its recorded outcome.
    pub outcomes: Vec<(HostUnit, UnitOutcome)>,
    /// Probe results that had no record to land in.
    pub merge_failures: Vec<MergeError>,
}

impl RunSummary {
    /// Units that reported a checked-out VCS.
    #[must_use]
    pub fn probed(&self) -> usize {
        self.count("ok")
    }

    /// Units that probed cleanly with no VCS present.
    #[must_use]
    pub fn absent(&self) -> usize {
        self.count("absent")
    }

    /// Units whose probe recorded an error.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.label() == label)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Orchestrates one run against one inventory store.
pub struct Reconciler {
    dialer: Arc<dyn Dial>,
    config: MusterConfig,
}

impl Reconciler {
    /// Build a reconciler over the given dial seam and configuration.
    #[must_use]
    pub fn new(dialer: Arc<dyn Dial>, config: MusterConfig) -> Self {
        Self { dialer, config }
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// Only inventory I/O: a document that cannot be loaded aborts before
    /// any probing, and a failed backup/write aborts after. Everything
    /// per-unit is recorded, not raised.
    pub async fn run(&self, store: &InventoryStore) -> Result<RunSummary, InventoryError> {
        let mut doc = store.load()?;
        let units = doc.units();
        info!(
            units = units.len(),
            workers = self.config.run.workers,
            "reconciliation started"
        );

        let outcomes = self.probe_all(&units).await;

        let mut summary = RunSummary::default();
        for (unit, outcome) in units.into_iter().zip(outcomes) {
            if let Err(err) = doc.merge(&unit, outcome.to_field()) {
                error!(unit = %unit, error = %err, "probe result has no record to land in");
                summary.merge_failures.push(err);
            }
            summary.outcomes.push((unit, outcome));
        }

        store.rotate()?;
        store.save(&doc)?;

        info!(
            probed = summary.probed(),
            absent = summary.absent(),
            failed = summary.failed(),
            "reconciliation finished"
        );
        Ok(summary)
    }

    /// Probe every unit through the bounded pool. The returned vector is
    /// index-aligned with `units` no matter which order workers finish in.
    async fn probe_all(&self, units: &[HostUnit]) -> Vec<UnitOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.run.workers.max(1)));
        let mut tasks: JoinSet<(usize, UnitOutcome)> = JoinSet::new();

        for (index, unit) in units.iter().enumerate() {
            let unit = unit.clone();
            let dialer = Arc::clone(&self.dialer);
            let run = self.config.run.clone();
            let remote = self.config.remote.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition only fails
                // if the runtime is tearing down; the permit spans the probe.
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = probe_unit(dialer.as_ref(), &run, &remote, &unit).await;
                info!(unit = %unit, outcome = outcome.label(), "unit finished");
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<UnitOutcome>> = Vec::with_capacity(units.len());
        slots.resize_with(units.len(), || None);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => error!("probe worker failed: {err}"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    UnitOutcome::Failed(UnitError::ProbeFailure {
                        detail: "probe worker aborted".to_owned(),
                    })
                })
            })
            .collect()
    }
}

/// One unit, one session, one deadline — plus the single bounded retry for
/// transient failures.
async fn probe_unit(
    dialer: &dyn Dial,
    run: &RunSettings,
    remote: &RemoteSettings,
    unit: &HostUnit,
) -> UnitOutcome {
    match attempt(dialer, run, remote, unit).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_transient() => {
            warn!(unit = %unit, error = %err, "transient failure, retrying once");
            tokio::time::sleep(run.retry_backoff()).await;
            match attempt(dialer, run, remote, unit).await {
                Ok(outcome) => outcome,
                Err(err) => UnitOutcome::Failed(err),
            }
        }
        Err(err) => UnitOutcome::Failed(err),
    }
}

async fn attempt(
    dialer: &dyn Dial,
    run: &RunSettings,
    remote: &RemoteSettings,
    unit: &HostUnit,
) -> Result<UnitOutcome, UnitError> {
    let work = async {
        let session = dialer.dial(unit).await?;
        probe_session(session.as_ref(), remote).await
        // Session dropped here: released on success, error, and — because
        // timeout cancels the future — on deadline expiry too.
    };
    match tokio::time::timeout(run.probe_timeout(), work).await {
        Ok(result) => result,
        Err(_) => Err(UnitError::ProbeTimeout {
            seconds: run.probe_timeout_secs,
        }),
    }
}
