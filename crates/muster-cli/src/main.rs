use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;

use muster::config::MusterConfig;
use muster::inventory::InventoryStore;
use muster::reconcile::Reconciler;
use muster::session::SshDialer;
use muster_vcs::{ProbeReport, VcsError, WORK_DIR};

/// Reconcile a host inventory with live VCS state
///
/// Muster reads a JSON inventory of hosts grouped by cluster, probes every
/// host over SSH to learn which VCS (if any) is checked out in its working
/// directory, and writes the enriched inventory back next to a `.old`
/// backup of the previous version.
///
/// Hosts are probed concurrently; per-host failures are recorded in the
/// document (as an `error` status under `vcs`) and never abort the run.
///
/// EXAMPLES:
///
///   muster --inventory fleet.json
///
///   # tune the pool and deadlines via a sibling muster.toml, or:
///   muster --inventory fleet.json --workers 16
///
/// The `--probe` flag makes the binary act as a probe payload on the local
/// machine: it prints one JSON status line for ~/bw and exits. That mode is
/// what the remote payload speaks; humans rarely need it.
#[derive(Parser)]
#[command(name = "muster")]
#[command(version, about)]
struct Cli {
    /// Path to the inventory JSON file
    #[arg(short = 'i', long, value_name = "PATH")]
    inventory: Option<PathBuf>,

    /// Act as a probe payload on the local machine
    #[arg(long)]
    probe: bool,

    /// Explicit config file (default: muster.toml beside the inventory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the worker pool size
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _telemetry = muster::telemetry::init(default_level);

    if cli.probe {
        return run_probe_payload();
    }

    match cli.inventory {
        Some(inventory) => run_reconcile(&inventory, cli.config.as_deref(), cli.workers).await,
        None => {
            // Soft failure: a bare invocation is a usage question, not an
            // error.
            println!("No inventory path given. Try 'muster --inventory <PATH>', or --help.");
            Ok(())
        }
    }
}

/// Probe-payload mode: detect the VCS in the fixed local working directory
/// and emit exactly one JSON line on stdout. Any failure goes to stderr and
/// a non-zero exit, which callers read as "no usable status".
fn run_probe_payload() -> Result<()> {
    let Some(home) = dirs::home_dir() else {
        bail!("cannot resolve home directory for the probe working directory");
    };
    let dir = home.join(WORK_DIR);

    match muster_vcs::probe(&dir) {
        Ok(status) => {
            println!("{}", ProbeReport::from(status).render());
            Ok(())
        }
        Err(VcsError::NoVcs) => {
            // A clean "nothing here" is a valid report, not a failure.
            println!("{}", ProbeReport::absent().render());
            Ok(())
        }
        Err(err) => Err(err).context(format!("probe of '{}' failed", dir.display())),
    }
}

async fn run_reconcile(
    inventory: &Path,
    config_path: Option<&Path>,
    workers: Option<usize>,
) -> Result<()> {
    let mut config = MusterConfig::load(config_path, inventory)?;
    if let Some(workers) = workers {
        config.run.workers = workers;
    }

    let store = InventoryStore::new(inventory);
    let dialer = Arc::new(SshDialer::new(config.run.connect_timeout()));
    let summary = Reconciler::new(dialer, config)
        .run(&store)
        .await
        .context("reconciliation failed")?;

    println!(
        "reconciled {}: {} probed, {} absent, {} failed",
        inventory.display(),
        summary.probed(),
        summary.absent(),
        summary.failed()
    );
    for (unit, outcome) in &summary.outcomes {
        if let muster::model::UnitOutcome::Failed(err) = outcome {
            println!("  {unit}: {err}");
        }
    }
    for failure in &summary.merge_failures {
        println!("  warning: {failure}");
    }
    Ok(())
}
