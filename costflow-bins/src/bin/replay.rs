//! Replay a mutation script against a snapshot
//!
//! This binary:
//! - Seeds an in-memory store from a JSON snapshot
//! - Applies each scripted edit and reports it to the change detector
//! - Waits for the worker pool to drain
//! - Prints the resulting order financials as JSON lines

use anyhow::{Context, Result};
use clap::Parser;
use costflow_bins::common::{init_logging, print_stats, write_financials, CommonArgs};
use costflow_bins::script::load_script;
use costflow_core::events::{EventJournal, EventSink, FanoutSink, TracingSink};
use costflow_core::resilience::install_panic_handler;
use costflow_core::{CostEngine, InMemoryStore, Snapshot, TenantId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct ReplayArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Snapshot of the cost graph (JSON)
    #[arg(long)]
    snapshot: PathBuf,

    /// Mutation script (JSON array)
    #[arg(long)]
    script: PathBuf,

    /// Tenant whose orders are printed
    #[arg(short, long, default_value = "1")]
    tenant: u64,

    /// Append domain events to this JSONL file
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Seconds to wait for outstanding units
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Print Prometheus metrics after the replay
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let args = ReplayArgs::parse();
    let config = args.common.load_config()?;

    init_logging(&config)?;
    install_panic_handler();

    tracing::info!("=== Costflow: replay ===");

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let snapshot = Snapshot::load(&args.snapshot)?;
    let store = Arc::new(InMemoryStore::from_snapshot(snapshot));
    let script = load_script(&args.script)?;
    tracing::info!("Loaded {} mutations", script.len());

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    let journal_path = args.journal.clone().or_else(|| config.events.journal_path.clone());
    if let Some(path) = journal_path {
        tracing::info!("Journaling events to {}", path.display());
        sinks.push(Arc::new(EventJournal::open(path)?));
    }
    let events = Arc::new(FanoutSink::new(sinks));

    let engine = CostEngine::start(&config, store.clone(), events)?;

    let mut applied = 0;
    let mut enqueued = 0;
    for mutation in &script {
        if interrupted.load(Ordering::SeqCst) {
            tracing::warn!("Interrupted, skipping remaining mutations");
            break;
        }
        enqueued += mutation
            .apply(&store, &engine)
            .with_context(|| format!("Failed to apply {:?}", mutation))?;
        applied += 1;
    }

    if !engine.wait_idle(Duration::from_secs(args.timeout_secs)) {
        tracing::warn!("{} units still in flight after {}s", engine.in_flight(), args.timeout_secs);
    }

    let orders = store.snapshot(TenantId::new(args.tenant)).orders;
    let stdout = std::io::stdout();
    write_financials(&mut stdout.lock(), &orders)?;

    print_stats(applied, enqueued, &engine.dead_letters());
    if args.metrics {
        println!("{}", engine.metrics().render()?);
    }

    engine.shutdown();
    Ok(())
}
