//! Reconcile CLI: run, latest, audit and demo commands.
//!
//! Commands:
//! - `run`: reconcile provider payload files for one request
//! - `latest`: print the most recent recorded decision for a request
//! - `audit`: list recorded decisions, optionally replaying each one
//! - `demo`: reconcile seeded synthetic providers
//!
//! Decisions go to stdout as JSON; logs and warnings go to stderr.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use reconcile_core::domain::{Decision, RequestIdentity, RequestKind, TimeWindow};
use reconcile_core::logging::{init_logging, LogConfig, LogFormat};
use reconcile_core::{EngineConfig, ReconcileError};
use reconcile_runner::{
    render_markdown, verify_all, DecisionRecorder, FileAdapter, JsonlRecorder, ProviderAdapter,
    ReconcileOutcome, Reconciler, SyntheticAdapter,
};

#[derive(Parser)]
#[command(
    name = "reconcile",
    about = "Reconcile market data from several providers and record the chosen source"
)]
struct Cli {
    /// Log filter, e.g. `info` or `reconcile_core=debug`. `RUST_LOG` wins when set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output: pretty, json or compact.
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    /// Log span open/close for each request and provider fetch.
    #[arg(long, global = true, default_value_t = false)]
    log_spans: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct RequestArgs {
    /// Ticker symbol (case-insensitive).
    #[arg(long)]
    symbol: String,

    /// Request kind: prices, indicators or fundamentals.
    #[arg(long, default_value = "indicators")]
    kind: RequestKind,

    /// Window start (YYYY-MM-DD). Requires --end.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Window end (YYYY-MM-DD). Requires --start.
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[derive(Args, Clone)]
struct StoreArgs {
    /// Engine configuration TOML. Defaults to built-in profiles.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Decision store directory.
    #[arg(long, default_value = "reconcile-audit")]
    audit_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile provider payload files for one request.
    Run {
        #[command(flatten)]
        request: RequestArgs,

        /// Provider payload as `provider=path` (JSON payload, or CSV by extension).
        #[arg(long = "payload", required = true)]
        payloads: Vec<String>,

        #[command(flatten)]
        store: StoreArgs,

        /// Also write a Markdown report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the most recent recorded decision for a request.
    Latest {
        #[command(flatten)]
        request: RequestArgs,

        #[command(flatten)]
        store: StoreArgs,
    },
    /// List recorded decisions.
    Audit {
        #[command(flatten)]
        store: StoreArgs,

        /// Replay every decision from its raw snapshot and report divergences.
        #[arg(long, default_value_t = false)]
        verify: bool,
    },
    /// Reconcile seeded synthetic providers (no input files needed).
    Demo {
        #[command(flatten)]
        request: RequestArgs,

        /// Seed for the synthetic providers.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Last date the synthetic providers serve when no window is given.
        #[arg(long)]
        as_of: Option<NaiveDate>,

        #[command(flatten)]
        store: StoreArgs,

        /// Also write a Markdown report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(
        LogConfig::new(cli.log_level)
            .with_format(cli.log_format)
            .with_span_events(cli.log_spans),
    )?;

    match cli.command {
        Commands::Run {
            request,
            payloads,
            store,
            report,
        } => run_files(&request, &payloads, &store, report.as_deref()),
        Commands::Latest { request, store } => run_latest(&request, &store),
        Commands::Audit { store, verify } => run_audit(&store, verify),
        Commands::Demo {
            request,
            seed,
            as_of,
            store,
            report,
        } => run_demo(&request, seed, as_of, &store, report.as_deref()),
    }
}

fn load_config(store: &StoreArgs) -> Result<EngineConfig> {
    match &store.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn build_request(config: &EngineConfig, args: &RequestArgs) -> Result<RequestIdentity> {
    let window = match (args.start, args.end) {
        (Some(start), Some(end)) => Some(TimeWindow::new(start, end)),
        (None, None) => None,
        _ => bail!("--start and --end must be given together"),
    };
    Ok(config.request(&args.symbol, args.kind, window))
}

fn run_files(
    request_args: &RequestArgs,
    specs: &[String],
    store: &StoreArgs,
    report: Option<&Path>,
) -> Result<()> {
    let config = load_config(store)?;
    let request = build_request(&config, request_args)?;

    let mut adapters: Vec<Box<dyn ProviderAdapter>> = Vec::with_capacity(specs.len());
    for spec in specs {
        let Some(adapter) = FileAdapter::parse_spec(spec) else {
            bail!("invalid --payload '{spec}', expected provider=path");
        };
        adapters.push(Box::new(adapter));
    }
    tracing::info!(request = %request, providers = adapters.len(), "reconciling payload files");

    let reconciler = Reconciler::new(config, JsonlRecorder::new(&store.audit_dir));
    finish(reconciler.fetch_and_reconcile(&adapters, &request), report)
}

fn run_demo(
    request_args: &RequestArgs,
    seed: u64,
    as_of: Option<NaiveDate>,
    store: &StoreArgs,
    report: Option<&Path>,
) -> Result<()> {
    let config = load_config(store)?;
    let request = build_request(&config, request_args)?;
    let adapters: Vec<Box<dyn ProviderAdapter>> = SyntheticAdapter::demo_set(seed)
        .into_iter()
        .map(|a| match as_of {
            Some(date) => a.with_anchor(date),
            None => a,
        })
        .map(|a| Box::new(a) as Box<dyn ProviderAdapter>)
        .collect();

    let reconciler = Reconciler::new(config, JsonlRecorder::new(&store.audit_dir));
    finish(reconciler.fetch_and_reconcile(&adapters, &request), report)
}

/// Print the decision, surface a persistence warning, and map no-data to exit 2.
fn finish(result: Result<ReconcileOutcome, ReconcileError>, report: Option<&Path>) -> Result<()> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e @ ReconcileError::NoDataAvailable { .. }) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    if let Some(warning) = &outcome.persistence_warning {
        eprintln!("WARNING: {warning}");
    }
    print_decision(&outcome.decision)?;

    if let Some(path) = report {
        std::fs::write(path, render_markdown(&outcome.decision))
            .with_context(|| format!("writing report {}", path.display()))?;
        eprintln!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn run_latest(request_args: &RequestArgs, store: &StoreArgs) -> Result<()> {
    let config = load_config(store)?;
    let request = build_request(&config, request_args)?;
    let recorder = JsonlRecorder::new(&store.audit_dir);

    match recorder.latest(&request)? {
        Some(decision) => print_decision(&decision),
        None => {
            eprintln!("No recorded decision for {request}");
            std::process::exit(1);
        }
    }
}

fn run_audit(store: &StoreArgs, verify: bool) -> Result<()> {
    let recorder = JsonlRecorder::new(&store.audit_dir);
    let decisions = recorder.read_audit()?;
    if decisions.is_empty() {
        println!("Audit log is empty: {}", recorder.audit_path().display());
        return Ok(());
    }

    println!(
        "{:<25} {:<8} {:<13} {:<14} {:>6}",
        "Timestamp", "Symbol", "Kind", "Chosen", "Score"
    );
    println!("{}", "-".repeat(70));
    for d in &decisions {
        println!(
            "{:<25} {:<8} {:<13} {:<14} {:>6.3}",
            d.timestamp.format("%Y-%m-%d %H:%M:%S"),
            d.request.symbol,
            d.request.kind,
            d.chosen_source,
            d.chosen_score().map_or(0.0, |s| s.score),
        );
    }

    if !verify {
        return Ok(());
    }

    let config = load_config(store)?;
    let reports = verify_all(&decisions, &config);
    let divergent: Vec<_> = reports.iter().filter(|r| !r.is_consistent()).collect();
    println!();
    println!(
        "Replayed {} decision(s): {} consistent, {} divergent",
        reports.len(),
        reports.len() - divergent.len(),
        divergent.len()
    );
    for r in &divergent {
        let replayed = r
            .replayed_source
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!(
            "  {}: recorded {} replayed {} (payload {}, scores {}){}",
            r.fingerprint,
            r.recorded_source,
            replayed,
            if r.payload_matches { "same" } else { "differs" },
            if r.scores_match { "same" } else { "differ" },
            r.error
                .as_deref()
                .map(|e| format!(" error: {e}"))
                .unwrap_or_default(),
        );
    }
    if !divergent.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_decision(decision: &Decision) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(decision)?);
    Ok(())
}
