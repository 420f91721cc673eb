use clap::Parser;
use dipdeploy::adapters::{PaperGateway, RandomWalkFeed, WebhookNotifier};
use dipdeploy::cli::{Cli, Commands};
use dipdeploy::config::AppConfig;
use dipdeploy::engine::{EngineContext, SignalEngine};
use dipdeploy::error::{DeployError, Result};
use dipdeploy::ledger::CapitalLedger;
use dipdeploy::logging::{init_logging, init_logging_simple};
use dipdeploy::notify::{CompositeNotifier, LogNotifier};
use dipdeploy::persistence::{FileSnapshotStore, SnapshotStore};
use dipdeploy::scheduler::IntervalTicker;
use dipdeploy::shutdown::{install_signal_handlers, GracefulShutdown};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run {
            paper,
            equity,
            symbols,
            start_price,
            step,
            seed,
            all_hours,
        } => {
            let mut config = load_run_config(&cli.config_dir, *paper, *equity, symbols.clone())?;
            if *all_hours {
                config.engine.trading_window = None;
            }
            let _guard = init_logging(&config.logging)?;
            run_paper(config, *start_price, *step, *seed).await?;
        }
        Commands::Status { snapshot, json } => {
            init_logging_simple();
            show_status(&cli.config_dir, snapshot.clone(), *json).await?;
        }
        Commands::CheckConfig => {
            init_logging_simple();
            let config = AppConfig::load_from(&cli.config_dir)?;
            validate(&config)?;
            println!("Configuration OK ({} symbols)", config.engine.symbols.len());
        }
    }

    Ok(())
}

fn load_run_config(
    config_dir: &Path,
    paper: bool,
    equity: Decimal,
    symbols: Vec<String>,
) -> Result<AppConfig> {
    if !paper {
        return Err(DeployError::Validation(
            "no live execution gateway is built into this binary; run with --paper".to_string(),
        ));
    }

    let config = match AppConfig::load_from(config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: no usable config in {} ({}), using paper defaults",
                config_dir.display(),
                e
            );
            AppConfig::paper_defaults(equity, symbols)
        }
    };
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|errors| DeployError::Validation(errors.join("; ")))
}

async fn run_paper(
    config: AppConfig,
    start_price: Decimal,
    step: f64,
    seed: Option<u64>,
) -> Result<()> {
    info!(
        equity = %config.capital.equity,
        symbols = ?config.engine.symbols,
        "Starting paper trading"
    );

    let start_prices: HashMap<String, Decimal> = config
        .engine
        .symbols
        .iter()
        .map(|s| (s.clone(), start_price))
        .collect();
    let feed = Arc::new(match seed {
        Some(seed) => RandomWalkFeed::seeded(start_prices, step, seed),
        None => RandomWalkFeed::new(start_prices, step),
    });
    let gateway = Arc::new(PaperGateway::new(feed.clone()));

    let mut notifier = CompositeNotifier::new().with(Arc::new(LogNotifier));
    if let Some(url) = &config.notifier.webhook_url {
        notifier = notifier.with(WebhookNotifier::new(url.clone()));
    } else if let Some(webhook) = WebhookNotifier::from_env() {
        notifier = notifier.with(webhook);
    }

    let tick_interval = config.engine.tick_interval();
    let snapshot_path = config
        .persistence
        .enabled
        .then(|| config.persistence.snapshot_path.clone())
        .flatten();

    let mut ctx = EngineContext::new(config, feed, gateway).with_notifier(Arc::new(notifier));
    if let Some(path) = snapshot_path {
        info!(path = %path.display(), "Snapshots enabled");
        ctx = ctx.with_snapshot_store(Arc::new(FileSnapshotStore::new(path)));
    }

    if let Some(report) = ctx.recover().await? {
        info!(
            restored = report.restored_positions,
            failed = report.failed_pending.len(),
            reverted = report.reverted_closing.len(),
            allocated = %report.allocated,
            "Recovered from snapshot"
        );
    }
    ctx.sync_equity().await?;

    let engine = SignalEngine::new(ctx).await;
    let shutdown = Arc::new(GracefulShutdown::new());
    install_signal_handlers(shutdown.clone());

    let result = engine.run(IntervalTicker::new(tick_interval), &shutdown).await;

    let status = engine.status().await;
    match serde_json::to_string_pretty(&status) {
        Ok(report) => println!("{}", report),
        Err(e) => warn!(error = %e, "Could not render final status"),
    }
    result
}

async fn show_status(config_dir: &Path, snapshot: Option<PathBuf>, json: bool) -> Result<()> {
    let path = match snapshot {
        Some(path) => path,
        None => AppConfig::load_from(config_dir)?
            .persistence
            .snapshot_path
            .ok_or_else(|| {
                DeployError::Validation(
                    "persistence.snapshot_path is not set; pass --snapshot".to_string(),
                )
            })?,
    };

    let store = FileSnapshotStore::new(&path);
    let Some(snapshot) = store.load().await? else {
        println!("No snapshot at {}", path.display());
        return Ok(());
    };

    let ledger = CapitalLedger::from_snapshot(&snapshot.ledger)?;
    let status = ledger.status().await;

    if json {
        let report = serde_json::json!({
            "taken_at": snapshot.taken_at,
            "ledger": status,
            "outstanding_reservations": snapshot.ledger.outstanding.len(),
            "positions": snapshot.positions,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Snapshot taken at {}", snapshot.taken_at);
    println!();
    println!("  Equity        {:>16}", status.equity.round_dp(2));
    println!("  Deployable    {:>16}", status.deployable.round_dp(2));
    println!("  Reserve       {:>16}", status.reserve.round_dp(2));
    println!("  Per trade     {:>16}", status.per_trade.round_dp(2));
    println!("  Allocated     {:>16}", status.allocated.round_dp(2));
    println!("  Reserved      {:>16}", status.reserved.round_dp(2));
    println!("  Available     {:>16}", status.available.round_dp(2));
    println!();

    if snapshot.positions.is_empty() {
        println!("No live positions");
    } else {
        println!(
            "  {:<12} {:<8} {:>8} {:>12} {:>12} {:>12}",
            "SYMBOL", "STATUS", "QTY", "ENTRY", "TARGET", "STOP"
        );
        for p in &snapshot.positions {
            println!(
                "  {:<12} {:<8} {:>8} {:>12} {:>12} {:>12}",
                p.symbol,
                p.status.to_string(),
                p.quantity,
                p.entry_price.round_dp(2),
                p.target_price.round_dp(2),
                p.stop_price.round_dp(2)
            );
        }
    }
    Ok(())
}
