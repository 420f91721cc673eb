use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dipdeploy")]
#[command(version = "0.1.0")]
#[command(about = "Percentage-based capital deployment with dip-entry signals", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, global = true, default_value = "config", env = "DIPDEPLOY_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the signal engine
    Run {
        /// Paper trading: random-walk prices and immediate fills
        #[arg(long)]
        paper: bool,
        /// Equity used when no config file is found (paper mode only)
        #[arg(long, default_value = "1000000")]
        equity: Decimal,
        /// Symbols used when no config file is found (paper mode only)
        #[arg(long, value_delimiter = ',', default_value = "NIFTYBEES,GOLDBEES,BANKBEES")]
        symbols: Vec<String>,
        /// Starting price for every paper symbol
        #[arg(long, default_value = "100")]
        start_price: Decimal,
        /// Max relative price move per poll for the random walk (e.g., 0.004 = 0.4%)
        #[arg(long, default_value = "0.004")]
        step: f64,
        /// Seed the random walk for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
        /// Ignore engine.trading_window and evaluate around the clock
        #[arg(long)]
        all_hours: bool,
    },
    /// Show ledger and positions from the last snapshot
    Status {
        /// Snapshot file (defaults to persistence.snapshot_path)
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Load and validate the configuration
    CheckConfig,
}
