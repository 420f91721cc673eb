use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::risk::RiskProfile;
use crate::scheduler::TradingWindow;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub capital: CapitalConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskProfile,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Capital buckets. All ratios are fractions in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalConfig {
    /// Total equity at startup
    pub equity: Decimal,
    /// Share of equity eligible for automated trading (e.g., 0.70)
    pub deployment_ratio: Decimal,
    /// Share of equity never touched by automated trades (e.g., 0.30)
    pub reserve_ratio: Decimal,
    /// Share of the deployable bucket committed per trade (e.g., 0.05)
    pub per_trade_ratio: Decimal,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            equity: Decimal::ZERO,
            deployment_ratio: dec!(0.70),
            reserve_ratio: dec!(0.30),
            per_trade_ratio: dec!(0.05),
        }
    }
}

/// Entry/exit policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Drop from the reference close that triggers an entry (e.g., 0.01 = 1%)
    #[serde(default = "default_dip_threshold")]
    pub dip_threshold: Decimal,
    /// Take-profit distance above entry (e.g., 0.03 = 3%)
    #[serde(default = "default_profit_target")]
    pub profit_target: Decimal,
    /// Loss-alert distance below entry (e.g., 0.05 = 5%)
    #[serde(default = "default_loss_alert")]
    pub loss_alert: Decimal,
    /// Close the position when the loss alert fires instead of only notifying
    #[serde(default)]
    pub hard_stop: bool,
    /// Window suppressing repeated ENTRY signals for the same symbol
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Minimum spacing of repeated loss ALERTs for one position; 0 alerts on every breached tick
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,
    /// Brokerage charged on gross sell proceeds (e.g., 0.003 = 0.3%)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Smallest order quantity the venue accepts
    #[serde(default = "default_min_quantity")]
    pub min_quantity: u64,
}

fn default_dip_threshold() -> Decimal {
    dec!(0.01)
}

fn default_profit_target() -> Decimal {
    dec!(0.03)
}

fn default_loss_alert() -> Decimal {
    dec!(0.05)
}

fn default_dedup_window_secs() -> u64 {
    300
}

fn default_alert_cooldown_secs() -> u64 {
    300
}

fn default_fee_rate() -> Decimal {
    dec!(0.003)
}

fn default_min_quantity() -> u64 {
    1
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            dip_threshold: default_dip_threshold(),
            profit_target: default_profit_target(),
            loss_alert: default_loss_alert(),
            hard_stop: false,
            dedup_window_secs: default_dedup_window_secs(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            fee_rate: default_fee_rate(),
            min_quantity: default_min_quantity(),
        }
    }
}

impl StrategyConfig {
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs as i64)
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alert_cooldown_secs as i64)
    }

    /// Price at or below which a dip entry fires
    pub fn entry_trigger(&self, reference_close: Decimal) -> Decimal {
        reference_close * (Decimal::ONE - self.dip_threshold)
    }

    pub fn target_price(&self, entry_price: Decimal) -> Decimal {
        entry_price * (Decimal::ONE + self.profit_target)
    }

    pub fn stop_price(&self, entry_price: Decimal) -> Decimal {
        entry_price * (Decimal::ONE - self.loss_alert)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-call timeout for feed and gateway requests in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    100
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Symbols evaluated concurrently within one tick
    #[serde(default = "default_max_concurrent_symbols")]
    pub max_concurrent_symbols: usize,
    /// Watched instruments
    pub symbols: Vec<String>,
    /// Exchange hours; ticks outside it are skipped. Unset means always open.
    #[serde(default)]
    pub trading_window: Option<TradingWindow>,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_concurrent_symbols() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_concurrent_symbols: default_max_concurrent_symbols(),
            symbols: Vec::new(),
            trading_window: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistenceConfig {
    /// Write a snapshot after every committed transition
    #[serde(default)]
    pub enabled: bool,
    /// Snapshot file location
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifierConfig {
    /// Webhook receiving JSON engine events
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("engine.tick_interval_ms", 1000)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("DIPDEPLOY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // DIPDEPLOY__CAPITAL__EQUITY, DIPDEPLOY__STRATEGY__DIP_THRESHOLD, ...
            .add_source(
                Environment::with_prefix("DIPDEPLOY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("engine.symbols")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Paper-trading defaults used by the CLI when no config directory exists
    pub fn paper_defaults(equity: Decimal, symbols: Vec<String>) -> Self {
        Self {
            capital: CapitalConfig {
                equity,
                ..CapitalConfig::default()
            },
            strategy: StrategyConfig::default(),
            risk: RiskProfile::default(),
            execution: ExecutionConfig::default(),
            engine: EngineConfig {
                symbols,
                ..EngineConfig::default()
            },
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let unit = |name: &str, v: Decimal, errors: &mut Vec<String>| {
            if v < Decimal::ZERO || v > Decimal::ONE {
                errors.push(format!("{name} must be a fraction between 0 and 1, got {v}"));
            }
        };

        let c = &self.capital;
        if c.equity < Decimal::ZERO {
            errors.push("capital.equity must not be negative".to_string());
        }
        unit("capital.deployment_ratio", c.deployment_ratio, &mut errors);
        unit("capital.reserve_ratio", c.reserve_ratio, &mut errors);
        unit("capital.per_trade_ratio", c.per_trade_ratio, &mut errors);
        if c.deployment_ratio + c.reserve_ratio != Decimal::ONE {
            errors.push(format!(
                "deployment_ratio + reserve_ratio must equal 1, got {}",
                c.deployment_ratio + c.reserve_ratio
            ));
        }

        let s = &self.strategy;
        unit("strategy.dip_threshold", s.dip_threshold, &mut errors);
        unit("strategy.profit_target", s.profit_target, &mut errors);
        unit("strategy.loss_alert", s.loss_alert, &mut errors);
        unit("strategy.fee_rate", s.fee_rate, &mut errors);
        if s.min_quantity == 0 {
            errors.push("strategy.min_quantity must be at least 1".to_string());
        }

        if let Err(mut risk_errors) = self.risk.validate() {
            errors.append(&mut risk_errors);
        }

        if self.execution.timeout_ms == 0 {
            errors.push("execution.timeout_ms must be positive".to_string());
        }
        if self.engine.tick_interval_ms == 0 {
            errors.push("engine.tick_interval_ms must be positive".to_string());
        }
        if self.engine.max_concurrent_symbols == 0 {
            errors.push("engine.max_concurrent_symbols must be at least 1".to_string());
        }
        if self.engine.symbols.is_empty() {
            errors.push("engine.symbols must list at least one instrument".to_string());
        }
        if let Some(window) = &self.engine.trading_window {
            if window.open >= window.close {
                errors.push(format!(
                    "engine.trading_window.open ({}) must be before close ({})",
                    window.open, window.close
                ));
            }
        }
        if self.persistence.enabled && self.persistence.snapshot_path.is_none() {
            errors.push("persistence.snapshot_path is required when persistence is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper() -> AppConfig {
        AppConfig::paper_defaults(dec!(1000000), vec!["NIFTYBEES".to_string()])
    }

    #[test]
    fn paper_defaults_validate() {
        assert!(paper().validate().is_ok());
    }

    #[test]
    fn ratios_must_sum_to_one() {
        let mut cfg = paper();
        cfg.capital.reserve_ratio = dec!(0.20);
        let errors = cfg.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("must equal 1")));
    }

    #[test]
    fn percentages_are_fractions() {
        let mut cfg = paper();
        cfg.strategy.dip_threshold = dec!(1.5);
        cfg.capital.per_trade_ratio = dec!(5);
        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn strategy_price_levels() {
        let s = StrategyConfig::default();
        assert_eq!(s.entry_trigger(dec!(100)), dec!(99.00));
        assert_eq!(s.target_price(dec!(100)), dec!(103.00));
        assert_eq!(s.stop_price(dec!(100)), dec!(95.00));
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[capital]
equity = 500000
deployment_ratio = 0.7
reserve_ratio = 0.3
per_trade_ratio = 0.05

[strategy]
dip_threshold = 0.02

[engine]
symbols = ["NIFTYBEES", "GOLDBEES"]
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(cfg.capital.equity, dec!(500000));
        assert_eq!(cfg.strategy.dip_threshold, dec!(0.02));
        assert_eq!(cfg.strategy.profit_target, dec!(0.03));
        assert_eq!(cfg.engine.symbols.len(), 2);
        assert_eq!(cfg.engine.tick_interval_ms, 1000);
        assert!(cfg.engine.trading_window.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn trading_window_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            r#"
[capital]
equity = 500000
deployment_ratio = 0.7
reserve_ratio = 0.3
per_trade_ratio = 0.05

[engine]
symbols = ["NIFTYBEES"]

[engine.trading_window]
open = "09:15:00"
close = "15:30:00"
timezone = "Asia/Kolkata"
holidays = ["2025-08-15"]
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(dir.path()).unwrap();
        let window = cfg.engine.trading_window.clone().unwrap();
        assert_eq!(window.timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(window.holidays.len(), 1);
        assert!(cfg.validate().is_ok());

        let mut inverted = cfg;
        if let Some(w) = inverted.engine.trading_window.as_mut() {
            std::mem::swap(&mut w.open, &mut w.close);
        }
        assert!(inverted.validate().is_err());
    }
}
