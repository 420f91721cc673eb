//! Pre-trade risk gate
//!
//! Every entry candidate passes through ordered checks before any capital
//! is reserved:
//! - capital available in the ledger
//! - concentration of the candidate in total equity
//! - correlation against symbols already held
//! - portfolio VaR with the candidate added

pub mod gate;
pub mod returns;
pub mod stats;

pub use gate::{evaluate, RiskCandidate, RiskGate, RiskVerdict};
pub use returns::{InMemoryReturns, ReturnsSource};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Risk limits. Fractions in [0, 1] unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Max weight of one candidate in total equity
    #[serde(default = "default_max_concentration")]
    pub max_concentration: Decimal,
    /// Pairwise trailing-return correlation ceiling (-1..=1)
    #[serde(default = "default_max_correlation")]
    pub max_correlation: f64,
    /// Max one-period portfolio VaR as a fraction of portfolio value
    #[serde(default = "default_max_portfolio_var")]
    pub max_portfolio_var: f64,
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    /// Overlapping observations needed before a correlation is trusted
    #[serde(default = "default_min_correlation_samples")]
    pub min_correlation_samples: usize,
    /// Below this many observations VaR is estimated parametrically
    #[serde(default = "default_min_historical_var_samples")]
    pub min_historical_var_samples: usize,
    /// Spacing of polled prices kept as return observations, in seconds
    #[serde(default = "default_returns_sample_secs")]
    pub returns_sample_secs: u64,
    /// Return observations kept per symbol
    #[serde(default = "default_returns_window")]
    pub returns_window: usize,
}

fn default_max_concentration() -> Decimal {
    dec!(0.10)
}

fn default_max_correlation() -> f64 {
    0.70
}

fn default_max_portfolio_var() -> f64 {
    0.05
}

fn default_var_confidence() -> f64 {
    0.95
}

fn default_min_correlation_samples() -> usize {
    20
}

fn default_min_historical_var_samples() -> usize {
    100
}

fn default_returns_sample_secs() -> u64 {
    300
}

fn default_returns_window() -> usize {
    250
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            max_concentration: default_max_concentration(),
            max_correlation: default_max_correlation(),
            max_portfolio_var: default_max_portfolio_var(),
            var_confidence: default_var_confidence(),
            min_correlation_samples: default_min_correlation_samples(),
            min_historical_var_samples: default_min_historical_var_samples(),
            returns_sample_secs: default_returns_sample_secs(),
            returns_window: default_returns_window(),
        }
    }
}

impl RiskProfile {
    pub fn returns_sample_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.returns_sample_secs as i64)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_concentration <= Decimal::ZERO || self.max_concentration > Decimal::ONE {
            errors.push(format!(
                "risk.max_concentration must be in (0, 1], got {}",
                self.max_concentration
            ));
        }
        if !(-1.0..=1.0).contains(&self.max_correlation) {
            errors.push(format!(
                "risk.max_correlation must be in [-1, 1], got {}",
                self.max_correlation
            ));
        }
        if !(0.0..=1.0).contains(&self.max_portfolio_var) {
            errors.push(format!(
                "risk.max_portfolio_var must be in [0, 1], got {}",
                self.max_portfolio_var
            ));
        }
        if !(self.var_confidence > 0.5 && self.var_confidence < 1.0) {
            errors.push(format!(
                "risk.var_confidence must be in (0.5, 1), got {}",
                self.var_confidence
            ));
        }
        if self.min_correlation_samples < 2 {
            errors.push("risk.min_correlation_samples must be at least 2".to_string());
        }
        if self.returns_window < self.min_correlation_samples {
            errors.push(format!(
                "risk.returns_window ({}) must hold at least min_correlation_samples ({})",
                self.returns_window, self.min_correlation_samples
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Why a candidate was rejected. Each variant has a stable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InsufficientCapital {
        requested: Decimal,
        available: Decimal,
    },
    ConcentrationLimit {
        weight: Decimal,
        limit: Decimal,
    },
    CorrelationLimit {
        symbol: String,
        held: String,
        correlation: f64,
        limit: f64,
    },
    PortfolioVarLimit {
        var: f64,
        limit: f64,
    },
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InsufficientCapital { .. } => "INSUFFICIENT_CAPITAL",
            RejectReason::ConcentrationLimit { .. } => "CONCENTRATION_LIMIT",
            RejectReason::CorrelationLimit { .. } => "CORRELATION_LIMIT",
            RejectReason::PortfolioVarLimit { .. } => "PORTFOLIO_VAR_LIMIT",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::InsufficientCapital {
                requested,
                available,
            } => {
                write!(
                    f,
                    "[{}] requested {} exceeds available {}",
                    self.code(),
                    requested,
                    available
                )
            }
            RejectReason::ConcentrationLimit { weight, limit } => {
                write!(
                    f,
                    "[{}] weight {:.4} exceeds limit {}",
                    self.code(),
                    weight,
                    limit
                )
            }
            RejectReason::CorrelationLimit {
                symbol,
                held,
                correlation,
                limit,
            } => {
                write!(
                    f,
                    "[{}] {} vs {} correlation {:.3} exceeds {:.3}",
                    self.code(),
                    symbol,
                    held,
                    correlation,
                    limit
                )
            }
            RejectReason::PortfolioVarLimit { var, limit } => {
                write!(
                    f,
                    "[{}] portfolio VaR {:.4} exceeds {:.4}",
                    self.code(),
                    var,
                    limit
                )
            }
        }
    }
}
