use rust_decimal::Decimal;
use thiserror::Error;

use crate::risk::RejectReason;

/// Main error type for the deployment engine
#[derive(Error, Debug)]
pub enum DeployError {
    // Capital errors
    #[error("Insufficient capital: requested {requested}, available {available}")]
    InsufficientCapital {
        requested: Decimal,
        available: Decimal,
    },

    // Risk management errors
    #[error("Risk limit exceeded: {0}")]
    RiskLimitExceeded(RejectReason),

    // Order execution errors
    #[error("Execution failed for {symbol} after {attempts} attempts: {reason}")]
    ExecutionFailure {
        symbol: String,
        attempts: u32,
        reason: String,
    },

    // Market data errors
    #[error("Price feed unavailable for {symbol}: {reason}")]
    FeedUnavailable { symbol: String, reason: String },

    // Ledger/registry consistency errors. Always fatal.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Position conflict: {0}")]
    PositionConflict(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DeployError {
    /// Fatal errors halt the tick loop and need manual reconciliation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeployError::InvariantViolation(_))
    }

    /// Errors worth another attempt under the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeployError::ExecutionFailure { .. }
                | DeployError::FeedUnavailable { .. }
                | DeployError::Timeout(_)
                | DeployError::Http(_)
        )
    }

    /// Soft rejections are normal outcomes: the candidate is dropped, nothing changes.
    pub fn is_soft_rejection(&self) -> bool {
        matches!(
            self,
            DeployError::InsufficientCapital { .. } | DeployError::RiskLimitExceeded(_)
        )
    }
}

/// Result type alias for DeployError
pub type Result<T> = std::result::Result<T, DeployError>;

/// Ledger-local failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient capital: requested {requested}, available {available}")]
    InsufficientCapital {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Reservation #{seq} is not outstanding (already committed or cancelled)")]
    ReservationConsumed { seq: u64 },

    #[error("Negative balance: {field} would become {value}")]
    NegativeBalance { field: &'static str, value: Decimal },

    #[error("Deployable cap breached: allocated {allocated} + reserved {reserved} > deployable {deployable}")]
    DeployableCapBreached {
        allocated: Decimal,
        reserved: Decimal,
        deployable: Decimal,
    },

    #[error("Reserved total {reserved} does not match outstanding reservations {outstanding}")]
    ReservedMismatch {
        reserved: Decimal,
        outstanding: Decimal,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
}

impl LedgerError {
    /// Everything except a plain capital shortfall means the books are wrong.
    pub fn is_invariant_violation(&self) -> bool {
        !matches!(
            self,
            LedgerError::InsufficientCapital { .. } | LedgerError::InvalidAmount(_)
        )
    }
}

impl From<LedgerError> for DeployError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCapital {
                requested,
                available,
            } => DeployError::InsufficientCapital {
                requested,
                available,
            },
            LedgerError::InvalidAmount(amount) => {
                DeployError::Validation(format!("invalid ledger amount {}", amount))
            }
            other => DeployError::InvariantViolation(other.to_string()),
        }
    }
}

impl From<RejectReason> for DeployError {
    fn from(reason: RejectReason) -> Self {
        DeployError::RiskLimitExceeded(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ledger_shortfall_maps_to_soft_error() {
        let err: DeployError = LedgerError::InsufficientCapital {
            requested: dec!(35000),
            available: dec!(0),
        }
        .into();
        assert!(err.is_soft_rejection());
        assert!(!err.is_fatal());
    }

    #[test]
    fn consumed_reservation_is_fatal() {
        let err: DeployError = LedgerError::ReservationConsumed { seq: 7 }.into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("#7"));
    }

    #[test]
    fn retryable_classification() {
        let feed = DeployError::FeedUnavailable {
            symbol: "NIFTYBEES".into(),
            reason: "timeout".into(),
        };
        assert!(feed.is_retryable());
        assert!(!DeployError::Validation("x".into()).is_retryable());
    }
}
