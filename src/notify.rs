//! Engine events and the notifier seam.
//!
//! Delivery is fire-and-forget: the engine spawns each notification and
//! never waits on it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::{Position, Signal};
use crate::risk::RejectReason;

/// Structured events surfaced to the notifier
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Signal(Signal),
    Rejected {
        symbol: String,
        amount: Decimal,
        code: String,
        reason: String,
    },
    ExecutionFailed {
        symbol: String,
        attempts: u32,
        reason: String,
    },
    FeedUnavailable {
        symbol: String,
        reason: String,
    },
    PositionOpened(Position),
    PositionClosed(Position),
    Fatal {
        error: String,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn rejected(symbol: &str, amount: Decimal, reason: &RejectReason) -> Self {
        EngineEvent::Rejected {
            symbol: symbol.to_string(),
            amount,
            code: reason.code().to_string(),
            reason: reason.to_string(),
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        match self {
            EngineEvent::Signal(s) => format!(
                "{} {} @ {} [{:?}] {}",
                s.kind, s.symbol, s.trigger_price, s.urgency, s.reason
            ),
            EngineEvent::Rejected {
                symbol,
                amount,
                reason,
                ..
            } => format!("REJECTED {} ({}): {}", symbol, amount, reason),
            EngineEvent::ExecutionFailed {
                symbol,
                attempts,
                reason,
            } => format!("EXECUTION FAILED {} after {} attempts: {}", symbol, attempts, reason),
            EngineEvent::FeedUnavailable { symbol, reason } => {
                format!("FEED UNAVAILABLE {}: {}", symbol, reason)
            }
            EngineEvent::PositionOpened(p) => format!(
                "OPENED {} {} @ {} (target {}, stop {}, {})",
                p.symbol, p.quantity, p.entry_price, p.target_price, p.stop_price, p.order_kind
            ),
            EngineEvent::PositionClosed(p) => format!(
                "CLOSED {} {} @ {} pnl {}",
                p.symbol,
                p.quantity,
                p.exit_price.unwrap_or_default(),
                p.realized_pnl.unwrap_or_default()
            ),
            EngineEvent::Fatal { error, .. } => format!("FATAL: {}", error),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &EngineEvent);
}

/// Writes every event to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Fatal { .. } => error!(target: "dipdeploy::events", "{}", event.summary()),
            EngineEvent::ExecutionFailed { .. }
            | EngineEvent::Rejected { .. }
            | EngineEvent::FeedUnavailable { .. } => {
                warn!(target: "dipdeploy::events", "{}", event.summary())
            }
            _ => info!(target: "dipdeploy::events", "{}", event.summary()),
        }
    }
}

/// Fans one event out to several notifiers
#[derive(Default, Clone)]
pub struct CompositeNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify(&self, event: &EngineEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event).await;
        }
    }
}

/// Callback invoked synchronously for every ENTRY/EXIT/ALERT signal
pub type SignalCallback = Arc<dyn Fn(&Signal) + Send + Sync>;
