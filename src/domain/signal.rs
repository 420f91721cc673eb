use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of signal emitted by the per-symbol state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Entry,
    Exit,
    Alert,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Entry => write!(f, "ENTRY"),
            SignalKind::Exit => write!(f, "EXIT"),
            SignalKind::Alert => write!(f, "ALERT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Medium,
    High,
    Critical,
}

/// Transient signal event. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub kind: SignalKind,
    /// Price the condition is measured against (reference close or entry price)
    pub reference_price: Decimal,
    /// Observed price that fired the condition
    pub trigger_price: Decimal,
    pub urgency: Urgency,
    pub reason: String,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    /// Dip entry. Urgency is high once the drop reaches twice the threshold.
    pub fn entry(
        symbol: &str,
        reference_close: Decimal,
        price: Decimal,
        dip_threshold: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        let drop = if reference_close.is_zero() {
            Decimal::ZERO
        } else {
            (reference_close - price) / reference_close
        };
        let urgency = if drop >= dip_threshold * Decimal::TWO {
            Urgency::High
        } else {
            Urgency::Medium
        };
        Self {
            symbol: symbol.to_string(),
            kind: SignalKind::Entry,
            reference_price: reference_close,
            trigger_price: price,
            urgency,
            reason: format!(
                "{} down {:.2}% from previous close {}",
                symbol,
                drop * Decimal::ONE_HUNDRED,
                reference_close
            ),
            generated_at: now,
        }
    }

    /// Take-profit (or hard stop) exit
    pub fn exit(symbol: &str, entry_price: Decimal, price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: SignalKind::Exit,
            reference_price: entry_price,
            trigger_price: price,
            urgency: Urgency::High,
            reason: format!(
                "{} at {} ({:+.2}% from entry {})",
                symbol,
                price,
                pct_change(entry_price, price),
                entry_price
            ),
            generated_at: now,
        }
    }

    /// Loss alert while holding. Does not close the position.
    pub fn alert(symbol: &str, entry_price: Decimal, price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind: SignalKind::Alert,
            reference_price: entry_price,
            trigger_price: price,
            urgency: Urgency::Critical,
            reason: format!(
                "{} loss alert: {} is {:+.2}% from entry {}",
                symbol,
                price,
                pct_change(entry_price, price),
                entry_price
            ),
            generated_at: now,
        }
    }
}

fn pct_change(from: Decimal, to: Decimal) -> Decimal {
    if from.is_zero() {
        return Decimal::ZERO;
    }
    (to - from) / from * Decimal::ONE_HUNDRED
}
