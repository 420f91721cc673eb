use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderKind;

/// Position direction. Only longs are traded by the dip policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
}

/// Position lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    /// Approved and capital reserved, buy not yet acknowledged
    Pending,
    /// Buy acknowledged, capital allocated
    Open,
    /// Exit approved, sell in flight
    Closing,
    /// Sell acknowledged, capital released
    Closed,
    /// Buy rejected after retries, reservation cancelled
    Failed,
}

impl PositionStatus {
    pub fn can_transition_to(&self, target: PositionStatus) -> bool {
        use PositionStatus::*;
        matches!(
            (self, target),
            (Pending, Open) | (Pending, Failed) | (Open, Closing) | (Closing, Closed) | (Closing, Open)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Failed)
    }

    /// Open or closing positions hold allocated capital.
    pub fn holds_allocation(&self) -> bool {
        matches!(self, PositionStatus::Open | PositionStatus::Closing)
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Pending => write!(f, "PENDING"),
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closing => write!(f, "CLOSING"),
            PositionStatus::Closed => write!(f, "CLOSED"),
            PositionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Position record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub quantity: u64,
    /// Capital committed in the ledger for this position (reserved amount while pending)
    pub allocated_amount: Decimal,
    pub target_price: Decimal,
    pub stop_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub order_kind: OrderKind,
    /// Ledger reservation backing a pending position
    #[serde(default)]
    pub reservation_seq: Option<u64>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub exit_price: Option<Decimal>,
    #[serde(default)]
    pub realized_pnl: Option<Decimal>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// A freshly approved position whose buy has not been acknowledged yet.
    pub fn pending(
        symbol: &str,
        reference_price: Decimal,
        quantity: u64,
        reserved_amount: Decimal,
        reservation_seq: u64,
        order_kind: OrderKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: PositionSide::Long,
            entry_price: reference_price,
            quantity,
            allocated_amount: reserved_amount,
            target_price: Decimal::ZERO,
            stop_price: Decimal::ZERO,
            opened_at: Utc::now(),
            status: PositionStatus::Pending,
            order_kind,
            reservation_seq: Some(reservation_seq),
            order_id: None,
            exit_price: None,
            realized_pnl: None,
            closed_at: None,
        }
    }

    /// Current market value
    pub fn market_value(&self, price: Decimal) -> Decimal {
        price * Decimal::from(self.quantity)
    }

    /// Mark-to-market P&L before fees
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * Decimal::from(self.quantity)
    }

    /// Net P&L of a sell at `exit_price` with a fee on gross proceeds
    pub fn realized_pnl_at(&self, exit_price: Decimal, fee_rate: Decimal) -> Decimal {
        let qty = Decimal::from(self.quantity);
        let gross_pnl = (exit_price - self.entry_price) * qty;
        let fees = exit_price * qty * fee_rate;
        gross_pnl - fees
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}
