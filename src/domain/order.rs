use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Funding mode of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    /// Margin-backed (broker funds part of the position)
    Margin,
    /// Fully funded from cash
    Cash,
}

impl OrderKind {
    /// Prefer margin when the gateway offers it, otherwise pay in full.
    pub fn select(margin_available: bool) -> Self {
        if margin_available {
            OrderKind::Margin
        } else {
            OrderKind::Cash
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Margin => write!(f, "MARGIN"),
            OrderKind::Cash => write!(f, "CASH"),
        }
    }
}

/// Order request (what we want to do)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub kind: OrderKind,
    /// Price observed when the order was decided (market orders carry no limit)
    pub reference_price: Decimal,
}

impl OrderRequest {
    pub fn buy(symbol: &str, quantity: u64, kind: OrderKind, reference_price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity,
            kind,
            reference_price,
        }
    }

    pub fn sell(symbol: &str, quantity: u64, kind: OrderKind, reference_price: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            quantity,
            kind,
            reference_price,
        }
    }

    /// Notional at the reference price
    pub fn notional(&self) -> Decimal {
        self.reference_price * Decimal::from(self.quantity)
    }
}

/// Execution acknowledgment from the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub filled_quantity: u64,
    pub avg_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OrderAck {
    pub fn fill_value(&self) -> Decimal {
        self.avg_price * Decimal::from(self.filled_quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_kind_selection_is_pure() {
        assert_eq!(OrderKind::select(true), OrderKind::Margin);
        assert_eq!(OrderKind::select(false), OrderKind::Cash);
        // No memory between calls
        assert_eq!(OrderKind::select(true), OrderKind::Margin);
    }

    #[test]
    fn request_notional() {
        let req = OrderRequest::buy("GOLDBEES", 40, OrderKind::Cash, dec!(52.25));
        assert_eq!(req.notional(), dec!(2090.00));
        assert_eq!(req.side, OrderSide::Buy);
    }
}
