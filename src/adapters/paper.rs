//! Paper trading adapters
//!
//! `StaticPriceFeed` serves prices set by hand, `RandomWalkFeed` drifts
//! prices randomly around a start level, and `PaperGateway` fills every
//! order immediately at the current feed price.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{OrderAck, OrderRequest, OrderSide};
use crate::error::{DeployError, Result};
use crate::gateway::{ExecutionGateway, PriceFeed};

/// Prices set explicitly
#[derive(Debug, Default)]
pub struct StaticPriceFeed {
    prices: RwLock<HashMap<String, Decimal>>,
    closes: RwLock<HashMap<String, Decimal>>,
    offline: RwLock<HashSet<String>>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn set_previous_close(&self, symbol: &str, close: Decimal) {
        self.closes.write().await.insert(symbol.to_string(), close);
    }

    /// Simulate an outage for one symbol.
    pub async fn set_offline(&self, symbol: &str, offline: bool) {
        let mut set = self.offline.write().await;
        if offline {
            set.insert(symbol.to_string());
        } else {
            set.remove(symbol);
        }
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn get_last_price(&self, symbol: &str) -> Result<Decimal> {
        if self.offline.read().await.contains(symbol) {
            return Err(DeployError::FeedUnavailable {
                symbol: symbol.to_string(),
                reason: "offline".to_string(),
            });
        }
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| DeployError::FeedUnavailable {
                symbol: symbol.to_string(),
                reason: "no price".to_string(),
            })
    }

    async fn previous_close(&self, symbol: &str) -> Result<Decimal> {
        self.closes
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| DeployError::FeedUnavailable {
                symbol: symbol.to_string(),
                reason: "no previous close".to_string(),
            })
    }
}

/// Random walk around a start price per symbol
pub struct RandomWalkFeed {
    state: Mutex<WalkState>,
    /// Max relative move per poll (e.g., 0.004 = 0.4%)
    step: f64,
}

struct WalkState {
    rng: StdRng,
    prices: HashMap<String, Decimal>,
    closes: HashMap<String, Decimal>,
}

impl RandomWalkFeed {
    pub fn new(start_prices: HashMap<String, Decimal>, step: f64) -> Self {
        Self::with_rng(start_prices, step, StdRng::from_entropy())
    }

    /// Deterministic walk for reproducible runs
    pub fn seeded(start_prices: HashMap<String, Decimal>, step: f64, seed: u64) -> Self {
        Self::with_rng(start_prices, step, StdRng::seed_from_u64(seed))
    }

    fn with_rng(start_prices: HashMap<String, Decimal>, step: f64, rng: StdRng) -> Self {
        Self {
            state: Mutex::new(WalkState {
                rng,
                closes: start_prices.clone(),
                prices: start_prices,
            }),
            step: step.abs(),
        }
    }
}

#[async_trait]
impl PriceFeed for RandomWalkFeed {
    fn name(&self) -> &str {
        "random-walk"
    }

    async fn get_last_price(&self, symbol: &str) -> Result<Decimal> {
        let mut state = self.state.lock().await;
        let move_pct = if self.step > 0.0 {
            state.rng.gen_range(-self.step..=self.step)
        } else {
            0.0
        };
        let factor = Decimal::from_f64(1.0 + move_pct).unwrap_or(Decimal::ONE);

        let price = state
            .prices
            .get_mut(symbol)
            .ok_or_else(|| DeployError::FeedUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            })?;
        *price = (*price * factor).round_dp(2).max(Decimal::new(1, 2));
        Ok(*price)
    }

    async fn previous_close(&self, symbol: &str) -> Result<Decimal> {
        self.state
            .lock()
            .await
            .closes
            .get(symbol)
            .copied()
            .ok_or_else(|| DeployError::FeedUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            })
    }
}

/// Fills every order immediately at the feed price
pub struct PaperGateway {
    feed: Arc<dyn PriceFeed>,
    margin: bool,
    orders: RwLock<Vec<(OrderRequest, OrderAck)>>,
    cancelled: RwLock<Vec<String>>,
}

impl PaperGateway {
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            feed,
            margin: false,
            orders: RwLock::new(Vec::new()),
            cancelled: RwLock::new(Vec::new()),
        }
    }

    /// Report margin as available for every symbol.
    pub fn with_margin(mut self, margin: bool) -> Self {
        self.margin = margin;
        self
    }

    pub async fn orders(&self) -> Vec<(OrderRequest, OrderAck)> {
        self.orders.read().await.clone()
    }

    pub async fn cancelled(&self) -> Vec<String> {
        self.cancelled.read().await.clone()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    fn name(&self) -> &str {
        "paper"
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        let price = self.feed.get_last_price(&request.symbol).await?;
        let ack = OrderAck {
            order_id: format!("paper-{}", Uuid::new_v4()),
            filled_quantity: request.quantity,
            avg_price: price,
            timestamp: Utc::now(),
        };
        let action = match request.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        info!(
            symbol = %request.symbol,
            quantity = request.quantity,
            %price,
            kind = %request.kind,
            "[PAPER] {} filled",
            action
        );
        self.orders.write().await.push((request.clone(), ack.clone()));
        Ok(ack)
    }

    async fn margin_available(&self, _symbol: &str) -> Result<bool> {
        Ok(self.margin)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        debug!(order_id, "[PAPER] cancel");
        self.cancelled.write().await.push(order_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderKind;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn static_feed_serves_and_fails() {
        let feed = StaticPriceFeed::new();
        feed.set_price("NIFTYBEES", dec!(250)).await;
        assert_eq!(feed.get_last_price("NIFTYBEES").await.unwrap(), dec!(250));
        assert!(feed.get_last_price("GOLDBEES").await.is_err());

        feed.set_offline("NIFTYBEES", true).await;
        assert!(feed.get_last_price("NIFTYBEES").await.is_err());
    }

    #[tokio::test]
    async fn random_walk_stays_within_step() {
        let mut start = HashMap::new();
        start.insert("NIFTYBEES".to_string(), dec!(250));
        let feed = RandomWalkFeed::seeded(start, 0.01, 7);

        let mut last = dec!(250);
        for _ in 0..50 {
            let p = feed.get_last_price("NIFTYBEES").await.unwrap();
            let change = ((p - last) / last).abs();
            assert!(change <= dec!(0.0101), "moved {}", change);
            last = p;
        }
        assert_eq!(feed.previous_close("NIFTYBEES").await.unwrap(), dec!(250));
    }

    #[tokio::test]
    async fn paper_gateway_fills_at_feed_price() {
        let feed = Arc::new(StaticPriceFeed::new());
        feed.set_price("GOLDBEES", dec!(52.25)).await;
        let gw = PaperGateway::new(feed.clone()).with_margin(true);

        assert!(gw.margin_available("GOLDBEES").await.unwrap());
        let req = OrderRequest::buy("GOLDBEES", 100, OrderKind::Margin, dec!(52.00));
        let ack = gw.place_order(&req).await.unwrap();
        assert_eq!(ack.avg_price, dec!(52.25));
        assert_eq!(ack.filled_quantity, 100);
        assert_eq!(gw.orders().await.len(), 1);
    }
}
