use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Source of trailing per-period returns, oldest first.
#[async_trait]
pub trait ReturnsSource: Send + Sync {
    /// `None` when no history exists for the symbol.
    async fn trailing_returns(&self, symbol: &str) -> Option<Vec<f64>>;

    /// Observe a sampled price. Sources backed by external history ignore it.
    async fn record_price(&self, _symbol: &str, _price: Decimal) {}
}

/// Returns history held in memory, fed from closes or preloaded series
#[derive(Debug, Default)]
pub struct InMemoryReturns {
    series: RwLock<HashMap<String, Vec<f64>>>,
    last_close: RwLock<HashMap<String, Decimal>>,
    max_len: Option<usize>,
}

impl InMemoryReturns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_len` observations per symbol.
    pub fn with_capacity_limit(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    pub async fn set_returns(&self, symbol: &str, returns: Vec<f64>) {
        let mut series = self.series.write().await;
        series.insert(symbol.to_string(), self.trim(returns));
    }

    /// Load a close-price history, converting it to simple returns.
    pub async fn set_closes(&self, symbol: &str, closes: &[Decimal]) {
        let returns = simple_returns(closes);
        if let Some(last) = closes.last() {
            self.last_close
                .write()
                .await
                .insert(symbol.to_string(), *last);
        }
        self.set_returns(symbol, returns).await;
    }

    /// Append one period close.
    pub async fn record_close(&self, symbol: &str, close: Decimal) {
        let previous = self
            .last_close
            .write()
            .await
            .insert(symbol.to_string(), close);

        let Some(previous) = previous else {
            return;
        };
        let Some(r) = period_return(previous, close) else {
            return;
        };

        let mut series = self.series.write().await;
        let entry = series.entry(symbol.to_string()).or_default();
        entry.push(r);
        if let Some(max) = self.max_len {
            if entry.len() > max {
                let excess = entry.len() - max;
                entry.drain(..excess);
            }
        }
    }

    fn trim(&self, mut returns: Vec<f64>) -> Vec<f64> {
        if let Some(max) = self.max_len {
            if returns.len() > max {
                returns.drain(..returns.len() - max);
            }
        }
        returns
    }
}

#[async_trait]
impl ReturnsSource for InMemoryReturns {
    async fn trailing_returns(&self, symbol: &str) -> Option<Vec<f64>> {
        self.series
            .read()
            .await
            .get(symbol)
            .filter(|s| !s.is_empty())
            .cloned()
    }

    async fn record_price(&self, symbol: &str, price: Decimal) {
        self.record_close(symbol, price).await;
    }
}

fn period_return(previous: Decimal, close: Decimal) -> Option<f64> {
    if previous.is_zero() {
        return None;
    }
    ((close - previous) / previous).to_f64()
}

/// Simple returns of a close series
pub fn simple_returns(closes: &[Decimal]) -> Vec<f64> {
    closes
        .windows(2)
        .filter_map(|w| period_return(w[0], w[1]))
        .collect()
}
