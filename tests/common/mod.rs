#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use dipdeploy::adapters::StaticPriceFeed;
use dipdeploy::config::AppConfig;
use dipdeploy::domain::{OrderAck, OrderRequest, Signal, SignalKind};
use dipdeploy::engine::{EngineContext, SignalEngine};
use dipdeploy::error::{DeployError, Result};
use dipdeploy::gateway::{ExecutionGateway, PriceFeed};
use dipdeploy::ledger::CapitalLedger;
use dipdeploy::notify::{EngineEvent, Notifier};
use dipdeploy::persistence::{MemorySnapshotStore, SnapshotStore};
use dipdeploy::registry::PositionRegistry;
use dipdeploy::risk::InMemoryReturns;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// Paper config with fast retries
pub fn test_config(symbols: &[&str]) -> AppConfig {
    let mut config = AppConfig::paper_defaults(
        dec!(1000000),
        symbols.iter().map(|s| s.to_string()).collect(),
    );
    config.execution.backoff_base_ms = 1;
    config.execution.timeout_ms = 500;
    config
}

/// Gateway whose fills and failures are scripted per test
pub struct ScriptedGateway {
    feed: Arc<dyn PriceFeed>,
    margin: AtomicBool,
    margin_errors: AtomicBool,
    fail_next: AtomicU32,
    fail_always: AtomicBool,
    reject_always: AtomicBool,
    zero_fill: AtomicBool,
    attempts: AtomicU32,
    orders: Mutex<Vec<(OrderRequest, OrderAck)>>,
    cancels: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            feed,
            margin: AtomicBool::new(false),
            margin_errors: AtomicBool::new(false),
            fail_next: AtomicU32::new(0),
            fail_always: AtomicBool::new(false),
            reject_always: AtomicBool::new(false),
            zero_fill: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            orders: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        }
    }

    pub fn set_margin(&self, margin: bool) {
        self.margin.store(margin, Ordering::SeqCst);
    }

    pub fn set_margin_errors(&self, errors: bool) {
        self.margin_errors.store(errors, Ordering::SeqCst);
    }

    /// Fail the next `n` placement attempts.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Refuse every order with a permanent validation error.
    pub fn set_reject_always(&self, reject: bool) {
        self.reject_always.store(reject, Ordering::SeqCst);
    }

    pub fn set_zero_fill(&self, zero: bool) {
        self.zero_fill.store(zero, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn orders(&self) -> Vec<(OrderRequest, OrderAck)> {
        self.orders.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderAck> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject_always.load(Ordering::SeqCst) {
            return Err(DeployError::Validation(format!(
                "{} quantity {} is not a valid lot",
                request.symbol, request.quantity
            )));
        }
        let scripted_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.fail_always.load(Ordering::SeqCst) {
            return Err(DeployError::ExecutionFailure {
                symbol: request.symbol.clone(),
                attempts: 1,
                reason: "venue rejected".to_string(),
            });
        }

        let price = self.feed.get_last_price(&request.symbol).await?;
        let filled_quantity = if self.zero_fill.load(Ordering::SeqCst) {
            0
        } else {
            request.quantity
        };
        let ack = OrderAck {
            order_id: format!("scripted-{}", request.client_order_id),
            filled_quantity,
            avg_price: price,
            timestamp: Utc::now(),
        };
        self.orders
            .lock()
            .unwrap()
            .push((request.clone(), ack.clone()));
        Ok(ack)
    }

    async fn margin_available(&self, symbol: &str) -> Result<bool> {
        if self.margin_errors.load(Ordering::SeqCst) {
            return Err(DeployError::Internal(format!("margin lookup failed for {}", symbol)));
        }
        Ok(self.margin.load(Ordering::SeqCst))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.cancels.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

/// Notifier that keeps every event, optionally after a delivery delay
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<EngineEvent>>,
    delay_ms: AtomicU32,
}

impl RecordingNotifier {
    /// Simulate a slow webhook.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn rejection_codes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Rejected { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &EngineEvent) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.events.lock().unwrap().push(event.clone());
    }
}

pub struct Harness {
    pub engine: SignalEngine,
    pub feed: Arc<StaticPriceFeed>,
    pub gateway: Arc<ScriptedGateway>,
    pub ledger: Arc<CapitalLedger>,
    pub registry: Arc<RwLock<PositionRegistry>>,
    pub returns: Arc<InMemoryReturns>,
    pub events: Arc<RecordingNotifier>,
    pub signals: Arc<Mutex<Vec<Signal>>>,
}

impl Harness {
    /// Engine over `config.engine.symbols`, each with a previous close of `close`.
    pub async fn new(
        config: AppConfig,
        close: Decimal,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let feed = Arc::new(StaticPriceFeed::new());
        for symbol in &config.engine.symbols {
            feed.set_previous_close(symbol, close).await;
            feed.set_price(symbol, close).await;
        }
        let gateway = Arc::new(ScriptedGateway::new(feed.clone()));
        let returns = Arc::new(InMemoryReturns::new());
        let events = Arc::new(RecordingNotifier::default());

        let mut ctx = EngineContext::new(config, feed.clone(), gateway.clone())
            .with_returns(returns.clone())
            .with_notifier(events.clone());
        if let Some(store) = store {
            ctx = ctx.with_snapshot_store(store);
        }
        ctx.recover().await.expect("recovery");
        let ledger = ctx.ledger.clone();
        let registry = ctx.registry.clone();

        let engine = SignalEngine::new(ctx).await;
        let signals = Arc::new(Mutex::new(Vec::new()));
        let sink = signals.clone();
        engine.on_signal(move |s: &Signal| sink.lock().unwrap().push(s.clone()));

        Self {
            engine,
            feed,
            gateway,
            ledger,
            registry,
            returns,
            events,
            signals,
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.feed.set_price(symbol, price).await;
    }

    pub fn signal_count(&self, kind: SignalKind) -> usize {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Let spawned notifications land.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Share a memory store with the engine while the test keeps a handle.
pub fn shared(store: &Arc<MemorySnapshotStore>) -> Option<Arc<dyn SnapshotStore>> {
    let store: Arc<dyn SnapshotStore> = store.clone();
    Some(store)
}
