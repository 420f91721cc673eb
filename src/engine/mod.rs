//! Signal engine
//!
//! On every tick each watched symbol is priced and run through its state
//! machine. Accepted entries flow through risk gate, ledger reservation,
//! order placement and commit; accepted exits through order placement and
//! release. Symbols are evaluated concurrently, bounded by
//! `engine.max_concurrent_symbols`; ledger and registry updates for one
//! transition happen under the registry write lock.

mod context;

pub use context::EngineContext;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{EngineConfig, StrategyConfig};
use crate::domain::{
    OrderKind, OrderRequest, Position, PositionStatus, Signal, StateTransition, SymbolState,
};
use crate::error::{DeployError, LedgerError, Result};
use crate::gateway::{self, ExecutionGateway, PriceFeed, RetryPolicy};
use crate::ledger::{CapitalLedger, LedgerStatus};
use crate::notify::{EngineEvent, Notifier, SignalCallback};
use crate::persistence::{EngineSnapshot, SnapshotStore};
use crate::registry::{PerformanceStats, PositionRegistry};
use crate::risk::{RejectReason, ReturnsSource, RiskCandidate, RiskGate, RiskVerdict};
use crate::scheduler::{Ticker, TradingWindow};
use crate::shutdown::{GracefulShutdown, ShutdownPhase, ShutdownSignal};

const TRANSITION_LOG_CAPACITY: usize = 1024;
/// Upper bound on waiting for in-flight notifications at shutdown
const NOTIFY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-symbol runtime state
#[derive(Debug, Default)]
struct SymbolRuntime {
    state: SymbolState,
    reference_close: Option<Decimal>,
    last_entry_signal: Option<DateTime<Utc>>,
    last_alert_signal: Option<DateTime<Utc>>,
    last_return_sample: Option<DateTime<Utc>>,
}

/// Engine health report
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub ticks: u64,
    pub signals: u64,
    pub trades: u64,
    pub open_positions: usize,
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub ledger: LedgerStatus,
    pub performance: PerformanceStats,
    pub symbols: Vec<(String, SymbolState)>,
}

pub struct SignalEngine {
    strategy: StrategyConfig,
    engine: EngineConfig,
    retry: RetryPolicy,
    ledger: Arc<CapitalLedger>,
    registry: Arc<RwLock<PositionRegistry>>,
    gate: RiskGate,
    returns: Arc<dyn ReturnsSource>,
    returns_sample: chrono::Duration,
    window: Option<TradingWindow>,
    feed: Arc<dyn PriceFeed>,
    gateway: Arc<dyn ExecutionGateway>,
    notifier: Arc<dyn Notifier>,
    notifications: std::sync::Mutex<JoinSet<()>>,
    store: Option<Arc<dyn SnapshotStore>>,
    symbols: HashMap<String, Mutex<SymbolRuntime>>,
    order: Vec<String>,
    callbacks: std::sync::RwLock<Vec<SignalCallback>>,
    transitions: std::sync::Mutex<VecDeque<StateTransition>>,
    ticks: AtomicU64,
    signals: AtomicU64,
    trades: AtomicU64,
    halted: AtomicBool,
    halt_reason: std::sync::Mutex<Option<String>>,
    session_open: std::sync::Mutex<Option<bool>>,
}

impl SignalEngine {
    /// Build the engine from a context. Symbols with a live position in the
    /// registry start in HOLDING.
    pub async fn new(ctx: EngineContext) -> Self {
        let EngineContext {
            config,
            ledger,
            registry,
            feed,
            gateway,
            returns,
            notifier,
            store,
        } = ctx;

        let mut order: Vec<String> = config.engine.symbols.clone();
        let mut symbols: HashMap<String, Mutex<SymbolRuntime>> = HashMap::new();
        for symbol in &order {
            symbols.insert(symbol.clone(), Mutex::new(SymbolRuntime::default()));
        }

        for position in registry.read().await.snapshot() {
            if position.status != PositionStatus::Open {
                continue;
            }
            let runtime = SymbolRuntime {
                state: SymbolState::Holding,
                ..SymbolRuntime::default()
            };
            if symbols
                .insert(position.symbol.clone(), Mutex::new(runtime))
                .is_none()
            {
                info!(symbol = %position.symbol, "Watching restored position outside the symbol list");
                order.push(position.symbol.clone());
            }
        }

        Self {
            retry: RetryPolicy::from_config(&config.execution),
            gate: RiskGate::new(config.risk.clone(), returns.clone()),
            returns,
            returns_sample: config.risk.returns_sample_interval(),
            window: config.engine.trading_window.clone(),
            strategy: config.strategy,
            engine: config.engine,
            ledger,
            registry,
            feed,
            gateway,
            notifier,
            notifications: std::sync::Mutex::new(JoinSet::new()),
            store,
            symbols,
            order,
            callbacks: std::sync::RwLock::new(Vec::new()),
            transitions: std::sync::Mutex::new(VecDeque::new()),
            ticks: AtomicU64::new(0),
            signals: AtomicU64::new(0),
            trades: AtomicU64::new(0),
            halted: AtomicBool::new(false),
            halt_reason: std::sync::Mutex::new(None),
            session_open: std::sync::Mutex::new(None),
        }
    }

    /// Register a callback fired for every ENTRY/EXIT/ALERT signal.
    pub fn on_signal<F>(&self, callback: F)
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Set the dip reference (previous close) for a symbol.
    pub async fn set_reference_close(&self, symbol: &str, close: Decimal) -> Result<()> {
        let runtime = self
            .symbols
            .get(symbol)
            .ok_or_else(|| DeployError::Validation(format!("{} is not watched", symbol)))?;
        runtime.lock().await.reference_close = Some(close);
        debug!(symbol, %close, "Reference close set");
        Ok(())
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.registry.read().await.snapshot()
    }

    pub async fn symbol_state(&self, symbol: &str) -> Option<SymbolState> {
        match self.symbols.get(symbol) {
            Some(runtime) => Some(runtime.lock().await.state),
            None => None,
        }
    }

    /// Recent symbol state transitions, oldest first
    pub fn transition_log(&self) -> Vec<StateTransition> {
        self.transitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> EngineStatus {
        let (open_positions, performance) = {
            let registry = self.registry.read().await;
            (registry.active_count(), registry.stats().clone())
        };
        let mut symbols = Vec::with_capacity(self.order.len());
        for symbol in &self.order {
            if let Some(state) = self.symbol_state(symbol).await {
                symbols.push((symbol.clone(), state));
            }
        }
        let halt_reason = self
            .halt_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        EngineStatus {
            ticks: self.ticks.load(Ordering::SeqCst),
            signals: self.signals.load(Ordering::SeqCst),
            trades: self.trades.load(Ordering::SeqCst),
            open_positions,
            halted: self.is_halted(),
            halt_reason,
            ledger: self.ledger.status().await,
            performance,
            symbols,
        }
    }

    /// Drive the engine until the ticker runs out, shutdown is requested,
    /// or a fatal error halts it.
    ///
    /// Shutdown is only observed between ticks, so a tick in progress always
    /// settles its reservations before the final snapshot.
    pub async fn run<T: Ticker>(&self, mut ticker: T, shutdown: &GracefulShutdown) -> Result<()> {
        let mut token = shutdown.token();
        info!(
            symbols = self.order.len(),
            tick_ms = self.engine.tick_interval_ms,
            "Signal engine started"
        );

        let outcome = loop {
            if token.is_shutdown_requested() {
                break Ok(());
            }
            let tick = tokio::select! {
                biased;
                signal = token.wait_for_shutdown() => {
                    info!(%signal, "Stopping before next tick");
                    break Ok(());
                }
                tick = ticker.next_tick() => match tick {
                    Some(tick) => tick,
                    None => {
                        info!("Ticker exhausted");
                        break Ok(());
                    }
                },
            };

            if let Err(e) = self.tick(tick.at).await {
                if e.is_fatal() {
                    shutdown.request_shutdown(ShutdownSignal::Fatal);
                    break Err(e);
                }
                error!(tick = tick.seq, error = %e, "Tick failed");
            }
        };

        shutdown.set_phase(ShutdownPhase::Draining);
        shutdown.set_phase(ShutdownPhase::Snapshotting);
        {
            let registry = self.registry.read().await;
            self.persist(&registry).await;
        }
        self.flush_notifications(NOTIFY_DRAIN_TIMEOUT).await;
        shutdown.set_phase(ShutdownPhase::Complete);

        let status = self.status().await;
        info!(
            ticks = status.ticks,
            signals = status.signals,
            trades = status.trades,
            open_positions = status.open_positions,
            halted = status.halted,
            "Signal engine stopped"
        );
        outcome
    }

    /// Evaluate every watched symbol once. Ticks outside the trading window
    /// are skipped entirely.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        if self.is_halted() {
            return Err(DeployError::Internal("engine is halted".to_string()));
        }
        if !self.session_open(now) {
            return Ok(());
        }
        self.ticks.fetch_add(1, Ordering::SeqCst);

        let results: Vec<Result<()>> = stream::iter(self.order.iter())
            .map(|symbol| self.evaluate_symbol(symbol, now))
            .buffer_unordered(self.engine.max_concurrent_symbols.max(1))
            .collect()
            .await;

        let mut first_fatal = None;
        for result in results {
            if let Err(e) = result {
                if e.is_fatal() {
                    first_fatal.get_or_insert(e);
                } else if e.is_soft_rejection() {
                    debug!(error = %e, "Candidate dropped");
                } else {
                    error!(error = %e, "Symbol evaluation error");
                }
            }
        }
        match first_fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[instrument(skip(self, now), level = "debug")]
    async fn evaluate_symbol(&self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(runtime) = self.symbols.get(symbol) else {
            return Ok(());
        };
        let mut rt = runtime.lock().await;

        let price = match gateway::last_price(self.feed.as_ref(), symbol, &self.retry).await {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(price) => {
                warn!(symbol, %price, "Ignoring non-positive price");
                return Ok(());
            }
            Err(e) => {
                warn!(symbol, error = %e, "Price unavailable, skipping symbol this tick");
                self.publish(EngineEvent::FeedUnavailable {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        let sample_due = rt
            .last_return_sample
            .map(|last| now - last >= self.returns_sample)
            .unwrap_or(true);
        if sample_due {
            self.returns.record_price(symbol, price).await;
            rt.last_return_sample = Some(now);
        }

        let result = match rt.state {
            SymbolState::Watching => self.try_entry(symbol, &mut rt, price, now).await,
            SymbolState::Holding => self.check_exit(symbol, &mut rt, price, now).await,
            other => {
                // Every tick settles its orders, so intermediate states never persist.
                Err(DeployError::InvariantViolation(format!(
                    "{} found in {} at start of tick",
                    symbol, other
                )))
            }
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                self.halt(e);
            }
        }
        result
    }

    async fn try_entry(
        &self,
        symbol: &str,
        rt: &mut SymbolRuntime,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if rt.reference_close.is_none() {
            match self.feed.previous_close(symbol).await {
                Ok(close) => rt.reference_close = Some(close),
                Err(e) => {
                    debug!(symbol, error = %e, "No reference close yet");
                    return Ok(());
                }
            }
        }
        let Some(reference) = rt.reference_close else {
            return Ok(());
        };

        if price > self.strategy.entry_trigger(reference) {
            return Ok(());
        }
        if self.registry.read().await.has_active(symbol) {
            return Ok(());
        }
        if let Some(last) = rt.last_entry_signal {
            if now - last < self.strategy.dedup_window() {
                debug!(symbol, "Entry suppressed by dedup window");
                return Ok(());
            }
        }
        if self.is_halted() {
            return Ok(());
        }

        self.advance(symbol, rt, SymbolState::EntryCandidate, "dip below reference close")?;
        rt.last_entry_signal = Some(now);
        self.emit_signal(Signal::entry(
            symbol,
            reference,
            price,
            self.strategy.dip_threshold,
            now,
        ));

        let per_trade = self.ledger.per_trade_amount().await;
        let quantity = (per_trade / price).floor().to_u64().unwrap_or(0);
        if quantity < self.strategy.min_quantity {
            info!(symbol, %per_trade, %price, "Per-trade allocation buys less than the minimum quantity");
            self.advance(symbol, rt, SymbolState::Watching, "below minimum quantity")?;
            return Ok(());
        }

        let margin = match self.gateway.margin_available(symbol).await {
            Ok(margin) => margin,
            Err(e) => {
                debug!(symbol, error = %e, "Margin check failed, using cash");
                false
            }
        };
        let kind = OrderKind::select(margin);

        // Gate, reservation and PENDING registration form one step.
        let token = {
            let mut registry = self.registry.write().await;
            let candidate = RiskCandidate::new(symbol, per_trade);
            let ledger_status = self.ledger.status().await;
            let positions = registry.snapshot();

            if let RiskVerdict::Rejected(reason) =
                self.gate.validate(&candidate, &ledger_status, &positions).await
            {
                drop(registry);
                self.publish(EngineEvent::rejected(symbol, per_trade, &reason));
                self.advance(symbol, rt, SymbolState::Watching, reason.code())?;
                return Ok(());
            }

            let token = match self.ledger.reserve(per_trade).await {
                Ok(token) => token,
                Err(LedgerError::InsufficientCapital {
                    requested,
                    available,
                }) => {
                    drop(registry);
                    let reason = RejectReason::InsufficientCapital {
                        requested,
                        available,
                    };
                    self.publish(EngineEvent::rejected(symbol, per_trade, &reason));
                    self.advance(symbol, rt, SymbolState::Watching, reason.code())?;
                    return Ok(());
                }
                Err(e) => {
                    self.advance(symbol, rt, SymbolState::Watching, "ledger error")?;
                    return Err(e.into());
                }
            };

            let position = Position::pending(symbol, price, quantity, per_trade, token.seq(), kind);
            if let Err(e) = registry.open(position) {
                self.ledger.cancel_reservation(token).await?;
                self.advance(symbol, rt, SymbolState::Watching, "position conflict")?;
                return Err(e);
            }
            self.persist(&registry).await;
            token
        };

        self.advance(symbol, rt, SymbolState::AwaitingFill, "approved")?;
        let request = OrderRequest::buy(symbol, quantity, kind, price);
        let placed = gateway::place_order(self.gateway.as_ref(), &request, &self.retry).await;

        let ack = match placed {
            Ok(ack) if ack.filled_quantity > 0 => ack,
            Ok(ack) => {
                let _ = self.gateway.cancel_order(&ack.order_id).await;
                return self
                    .fail_entry(
                        symbol,
                        rt,
                        token,
                        1,
                        format!("order {} acknowledged with zero fill", ack.order_id),
                    )
                    .await;
            }
            Err(DeployError::ExecutionFailure {
                attempts, reason, ..
            }) => return self.fail_entry(symbol, rt, token, attempts, reason).await,
            Err(e) => return self.fail_entry(symbol, rt, token, 1, e.to_string()).await,
        };

        let fill_value = ack.fill_value();
        let opened = {
            let mut registry = self.registry.write().await;
            self.ledger.commit(token, fill_value).await?;
            let opened = registry
                .mark_open(
                    symbol,
                    ack.avg_price,
                    ack.filled_quantity,
                    fill_value,
                    self.strategy.target_price(ack.avg_price),
                    self.strategy.stop_price(ack.avg_price),
                    &ack.order_id,
                )?
                .clone();
            self.persist(&registry).await;
            opened
        };

        self.advance(symbol, rt, SymbolState::Holding, "buy acknowledged")?;
        rt.last_alert_signal = None;
        self.trades.fetch_add(1, Ordering::SeqCst);
        self.publish(EngineEvent::PositionOpened(opened));
        Ok(())
    }

    /// Execution gave up: cancel the reservation and mark the position FAILED.
    async fn fail_entry(
        &self,
        symbol: &str,
        rt: &mut SymbolRuntime,
        token: crate::ledger::ReservationToken,
        attempts: u32,
        reason: String,
    ) -> Result<()> {
        {
            let mut registry = self.registry.write().await;
            self.ledger.cancel_reservation(token).await?;
            registry.mark_failed(symbol)?;
            self.persist(&registry).await;
        }
        self.advance(symbol, rt, SymbolState::Watching, "execution failed")?;
        warn!(symbol, attempts, %reason, "Entry execution failed, reservation cancelled");
        self.publish(EngineEvent::ExecutionFailed {
            symbol: symbol.to_string(),
            attempts,
            reason,
        });
        Ok(())
    }

    async fn check_exit(
        &self,
        symbol: &str,
        rt: &mut SymbolRuntime,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let position = match self.registry.read().await.get(symbol) {
            Some(p) if p.status == PositionStatus::Open => p.clone(),
            Some(p) => {
                return Err(DeployError::InvariantViolation(format!(
                    "{} is HOLDING but its position is {}",
                    symbol, p.status
                )))
            }
            None => {
                return Err(DeployError::InvariantViolation(format!(
                    "{} is HOLDING without a position",
                    symbol
                )))
            }
        };

        let target_hit = price >= position.target_price;
        let stop_hit = price <= position.stop_price;

        if stop_hit {
            let recent = rt
                .last_alert_signal
                .map(|last| now - last < self.strategy.alert_cooldown())
                .unwrap_or(false);
            if !recent {
                rt.last_alert_signal = Some(now);
                self.emit_signal(Signal::alert(symbol, position.entry_price, price, now));
            }
        }

        let exit = target_hit || (stop_hit && self.strategy.hard_stop);
        if !exit {
            return Ok(());
        }

        let reason = if target_hit { "profit target hit" } else { "hard stop hit" };
        self.advance(symbol, rt, SymbolState::ExitCandidate, reason)?;
        self.emit_signal(Signal::exit(symbol, position.entry_price, price, now));
        {
            let mut registry = self.registry.write().await;
            registry.mark_closing(symbol)?;
            self.persist(&registry).await;
        }

        self.advance(symbol, rt, SymbolState::AwaitingExitFill, "sell sent")?;
        let request = OrderRequest::sell(symbol, position.quantity, position.order_kind, price);
        let placed = gateway::place_order(self.gateway.as_ref(), &request, &self.retry).await;

        let ack = match placed {
            Ok(ack) if ack.filled_quantity > 0 => ack,
            other => {
                let (attempts, reason) = match other {
                    Ok(ack) => (1, format!("order {} acknowledged with zero fill", ack.order_id)),
                    Err(DeployError::ExecutionFailure {
                        attempts, reason, ..
                    }) => (attempts, reason),
                    Err(e) => (1, e.to_string()),
                };
                {
                    let mut registry = self.registry.write().await;
                    registry.revert_closing(symbol)?;
                    self.persist(&registry).await;
                }
                self.advance(symbol, rt, SymbolState::Holding, "sell failed")?;
                warn!(symbol, attempts, %reason, "Exit failed, will retry next tick");
                self.publish(EngineEvent::ExecutionFailed {
                    symbol: symbol.to_string(),
                    attempts,
                    reason,
                });
                return Ok(());
            }
        };

        if ack.filled_quantity != position.quantity {
            warn!(
                symbol,
                filled = ack.filled_quantity,
                held = position.quantity,
                "Sell fill differs from held quantity, closing at acknowledged price"
            );
        }

        let exit_price = ack.avg_price;
        let realized_pnl = position.realized_pnl_at(exit_price, self.strategy.fee_rate);
        let closed = {
            let mut registry = self.registry.write().await;
            self.ledger
                .release(position.allocated_amount, realized_pnl)
                .await?;
            let closed = registry.close(symbol, exit_price, realized_pnl)?;
            self.persist(&registry).await;
            closed
        };

        self.advance(symbol, rt, SymbolState::Watching, "sell acknowledged")?;
        self.trades.fetch_add(1, Ordering::SeqCst);
        self.publish(EngineEvent::PositionClosed(closed));
        Ok(())
    }

    fn advance(
        &self,
        symbol: &str,
        rt: &mut SymbolRuntime,
        to: SymbolState,
        reason: &str,
    ) -> Result<()> {
        let from = rt.state;
        if !from.can_transition_to(to) {
            return Err(DeployError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        rt.state = to;
        debug!(symbol, %from, %to, reason, "State transition");

        let mut log = self.transitions.lock().unwrap_or_else(|e| e.into_inner());
        if log.len() >= TRANSITION_LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(StateTransition::new(symbol, from, to, reason));
        Ok(())
    }

    fn emit_signal(&self, signal: Signal) {
        self.signals.fetch_add(1, Ordering::SeqCst);
        info!(
            symbol = %signal.symbol,
            kind = %signal.kind,
            price = %signal.trigger_price,
            "Signal: {}",
            signal.reason
        );
        {
            let callbacks = self.callbacks.read().unwrap_or_else(|e| e.into_inner());
            for callback in callbacks.iter() {
                callback(&signal);
            }
        }
        self.publish(EngineEvent::Signal(signal));
    }

    /// Deliver in the background. Tasks are tracked so shutdown can wait for them.
    fn publish(&self, event: EngineEvent) {
        let notifier = self.notifier.clone();
        let mut tasks = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            notifier.notify(&event).await;
        });
    }

    /// Wait for in-flight notifications, giving up after `limit`.
    pub async fn flush_notifications(&self, limit: Duration) {
        let mut tasks = std::mem::take(
            &mut *self.notifications.lock().unwrap_or_else(|e| e.into_inner()),
        );
        if tasks.is_empty() {
            return;
        }
        let pending = tasks.len();
        let drained = tokio::time::timeout(limit, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        match drained {
            Ok(()) => debug!(pending, "Notifications delivered"),
            Err(_) => {
                warn!(
                    remaining = tasks.len(),
                    timeout_ms = limit.as_millis() as u64,
                    "Gave up waiting for notifications"
                );
                tasks.abort_all();
            }
        }
    }

    /// Whether `now` is tradable; logs session changes once.
    fn session_open(&self, now: DateTime<Utc>) -> bool {
        let Some(window) = &self.window else {
            return true;
        };
        let status = window.status(now);
        let open = status.is_open();
        let mut last = self.session_open.lock().unwrap_or_else(|e| e.into_inner());
        if *last != Some(open) {
            if open {
                info!(at = %now, "Trading session open");
            } else {
                info!(at = %now, session = %status, "Outside trading window, skipping ticks");
            }
            *last = Some(open);
        }
        open
    }

    fn halt(&self, err: &DeployError) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        error!(error = %err, "Fatal error, engine halted; manual reconciliation required");
        *self.halt_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.to_string());
        self.publish(EngineEvent::Fatal {
            error: err.to_string(),
            at: Utc::now(),
        });
    }

    /// Write a snapshot of the ledger and the given registry state.
    async fn persist(&self, registry: &PositionRegistry) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = EngineSnapshot::new(self.ledger.snapshot().await, registry.snapshot());
        if let Err(e) = store.save(&snapshot).await {
            error!(error = %e, "Failed to write snapshot");
        }
    }
}
