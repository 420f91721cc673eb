use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::gateway::{ExecutionGateway, PriceFeed};
use crate::ledger::CapitalLedger;
use crate::notify::{LogNotifier, Notifier};
use crate::persistence::{EngineSnapshot, SnapshotStore};
use crate::reconcile::{reconcile, ReconciliationReport};
use crate::registry::PositionRegistry;
use crate::risk::{InMemoryReturns, ReturnsSource};

/// Everything the engine needs, built once at startup and passed in.
///
/// Nothing in the crate reads global state; components receive their
/// collaborators from here.
pub struct EngineContext {
    pub config: AppConfig,
    pub ledger: Arc<CapitalLedger>,
    pub registry: Arc<RwLock<PositionRegistry>>,
    pub feed: Arc<dyn PriceFeed>,
    pub gateway: Arc<dyn ExecutionGateway>,
    pub returns: Arc<dyn ReturnsSource>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Option<Arc<dyn SnapshotStore>>,
}

impl EngineContext {
    pub fn new(
        config: AppConfig,
        feed: Arc<dyn PriceFeed>,
        gateway: Arc<dyn ExecutionGateway>,
    ) -> Self {
        let ledger = Arc::new(CapitalLedger::new(&config.capital));
        let returns = Arc::new(InMemoryReturns::with_capacity_limit(config.risk.returns_window));
        Self {
            config,
            ledger,
            registry: Arc::new(RwLock::new(PositionRegistry::new())),
            feed,
            gateway,
            returns,
            notifier: Arc::new(LogNotifier),
            store: None,
        }
    }

    pub fn with_returns(mut self, returns: Arc<dyn ReturnsSource>) -> Self {
        self.returns = returns;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replay the last snapshot, if any, and settle what a crash left in flight.
    ///
    /// The reconciled state is written back immediately so a second crash
    /// cannot replay the same orphans.
    pub async fn recover(&self) -> Result<Option<ReconciliationReport>> {
        let Some(store) = &self.store else {
            debug!("No snapshot store configured, starting fresh");
            return Ok(None);
        };
        let Some(snapshot) = store.load().await? else {
            info!("No snapshot to recover, starting fresh");
            return Ok(None);
        };

        let mut registry = self.registry.write().await;
        let report = reconcile(snapshot, &self.ledger, &mut registry).await?;
        if !report.is_clean() {
            warn!(
                failed = ?report.failed_pending,
                reverted = ?report.reverted_closing,
                "Recovered in-flight work from previous run"
            );
        }
        let fresh = EngineSnapshot::new(self.ledger.snapshot().await, registry.snapshot());
        store.save(&fresh).await?;
        Ok(Some(report))
    }

    /// Refresh equity from the broker when the gateway reports it.
    pub async fn sync_equity(&self) -> Result<bool> {
        match self.gateway.account_equity().await {
            Ok(equity) => {
                self.ledger.sync_equity(equity).await?;
                Ok(true)
            }
            Err(e) => {
                debug!(gateway = self.gateway.name(), error = %e, "Equity sync skipped");
                Ok(false)
            }
        }
    }
}
