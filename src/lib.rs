pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod persistence;
pub mod reconcile;
pub mod registry;
pub mod risk;
pub mod scheduler;
pub mod shutdown;

pub use config::AppConfig;
pub use domain::{
    OrderAck, OrderKind, OrderRequest, OrderSide, Position, PositionStatus, Signal, SignalKind,
    StateTransition, SymbolState,
};
pub use engine::{EngineContext, EngineStatus, SignalEngine};
pub use error::{DeployError, LedgerError, Result};
pub use gateway::{ExecutionGateway, PriceFeed, RetryPolicy};
pub use ledger::{CapitalLedger, LedgerSnapshot, LedgerStatus, ReservationToken};
pub use notify::{CompositeNotifier, EngineEvent, LogNotifier, Notifier};
pub use persistence::{EngineSnapshot, FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use reconcile::{reconcile, ReconciliationReport};
pub use registry::{PerformanceStats, PositionRegistry};
pub use risk::{RejectReason, RiskCandidate, RiskGate, RiskProfile, RiskVerdict};
pub use scheduler::{IntervalTicker, ManualTicker, TickHandle, Ticker};
pub use shutdown::{GracefulShutdown, ShutdownPhase, ShutdownSignal, ShutdownToken};
