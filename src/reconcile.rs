//! Startup reconciliation
//!
//! Replays the last durable snapshot into the ledger and the registry and
//! settles anything a crash left in flight:
//! - PENDING positions never got an acknowledgment and become FAILED
//! - their reservations are cancelled as orphans
//! - CLOSING positions go back to OPEN so the exit is retried
//!
//! Finally the ledger's allocated capital must equal what the live
//! positions account for. Any mismatch blocks startup.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::domain::PositionStatus;
use crate::error::{DeployError, Result};
use crate::ledger::CapitalLedger;
use crate::persistence::EngineSnapshot;
use crate::registry::PositionRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub timestamp: DateTime<Utc>,
    pub snapshot_taken_at: DateTime<Utc>,
    pub restored_positions: usize,
    /// Symbols whose PENDING entry was marked FAILED
    pub failed_pending: Vec<String>,
    /// Symbols whose CLOSING exit was reverted to OPEN
    pub reverted_closing: Vec<String>,
    /// Cancelled reservations (sequence id, amount)
    pub cancelled_reservations: Vec<(u64, Decimal)>,
    pub allocated: Decimal,
    pub duration_ms: u64,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.failed_pending.is_empty()
            && self.reverted_closing.is_empty()
            && self.cancelled_reservations.is_empty()
    }
}

pub async fn reconcile(
    snapshot: EngineSnapshot,
    ledger: &CapitalLedger,
    registry: &mut PositionRegistry,
) -> Result<ReconciliationReport> {
    let start = Instant::now();
    let snapshot_taken_at = snapshot.taken_at;

    ledger.restore(&snapshot.ledger).await?;

    let mut failed_pending = Vec::new();
    let mut reverted_closing = Vec::new();
    let mut positions = snapshot.positions;
    for position in positions.iter_mut() {
        match position.status {
            PositionStatus::Pending => {
                warn!(symbol = %position.symbol, "PENDING entry without acknowledgment, marking FAILED");
                position.status = PositionStatus::Failed;
                position.reservation_seq = None;
                position.closed_at = Some(Utc::now());
                failed_pending.push(position.symbol.clone());
            }
            PositionStatus::Closing => {
                warn!(symbol = %position.symbol, "CLOSING exit without acknowledgment, reverting to OPEN");
                position.status = PositionStatus::Open;
                reverted_closing.push(position.symbol.clone());
            }
            _ => {}
        }
    }

    registry.restore(positions)?;
    let cancelled_reservations = ledger.cancel_orphaned_reservations().await;

    let status = ledger.status().await;
    let expected = registry.allocated_total();
    if status.allocated != expected {
        error!(
            ledger_allocated = %status.allocated,
            positions_allocated = %expected,
            "Ledger and registry disagree"
        );
        return Err(DeployError::InvariantViolation(format!(
            "ledger allocated {} but live positions account for {}",
            status.allocated, expected
        )));
    }
    ledger.validate_reserve_protection().await?;

    let report = ReconciliationReport {
        timestamp: Utc::now(),
        snapshot_taken_at,
        restored_positions: registry.active_count(),
        failed_pending,
        reverted_closing,
        cancelled_reservations,
        allocated: status.allocated,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        restored = report.restored_positions,
        failed = report.failed_pending.len(),
        reverted = report.reverted_closing.len(),
        cancelled = report.cancelled_reservations.len(),
        allocated = %report.allocated,
        "Reconciliation complete"
    );
    Ok(report)
}
