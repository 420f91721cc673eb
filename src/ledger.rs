//! Capital ledger
//!
//! Owns total equity and the deployable/reserve/per-trade buckets. Every
//! mutation goes through a single write lock, is validated against the
//! bucket invariant before it is applied, and leaves the book untouched
//! when it fails.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::CapitalConfig;
use crate::error::LedgerError;

/// Proof of a reservation. Move-only: it is consumed by exactly one of
/// `commit` or `cancel_reservation`.
#[derive(Debug)]
#[must_use = "a reservation must be committed or cancelled"]
pub struct ReservationToken {
    seq: u64,
    amount: Decimal,
}

impl ReservationToken {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Consistent read of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub equity: Decimal,
    pub deployable: Decimal,
    pub reserve: Decimal,
    pub per_trade: Decimal,
    pub allocated: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
}

/// Durable ledger state, including reservations still outstanding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub equity: Decimal,
    pub deployment_ratio: Decimal,
    pub reserve_ratio: Decimal,
    pub per_trade_ratio: Decimal,
    pub allocated: Decimal,
    pub reserved: Decimal,
    pub next_seq: u64,
    /// Outstanding reservations keyed by sequence id
    #[serde(default)]
    pub outstanding: BTreeMap<u64, Decimal>,
}

#[derive(Debug, Clone)]
struct LedgerBook {
    equity: Decimal,
    deployment_ratio: Decimal,
    reserve_ratio: Decimal,
    per_trade_ratio: Decimal,
    deployable: Decimal,
    reserve: Decimal,
    per_trade: Decimal,
    allocated: Decimal,
    reserved: Decimal,
    next_seq: u64,
    outstanding: BTreeMap<u64, Decimal>,
}

impl LedgerBook {
    fn new(config: &CapitalConfig) -> Self {
        let mut book = Self {
            equity: config.equity,
            deployment_ratio: config.deployment_ratio,
            reserve_ratio: config.reserve_ratio,
            per_trade_ratio: config.per_trade_ratio,
            deployable: Decimal::ZERO,
            reserve: Decimal::ZERO,
            per_trade: Decimal::ZERO,
            allocated: Decimal::ZERO,
            reserved: Decimal::ZERO,
            next_seq: 1,
            outstanding: BTreeMap::new(),
        };
        book.recalc();
        book
    }

    fn recalc(&mut self) {
        let (deployable, reserve, per_trade) = buckets(
            self.equity,
            self.deployment_ratio,
            self.reserve_ratio,
            self.per_trade_ratio,
        );
        self.deployable = deployable;
        self.reserve = reserve;
        self.per_trade = per_trade;
    }

    fn available(&self) -> Decimal {
        self.deployable - self.allocated - self.reserved
    }

    fn status(&self) -> LedgerStatus {
        LedgerStatus {
            equity: self.equity,
            deployable: self.deployable,
            reserve: self.reserve,
            per_trade: self.per_trade,
            allocated: self.allocated,
            reserved: self.reserved,
            available: self.available(),
        }
    }

    /// Check a prospective state against the bucket invariant.
    fn check(
        &self,
        equity: Decimal,
        allocated: Decimal,
        reserved: Decimal,
    ) -> Result<(), LedgerError> {
        if equity < Decimal::ZERO {
            return Err(LedgerError::NegativeBalance {
                field: "equity",
                value: equity,
            });
        }
        if allocated < Decimal::ZERO {
            return Err(LedgerError::NegativeBalance {
                field: "allocated",
                value: allocated,
            });
        }
        if reserved < Decimal::ZERO {
            return Err(LedgerError::NegativeBalance {
                field: "reserved",
                value: reserved,
            });
        }
        let (deployable, _, _) = buckets(
            equity,
            self.deployment_ratio,
            self.reserve_ratio,
            self.per_trade_ratio,
        );
        if allocated + reserved > deployable {
            return Err(LedgerError::DeployableCapBreached {
                allocated,
                reserved,
                deployable,
            });
        }
        Ok(())
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            equity: self.equity,
            deployment_ratio: self.deployment_ratio,
            reserve_ratio: self.reserve_ratio,
            per_trade_ratio: self.per_trade_ratio,
            allocated: self.allocated,
            reserved: self.reserved,
            next_seq: self.next_seq,
            outstanding: self.outstanding.clone(),
        }
    }
}

/// Bucket math: (deployable, reserve, per_trade). Pure function of equity and ratios.
pub fn buckets(
    equity: Decimal,
    deployment_ratio: Decimal,
    reserve_ratio: Decimal,
    per_trade_ratio: Decimal,
) -> (Decimal, Decimal, Decimal) {
    let deployable = equity * deployment_ratio;
    let reserve = equity * reserve_ratio;
    let per_trade = deployable * per_trade_ratio;
    (deployable, reserve, per_trade)
}

/// Single-writer capital ledger
#[derive(Debug)]
pub struct CapitalLedger {
    book: RwLock<LedgerBook>,
}

impl CapitalLedger {
    pub fn new(config: &CapitalConfig) -> Self {
        let book = LedgerBook::new(config);
        info!(
            equity = %book.equity,
            deployable = %book.deployable,
            reserve = %book.reserve,
            per_trade = %book.per_trade,
            "Capital ledger initialized"
        );
        Self {
            book: RwLock::new(book),
        }
    }

    /// Rebuild a ledger from a durable snapshot, re-checking the invariant.
    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Result<Self, LedgerError> {
        let mut book = LedgerBook::new(&CapitalConfig {
            equity: snapshot.equity,
            deployment_ratio: snapshot.deployment_ratio,
            reserve_ratio: snapshot.reserve_ratio,
            per_trade_ratio: snapshot.per_trade_ratio,
        });
        apply_snapshot(&mut book, snapshot)?;
        Ok(Self {
            book: RwLock::new(book),
        })
    }

    /// Replace the whole book with a snapshot.
    pub async fn restore(&self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
        let mut book = self.book.write().await;
        apply_snapshot(&mut book, snapshot)?;
        info!(
            equity = %book.equity,
            allocated = %book.allocated,
            reserved = %book.reserved,
            outstanding = book.outstanding.len(),
            "Capital ledger restored"
        );
        Ok(())
    }

    pub async fn status(&self) -> LedgerStatus {
        self.book.read().await.status()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.book.read().await.snapshot()
    }

    /// Per-trade allocation at current equity
    pub async fn per_trade_amount(&self) -> Decimal {
        self.book.read().await.per_trade
    }

    /// Recompute buckets from equity and ratios.
    pub async fn recalc(&self) {
        self.book.write().await.recalc();
    }

    /// Reserve `amount` of deployable capital.
    ///
    /// A shortfall is a normal outcome and leaves the book untouched.
    pub async fn reserve(&self, amount: Decimal) -> Result<ReservationToken, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut book = self.book.write().await;
        let available = book.available();
        if amount > available {
            debug!(%amount, %available, "Reservation rejected: insufficient capital");
            return Err(LedgerError::InsufficientCapital {
                requested: amount,
                available,
            });
        }

        let reserved = book.reserved + amount;
        let allocated = book.allocated;
        let equity = book.equity;
        book.check(equity, allocated, reserved)?;

        let seq = book.next_seq;
        book.next_seq += 1;
        book.reserved = reserved;
        book.outstanding.insert(seq, amount);
        debug!(seq, %amount, available = %book.available(), "Capital reserved");

        Ok(ReservationToken { seq, amount })
    }

    /// Convert a reservation into allocated capital at the actual fill value.
    pub async fn commit(
        &self,
        token: ReservationToken,
        actual_amount: Decimal,
    ) -> Result<(), LedgerError> {
        if actual_amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(actual_amount));
        }

        let mut book = self.book.write().await;
        if book.outstanding.get(&token.seq) != Some(&token.amount) {
            error!(seq = token.seq, "Commit of a reservation that is not outstanding");
            return Err(LedgerError::ReservationConsumed { seq: token.seq });
        }

        let reserved = book.reserved - token.amount;
        let allocated = book.allocated + actual_amount;
        let equity = book.equity;
        if let Err(e) = book.check(equity, allocated, reserved) {
            error!(seq = token.seq, %actual_amount, error = %e, "Commit rejected");
            return Err(e);
        }

        book.outstanding.remove(&token.seq);
        book.reserved = reserved;
        book.allocated = allocated;
        info!(
            seq = token.seq,
            reserved_amount = %token.amount,
            %actual_amount,
            allocated = %book.allocated,
            "Reservation committed"
        );
        Ok(())
    }

    /// Return a reservation to the available pool (execution failed before commit).
    pub async fn cancel_reservation(&self, token: ReservationToken) -> Result<(), LedgerError> {
        let mut book = self.book.write().await;
        if book.outstanding.get(&token.seq) != Some(&token.amount) {
            error!(seq = token.seq, "Cancel of a reservation that is not outstanding");
            return Err(LedgerError::ReservationConsumed { seq: token.seq });
        }

        let reserved = book.reserved - token.amount;
        let allocated = book.allocated;
        let equity = book.equity;
        book.check(equity, allocated, reserved)?;

        book.outstanding.remove(&token.seq);
        book.reserved = reserved;
        debug!(seq = token.seq, amount = %token.amount, "Reservation cancelled");
        Ok(())
    }

    /// Release capital of a closed position and book its realized P&L.
    pub async fn release(
        &self,
        allocated_amount: Decimal,
        realized_pnl: Decimal,
    ) -> Result<(), LedgerError> {
        if allocated_amount < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(allocated_amount));
        }

        let mut book = self.book.write().await;
        let allocated = book.allocated - allocated_amount;
        let equity = book.equity + realized_pnl;
        let reserved = book.reserved;
        if let Err(e) = book.check(equity, allocated, reserved) {
            error!(%allocated_amount, %realized_pnl, error = %e, "Release rejected");
            return Err(e);
        }

        book.allocated = allocated;
        book.equity = equity;
        book.recalc();
        info!(
            %allocated_amount,
            %realized_pnl,
            equity = %book.equity,
            available = %book.available(),
            "Capital released"
        );
        Ok(())
    }

    /// Replace equity from a broker balance refresh.
    pub async fn sync_equity(&self, new_equity: Decimal) -> Result<(), LedgerError> {
        let mut book = self.book.write().await;
        let allocated = book.allocated;
        let reserved = book.reserved;
        if let Err(e) = book.check(new_equity, allocated, reserved) {
            error!(%new_equity, error = %e, "Equity sync would break the deployable cap");
            return Err(e);
        }

        let previous = book.equity;
        book.equity = new_equity;
        book.recalc();
        if previous != new_equity {
            info!(%previous, equity = %new_equity, deployable = %book.deployable, "Equity synced");
        }
        Ok(())
    }

    /// Assert that committed capital never reaches into the reserve bucket.
    pub async fn validate_reserve_protection(&self) -> Result<(), LedgerError> {
        let book = self.book.read().await;
        book.check(book.equity, book.allocated, book.reserved)
    }

    /// Cancel every outstanding reservation. Used at startup, when no
    /// execution can still be in flight for them.
    pub async fn cancel_orphaned_reservations(&self) -> Vec<(u64, Decimal)> {
        let mut book = self.book.write().await;
        let orphans: Vec<(u64, Decimal)> = std::mem::take(&mut book.outstanding)
            .into_iter()
            .collect();
        let total: Decimal = orphans.iter().map(|(_, amount)| *amount).sum();
        book.reserved = (book.reserved - total).max(Decimal::ZERO);
        if !orphans.is_empty() {
            warn!(count = orphans.len(), %total, "Cancelled orphaned reservations");
        }
        orphans
    }
}

fn apply_snapshot(book: &mut LedgerBook, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
    let outstanding_total: Decimal = snapshot.outstanding.values().copied().sum();
    if outstanding_total != snapshot.reserved {
        return Err(LedgerError::ReservedMismatch {
            reserved: snapshot.reserved,
            outstanding: outstanding_total,
        });
    }

    let mut candidate = book.clone();
    candidate.equity = snapshot.equity;
    candidate.deployment_ratio = snapshot.deployment_ratio;
    candidate.reserve_ratio = snapshot.reserve_ratio;
    candidate.per_trade_ratio = snapshot.per_trade_ratio;
    candidate.allocated = snapshot.allocated;
    candidate.reserved = snapshot.reserved;
    candidate.next_seq = snapshot.next_seq.max(1);
    candidate.outstanding = snapshot.outstanding.clone();
    candidate.recalc();
    candidate.check(candidate.equity, candidate.allocated, candidate.reserved)?;

    *book = candidate;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger(equity: Decimal) -> CapitalLedger {
        CapitalLedger::new(&CapitalConfig {
            equity,
            ..CapitalConfig::default()
        })
    }

    #[tokio::test]
    async fn bucket_math() {
        let l = ledger(dec!(1000000));
        let s = l.status().await;
        assert_eq!(s.deployable, dec!(700000));
        assert_eq!(s.reserve, dec!(300000));
        assert_eq!(s.per_trade, dec!(35000));
        assert_eq!(s.available, dec!(700000));
    }

    #[tokio::test]
    async fn shortfall_has_no_side_effects() {
        let l = ledger(dec!(100000));
        let before = l.snapshot().await;
        let err = l.reserve(dec!(70001)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientCapital { .. }));
        assert!(!err.is_invariant_violation());
        assert_eq!(l.snapshot().await, before);
    }

    #[tokio::test]
    async fn reserve_commit_release_round_trip() {
        let l = ledger(dec!(1000000));
        let token = l.reserve(dec!(35000)).await.unwrap();
        assert_eq!(l.status().await.reserved, dec!(35000));

        l.commit(token, dec!(34980)).await.unwrap();
        let s = l.status().await;
        assert_eq!(s.reserved, Decimal::ZERO);
        assert_eq!(s.allocated, dec!(34980));

        l.release(dec!(34980), dec!(941.85)).await.unwrap();
        let s = l.status().await;
        assert_eq!(s.allocated, Decimal::ZERO);
        assert_eq!(s.equity, dec!(1000941.85));
        assert_eq!(s.deployable, dec!(1000941.85) * dec!(0.70));
    }

    #[tokio::test]
    async fn cancel_returns_capital() {
        let l = ledger(dec!(1000000));
        let token = l.reserve(dec!(35000)).await.unwrap();
        l.cancel_reservation(token).await.unwrap();
        let s = l.status().await;
        assert_eq!(s.reserved, Decimal::ZERO);
        assert_eq!(s.available, dec!(700000));
    }

    #[tokio::test]
    async fn commit_after_orphan_cancel_is_a_violation() {
        let l = ledger(dec!(1000000));
        let token = l.reserve(dec!(35000)).await.unwrap();
        let orphans = l.cancel_orphaned_reservations().await;
        assert_eq!(orphans, vec![(token.seq(), dec!(35000))]);

        let err = l.commit(token, dec!(35000)).await.unwrap_err();
        assert_eq!(err, LedgerError::ReservationConsumed { seq: 1 });
        assert!(err.is_invariant_violation());
        assert_eq!(l.status().await.allocated, Decimal::ZERO);
    }

    #[tokio::test]
    async fn overfill_beyond_cap_is_rejected() {
        let l = ledger(dec!(100000));
        let token = l.reserve(dec!(70000)).await.unwrap();
        let err = l.commit(token, dec!(70001)).await.unwrap_err();
        assert!(matches!(err, LedgerError::DeployableCapBreached { .. }));
        // Book untouched: reservation still outstanding
        let s = l.status().await;
        assert_eq!(s.reserved, dec!(70000));
        assert_eq!(s.allocated, Decimal::ZERO);
    }

    #[tokio::test]
    async fn sync_equity_cannot_strand_committed_capital() {
        let l = ledger(dec!(100000));
        let token = l.reserve(dec!(50000)).await.unwrap();
        l.commit(token, dec!(50000)).await.unwrap();

        assert!(l.sync_equity(dec!(50000)).await.is_err());
        assert_eq!(l.status().await.equity, dec!(100000));

        l.sync_equity(dec!(120000)).await.unwrap();
        let s = l.status().await;
        assert_eq!(s.deployable, dec!(84000));
        assert!(l.validate_reserve_protection().await.is_ok());
    }

    #[tokio::test]
    async fn snapshot_restore() {
        let l = ledger(dec!(1000000));
        let t1 = l.reserve(dec!(35000)).await.unwrap();
        l.commit(t1, dec!(35000)).await.unwrap();
        let _t2 = l.reserve(dec!(35000)).await.unwrap();
        let snap = l.snapshot().await;
        assert_eq!(snap.outstanding.len(), 1);

        let restored = CapitalLedger::from_snapshot(&snap).unwrap();
        assert_eq!(restored.status().await, l.status().await);

        // Sequence ids keep increasing after restore
        let t3 = restored.reserve(dec!(1000)).await.unwrap();
        assert_eq!(t3.seq(), 3);
    }

    #[tokio::test]
    async fn restore_rejects_inconsistent_snapshot() {
        let l = ledger(dec!(1000000));
        let mut snap = l.snapshot().await;
        snap.allocated = dec!(800000);
        assert!(l.restore(&snap).await.is_err());
        assert_eq!(l.status().await.allocated, Decimal::ZERO);
    }

    #[tokio::test]
    async fn non_positive_reservation_is_invalid() {
        let l = ledger(dec!(1000));
        assert!(matches!(
            l.reserve(Decimal::ZERO).await,
            Err(LedgerError::InvalidAmount(_))
        ));
    }
}
