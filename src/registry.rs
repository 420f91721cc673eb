//! Position registry
//!
//! Tracks every live position keyed by symbol and enforces at most one
//! non-terminal position per symbol. Terminal positions (CLOSED, FAILED)
//! move into history and feed the performance stats.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::domain::{Position, PositionStatus};
use crate::error::{DeployError, Result};

/// Closed-trade performance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub trades_closed: u32,
    pub wins: u32,
    pub losses: u32,
    pub failed_entries: u32,
    pub total_realized_pnl: Decimal,
}

impl PerformanceStats {
    pub fn win_rate(&self) -> Decimal {
        if self.trades_closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) / Decimal::from(self.trades_closed)
    }
}

/// Retired positions kept for inspection; stats cover every position ever retired.
const HISTORY_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct PositionRegistry {
    active: HashMap<String, Position>,
    history: VecDeque<Position>,
    history_limit: usize,
    stats: PerformanceStats,
}

impl Default for PositionRegistry {
    fn default() -> Self {
        Self::with_history_limit(HISTORY_CAPACITY)
    }
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            active: HashMap::new(),
            history: VecDeque::new(),
            history_limit: limit.max(1),
            stats: PerformanceStats::default(),
        }
    }

    /// Register a freshly approved PENDING position.
    pub fn open(&mut self, position: Position) -> Result<()> {
        if let Some(existing) = self.active.get(&position.symbol) {
            return Err(DeployError::PositionConflict(format!(
                "{} already has a {} position",
                position.symbol, existing.status
            )));
        }
        if position.status != PositionStatus::Pending {
            return Err(DeployError::InvalidStateTransition {
                from: "NONE".to_string(),
                to: position.status.to_string(),
            });
        }
        debug!(symbol = %position.symbol, id = %position.id, "Position registered as PENDING");
        self.active.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// PENDING -> OPEN on buy acknowledgment.
    pub fn mark_open(
        &mut self,
        symbol: &str,
        fill_price: Decimal,
        quantity: u64,
        allocated_amount: Decimal,
        target_price: Decimal,
        stop_price: Decimal,
        order_id: &str,
    ) -> Result<&Position> {
        let position = self.active_mut(symbol)?;
        transition(position, PositionStatus::Open)?;
        position.entry_price = fill_price;
        position.quantity = quantity;
        position.allocated_amount = allocated_amount;
        position.target_price = target_price;
        position.stop_price = stop_price;
        position.order_id = Some(order_id.to_string());
        position.reservation_seq = None;
        position.opened_at = Utc::now();
        info!(
            symbol,
            %fill_price,
            quantity,
            %allocated_amount,
            %target_price,
            %stop_price,
            "Position OPEN"
        );
        Ok(position)
    }

    /// PENDING -> FAILED when execution is rejected after retries.
    pub fn mark_failed(&mut self, symbol: &str) -> Result<Position> {
        let position = self.active_mut(symbol)?;
        transition(position, PositionStatus::Failed)?;
        position.reservation_seq = None;
        position.closed_at = Some(Utc::now());
        let position = self.retire(symbol)?;
        self.stats.failed_entries += 1;
        warn!(symbol, id = %position.id, "Position FAILED");
        Ok(position)
    }

    /// OPEN -> CLOSING once an exit is approved.
    pub fn mark_closing(&mut self, symbol: &str) -> Result<&Position> {
        let position = self.active_mut(symbol)?;
        transition(position, PositionStatus::Closing)?;
        debug!(symbol, "Position CLOSING");
        Ok(position)
    }

    /// CLOSING -> OPEN when the sell could not be placed.
    pub fn revert_closing(&mut self, symbol: &str) -> Result<&Position> {
        let position = self.active_mut(symbol)?;
        transition(position, PositionStatus::Open)?;
        warn!(symbol, "Exit failed, position back to OPEN");
        Ok(position)
    }

    /// CLOSING -> CLOSED on sell acknowledgment.
    pub fn close(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        realized_pnl: Decimal,
    ) -> Result<Position> {
        let position = self.active_mut(symbol)?;
        transition(position, PositionStatus::Closed)?;
        position.exit_price = Some(exit_price);
        position.realized_pnl = Some(realized_pnl);
        position.closed_at = Some(Utc::now());
        let position = self.retire(symbol)?;

        self.stats.trades_closed += 1;
        if realized_pnl > Decimal::ZERO {
            self.stats.wins += 1;
        } else {
            self.stats.losses += 1;
        }
        self.stats.total_realized_pnl += realized_pnl;

        info!(
            symbol,
            %exit_price,
            %realized_pnl,
            total_pnl = %self.stats.total_realized_pnl,
            "Position CLOSED"
        );
        Ok(position)
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.active.get(symbol)
    }

    pub fn has_active(&self, symbol: &str) -> bool {
        self.active.contains_key(symbol)
    }

    pub fn unrealized_pnl(&self, symbol: &str, current_price: Decimal) -> Option<Decimal> {
        self.active
            .get(symbol)
            .filter(|p| p.status.holds_allocation())
            .map(|p| p.unrealized_pnl(current_price))
    }

    /// Every non-terminal position, ordered by symbol
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.active.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    /// Most recent retired positions, oldest first
    pub fn history(&self) -> &VecDeque<Position> {
        &self.history
    }

    pub fn stats(&self) -> &PerformanceStats {
        &self.stats
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Capital that should be allocated in the ledger for live positions
    pub fn allocated_total(&self) -> Decimal {
        self.active
            .values()
            .filter(|p| p.status.holds_allocation())
            .map(|p| p.allocated_amount)
            .sum()
    }

    /// Replace the live set with positions loaded from a snapshot.
    /// Terminal positions go straight to history.
    pub fn restore(&mut self, positions: Vec<Position>) -> Result<()> {
        let mut active = HashMap::new();
        let mut retired = Vec::new();
        for position in positions {
            if position.status.is_terminal() {
                retired.push(position);
                continue;
            }
            if active.contains_key(&position.symbol) {
                return Err(DeployError::InvariantViolation(format!(
                    "snapshot holds two live positions for {}",
                    position.symbol
                )));
            }
            active.insert(position.symbol.clone(), position);
        }
        info!(positions = active.len(), retired = retired.len(), "Position registry restored");
        self.active = active;
        for position in retired {
            if position.status == PositionStatus::Failed {
                self.stats.failed_entries += 1;
            }
            self.push_history(position);
        }
        Ok(())
    }

    fn active_mut(&mut self, symbol: &str) -> Result<&mut Position> {
        self.active
            .get_mut(symbol)
            .ok_or_else(|| DeployError::PositionNotFound(symbol.to_string()))
    }

    fn retire(&mut self, symbol: &str) -> Result<Position> {
        let position = self
            .active
            .remove(symbol)
            .ok_or_else(|| DeployError::PositionNotFound(symbol.to_string()))?;
        self.push_history(position.clone());
        Ok(position)
    }

    fn push_history(&mut self, position: Position) {
        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(position);
    }
}

fn transition(position: &mut Position, to: PositionStatus) -> Result<()> {
    if !position.status.can_transition_to(to) {
        return Err(DeployError::InvalidStateTransition {
            from: position.status.to_string(),
            to: to.to_string(),
        });
    }
    position.status = to;
    Ok(())
}
