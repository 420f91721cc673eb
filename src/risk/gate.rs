use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::returns::ReturnsSource;
use super::stats::{correlation, portfolio_returns, portfolio_var};
use super::{RejectReason, RiskProfile};
use crate::domain::Position;
use crate::ledger::LedgerStatus;

/// Capital request to be checked before reservation
#[derive(Debug, Clone)]
pub struct RiskCandidate {
    pub symbol: String,
    pub amount: Decimal,
}

impl RiskCandidate {
    pub fn new(symbol: impl Into<String>, amount: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskVerdict {
    Approved,
    Rejected(RejectReason),
}

impl RiskVerdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskVerdict::Approved)
    }
}

/// Run the ordered checks. Pure: the result depends only on the arguments.
///
/// `history` maps symbols to trailing returns; symbols missing from it skip
/// the correlation check and drop out of the VaR simulation.
pub fn evaluate(
    candidate: &RiskCandidate,
    ledger: &LedgerStatus,
    open_positions: &[Position],
    profile: &RiskProfile,
    history: &HashMap<String, Vec<f64>>,
) -> RiskVerdict {
    // 1. Capital
    if candidate.amount > ledger.available {
        return RiskVerdict::Rejected(RejectReason::InsufficientCapital {
            requested: candidate.amount,
            available: ledger.available,
        });
    }

    // 2. Concentration
    let weight = if ledger.equity > Decimal::ZERO {
        candidate.amount / ledger.equity
    } else {
        Decimal::MAX
    };
    if weight > profile.max_concentration {
        return RiskVerdict::Rejected(RejectReason::ConcentrationLimit {
            weight,
            limit: profile.max_concentration,
        });
    }

    let held: Vec<&Position> = open_positions
        .iter()
        .filter(|p| p.is_active() && p.symbol != candidate.symbol)
        .collect();

    // 3. Correlation against every held symbol
    if let Some(candidate_returns) = history.get(&candidate.symbol) {
        for position in &held {
            let Some(held_returns) = history.get(&position.symbol) else {
                continue;
            };
            let Some(corr) = correlation(
                candidate_returns,
                held_returns,
                profile.min_correlation_samples,
            ) else {
                continue;
            };
            if corr > profile.max_correlation {
                return RiskVerdict::Rejected(RejectReason::CorrelationLimit {
                    symbol: candidate.symbol.clone(),
                    held: position.symbol.clone(),
                    correlation: corr,
                    limit: profile.max_correlation,
                });
            }
        }
    }

    // 4. Portfolio VaR with the candidate added
    let mut series: Vec<&[f64]> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    let exposures = held
        .iter()
        .map(|p| (p.symbol.as_str(), p.allocated_amount))
        .chain(std::iter::once((candidate.symbol.as_str(), candidate.amount)));
    for (symbol, value) in exposures {
        if let (Some(returns), Some(w)) = (history.get(symbol), value.to_f64()) {
            if !returns.is_empty() && w > 0.0 {
                series.push(returns);
                weights.push(w);
            }
        }
    }
    if !series.is_empty() {
        let combined = portfolio_returns(&series, &weights);
        if let Some(estimate) = portfolio_var(
            &combined,
            profile.var_confidence,
            profile.min_historical_var_samples,
        ) {
            debug!(
                symbol = %candidate.symbol,
                var = estimate.var,
                cvar = estimate.cvar,
                method = ?estimate.method,
                samples = estimate.samples,
                "Portfolio VaR with candidate"
            );
            if estimate.var > profile.max_portfolio_var {
                return RiskVerdict::Rejected(RejectReason::PortfolioVarLimit {
                    var: estimate.var,
                    limit: profile.max_portfolio_var,
                });
            }
        }
    }

    RiskVerdict::Approved
}

/// Risk gate bound to a profile and a returns source.
///
/// Holds no mutable state; the caller acts on the verdict.
pub struct RiskGate {
    profile: RiskProfile,
    returns: Arc<dyn ReturnsSource>,
}

impl RiskGate {
    pub fn new(profile: RiskProfile, returns: Arc<dyn ReturnsSource>) -> Self {
        Self { profile, returns }
    }

    pub fn profile(&self) -> &RiskProfile {
        &self.profile
    }

    pub async fn validate(
        &self,
        candidate: &RiskCandidate,
        ledger: &LedgerStatus,
        open_positions: &[Position],
    ) -> RiskVerdict {
        let mut history = HashMap::new();
        let symbols = open_positions
            .iter()
            .filter(|p| p.is_active())
            .map(|p| p.symbol.as_str())
            .chain(std::iter::once(candidate.symbol.as_str()));
        for symbol in symbols {
            if history.contains_key(symbol) {
                continue;
            }
            if let Some(returns) = self.returns.trailing_returns(symbol).await {
                history.insert(symbol.to_string(), returns);
            }
        }

        let verdict = evaluate(candidate, ledger, open_positions, &self.profile, &history);
        match &verdict {
            RiskVerdict::Approved => debug!(
                symbol = %candidate.symbol,
                amount = %candidate.amount,
                "Risk gate approved"
            ),
            RiskVerdict::Rejected(reason) => info!(
                symbol = %candidate.symbol,
                amount = %candidate.amount,
                code = reason.code(),
                "Risk gate rejected: {}",
                reason
            ),
        }
        verdict
    }
}
