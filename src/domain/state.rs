use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-symbol signal state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolState {
    /// No position, watching for a dip below the reference close
    Watching,
    /// Dip detected, waiting on the risk gate and the ledger
    EntryCandidate,
    /// Buy order sent, waiting for acknowledgment
    AwaitingFill,
    /// Position open, watching target and stop levels
    Holding,
    /// Exit approved, sell about to be sent
    ExitCandidate,
    /// Sell order sent, waiting for acknowledgment
    AwaitingExitFill,
}

impl Default for SymbolState {
    fn default() -> Self {
        SymbolState::Watching
    }
}

impl SymbolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolState::Watching => "WATCHING",
            SymbolState::EntryCandidate => "ENTRY_CANDIDATE",
            SymbolState::AwaitingFill => "AWAITING_FILL",
            SymbolState::Holding => "HOLDING",
            SymbolState::ExitCandidate => "EXIT_CANDIDATE",
            SymbolState::AwaitingExitFill => "AWAITING_EXIT_FILL",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: SymbolState) -> bool {
        use SymbolState::*;

        match (self, target) {
            // From Watching
            (Watching, EntryCandidate) => true, // Dip detected

            // From EntryCandidate
            (EntryCandidate, AwaitingFill) => true, // Gate + ledger approved
            (EntryCandidate, Watching) => true,     // Rejected

            // From AwaitingFill
            (AwaitingFill, Holding) => true,  // Buy acknowledged
            (AwaitingFill, Watching) => true, // Execution failed

            // From Holding
            (Holding, ExitCandidate) => true, // Target (or hard stop) hit

            // From ExitCandidate
            (ExitCandidate, AwaitingExitFill) => true,

            // From AwaitingExitFill
            (AwaitingExitFill, Watching) => true, // Sell acknowledged
            (AwaitingExitFill, Holding) => true,  // Sell failed, retry next tick

            // All other transitions are invalid
            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<SymbolState> {
        use SymbolState::*;

        match self {
            Watching => vec![EntryCandidate],
            EntryCandidate => vec![AwaitingFill, Watching],
            AwaitingFill => vec![Holding, Watching],
            Holding => vec![ExitCandidate],
            ExitCandidate => vec![AwaitingExitFill],
            AwaitingExitFill => vec![Watching, Holding],
        }
    }

    /// Does this state have an order in flight?
    pub fn has_pending_order(&self) -> bool {
        matches!(
            self,
            SymbolState::AwaitingFill | SymbolState::AwaitingExitFill
        )
    }

    /// Does this state carry capital (reserved or allocated)?
    pub fn holds_capital(&self) -> bool {
        !matches!(self, SymbolState::Watching | SymbolState::EntryCandidate)
    }
}

impl fmt::Display for SymbolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SymbolState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "WATCHING" => Ok(SymbolState::Watching),
            "ENTRY_CANDIDATE" => Ok(SymbolState::EntryCandidate),
            "AWAITING_FILL" => Ok(SymbolState::AwaitingFill),
            "HOLDING" => Ok(SymbolState::Holding),
            "EXIT_CANDIDATE" => Ok(SymbolState::ExitCandidate),
            "AWAITING_EXIT_FILL" => Ok(SymbolState::AwaitingExitFill),
            _ => Err(format!("Unknown state: {}", s)),
        }
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub symbol: String,
    pub from: SymbolState,
    pub to: SymbolState,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(
        symbol: impl Into<String>,
        from: SymbolState,
        to: SymbolState,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            from,
            to,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SymbolState::*;

    const ALL: [SymbolState; 6] = [
        Watching,
        EntryCandidate,
        AwaitingFill,
        Holding,
        ExitCandidate,
        AwaitingExitFill,
    ];

    #[test]
    fn no_shortcut_between_watching_and_holding() {
        assert!(!Watching.can_transition_to(Holding));
        assert!(!Holding.can_transition_to(Watching));
        assert!(!Watching.can_transition_to(AwaitingFill));
        assert!(!Holding.can_transition_to(AwaitingExitFill));
    }

    #[test]
    fn valid_transitions_agree_with_can_transition_to() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    from.valid_transitions().contains(&to),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn full_cycle_is_walkable() {
        let path = [
            Watching,
            EntryCandidate,
            AwaitingFill,
            Holding,
            ExitCandidate,
            AwaitingExitFill,
            Watching,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }

    #[test]
    fn parse_round_trips_display() {
        for state in ALL {
            assert_eq!(SymbolState::try_from(state.as_str()).unwrap(), state);
        }
        assert!(SymbolState::try_from("LEG1_PENDING").is_err());
    }
}
