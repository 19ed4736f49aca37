use serde::{Deserialize, Serialize};
use std::fmt;

/// Debate session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebateState {
    /// Session created, features validated, no round started
    Init,
    /// Agents are being polled for the current round
    RoundInProgress,
    /// Score crossed the consensus threshold at or after min_rounds
    ConsensusReached,
    /// max_rounds completed without consensus
    RoundLimitReached,
    /// An agent was unavailable, timed out, or the session deadline expired
    AgentFailure,
    /// Final decision emitted, transcript released
    Terminated,
}

impl DebateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateState::Init => "INIT",
            DebateState::RoundInProgress => "ROUND_IN_PROGRESS",
            DebateState::ConsensusReached => "CONSENSUS_REACHED",
            DebateState::RoundLimitReached => "ROUND_LIMIT_REACHED",
            DebateState::AgentFailure => "AGENT_FAILURE",
            DebateState::Terminated => "TERMINATED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: DebateState) -> bool {
        use DebateState::*;

        match (self, target) {
            (Init, RoundInProgress) => true,

            // A round either loops, terminates the debate, or fails
            (RoundInProgress, RoundInProgress) => true,
            (RoundInProgress, ConsensusReached) => true,
            (RoundInProgress, RoundLimitReached) => true,
            (RoundInProgress, AgentFailure) => true,

            (ConsensusReached, Terminated) => true,
            (RoundLimitReached, Terminated) => true,
            (AgentFailure, Terminated) => true,

            _ => false,
        }
    }
}

impl fmt::Display for DebateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DebateState,
    pub to: DebateState,
    pub round: u32,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl StateTransition {
    pub fn new(from: DebateState, to: DebateState, round: u32, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            round,
            reason: reason.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use DebateState::*;

        assert!(Init.can_transition_to(RoundInProgress));
        assert!(RoundInProgress.can_transition_to(RoundInProgress));
        assert!(RoundInProgress.can_transition_to(ConsensusReached));
        assert!(RoundInProgress.can_transition_to(RoundLimitReached));
        assert!(RoundInProgress.can_transition_to(AgentFailure));
        assert!(ConsensusReached.can_transition_to(Terminated));
        assert!(AgentFailure.can_transition_to(Terminated));

        assert!(!Init.can_transition_to(ConsensusReached));
        assert!(!Init.can_transition_to(Terminated));
        assert!(!ConsensusReached.can_transition_to(RoundInProgress));
        assert!(!Terminated.can_transition_to(Init));
    }
}
