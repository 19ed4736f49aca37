use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::recommendation::{Action, Recommendation};
use super::state::DebateState;

/// How firmly the voices agreed on the final decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusStatus {
    /// Session failed before a decision could be reached
    Inconclusive,
    /// Round limit reached, voices still far apart
    NoConsensus,
    /// Round limit reached, voices close but under the threshold
    PartialConsensus,
    /// Consensus threshold met at or after min_rounds
    StrongConsensus,
}

impl ConsensusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusStatus::Inconclusive => "INCONCLUSIVE",
            ConsensusStatus::NoConsensus => "NO_CONSENSUS",
            ConsensusStatus::PartialConsensus => "PARTIAL_CONSENSUS",
            ConsensusStatus::StrongConsensus => "STRONG_CONSENSUS",
        }
    }
}

impl fmt::Display for ConsensusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ConsensusStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "INCONCLUSIVE" => Ok(ConsensusStatus::Inconclusive),
            "NO_CONSENSUS" | "NONE" => Ok(ConsensusStatus::NoConsensus),
            "PARTIAL_CONSENSUS" | "PARTIAL" => Ok(ConsensusStatus::PartialConsensus),
            "STRONG_CONSENSUS" | "STRONG" => Ok(ConsensusStatus::StrongConsensus),
            _ => Err(format!("Unknown consensus status: {}", s)),
        }
    }
}

/// The single outcome of a debate session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub session_id: Uuid,
    pub candidate_id: String,
    pub action: Action,
    /// Blended confidence in [0, 1]
    pub confidence: f64,
    pub rationale: String,
    pub consensus_status: ConsensusStatus,
    /// Outcome state the synthesizer collapsed
    pub terminal_state: DebateState,
    pub round_count: u32,
    /// Agreement score of the last completed round
    pub final_score: Option<f64>,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// Pattern-derived success probability the debate started from
    pub success_probability: f64,
    /// Recommendations of the last completed round
    pub contributions: Vec<Recommendation>,
    pub decided_at: DateTime<Utc>,
}

impl FinalDecision {
    /// A decision the caller may act on (anything but INCONCLUSIVE)
    pub fn is_actionable(&self) -> bool {
        self.consensus_status != ConsensusStatus::Inconclusive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order_and_parse() {
        assert!(ConsensusStatus::StrongConsensus > ConsensusStatus::PartialConsensus);
        assert!(ConsensusStatus::PartialConsensus > ConsensusStatus::NoConsensus);
        assert!(ConsensusStatus::NoConsensus > ConsensusStatus::Inconclusive);
        assert_eq!(
            ConsensusStatus::try_from("partial").unwrap(),
            ConsensusStatus::PartialConsensus
        );
        assert!(ConsensusStatus::try_from("maybe").is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&ConsensusStatus::NoConsensus).unwrap();
        assert_eq!(json, "\"NO_CONSENSUS\"");
    }
}
