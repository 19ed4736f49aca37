//! Round records and the append-only transcript of one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Action, Recommendation};

/// Agreement scalar in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsensusScore(f64);

impl ConsensusScore {
    /// `None` for NaN or values outside [0, 1]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for ConsensusScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Dominant axis along which the voices diverge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceAxis {
    Action,
    Confidence,
    PriceTarget,
    None,
}

impl DivergenceAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            DivergenceAxis::Action => "action",
            DivergenceAxis::Confidence => "confidence",
            DivergenceAxis::PriceTarget => "price_target",
            DivergenceAxis::None => "none",
        }
    }
}

impl fmt::Display for DivergenceAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the voices disagree on, fed back into the next round's context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disagreement {
    pub axis: DivergenceAxis,
    /// Distinct actions seen this round, most severe first
    pub actions: Vec<Action>,
    /// max - min confidence this round
    pub confidence_spread: f64,
    /// One-line instruction for the next round
    pub guidance: String,
}

impl Disagreement {
    pub fn none() -> Self {
        Self {
            axis: DivergenceAxis::None,
            actions: Vec::new(),
            confidence_spread: 0.0,
            guidance: "Views are aligned; confirm or refine your position.".to_string(),
        }
    }
}

/// Agreement between one pair of voices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseScore {
    pub first: String,
    pub second: String,
    pub action_agreement: f64,
    pub confidence_agreement: f64,
    /// Omitted unless both actions are directional with targets
    pub price_target_agreement: Option<f64>,
    pub score: f64,
}

/// One synchronized cycle of every voice plus its scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    pub round: u32,
    /// One recommendation per registered voice, in registration order
    pub recommendations: Vec<Recommendation>,
    pub score: ConsensusScore,
    pub pairwise: Vec<PairwiseScore>,
    pub disagreement: Disagreement,
    pub completed_at: DateTime<Utc>,
}

impl DebateRound {
    pub fn recommendation_for(&self, agent: &str) -> Option<&Recommendation> {
        self.recommendations.iter().find(|r| r.agent == agent)
    }
}

/// Append-only sequence of rounds, owned by a single session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateTranscript {
    rounds: Vec<DebateRound>,
}

impl DebateTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, round: DebateRound) {
        self.rounds.push(round);
    }

    pub fn rounds(&self) -> &[DebateRound] {
        &self.rounds
    }

    pub fn last(&self) -> Option<&DebateRound> {
        self.rounds.last()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Everything one voice has said so far, oldest first
    pub fn history_of<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = &'a Recommendation> + 'a {
        self.rounds
            .iter()
            .filter_map(move |r| r.recommendation_for(agent))
    }
}
