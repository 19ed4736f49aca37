use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rationale prefix attached to recommendations whose backend output could not be parsed
pub const PARSE_FAILED_FLAG: &str = "[parse_failed]";

/// Recommended action, totally ordered by severity:
/// `StrongBuy > Buy > Hold > Sell > Avoid`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Avoid,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::StrongBuy,
        Action::Buy,
        Action::Hold,
        Action::Sell,
        Action::Avoid,
    ];

    /// Position in the severity order, Avoid = 0 .. StrongBuy = 4
    pub fn severity(&self) -> u8 {
        match self {
            Action::Avoid => 0,
            Action::Sell => 1,
            Action::Hold => 2,
            Action::Buy => 3,
            Action::StrongBuy => 4,
        }
    }

    pub fn from_severity(severity: u8) -> Action {
        match severity {
            0 => Action::Avoid,
            1 => Action::Sell,
            2 => Action::Hold,
            3 => Action::Buy,
            _ => Action::StrongBuy,
        }
    }

    /// One step along the severity order toward `target`
    pub fn step_toward(&self, target: Action) -> Action {
        let (from, to) = (self.severity(), target.severity());
        if from < to {
            Action::from_severity(from + 1)
        } else if from > to {
            Action::from_severity(from - 1)
        } else {
            *self
        }
    }

    /// Neighbours in the severity order (e.g. Buy/StrongBuy, Hold/Sell)
    pub fn is_adjacent(&self, other: Action) -> bool {
        self.severity().abs_diff(other.severity()) == 1
    }

    /// Actions that carry a price target
    pub fn is_directional(&self) -> bool {
        matches!(self, Action::StrongBuy | Action::Buy | Action::Sell)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::StrongBuy => "STRONG_BUY",
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
            Action::Avoid => "AVOID",
        }
    }

    /// Lenient parse used at the agent boundary
    pub fn parse_loose(s: &str) -> Option<Action> {
        let normalized: String = s
            .trim()
            .to_uppercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "STRONG_BUY" | "STRONGBUY" => Some(Action::StrongBuy),
            "BUY" | "ACCUMULATE" | "LONG" => Some(Action::Buy),
            "HOLD" | "NEUTRAL" | "WAIT" => Some(Action::Hold),
            "SELL" | "REDUCE" | "TRIM" => Some(Action::Sell),
            "AVOID" | "STRONG_SELL" | "PASS" => Some(Action::Avoid),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Action {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Action::parse_loose(s).ok_or_else(|| format!("Unknown action: {}", s))
    }
}

/// One agent's view in one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Name of the voice that produced this recommendation
    pub agent: String,
    pub action: Action,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub rationale: String,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Backend answered but its output could not be parsed
    #[serde(default)]
    pub parse_failed: bool,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn new(
        agent: impl Into<String>,
        action: Action,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            action,
            confidence,
            rationale: rationale.into(),
            target_price: None,
            stop_loss: None,
            parse_failed: false,
            created_at: Utc::now(),
        }
    }

    /// Degraded HOLD/0.5 recommendation for unparseable backend output
    pub fn parse_failed(agent: impl Into<String>, detail: &str) -> Self {
        let mut rec = Self::new(
            agent,
            Action::Hold,
            0.5,
            format!("{} {}", PARSE_FAILED_FLAG, detail),
        );
        rec.parse_failed = true;
        rec
    }

    pub fn with_target(mut self, target: Decimal) -> Self {
        self.target_price = Some(target);
        self
    }

    pub fn with_stop_loss(mut self, stop: Decimal) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    /// Confidence is finite and within [0, 1]
    pub fn has_valid_confidence(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }
}
