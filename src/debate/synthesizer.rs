//! Collapses a finished transcript into one `FinalDecision`.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

use super::transcript::{DebateTranscript, DivergenceAxis};
use crate::config::DebateConfig;
use crate::domain::{Action, ConsensusStatus, DebateState, FinalDecision, Recommendation};
use crate::pattern::PatternInsights;

/// Themes recognised in rationales, in reporting order
pub const THEME_VOCABULARY: &[&str] = &[
    "growth",
    "valuation",
    "undervalued",
    "overvalued",
    "momentum",
    "earnings",
    "margin",
    "debt",
    "leverage",
    "competition",
    "dividend",
    "volatility",
    "risk",
    "moat",
    "management",
    "cash flow",
    "sentiment",
    "catalyst",
    "liquidity",
];

const DEFAULT_DAMPING: f64 = 0.8;

/// Identity of the session being summarised
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary<'a> {
    pub session_id: Uuid,
    pub candidate_id: &'a str,
    pub insights: &'a PatternInsights,
}

#[derive(Debug, Clone)]
pub struct RecommendationSynthesizer {
    round_limit_damping: f64,
    partial_threshold: f64,
}

impl Default for RecommendationSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_DAMPING, 0.6)
    }
}

impl RecommendationSynthesizer {
    /// `round_limit_damping` outside (0, 1) falls back to 0.8 so the round
    /// limit can never amplify confidence.
    pub fn new(round_limit_damping: f64, partial_threshold: f64) -> Self {
        let round_limit_damping = if round_limit_damping > 0.0 && round_limit_damping < 1.0 {
            round_limit_damping
        } else {
            warn!(round_limit_damping, "damping outside (0, 1), using {}", DEFAULT_DAMPING);
            DEFAULT_DAMPING
        };
        Self {
            round_limit_damping,
            partial_threshold,
        }
    }

    pub fn from_config(config: &DebateConfig) -> Self {
        Self::new(config.round_limit_damping, config.partial_consensus_threshold)
    }

    pub fn round_limit_damping(&self) -> f64 {
        self.round_limit_damping
    }

    /// Build the decision for an outcome state. Non-outcome states are
    /// treated as a failure.
    pub fn synthesize(
        &self,
        session: &SessionSummary<'_>,
        transcript: &DebateTranscript,
        terminal: DebateState,
    ) -> FinalDecision {
        let Some(last) = transcript.last() else {
            return self.inconclusive(session, transcript, "no round completed");
        };
        if last.recommendations.is_empty() {
            return self.inconclusive(session, transcript, "last round has no recommendations");
        }

        match terminal {
            DebateState::ConsensusReached => self.consensus(session, transcript),
            DebateState::RoundLimitReached => self.round_limit(session, transcript),
            other => self.inconclusive(session, transcript, &format!("session ended in {}", other)),
        }
    }

    /// INCONCLUSIVE decision: no action, zero confidence, transcript summary kept
    pub fn inconclusive(
        &self,
        session: &SessionSummary<'_>,
        transcript: &DebateTranscript,
        reason: &str,
    ) -> FinalDecision {
        let rounds = transcript.len() as u32;
        let rationale = if rounds == 0 {
            format!("Debate aborted before any round completed: {}.", reason)
        } else {
            format!(
                "Debate aborted after {} completed round(s): {}. No decision should be acted on.",
                rounds, reason
            )
        };

        let mut decision = base_decision(session, transcript, DebateState::AgentFailure);
        decision.action = Action::Hold;
        decision.confidence = 0.0;
        decision.rationale = rationale;
        decision.consensus_status = ConsensusStatus::Inconclusive;
        decision
    }

    fn consensus(&self, session: &SessionSummary<'_>, transcript: &DebateTranscript) -> FinalDecision {
        let recs = last_recommendations(transcript);
        let action = modal_action(recs);
        let confidence = recs.iter().map(|r| r.confidence).sum::<f64>() / recs.len() as f64;

        let themes = shared_themes(recs);
        let mut rationale = agreement_sentence(recs, action);
        if themes.is_empty() {
            rationale.push_str(" No shared themes beyond the action.");
        } else {
            rationale.push_str(&format!(" Shared themes: {}.", themes.join(", ")));
        }
        if let Some(note) = parse_failure_note(recs) {
            rationale.push(' ');
            rationale.push_str(&note);
        }
        rationale.push(' ');
        rationale.push_str(&session.insights.historical_comparison());

        let (target_price, stop_loss) = agreed_levels(recs);
        // Degraded answers cannot back a strong consensus
        let status = if recs.iter().any(|r| r.parse_failed) {
            ConsensusStatus::PartialConsensus
        } else {
            ConsensusStatus::StrongConsensus
        };

        let mut decision = base_decision(session, transcript, DebateState::ConsensusReached);
        decision.action = action;
        decision.confidence = confidence.clamp(0.0, 1.0);
        decision.rationale = rationale;
        decision.consensus_status = status;
        decision.target_price = target_price;
        decision.stop_loss = stop_loss;
        decision
    }

    fn round_limit(&self, session: &SessionSummary<'_>, transcript: &DebateTranscript) -> FinalDecision {
        let recs = last_recommendations(transcript);
        // First registered voice wins confidence ties
        let primary = recs
            .iter()
            .skip(1)
            .fold(&recs[0], |best, r| if r.confidence > best.confidence { r } else { best });

        let score = transcript.last().map(|r| r.score.value()).unwrap_or(0.0);
        let status = if score >= self.partial_threshold {
            ConsensusStatus::PartialConsensus
        } else {
            ConsensusStatus::NoConsensus
        };

        let split = transcript
            .last()
            .map(|r| match r.disagreement.axis {
                DivergenceAxis::Action => format!(
                    "split on action ({})",
                    r.disagreement
                        .actions
                        .iter()
                        .map(|a| a.as_str())
                        .collect::<Vec<_>>()
                        .join(" / ")
                ),
                DivergenceAxis::None => "minor differences".to_string(),
                axis => format!("split on {}", axis),
            })
            .unwrap_or_default();

        let damped = primary.confidence * self.round_limit_damping;
        let mut rationale = format!(
            "Round limit reached after {} rounds without consensus (agreement {:.2}, {}). \
             Followed {} ({} at {:.0}% confidence, damped to {:.0}%): {}",
            transcript.len(),
            score,
            split,
            primary.agent,
            primary.action,
            primary.confidence * 100.0,
            damped * 100.0,
            primary.rationale
        );
        if let Some(note) = parse_failure_note(recs) {
            rationale.push(' ');
            rationale.push_str(&note);
        }

        let mut decision = base_decision(session, transcript, DebateState::RoundLimitReached);
        decision.action = primary.action;
        decision.confidence = damped.clamp(0.0, 1.0);
        decision.rationale = rationale;
        decision.consensus_status = status;
        decision.target_price = primary.target_price;
        decision.stop_loss = primary.stop_loss;
        decision
    }
}

fn base_decision(
    session: &SessionSummary<'_>,
    transcript: &DebateTranscript,
    terminal: DebateState,
) -> FinalDecision {
    FinalDecision {
        session_id: session.session_id,
        candidate_id: session.candidate_id.to_string(),
        action: Action::Hold,
        confidence: 0.0,
        rationale: String::new(),
        consensus_status: ConsensusStatus::Inconclusive,
        terminal_state: terminal,
        round_count: transcript.len() as u32,
        final_score: transcript.last().map(|r| r.score.value()),
        target_price: None,
        stop_loss: None,
        success_probability: session.insights.success_probability,
        contributions: last_recommendations(transcript).to_vec(),
        decided_at: Utc::now(),
    }
}

/// "All N voices chose X." or "k of N voices chose X; dissent: b (STRONG_BUY)."
fn agreement_sentence(recs: &[Recommendation], action: Action) -> String {
    let dissent: Vec<String> = recs
        .iter()
        .filter(|r| r.action != action)
        .map(|r| format!("{} ({})", r.agent, r.action))
        .collect();
    if dissent.is_empty() {
        format!("All {} voices chose {}.", recs.len(), action)
    } else {
        format!(
            "{} of {} voices chose {}; dissent: {}.",
            recs.len() - dissent.len(),
            recs.len(),
            action,
            dissent.join(", ")
        )
    }
}

fn parse_failure_note(recs: &[Recommendation]) -> Option<String> {
    let failed: Vec<&str> = recs
        .iter()
        .filter(|r| r.parse_failed)
        .map(|r| r.agent.as_str())
        .collect();
    if failed.is_empty() {
        return None;
    }
    Some(format!(
        "{} of {} final answers could not be parsed and stand in as HOLD at 50% ({}).",
        failed.len(),
        recs.len(),
        failed.join(", ")
    ))
}

fn last_recommendations(transcript: &DebateTranscript) -> &[Recommendation] {
    transcript
        .last()
        .map(|r| r.recommendations.as_slice())
        .unwrap_or(&[])
}

/// Most common action; ties go to higher summed confidence, then to the
/// action closer to HOLD, then to the more conservative action.
pub fn modal_action(recs: &[Recommendation]) -> Action {
    let mut tally: BTreeMap<Action, (usize, f64)> = BTreeMap::new();
    for rec in recs {
        let entry = tally.entry(rec.action).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += rec.confidence;
    }

    let mut best: Option<(Action, usize, f64)> = None;
    // BTreeMap iterates from the most conservative action upward
    for (action, (count, conf)) in tally {
        let better = match best {
            None => true,
            Some((b_action, b_count, b_conf)) => {
                count > b_count
                    || (count == b_count && conf > b_conf)
                    || (count == b_count
                        && conf == b_conf
                        && distance_from_hold(action) < distance_from_hold(b_action))
            }
        };
        if better {
            best = Some((action, count, conf));
        }
    }
    best.map(|(a, _, _)| a).unwrap_or(Action::Hold)
}

fn distance_from_hold(action: Action) -> u8 {
    action.severity().abs_diff(Action::Hold.severity())
}

/// Vocabulary themes mentioned by at least two rationales
pub fn shared_themes(recs: &[Recommendation]) -> Vec<&'static str> {
    let lowered: Vec<String> = recs.iter().map(|r| r.rationale.to_lowercase()).collect();
    THEME_VOCABULARY
        .iter()
        .copied()
        .filter(|theme| lowered.iter().filter(|r| r.contains(theme)).count() >= 2)
        .collect()
}

/// Mean target/stop over supplied values when every directional action agrees
fn agreed_levels(recs: &[Recommendation]) -> (Option<Decimal>, Option<Decimal>) {
    let directional: Vec<&Recommendation> = recs.iter().filter(|r| r.action.is_directional()).collect();
    let Some(first) = directional.first() else {
        return (None, None);
    };
    if directional.iter().any(|r| r.action != first.action) {
        return (None, None);
    }
    let mean = |values: Vec<Decimal>| -> Option<Decimal> {
        if values.is_empty() {
            None
        } else {
            Some((values.iter().sum::<Decimal>() / Decimal::from(values.len())).round_dp(2))
        }
    };
    (
        mean(directional.iter().filter_map(|r| r.target_price).collect()),
        mean(directional.iter().filter_map(|r| r.stop_loss).collect()),
    )
}
