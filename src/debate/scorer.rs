//! Pairwise agreement scoring for one round.
//!
//! For a pair of recommendations:
//!
//! - action: 1.0 equal, 0.5 adjacent in severity, else 0.0
//! - confidence: `max(0, 1 - |c1 - c2|)`
//! - price target: `max(0, 1 - |t1 - t2| / max(t1, t2))`, only when both
//!   actions are directional and both carry a target
//!
//! The pair score is the weighted mean of the terms present (weights
//! renormalise when the target term is omitted). N voices score as the
//! mean over all pairs.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::transcript::{ConsensusScore, Disagreement, DivergenceAxis, PairwiseScore};
use crate::domain::{Action, Recommendation};
use crate::error::{ConclaveError, Result};
use crate::validation::validate_recommendation;

/// Weighted deficits below this count as no divergence.
const NONE_TOLERANCE: f64 = 0.01;

/// Weights of the three agreement terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub action: f64,
    pub confidence: f64,
    pub price_target: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            action: 0.6,
            confidence: 0.3,
            price_target: 0.1,
        }
    }
}

/// Score plus the data used to build it
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRound {
    pub score: ConsensusScore,
    pub pairwise: Vec<PairwiseScore>,
    pub disagreement: Disagreement,
}

/// Pure agreement function over a complete round
#[derive(Debug, Clone, Default)]
pub struct ConsensusScorer {
    weights: ScoreWeights,
}

impl ConsensusScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score a complete round. Rejects empty rounds and any recommendation
    /// with an undefined confidence or non-positive price.
    pub fn score(&self, recs: &[Recommendation]) -> Result<ScoredRound> {
        if recs.is_empty() {
            return Err(ConclaveError::InvalidRound(
                "cannot score a round with no recommendations".to_string(),
            ));
        }
        for rec in recs {
            validate_recommendation(rec)?;
        }

        if recs.len() == 1 {
            return Ok(ScoredRound {
                score: unit_score(1.0)?,
                pairwise: Vec::new(),
                disagreement: Disagreement::none(),
            });
        }

        let mut pairwise = Vec::with_capacity(recs.len() * (recs.len() - 1) / 2);
        for (i, a) in recs.iter().enumerate() {
            for b in &recs[i + 1..] {
                pairwise.push(self.pair(a, b));
            }
        }

        let mean = pairwise.iter().map(|p| p.score).sum::<f64>() / pairwise.len() as f64;
        let score = unit_score(mean)?;
        let disagreement = self.describe(recs, &pairwise);

        Ok(ScoredRound {
            score,
            pairwise,
            disagreement,
        })
    }

    /// Agreement between two recommendations
    pub fn pair(&self, a: &Recommendation, b: &Recommendation) -> PairwiseScore {
        let action_agreement = action_agreement(a.action, b.action);
        let confidence_agreement = (1.0 - (a.confidence - b.confidence).abs()).max(0.0);
        let price_target_agreement = price_target_agreement(a, b);

        let w = &self.weights;
        let (numerator, denominator) = match price_target_agreement {
            Some(p) => (
                w.action * action_agreement + w.confidence * confidence_agreement + w.price_target * p,
                w.action + w.confidence + w.price_target,
            ),
            None => (
                w.action * action_agreement + w.confidence * confidence_agreement,
                w.action + w.confidence,
            ),
        };
        let score = if denominator > 0.0 {
            (numerator / denominator).clamp(0.0, 1.0)
        } else {
            0.0
        };

        PairwiseScore {
            first: a.agent.clone(),
            second: b.agent.clone(),
            action_agreement,
            confidence_agreement,
            price_target_agreement,
            score,
        }
    }

    fn describe(&self, recs: &[Recommendation], pairwise: &[PairwiseScore]) -> Disagreement {
        let n = pairwise.len() as f64;
        let w = &self.weights;

        let action_deficit =
            pairwise.iter().map(|p| w.action * (1.0 - p.action_agreement)).sum::<f64>() / n;
        let confidence_deficit = pairwise
            .iter()
            .map(|p| w.confidence * (1.0 - p.confidence_agreement))
            .sum::<f64>()
            / n;
        let target_deficit = pairwise
            .iter()
            .filter_map(|p| p.price_target_agreement)
            .map(|t| w.price_target * (1.0 - t))
            .sum::<f64>()
            / n;

        let mut actions: Vec<Action> = recs.iter().map(|r| r.action).collect();
        actions.sort_by(|a, b| b.cmp(a));
        actions.dedup();

        let (min_conf, max_conf) = recs.iter().fold((f64::MAX, f64::MIN), |(lo, hi), r| {
            (lo.min(r.confidence), hi.max(r.confidence))
        });
        let confidence_spread = (max_conf - min_conf).max(0.0);

        // Ties resolve in weight order: action, confidence, target
        let mut axis = DivergenceAxis::Action;
        let mut worst = action_deficit;
        if confidence_deficit > worst {
            axis = DivergenceAxis::Confidence;
            worst = confidence_deficit;
        }
        if target_deficit > worst {
            axis = DivergenceAxis::PriceTarget;
            worst = target_deficit;
        }
        if worst < NONE_TOLERANCE {
            axis = DivergenceAxis::None;
        }

        let guidance = match axis {
            DivergenceAxis::Action => format!(
                "Voices split between {}; address the opposing case directly and state what would change your action.",
                actions
                    .iter()
                    .map(Action::as_str)
                    .collect::<Vec<_>>()
                    .join(" / ")
            ),
            DivergenceAxis::Confidence => format!(
                "Actions broadly align but confidence ranges {:.2}-{:.2}; justify your conviction level.",
                min_conf, max_conf
            ),
            DivergenceAxis::PriceTarget => {
                let targets: Vec<Decimal> = recs.iter().filter_map(|r| r.target_price).collect();
                let lo = targets.iter().min().copied().unwrap_or_default();
                let hi = targets.iter().max().copied().unwrap_or_default();
                format!(
                    "Price targets diverge ({} to {}); reconcile your valuation assumptions.",
                    lo.round_dp(2),
                    hi.round_dp(2)
                )
            }
            DivergenceAxis::None => Disagreement::none().guidance,
        };

        Disagreement {
            axis,
            actions,
            confidence_spread,
            guidance,
        }
    }
}

fn unit_score(value: f64) -> Result<ConsensusScore> {
    ConsensusScore::new(value).ok_or_else(|| {
        ConclaveError::InvalidRound(format!("consensus score {} is not within [0, 1]", value))
    })
}

fn action_agreement(a: Action, b: Action) -> f64 {
    if a == b {
        1.0
    } else if a.is_adjacent(b) {
        0.5
    } else {
        0.0
    }
}

fn price_target_agreement(a: &Recommendation, b: &Recommendation) -> Option<f64> {
    if !a.action.is_directional() || !b.action.is_directional() {
        return None;
    }
    let (t1, t2) = (a.target_price?, b.target_price?);
    let max = t1.max(t2);
    if max <= Decimal::ZERO {
        return None;
    }
    let ratio = ((t1 - t2).abs() / max).to_f64()?;
    Some((1.0 - ratio).max(0.0))
}
