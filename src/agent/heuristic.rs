//! Internal rule-based voices.
//!
//! Both voices form an opening view from the candidate data in round 1 and
//! from round 2 onward start from their own previous recommendation and
//! apply [`reconsider`] against the peers' last round.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::adapter::AgentAdapter;
use super::protocol::DebateContext;
use crate::debate::{Disagreement, DivergenceAxis};
use crate::domain::{Action, CandidateFeatures, Recommendation};
use crate::error::Result;
use crate::pattern::PatternInsights;

const MAX_CONFIDENCE: f64 = 0.9;

/// Valuation and precedent driven voice
#[derive(Debug, Clone)]
pub struct ValueAnalyst {
    name: String,
}

impl ValueAnalyst {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Opening view from multiples and historical success probability
    pub fn opening_view(&self, features: &CandidateFeatures, insights: &PatternInsights) -> Recommendation {
        let mut score: i32 = 0;
        let mut notes = Vec::new();

        match features.pe_ratio {
            Some(pe) if pe <= 0.0 => {
                score -= 1;
                notes.push("negative earnings weigh on valuation".to_string());
            }
            Some(pe) if pe < 10.0 => {
                score += 2;
                notes.push(format!("P/E {:.1} looks undervalued", pe));
            }
            Some(pe) if pe < 15.0 => {
                score += 1;
                notes.push(format!("P/E {:.1} is a reasonable valuation", pe));
            }
            Some(pe) if pe > 40.0 => {
                score -= 2;
                notes.push(format!("P/E {:.1} looks overvalued", pe));
            }
            Some(pe) if pe > 25.0 => {
                score -= 1;
                notes.push(format!("P/E {:.1} is a rich valuation", pe));
            }
            Some(pe) => notes.push(format!("P/E {:.1} is fair", pe)),
            None => notes.push("no earnings multiple available".to_string()),
        }

        match features.price_to_book {
            Some(pb) if pb > 0.0 && pb < 1.0 => {
                score += 1;
                notes.push(format!("trades below book at {:.2}x", pb));
            }
            Some(pb) if pb > 6.0 => {
                score -= 1;
                notes.push(format!("P/B {:.1} leaves little margin of safety", pb));
            }
            _ => {}
        }

        if insights.success_probability >= 0.65 {
            score += 1;
            notes.push("historical precedents mostly worked out".to_string());
        } else if insights.success_probability < 0.35 {
            score -= 1;
            notes.push("historical precedents carry elevated risk".to_string());
        }

        let action = match score {
            s if s >= 3 => Action::StrongBuy,
            s if s >= 1 => Action::Buy,
            0 => Action::Hold,
            -1 => Action::Sell,
            _ => Action::Avoid,
        };

        let mut confidence = 0.5 + 0.1 * score.unsigned_abs() as f64;
        if !insights.positive.is_empty() || !insights.negative.is_empty() {
            confidence += 0.1;
        }

        let rec = Recommendation::new(
            &self.name,
            action,
            round2(confidence.min(MAX_CONFIDENCE)),
            notes.join("; "),
        );
        with_levels(rec, features.price, dec!(1.15), dec!(1.25), dec!(0.90), dec!(0.92))
    }
}

#[async_trait]
impl AgentAdapter for ValueAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, ctx: &DebateContext) -> Result<Recommendation> {
        Ok(match ctx.own_last(&self.name) {
            Some(prev) => reconsider(prev, &ctx.peers_last(&self.name), ctx.guidance.as_ref()),
            None => self.opening_view(&ctx.features, &ctx.insights),
        })
    }
}

/// Price trend driven voice
#[derive(Debug, Clone)]
pub struct MomentumAnalyst {
    name: String,
}

impl MomentumAnalyst {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Weighted trend `0.2 * 1d + 0.3 * 5d + 0.5 * 20d`, `None` without history
    pub fn trend(features: &CandidateFeatures) -> Option<f64> {
        let changes = [
            (features.change_1d_pct, 0.2),
            (features.change_5d_pct, 0.3),
            (features.change_20d_pct, 0.5),
        ];
        if changes.iter().all(|(c, _)| c.is_none()) {
            return None;
        }
        Some(changes.iter().map(|(c, w)| c.unwrap_or(0.0) * w).sum())
    }

    pub fn opening_view(&self, features: &CandidateFeatures) -> Recommendation {
        let Some(m) = Self::trend(features) else {
            return Recommendation::new(
                &self.name,
                Action::Hold,
                0.4,
                "no price history, momentum unknown",
            );
        };

        let action = if m >= 15.0 {
            Action::StrongBuy
        } else if m >= 4.0 {
            Action::Buy
        } else if m > -4.0 {
            Action::Hold
        } else if m > -15.0 {
            Action::Sell
        } else {
            Action::Avoid
        };

        let confidence = 0.5 + (m.abs() / 40.0).min(0.4);
        let tone = if m > 0.0 { "positive" } else { "negative" };
        let rationale = format!(
            "weighted momentum {:+.1}% is {}; sentiment follows the trend",
            m, tone
        );

        let rec = Recommendation::new(&self.name, action, round2(confidence), rationale);
        with_levels(rec, features.price, dec!(1.10), dec!(1.20), dec!(0.92), dec!(0.95))
    }
}

#[async_trait]
impl AgentAdapter for MomentumAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, ctx: &DebateContext) -> Result<Recommendation> {
        Ok(match ctx.own_last(&self.name) {
            Some(prev) => reconsider(prev, &ctx.peers_last(&self.name), ctx.guidance.as_ref()),
            None => self.opening_view(&ctx.features),
        })
    }
}

/// Concession rule applied from round 2.
///
/// - action split: a voice less confident than the peer mean steps one
///   notch toward the peer median action and averages its confidence
///   with the peers
/// - confidence split: confidence moves halfway to the peer mean
/// - price target split: target moves halfway to the peer mean target
/// - otherwise the previous view stands
pub fn reconsider(
    prev: &Recommendation,
    peers: &[&Recommendation],
    guidance: Option<&Disagreement>,
) -> Recommendation {
    let mut next = Recommendation::new(&prev.agent, prev.action, prev.confidence, prev.rationale.clone());
    next.target_price = prev.target_price;
    next.stop_loss = prev.stop_loss;

    let (Some(guidance), false) = (guidance, peers.is_empty()) else {
        return next;
    };

    let peer_confidence = peers.iter().map(|p| p.confidence).sum::<f64>() / peers.len() as f64;

    match guidance.axis {
        DivergenceAxis::Action => {
            if prev.confidence < peer_confidence {
                let target = median_action(peers);
                let stepped = prev.action.step_toward(target);
                if stepped != prev.action {
                    next.action = stepped;
                    next.rationale = format!(
                        "{}{}now {}, leaning toward peers at {}",
                        opening_notes(&prev.rationale),
                        REVISION_MARK,
                        stepped,
                        target
                    );
                    if !stepped.is_directional() {
                        next.target_price = None;
                        next.stop_loss = None;
                    }
                }
                next.confidence = round2((prev.confidence + peer_confidence) / 2.0);
            }
        }
        DivergenceAxis::Confidence => {
            next.confidence = round2((prev.confidence + peer_confidence) / 2.0);
        }
        DivergenceAxis::PriceTarget => {
            let targets: Vec<Decimal> = peers.iter().filter_map(|p| p.target_price).collect();
            if let (Some(own), false) = (prev.target_price, targets.is_empty()) {
                let mean = targets.iter().sum::<Decimal>() / Decimal::from(targets.len());
                next.target_price = Some(((own + mean) / dec!(2)).round_dp(2));
            }
        }
        DivergenceAxis::None => {}
    }

    next.confidence = next.confidence.clamp(0.0, 1.0);
    next
}

const REVISION_MARK: &str = " | revised: ";

/// Rationale as first stated, without any revision note
fn opening_notes(rationale: &str) -> &str {
    rationale.split(REVISION_MARK).next().unwrap_or(rationale)
}

/// Lower median of the peers' actions by severity
fn median_action(peers: &[&Recommendation]) -> Action {
    let mut severities: Vec<u8> = peers.iter().map(|p| p.action.severity()).collect();
    severities.sort_unstable();
    Action::from_severity(severities[(severities.len() - 1) / 2])
}

fn with_levels(
    mut rec: Recommendation,
    price: Option<Decimal>,
    buy: Decimal,
    strong_buy: Decimal,
    sell: Decimal,
    stop: Decimal,
) -> Recommendation {
    let Some(price) = price.filter(|p| *p > Decimal::ZERO) else {
        return rec;
    };
    let multiplier = match rec.action {
        Action::StrongBuy => Some(strong_buy),
        Action::Buy => Some(buy),
        Action::Sell => Some(sell),
        _ => None,
    };
    if let Some(m) = multiplier {
        rec.target_price = Some((price * m).round_dp(2));
    }
    if matches!(rec.action, Action::StrongBuy | Action::Buy) {
        rec.stop_loss = Some((price * stop).round_dp(2));
    }
    rec
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
