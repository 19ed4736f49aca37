//! Agent communication protocol definitions
//!
//! Defines what a voice sees each round and how that view is rendered into
//! a prompt for text-generating backends.

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::debate::{DebateTranscript, Disagreement};
use crate::domain::{CandidateFeatures, Recommendation};
use crate::pattern::PatternInsights;

/// Read-only snapshot handed to every voice for one round.
///
/// All fields are shared behind `Arc`, so cloning per voice is cheap and
/// no voice can mutate session state.
#[derive(Debug, Clone)]
pub struct DebateContext {
    pub features: Arc<CandidateFeatures>,
    pub insights: Arc<PatternInsights>,
    /// Completed rounds before this one
    pub transcript: Arc<DebateTranscript>,
    /// 1-based round number
    pub round: u32,
    /// Divergence descriptor of the previous round, if any
    pub guidance: Option<Disagreement>,
}

impl DebateContext {
    pub fn new(
        features: Arc<CandidateFeatures>,
        insights: Arc<PatternInsights>,
        transcript: Arc<DebateTranscript>,
        round: u32,
    ) -> Self {
        let guidance = transcript.last().map(|r| r.disagreement.clone());
        Self {
            features,
            insights,
            transcript,
            round,
            guidance,
        }
    }

    /// This voice's previous recommendation
    pub fn own_last(&self, agent: &str) -> Option<&Recommendation> {
        self.transcript
            .last()
            .and_then(|r| r.recommendation_for(agent))
    }

    /// Everyone else's recommendations from the previous round
    pub fn peers_last<'a>(&'a self, agent: &'a str) -> Vec<&'a Recommendation> {
        self.transcript
            .last()
            .map(|r| {
                r.recommendations
                    .iter()
                    .filter(|rec| rec.agent != agent)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Prompt pair sent to a text backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptContext {
    pub system: String,
    pub user: String,
}

/// A voice's standing instructions
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub name: String,
    pub role: String,
    pub focus: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, role: impl Into<String>, focus: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            focus: focus.into(),
        }
    }

    pub fn value_investor(name: impl Into<String>) -> Self {
        Self::new(
            name,
            "disciplined value investor",
            "valuation multiples, balance-sheet strength, margin of safety",
        )
    }

    pub fn growth_analyst(name: impl Into<String>) -> Self {
        Self::new(
            name,
            "growth and momentum analyst",
            "revenue growth, price trend, catalysts and market sentiment",
        )
    }

    pub fn risk_manager(name: impl Into<String>) -> Self {
        Self::new(
            name,
            "skeptical risk manager",
            "downside scenarios, leverage, volatility and historical failures",
        )
    }

    pub fn system_prompt(&self) -> String {
        format!(
            r#"You are {name}, a {role} taking part in a structured investment debate with other analysts.

Focus on: {focus}.

Each round you see the candidate's data, historical precedents, and what the other analysts said last round.
Engage with their arguments. Change your view only when the evidence warrants it.

Respond ONLY with JSON matching this schema:
{{
    "action": "STRONG_BUY" | "BUY" | "HOLD" | "SELL" | "AVOID",
    "confidence": 0.0 to 1.0,
    "rationale": "2-4 sentences",
    "target_price": number or null,
    "stop_loss": number or null
}}"#,
            name = self.name,
            role = self.role,
            focus = self.focus,
        )
    }
}

/// Render the round context into the user half of a prompt
pub fn render_round_prompt(ctx: &DebateContext) -> String {
    let mut out = String::new();
    let f = &ctx.features;

    let _ = writeln!(out, "## Round {}", ctx.round);
    let _ = writeln!(out);
    let _ = writeln!(out, "## Candidate: {} ({})", f.display_name(), f.id);
    let _ = writeln!(out, "Sector: {}", f.sector);
    let _ = writeln!(out, "Size bucket: {}", f.size_bucket());
    if let Some(v) = f.market_cap {
        let _ = writeln!(out, "Market cap: {:.0}", v);
    }
    if let Some(v) = f.pe_ratio {
        let _ = writeln!(out, "P/E: {:.2}", v);
    }
    if let Some(v) = f.price_to_book {
        let _ = writeln!(out, "P/B: {:.2}", v);
    }
    if let Some(p) = f.price {
        let _ = writeln!(out, "Price: {}", p);
    }
    for (label, change) in [
        ("1d", f.change_1d_pct),
        ("5d", f.change_5d_pct),
        ("20d", f.change_20d_pct),
    ] {
        if let Some(c) = change {
            let _ = writeln!(out, "Change {}: {:+.2}%", label, c);
        }
    }

    let insights = &ctx.insights;
    let _ = writeln!(out);
    let _ = writeln!(out, "## Historical precedents");
    let _ = writeln!(out, "{}", insights.historical_comparison());
    let _ = writeln!(out, "Risk bucket: {}", insights.risk);
    for p in insights.positive.iter().chain(insights.negative.iter()) {
        let _ = writeln!(
            out,
            "- {} [{}] similarity {:.2}, outcome {:+.1}%{}",
            p.label,
            p.sector,
            p.similarity,
            p.outcome_pct,
            if p.factors.is_empty() {
                String::new()
            } else {
                format!(" ({})", p.factors.join(", "))
            }
        );
    }

    if let Some(last) = ctx.transcript.last() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "## Previous round {} (agreement {:.2})",
            last.round,
            last.score.value()
        );
        for rec in &last.recommendations {
            let _ = writeln!(
                out,
                "- {}: {} at {:.0}% confidence. {}",
                rec.agent,
                rec.action,
                rec.confidence * 100.0,
                truncate(&rec.rationale, 280)
            );
        }
    }

    if let Some(guidance) = &ctx.guidance {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Moderator guidance ({})", guidance.axis);
        let _ = writeln!(out, "{}", guidance.guidance);
    }

    out
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::{ConsensusScore, DebateRound};
    use crate::domain::Action;
    use chrono::Utc;

    fn context_with_history() -> DebateContext {
        let mut transcript = DebateTranscript::new();
        transcript.push(DebateRound {
            round: 1,
            recommendations: vec![
                Recommendation::new("value", Action::Buy, 0.7, "cheap on earnings"),
                Recommendation::new("risk", Action::Avoid, 0.6, "too much leverage"),
            ],
            score: ConsensusScore::new(0.3).unwrap(),
            pairwise: vec![],
            disagreement: Disagreement {
                guidance: "Voices split between BUY / AVOID".to_string(),
                ..Disagreement::none()
            },
            completed_at: Utc::now(),
        });

        DebateContext::new(
            Arc::new(CandidateFeatures::new("ACME", "Industrials").with_pe_ratio(11.0)),
            Arc::new(PatternInsights::neutral(0)),
            Arc::new(transcript),
            2,
        )
    }

    #[test]
    fn test_guidance_comes_from_last_round() {
        let ctx = context_with_history();
        assert!(ctx.guidance.is_some());
        assert_eq!(ctx.own_last("value").map(|r| r.action), Some(Action::Buy));
        assert_eq!(ctx.peers_last("value").len(), 1);
        assert_eq!(ctx.peers_last("value")[0].agent, "risk");
    }

    #[test]
    fn test_render_round_prompt() {
        let prompt = render_round_prompt(&context_with_history());
        assert!(prompt.contains("## Round 2"));
        assert!(prompt.contains("P/E: 11.00"));
        assert!(prompt.contains("risk: AVOID at 60% confidence"));
        assert!(prompt.contains("Moderator guidance"));
    }

    #[test]
    fn test_first_round_has_no_guidance() {
        let ctx = DebateContext::new(
            Arc::new(CandidateFeatures::new("ACME", "Industrials")),
            Arc::new(PatternInsights::neutral(0)),
            Arc::new(DebateTranscript::new()),
            1,
        );
        assert!(ctx.guidance.is_none());
        assert!(ctx.peers_last("value").is_empty());
        assert!(!render_round_prompt(&ctx).contains("Previous round"));
    }

    #[test]
    fn test_persona_prompt_names_schema() {
        let prompt = Persona::risk_manager("skeptic").system_prompt();
        assert!(prompt.contains("You are skeptic"));
        assert!(prompt.contains("\"confidence\""));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
