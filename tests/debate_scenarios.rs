//! End-to-end debate sessions driven by scripted voices.

use async_trait::async_trait;
use conclave::agent::{
    AgentAdapter, AgentBackend, DebateContext, LlmAdapter, MomentumAnalyst, Persona, PromptContext,
    ValueAnalyst,
};
use conclave::config::DebateConfig;
use conclave::domain::{Action, CandidateFeatures, ConsensusStatus, DebateState, FinalDecision, Recommendation};
use conclave::error::{ConclaveError, Result};
use conclave::pattern::PatternLibrary;
use conclave::persistence::PersistenceSink;
use conclave::DebateOrchestrator;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Plays one (action, confidence) per round, repeating the last entry
struct Scripted {
    name: &'static str,
    script: Vec<(Action, f64)>,
}

#[async_trait]
impl AgentAdapter for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    async fn analyze(&self, ctx: &DebateContext) -> Result<Recommendation> {
        let idx = (ctx.round as usize - 1).min(self.script.len() - 1);
        let (action, confidence) = self.script[idx];
        Ok(Recommendation::new(self.name, action, confidence, "earnings momentum"))
    }
}

struct Slow {
    delay: Duration,
}

#[async_trait]
impl AgentAdapter for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn analyze(&self, _ctx: &DebateContext) -> Result<Recommendation> {
        tokio::time::sleep(self.delay).await;
        Ok(Recommendation::new("slow", Action::Buy, 0.9, "late"))
    }
}

struct CountingSink {
    saves: AtomicUsize,
    fail: bool,
}

impl CountingSink {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            saves: AtomicUsize::new(0),
            fail,
        })
    }
}

#[async_trait]
impl PersistenceSink for CountingSink {
    async fn save(&self, _decision: &FinalDecision) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ConclaveError::Persistence("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

fn voice(name: &'static str, script: Vec<(Action, f64)>) -> Arc<dyn AgentAdapter> {
    Arc::new(Scripted { name, script })
}

fn fast_config() -> DebateConfig {
    DebateConfig {
        per_call_timeout_ms: 500,
        session_slack_ms: 500,
        ..Default::default()
    }
}

fn candidate() -> CandidateFeatures {
    CandidateFeatures::new("ACME", "Technology")
        .with_market_cap(50e9)
        .with_pe_ratio(18.0)
}

#[tokio::test]
async fn unanimous_voices_reach_strong_consensus_at_min_rounds() {
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("value", vec![(Action::Buy, 0.9)]),
            voice("growth", vec![(Action::Buy, 0.9)]),
            voice("risk", vec![(Action::Buy, 0.9)]),
        ],
        PatternLibrary::empty(),
        fast_config(),
    );

    let decision = tokio_test::assert_ok!(orchestrator.run_debate(candidate()).await);

    assert_eq!(decision.terminal_state, DebateState::ConsensusReached);
    assert_eq!(decision.consensus_status, ConsensusStatus::StrongConsensus);
    assert_eq!(decision.round_count, 3);
    assert_eq!(decision.action, Action::Buy);
    assert!((decision.confidence - 0.9).abs() < 1e-9);
    assert_eq!(decision.contributions.len(), 3);
}

#[tokio::test]
async fn close_confidences_still_count_as_agreement() {
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("a", vec![(Action::Buy, 0.80)]),
            voice("b", vec![(Action::Buy, 0.82)]),
        ],
        PatternLibrary::empty(),
        fast_config(),
    );

    let decision = orchestrator.run_debate(candidate()).await.unwrap();

    assert_eq!(decision.consensus_status, ConsensusStatus::StrongConsensus);
    assert_eq!(decision.round_count, 3);
    assert!((decision.confidence - 0.81).abs() < 1e-9);
}

#[tokio::test]
async fn opposed_voices_hit_round_limit_without_consensus() {
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("bull", vec![(Action::Buy, 0.9)]),
            voice("bear", vec![(Action::Avoid, 0.6)]),
        ],
        PatternLibrary::empty(),
        fast_config(),
    );

    let decision = orchestrator.run_debate(candidate()).await.unwrap();

    assert_eq!(decision.terminal_state, DebateState::RoundLimitReached);
    assert_eq!(decision.consensus_status, ConsensusStatus::NoConsensus);
    assert_eq!(decision.round_count, 6);
    assert_eq!(decision.action, Action::Buy);
    assert!((decision.confidence - 0.72).abs() < 1e-9);
    assert!(decision.final_score.unwrap() < 0.6);
}

#[tokio::test]
async fn near_agreement_at_round_limit_is_partial() {
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("a", vec![(Action::Buy, 0.8)]),
            voice("b", vec![(Action::StrongBuy, 0.7)]),
        ],
        PatternLibrary::empty(),
        fast_config(),
    );

    let decision = orchestrator.run_debate(candidate()).await.unwrap();

    assert_eq!(decision.consensus_status, ConsensusStatus::PartialConsensus);
    assert_eq!(decision.round_count, 6);
    assert_eq!(decision.action, Action::Buy);
    assert!((decision.confidence - 0.64).abs() < 1e-9);
}

#[tokio::test]
async fn voices_converging_late_stop_when_they_agree() {
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("steady", vec![(Action::Buy, 0.8)]),
            voice(
                "convert",
                vec![
                    (Action::Avoid, 0.7),
                    (Action::Sell, 0.7),
                    (Action::Hold, 0.7),
                    (Action::Buy, 0.8),
                ],
            ),
        ],
        PatternLibrary::empty(),
        fast_config(),
    );

    let decision = orchestrator.run_debate(candidate()).await.unwrap();

    assert_eq!(decision.terminal_state, DebateState::ConsensusReached);
    assert_eq!(decision.round_count, 4);
}

#[tokio::test]
async fn consensus_never_precedes_min_rounds() {
    let config = DebateConfig {
        min_rounds: 4,
        max_rounds: 5,
        ..fast_config()
    };
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("a", vec![(Action::Hold, 0.5)]),
            voice("b", vec![(Action::Hold, 0.5)]),
        ],
        PatternLibrary::empty(),
        config,
    );

    let decision = orchestrator.run_debate(candidate()).await.unwrap();

    assert_eq!(decision.round_count, 4);
    assert_eq!(decision.consensus_status, ConsensusStatus::StrongConsensus);
}

#[tokio::test]
async fn slow_voice_aborts_with_inconclusive_decision() {
    let config = DebateConfig {
        per_call_timeout_ms: 50,
        session_slack_ms: 50,
        ..Default::default()
    };
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("quick", vec![(Action::Buy, 0.9)]),
            Arc::new(Slow {
                delay: Duration::from_secs(2),
            }),
        ],
        PatternLibrary::empty(),
        config,
    );

    let err = tokio_test::assert_err!(orchestrator.run_debate(candidate()).await);

    assert!(err.is_agent_failure());
    match &err {
        ConclaveError::DebateAborted { cause, decision } => {
            assert!(matches!(**cause, ConclaveError::Timeout { ref agent, .. } if agent == "slow"));
            assert_eq!(decision.consensus_status, ConsensusStatus::Inconclusive);
            assert_eq!(decision.terminal_state, DebateState::AgentFailure);
            assert_eq!(decision.round_count, 0);
            assert_eq!(decision.action, Action::Hold);
            assert!(decision.contributions.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failing_sink_does_not_fail_the_debate() {
    let broken = CountingSink::new(true);
    let healthy = CountingSink::new(false);
    let orchestrator = DebateOrchestrator::new(
        vec![
            voice("a", vec![(Action::Buy, 0.9)]),
            voice("b", vec![(Action::Buy, 0.9)]),
        ],
        PatternLibrary::empty(),
        fast_config(),
    )
    .with_persistence(broken.clone(), Duration::from_millis(200))
    .with_persistence(healthy.clone(), Duration::from_millis(200));

    let decision = orchestrator.run_debate(candidate()).await.unwrap();

    assert_eq!(decision.consensus_status, ConsensusStatus::StrongConsensus);
    assert_eq!(broken.saves.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.saves.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_candidate_is_rejected_before_any_round() {
    let sink = CountingSink::new(false);
    let calls = Arc::new(AtomicUsize::new(0));

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl AgentAdapter for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn analyze(&self, _ctx: &DebateContext) -> Result<Recommendation> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Recommendation::new("counting", Action::Hold, 0.5, ""))
        }
    }

    let orchestrator = DebateOrchestrator::new(
        vec![Arc::new(Counting(calls.clone()))],
        PatternLibrary::empty(),
        fast_config(),
    )
    .with_persistence(sink.clone(), Duration::from_millis(200));

    let features = CandidateFeatures::new("ACME", "Technology").with_pe_ratio(f64::NAN);
    let err = orchestrator.run_debate(features).await.unwrap_err();

    assert!(matches!(err, ConclaveError::Validation(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(sink.saves.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_library_yields_neutral_insights() {
    let orchestrator = DebateOrchestrator::new(
        vec![voice("only", vec![(Action::Hold, 0.5)])],
        PatternLibrary::empty(),
        fast_config(),
    );

    let insights = orchestrator.insights_for(&candidate());
    assert_eq!(insights.success_probability, 0.5);
    assert!(insights.positive.is_empty());
    assert!(insights.negative.is_empty());

    let decision = orchestrator.run_debate(candidate()).await.unwrap();
    assert_eq!(decision.success_probability, 0.5);
    // One voice always agrees with itself
    assert_eq!(decision.final_score, Some(1.0));
    assert_eq!(decision.round_count, 3);
}

#[tokio::test]
async fn heuristic_voices_finish_within_round_limit() {
    let orchestrator = DebateOrchestrator::new(
        vec![
            Arc::new(ValueAnalyst::new("value")),
            Arc::new(MomentumAnalyst::new("momentum")),
        ],
        PatternLibrary::empty(),
        fast_config(),
    );
    let features = candidate()
        .with_price(dec!(120))
        .with_price_to_book(2.0)
        .with_changes(-1.5, -6.0, -18.0);

    let decision = orchestrator.run_debate(features).await.unwrap();

    assert!(decision.round_count >= 1 && decision.round_count <= 6);
    assert!(decision.is_actionable());
    assert!((0.0..=1.0).contains(&decision.confidence));
    let names: Vec<&str> = decision.contributions.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(names, vec!["value", "momentum"]);
}

/// Backend whose replies carry no recommendation at all
struct Babbling;

#[async_trait]
impl AgentBackend for Babbling {
    fn label(&self) -> &str {
        "babbling"
    }

    async fn complete(&self, _prompt: &PromptContext) -> Result<String> {
        Ok("lorem ipsum dolor sit amet".to_string())
    }
}

#[tokio::test]
async fn unreadable_backends_never_yield_strong_consensus() {
    let backend: Arc<dyn AgentBackend> = Arc::new(Babbling);
    let orchestrator = DebateOrchestrator::new(
        vec![
            Arc::new(LlmAdapter::new(Persona::value_investor("claude"), backend.clone())),
            Arc::new(LlmAdapter::new(Persona::risk_manager("grok"), backend)),
        ],
        PatternLibrary::empty(),
        fast_config(),
    );

    let decision = orchestrator.run_debate(candidate()).await.unwrap();

    assert_eq!(decision.terminal_state, DebateState::ConsensusReached);
    assert_eq!(decision.consensus_status, ConsensusStatus::PartialConsensus);
    assert_eq!(decision.action, Action::Hold);
    assert!(decision.contributions.iter().all(|r| r.parse_failed));
    assert!(decision.rationale.contains("2 of 2 final answers could not be parsed"));
}
