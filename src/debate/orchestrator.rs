//! Debate session runner.
//!
//! One call to [`DebateOrchestrator::run_debate`] owns one session from
//! `INIT` to `TERMINATED`:
//!
//! 1. check the session rules, validate the candidate and match it
//!    against the pattern library
//! 2. poll every voice concurrently, each call under `per_call_timeout`
//! 3. score the complete round and append it to the transcript
//! 4. stop on consensus (score ≥ threshold and round ≥ min_rounds), at
//!    max_rounds, or on the first unavailable voice
//! 5. synthesize the decision, hand it to the sinks, release the transcript
//!
//! The whole loop runs under the session deadline
//! `max_rounds * per_call_timeout + slack`, unless replaced with
//! [`DebateOrchestrator::with_session_deadline`].

use futures::future::{join, join_all};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::scorer::ConsensusScorer;
use super::synthesizer::{RecommendationSynthesizer, SessionSummary};
use super::transcript::{DebateRound, DebateTranscript};
use crate::agent::{AgentAdapter, DebateContext};
use crate::config::DebateConfig;
use crate::domain::{
    CandidateFeatures, ConsensusStatus, DebateState, FinalDecision, Recommendation, StateTransition,
};
use crate::error::{ConclaveError, Result};
use crate::notify::NotificationSink;
use crate::pattern::{PatternInsights, PatternLibrary, PatternMatcher};
use crate::persistence::PersistenceSink;
use crate::validation::validate_candidate;

/// Mutable state of one session; never shared outside `run_debate`
struct DebateSession {
    id: Uuid,
    state: DebateState,
    transcript: DebateTranscript,
    transitions: Vec<StateTransition>,
    started: Instant,
}

impl DebateSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: DebateState::Init,
            transcript: DebateTranscript::new(),
            transitions: Vec::new(),
            started: Instant::now(),
        }
    }

    fn transition(&mut self, to: DebateState, round: u32, reason: impl Into<String>) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(ConclaveError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        let transition = StateTransition::new(self.state, to, round, reason);
        debug!(
            session = %self.id,
            from = %transition.from,
            to = %transition.to,
            round,
            reason = %transition.reason,
            "state transition"
        );
        self.transitions.push(transition);
        self.state = to;
        Ok(())
    }

    /// "INIT -> ROUND_IN_PROGRESS -> ..." for logs
    fn path(&self) -> String {
        let mut states = vec![DebateState::Init.as_str()];
        states.extend(self.transitions.iter().map(|t| t.to.as_str()));
        states.join(" -> ")
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Outcome of one loop pass
enum RoundOutcome {
    Continue,
    Finished(DebateState),
}

pub struct DebateOrchestrator {
    voices: Vec<Arc<dyn AgentAdapter>>,
    library: PatternLibrary,
    matcher: PatternMatcher,
    scorer: ConsensusScorer,
    synthesizer: RecommendationSynthesizer,
    config: DebateConfig,
    persistence: Vec<Arc<dyn PersistenceSink>>,
    save_timeout: Duration,
    notifier: Option<(Arc<dyn NotificationSink>, ConsensusStatus)>,
    session_deadline: Option<Duration>,
}

impl DebateOrchestrator {
    /// Voices are polled and recorded in the order given here
    pub fn new(
        voices: Vec<Arc<dyn AgentAdapter>>,
        library: PatternLibrary,
        config: DebateConfig,
    ) -> Self {
        Self {
            voices,
            library,
            matcher: PatternMatcher::default(),
            scorer: ConsensusScorer::default(),
            synthesizer: RecommendationSynthesizer::from_config(&config),
            config,
            persistence: Vec::new(),
            save_timeout: Duration::from_secs(5),
            notifier: None,
            session_deadline: None,
        }
    }

    pub fn with_matcher(mut self, matcher: PatternMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Replace the `max_rounds * per_call_timeout + slack` session bound
    pub fn with_session_deadline(mut self, deadline: Duration) -> Self {
        self.session_deadline = Some(deadline);
        self
    }

    /// Add a sink; every sink gets every decision, each bounded by `save_timeout`
    pub fn with_persistence(mut self, sink: Arc<dyn PersistenceSink>, save_timeout: Duration) -> Self {
        self.persistence.push(sink);
        self.save_timeout = save_timeout;
        self
    }

    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>, min_status: ConsensusStatus) -> Self {
        self.notifier = Some((sink, min_status));
        self
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    pub fn voice_names(&self) -> Vec<&str> {
        self.voices.iter().map(|v| v.name()).collect()
    }

    /// Pattern insights for a candidate without running a debate
    pub fn insights_for(&self, features: &CandidateFeatures) -> PatternInsights {
        self.matcher.match_candidate(features, &self.library)
    }

    /// Run one debate session to completion.
    ///
    /// Returns the decision for consensus and round-limit outcomes.
    /// Inconsistent session rules fail with `InvalidConfig` and malformed
    /// features with `Validation`, both before round 1. Any
    /// voice failure, timeout, rejected round or session deadline fails
    /// with `DebateAborted`, which carries the INCONCLUSIVE decision.
    pub async fn run_debate(&self, features: CandidateFeatures) -> Result<FinalDecision> {
        self.config
            .validate()
            .map_err(|errors| ConclaveError::InvalidConfig(errors.join("; ")))?;
        validate_candidate(&features)?;
        if self.voices.is_empty() {
            return Err(ConclaveError::InvalidConfig("no voices registered".to_string()));
        }

        let insights = Arc::new(self.insights_for(&features));
        let features = Arc::new(features);
        let mut session = DebateSession::new();

        info!(
            session = %session.id,
            candidate = %features.id,
            voices = self.voices.len(),
            success_probability = insights.success_probability,
            risk = %insights.risk,
            "debate started"
        );

        let deadline = session.started
            + self
                .session_deadline
                .unwrap_or_else(|| self.config.session_deadline());
        let result = self.run_rounds(&mut session, &features, &insights, deadline).await;

        let summary = SessionSummary {
            session_id: session.id,
            candidate_id: &features.id,
            insights: &insights,
        };

        match result {
            Ok(terminal) => {
                let decision = self
                    .synthesizer
                    .synthesize(&summary, &session.transcript, terminal);
                session.transition(DebateState::Terminated, decision.round_count, "decision emitted")?;
                info!(
                    session = %session.id,
                    candidate = %decision.candidate_id,
                    action = %decision.action,
                    confidence = decision.confidence,
                    status = %decision.consensus_status,
                    rounds = decision.round_count,
                    elapsed_ms = session.elapsed_ms(),
                    "debate finished"
                );
                debug!(session = %session.id, path = %session.path(), "session path");
                self.publish(&decision).await;
                Ok(decision)
            }
            Err(cause) => {
                let round = session.transcript.len() as u32 + 1;
                error!(session = %session.id, round, error = %cause, "debate aborted");
                if session.state == DebateState::RoundInProgress {
                    session.transition(DebateState::AgentFailure, round, cause.to_string())?;
                }
                let decision =
                    self.synthesizer
                        .inconclusive(&summary, &session.transcript, &cause.to_string());
                if session.state == DebateState::AgentFailure {
                    session.transition(DebateState::Terminated, decision.round_count, "aborted")?;
                }
                debug!(session = %session.id, path = %session.path(), "session path");
                self.publish(&decision).await;
                Err(ConclaveError::DebateAborted {
                    cause: Box::new(cause),
                    decision: Box::new(decision),
                })
            }
        }
    }

    /// Drive rounds until an outcome state; `Err` means the session must abort
    async fn run_rounds(
        &self,
        session: &mut DebateSession,
        features: &Arc<CandidateFeatures>,
        insights: &Arc<PatternInsights>,
        deadline: Instant,
    ) -> Result<DebateState> {
        session.transition(DebateState::RoundInProgress, 1, "session started")?;

        for round in 1..=self.config.max_rounds {
            let ctx = DebateContext::new(
                features.clone(),
                insights.clone(),
                Arc::new(session.transcript.clone()),
                round,
            );

            let recommendations = timeout_at(deadline, self.poll_round(&ctx))
                .await
                .map_err(|_| ConclaveError::SessionDeadline {
                    elapsed_ms: session.elapsed_ms(),
                })??;

            let scored = self.scorer.score(&recommendations)?;
            let score = scored.score.value();
            debug!(
                session = %session.id,
                round,
                score,
                axis = %scored.disagreement.axis,
                "round scored"
            );
            for rec in recommendations.iter().filter(|r| r.parse_failed) {
                warn!(session = %session.id, round, agent = %rec.agent, "round includes unparsed output");
            }

            session.transcript.push(DebateRound {
                round,
                recommendations,
                score: scored.score,
                pairwise: scored.pairwise,
                disagreement: scored.disagreement,
                completed_at: chrono::Utc::now(),
            });

            match self.decide(round, score) {
                RoundOutcome::Finished(state) => {
                    session.transition(state, round, format!("score {:.3} at round {}", score, round))?;
                    return Ok(state);
                }
                RoundOutcome::Continue => {
                    session.transition(DebateState::RoundInProgress, round + 1, "next round")?;
                }
            }
        }

        // max_rounds == 0 never enters the loop; config validation rejects it
        Err(ConclaveError::InvalidConfig(
            "max_rounds must be at least 1".to_string(),
        ))
    }

    fn decide(&self, round: u32, score: f64) -> RoundOutcome {
        if score >= self.config.consensus_threshold && round >= self.config.min_rounds {
            RoundOutcome::Finished(DebateState::ConsensusReached)
        } else if round >= self.config.max_rounds {
            RoundOutcome::Finished(DebateState::RoundLimitReached)
        } else {
            RoundOutcome::Continue
        }
    }

    /// Poll every voice concurrently. All calls finish (or time out) before
    /// the round is assembled; the first failure in registration order wins.
    async fn poll_round(&self, ctx: &DebateContext) -> Result<Vec<Recommendation>> {
        let per_call = self.config.per_call_timeout();

        let calls = self.voices.iter().map(|voice| async move {
            let name = voice.name().to_string();
            match timeout(per_call, voice.analyze(ctx)).await {
                Ok(Ok(mut rec)) => {
                    rec.agent = name;
                    Ok(rec)
                }
                Ok(Err(e)) if e.is_agent_failure() => Err(e),
                Ok(Err(e)) => Err(ConclaveError::agent_unavailable(name, e.to_string())),
                Err(_) => Err(ConclaveError::Timeout {
                    agent: name,
                    elapsed_ms: per_call.as_millis() as u64,
                }),
            }
        });

        let results = join_all(calls).await;

        let mut recommendations = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(rec) => recommendations.push(rec),
                Err(e) => {
                    error!(round = ctx.round, error = %e, "voice failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(recommendations),
        }
    }

    /// Hand the decision to every sink concurrently; failures are logged only.
    /// The caller waits at most one `save_timeout`.
    async fn publish(&self, decision: &FinalDecision) {
        let saves = self.persistence.iter().enumerate().map(|(index, sink)| async move {
            match timeout(self.save_timeout, sink.save(decision)).await {
                Ok(Ok(())) => debug!(sink = index, session = %decision.session_id, "decision saved"),
                Ok(Err(e)) => warn!(sink = index, error = %e, "failed to persist decision"),
                Err(_) => warn!(
                    sink = index,
                    timeout_ms = self.save_timeout.as_millis() as u64,
                    "persisting decision timed out"
                ),
            }
        });

        let notify = async {
            let Some((notifier, min_status)) = &self.notifier else {
                return;
            };
            if decision.consensus_status < *min_status {
                return;
            }
            match timeout(self.save_timeout, notifier.notify(decision)).await {
                Ok(Ok(())) => debug!(session = %decision.session_id, "notification sent"),
                Ok(Err(e)) => warn!(error = %e, "failed to send notification"),
                Err(_) => warn!("notification timed out"),
            }
        };

        join(join_all(saves), notify).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Action;
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::atomic::{AtomicU32, Ordering};

    mock! {
        pub Sink {}

        #[async_trait]
        impl PersistenceSink for Sink {
            async fn save(&self, decision: &FinalDecision) -> Result<()>;
        }
    }

    /// Returns the same view every round
    struct Fixed {
        name: &'static str,
        action: Action,
        confidence: f64,
    }

    #[async_trait]
    impl AgentAdapter for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn analyze(&self, _ctx: &DebateContext) -> Result<Recommendation> {
            Ok(Recommendation::new(self.name, self.action, self.confidence, "steady growth"))
        }
    }

    /// Fails on a given round
    struct FailsOn {
        round: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AgentAdapter for FailsOn {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn analyze(&self, ctx: &DebateContext) -> Result<Recommendation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if ctx.round == self.round {
                Err(ConclaveError::agent_unavailable("flaky", "connection reset"))
            } else {
                Ok(Recommendation::new("flaky", Action::Buy, 0.9, "fine"))
            }
        }
    }

    fn fast_config() -> DebateConfig {
        DebateConfig {
            per_call_timeout_ms: 200,
            session_slack_ms: 200,
            ..Default::default()
        }
    }

    fn fixed(name: &'static str, action: Action, confidence: f64) -> Arc<dyn AgentAdapter> {
        Arc::new(Fixed {
            name,
            action,
            confidence,
        })
    }

    #[tokio::test]
    async fn test_consensus_waits_for_min_rounds() {
        let orchestrator = DebateOrchestrator::new(
            vec![fixed("a", Action::Buy, 0.9), fixed("b", Action::Buy, 0.9)],
            PatternLibrary::empty(),
            fast_config(),
        );
        let decision = orchestrator
            .run_debate(CandidateFeatures::new("ACME", "Technology"))
            .await
            .unwrap();

        assert_eq!(decision.round_count, 3);
        assert_eq!(decision.terminal_state, DebateState::ConsensusReached);
        assert_eq!(decision.consensus_status, ConsensusStatus::StrongConsensus);
        assert!(decision.rationale.contains("growth"));
    }

    #[tokio::test]
    async fn test_failure_mid_session_keeps_transcript() {
        let flaky = Arc::new(FailsOn {
            round: 2,
            calls: AtomicU32::new(0),
        });
        let orchestrator = DebateOrchestrator::new(
            vec![fixed("a", Action::Buy, 0.6), flaky.clone()],
            PatternLibrary::empty(),
            fast_config(),
        );

        let err = orchestrator
            .run_debate(CandidateFeatures::new("ACME", "Technology"))
            .await
            .unwrap_err();

        assert!(err.is_agent_failure());
        let decision = err.aborted_decision().unwrap();
        assert_eq!(decision.consensus_status, ConsensusStatus::Inconclusive);
        assert_eq!(decision.round_count, 1);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let mut sink = MockSink::new();
        sink.expect_save()
            .times(1)
            .returning(|_| Err(ConclaveError::Persistence("disk full".to_string())));

        let orchestrator = DebateOrchestrator::new(
            vec![fixed("a", Action::Hold, 0.5)],
            PatternLibrary::empty(),
            fast_config(),
        )
        .with_persistence(Arc::new(sink), Duration::from_millis(100));

        let decision = orchestrator
            .run_debate(CandidateFeatures::new("ACME", "Technology"))
            .await
            .unwrap();
        assert_eq!(decision.consensus_status, ConsensusStatus::StrongConsensus);
    }

    #[tokio::test]
    async fn test_inconclusive_decision_is_persisted() {
        let mut sink = MockSink::new();
        sink.expect_save()
            .withf(|d: &FinalDecision| d.consensus_status == ConsensusStatus::Inconclusive)
            .times(1)
            .returning(|_| Ok(()));

        let flaky = Arc::new(FailsOn {
            round: 1,
            calls: AtomicU32::new(0),
        });
        let orchestrator =
            DebateOrchestrator::new(vec![flaky], PatternLibrary::empty(), fast_config())
                .with_persistence(Arc::new(sink), Duration::from_millis(100));

        let err = orchestrator
            .run_debate(CandidateFeatures::new("ACME", "Technology"))
            .await
            .unwrap_err();
        assert_eq!(err.aborted_decision().map(|d| d.round_count), Some(0));
    }

    #[tokio::test]
    async fn test_validation_error_before_round_one() {
        let orchestrator = DebateOrchestrator::new(
            vec![fixed("a", Action::Buy, 0.9)],
            PatternLibrary::empty(),
            fast_config(),
        );
        let err = orchestrator
            .run_debate(CandidateFeatures::new("", "Technology"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConclaveError::Validation(_)));
        assert!(err.aborted_decision().is_none());
    }

    #[tokio::test]
    async fn test_inconsistent_rules_rejected_before_round_one() {
        let counter = Arc::new(FailsOn {
            round: 99,
            calls: AtomicU32::new(0),
        });
        let config = DebateConfig {
            min_rounds: 5,
            max_rounds: 3,
            ..fast_config()
        };
        let orchestrator = DebateOrchestrator::new(
            vec![fixed("a", Action::Buy, 0.9), counter.clone()],
            PatternLibrary::empty(),
            config,
        );

        let err = orchestrator
            .run_debate(CandidateFeatures::new("ACME", "Technology"))
            .await
            .unwrap_err();

        match err {
            ConclaveError::InvalidConfig(msg) => assert!(msg.contains("min_rounds (5)")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    }

    /// Answers only after `delay`
    struct Sleepy {
        delay: Duration,
    }

    #[async_trait]
    impl AgentAdapter for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn analyze(&self, _ctx: &DebateContext) -> Result<Recommendation> {
            tokio::time::sleep(self.delay).await;
            Ok(Recommendation::new("sleepy", Action::Buy, 0.9, "late"))
        }
    }

    #[tokio::test]
    async fn test_session_deadline_aborts() {
        let config = DebateConfig {
            per_call_timeout_ms: 2_000,
            ..fast_config()
        };
        let orchestrator = DebateOrchestrator::new(
            vec![
                fixed("a", Action::Buy, 0.9),
                Arc::new(Sleepy {
                    delay: Duration::from_millis(500),
                }),
            ],
            PatternLibrary::empty(),
            config,
        )
        .with_session_deadline(Duration::from_millis(100));

        let err = orchestrator
            .run_debate(CandidateFeatures::new("ACME", "Technology"))
            .await
            .unwrap_err();

        assert!(err.is_agent_failure());
        match &err {
            ConclaveError::DebateAborted { cause, decision } => {
                assert!(matches!(**cause, ConclaveError::SessionDeadline { .. }));
                assert_eq!(decision.consensus_status, ConsensusStatus::Inconclusive);
                assert_eq!(decision.terminal_state, DebateState::AgentFailure);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct SlowSink {
        delay: Duration,
        saved: AtomicU32,
    }

    #[async_trait]
    impl PersistenceSink for SlowSink {
        async fn save(&self, _decision: &FinalDecision) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.saved.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sinks_are_awaited_together() {
        let sink = || {
            Arc::new(SlowSink {
                delay: Duration::from_millis(300),
                saved: AtomicU32::new(0),
            })
        };
        let (first, second) = (sink(), sink());
        let orchestrator = DebateOrchestrator::new(
            vec![fixed("a", Action::Buy, 0.9)],
            PatternLibrary::empty(),
            fast_config(),
        )
        .with_persistence(first.clone(), Duration::from_secs(2))
        .with_persistence(second.clone(), Duration::from_secs(2));

        let started = std::time::Instant::now();
        orchestrator
            .run_debate(CandidateFeatures::new("ACME", "Technology"))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(550));
        assert_eq!(first.saved.load(Ordering::SeqCst), 1);
        assert_eq!(second.saved.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_transitions() {
        let mut session = DebateSession::new();
        session.transition(DebateState::RoundInProgress, 1, "start").unwrap();
        session.transition(DebateState::RoundInProgress, 2, "next").unwrap();
        session.transition(DebateState::RoundLimitReached, 2, "limit").unwrap();

        let err = session.transition(DebateState::RoundInProgress, 3, "again").unwrap_err();
        assert!(matches!(err, ConclaveError::InvalidStateTransition { .. }));

        session.transition(DebateState::Terminated, 2, "done").unwrap();
        assert_eq!(
            session.path(),
            "INIT -> ROUND_IN_PROGRESS -> ROUND_IN_PROGRESS -> ROUND_LIMIT_REACHED -> TERMINATED"
        );
    }

    #[test]
    fn test_decide() {
        let orchestrator = DebateOrchestrator::new(vec![], PatternLibrary::empty(), DebateConfig::default());
        assert!(matches!(orchestrator.decide(2, 1.0), RoundOutcome::Continue));
        assert!(matches!(
            orchestrator.decide(3, 0.85),
            RoundOutcome::Finished(DebateState::ConsensusReached)
        ));
        assert!(matches!(orchestrator.decide(5, 0.5), RoundOutcome::Continue));
        assert!(matches!(
            orchestrator.decide(6, 0.5),
            RoundOutcome::Finished(DebateState::RoundLimitReached)
        ));
    }
}
