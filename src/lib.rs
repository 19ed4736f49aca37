pub mod agent;
pub mod cli;
pub mod config;
pub mod debate;
pub mod domain;
pub mod error;
pub mod market;
pub mod notify;
pub mod pattern;
pub mod persistence;
pub mod validation;

pub use agent::{AgentAdapter, AgentBackend, DebateContext, LlmAdapter};
pub use config::AppConfig;
pub use debate::{ConsensusScorer, DebateOrchestrator, DebateTranscript, RecommendationSynthesizer};
pub use domain::{
    Action, CandidateFeatures, ConsensusStatus, DebateState, FinalDecision, Recommendation,
};
pub use error::{ConclaveError, Result};
pub use market::{FileSnapshotProvider, MarketSnapshotProvider};
pub use notify::{NotificationSink, WebhookNotifier};
pub use pattern::{PatternInsights, PatternLibrary, PatternMatcher};
pub use persistence::{JsonlDecisionSink, PersistenceSink, PostgresDecisionSink};
