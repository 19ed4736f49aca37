//! Multi-round debate engine
//!
//! - `scorer`: pairwise agreement and divergence axis of one round
//! - `transcript`: round records, append-only per session
//! - `orchestrator`: the session state machine
//! - `synthesizer`: transcript to `FinalDecision`

pub mod orchestrator;
pub mod scorer;
pub mod synthesizer;
pub mod transcript;

pub use orchestrator::DebateOrchestrator;
pub use scorer::{ConsensusScorer, ScoreWeights, ScoredRound};
pub use synthesizer::{
    modal_action, shared_themes, RecommendationSynthesizer, SessionSummary, THEME_VOCABULARY,
};
pub use transcript::{
    ConsensusScore, DebateRound, DebateTranscript, Disagreement, DivergenceAxis, PairwiseScore,
};
