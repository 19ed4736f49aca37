use thiserror::Error;

use crate::domain::FinalDecision;

/// Main error type for the debate engine
#[derive(Error, Debug)]
pub enum ConclaveError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Input errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("Pattern library error: {0}")]
    PatternLibrary(String),

    // Agent errors
    #[error("Agent unavailable: {agent} - {reason}")]
    AgentUnavailable { agent: String, reason: String },

    #[error("Agent timed out: {agent} after {elapsed_ms}ms")]
    Timeout { agent: String, elapsed_ms: u64 },

    #[error("Session deadline exceeded after {elapsed_ms}ms")]
    SessionDeadline { elapsed_ms: u64 },

    #[error("Round rejected: {0}")]
    InvalidRound(String),

    /// A session that started but could not produce a consensus-bearing decision.
    /// `decision` is the INCONCLUSIVE record built from whatever transcript existed.
    #[error("Debate aborted: {cause}")]
    DebateAborted {
        #[source]
        cause: Box<ConclaveError>,
        decision: Box<FinalDecision>,
    },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Sink errors (logged by the orchestrator, never fatal to a debate)
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ConclaveError {
    pub fn agent_unavailable(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        ConclaveError::AgentUnavailable {
            agent: agent.into(),
            reason: reason.into(),
        }
    }

    /// True for every failure that ends a session in AGENT_FAILURE.
    pub fn is_agent_failure(&self) -> bool {
        match self {
            ConclaveError::AgentUnavailable { .. }
            | ConclaveError::Timeout { .. }
            | ConclaveError::SessionDeadline { .. }
            | ConclaveError::InvalidRound(_) => true,
            ConclaveError::DebateAborted { cause, .. } => cause.is_agent_failure(),
            _ => false,
        }
    }

    /// The INCONCLUSIVE decision attached to an aborted session, if any.
    pub fn aborted_decision(&self) -> Option<&FinalDecision> {
        match self {
            ConclaveError::DebateAborted { decision, .. } => Some(decision),
            _ => None,
        }
    }
}

/// Result type alias for ConclaveError
pub type Result<T> = std::result::Result<T, ConclaveError>;
