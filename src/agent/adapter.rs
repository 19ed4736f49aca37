//! Adapter seam between the orchestrator and individual voices.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::parse::parse_recommendation;
use super::protocol::{render_round_prompt, DebateContext, Persona, PromptContext};
use crate::domain::Recommendation;
use crate::error::{ConclaveError, Result};

/// One voice in the debate.
///
/// Implementations must not hold references into the context past the
/// call. Errors mean the voice is unavailable and abort the session; a
/// voice that answered with garbage should instead return a
/// `parse_failed` recommendation.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Stable, unique name used in transcripts
    fn name(&self) -> &str;

    async fn analyze(&self, ctx: &DebateContext) -> Result<Recommendation>;
}

/// Raw text generator behind an [`LlmAdapter`]
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Short label for logs ("claude-cli", "chat-api")
    fn label(&self) -> &str;

    async fn complete(&self, prompt: &PromptContext) -> Result<String>;
}

/// Voice that renders the context into a prompt, calls a text backend
/// and parses the reply leniently.
pub struct LlmAdapter {
    persona: Persona,
    backend: Arc<dyn AgentBackend>,
}

impl LlmAdapter {
    pub fn new(persona: Persona, backend: Arc<dyn AgentBackend>) -> Self {
        Self { persona, backend }
    }

    fn build_prompt(&self, ctx: &DebateContext) -> PromptContext {
        PromptContext {
            system: self.persona.system_prompt(),
            user: render_round_prompt(ctx),
        }
    }
}

#[async_trait]
impl AgentAdapter for LlmAdapter {
    fn name(&self) -> &str {
        &self.persona.name
    }

    async fn analyze(&self, ctx: &DebateContext) -> Result<Recommendation> {
        let prompt = self.build_prompt(ctx);
        debug!(
            agent = %self.persona.name,
            backend = self.backend.label(),
            round = ctx.round,
            prompt_chars = prompt.user.len(),
            "querying backend"
        );

        let raw = self.backend.complete(&prompt).await.map_err(|e| match e {
            e @ (ConclaveError::AgentUnavailable { .. } | ConclaveError::Timeout { .. }) => e,
            other => ConclaveError::agent_unavailable(&self.persona.name, other.to_string()),
        })?;

        let rec = parse_recommendation(&self.persona.name, &raw);
        if rec.parse_failed {
            warn!(agent = %self.persona.name, round = ctx.round, "degraded to HOLD after parse failure");
        }
        Ok(rec)
    }
}
