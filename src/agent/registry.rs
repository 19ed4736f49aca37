//! Builds the ordered list of voices from configuration.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::adapter::{AgentAdapter, LlmAdapter};
use super::chat::{ChatApiConfig, ChatCompletionsBackend};
use super::client::{ClaudeCliBackend, ClaudeCliConfig};
use super::heuristic::{MomentumAnalyst, ValueAnalyst};
use super::protocol::Persona;
use crate::config::{AgentConfig, AgentKind};
use crate::error::{ConclaveError, Result};

/// Instantiate every configured voice, preserving registration order
pub fn build_voices(
    agents: &[AgentConfig],
    per_call_timeout: Duration,
) -> Result<Vec<Arc<dyn AgentAdapter>>> {
    agents
        .iter()
        .map(|agent| {
            let voice = build_voice(agent, per_call_timeout)?;
            info!(name = %agent.name, kind = agent.kind.as_str(), "registered voice");
            Ok(voice)
        })
        .collect()
}

fn build_voice(agent: &AgentConfig, per_call_timeout: Duration) -> Result<Arc<dyn AgentAdapter>> {
    let voice: Arc<dyn AgentAdapter> = match agent.kind {
        AgentKind::HeuristicValue => Arc::new(ValueAnalyst::new(&agent.name)),
        AgentKind::HeuristicMomentum => Arc::new(MomentumAnalyst::new(&agent.name)),
        AgentKind::ClaudeCli => {
            let mut config = ClaudeCliConfig::default().with_timeout(per_call_timeout);
            if let Some(path) = &agent.cli_path {
                config.cli_path = path.clone();
            }
            if let Some(model) = &agent.model {
                config = config.with_model(model);
            }
            let backend = ClaudeCliBackend::new(&agent.name, config);
            Arc::new(LlmAdapter::new(persona_for(agent)?, Arc::new(backend)))
        }
        AgentKind::ChatApi => {
            let mut config = ChatApiConfig {
                timeout: per_call_timeout,
                ..Default::default()
            };
            if let Some(url) = &agent.base_url {
                config.base_url = url.clone();
            }
            if let Some(model) = &agent.model {
                config.model = model.clone();
            }
            let config = config.with_key_from_env(agent.api_key_env.as_deref().unwrap_or("CHAT_API_KEY"));
            let backend = ChatCompletionsBackend::new(&agent.name, config)?;
            Arc::new(LlmAdapter::new(persona_for(agent)?, Arc::new(backend)))
        }
    };
    Ok(voice)
}

fn persona_for(agent: &AgentConfig) -> Result<Persona> {
    match agent.persona.as_deref().unwrap_or("value") {
        "value" => Ok(Persona::value_investor(&agent.name)),
        "growth" => Ok(Persona::growth_analyst(&agent.name)),
        "risk" => Ok(Persona::risk_manager(&agent.name)),
        other => Err(ConclaveError::InvalidConfig(format!(
            "agent {}: unknown persona '{}'",
            agent.name, other
        ))),
    }
}
