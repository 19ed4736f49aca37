use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::ConsensusStatus;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub debate: DebateConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DebateConfig {
    /// Rounds that must complete before consensus may be declared
    #[serde(default = "default_min_rounds")]
    pub min_rounds: u32,
    /// Hard cap on rounds per session
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Score at or above which the voices are considered in agreement
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,
    /// Final-round score separating PARTIAL from NO consensus at the round limit
    #[serde(default = "default_partial_threshold")]
    pub partial_consensus_threshold: f64,
    /// Timeout for one adapter call
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
    /// Extra allowance on top of max_rounds x per_call_timeout
    #[serde(default = "default_session_slack_ms")]
    pub session_slack_ms: u64,
    /// Confidence multiplier applied when the round limit forces a decision
    #[serde(default = "default_damping")]
    pub round_limit_damping: f64,
}

fn default_min_rounds() -> u32 {
    3
}

fn default_max_rounds() -> u32 {
    6
}

fn default_consensus_threshold() -> f64 {
    0.85
}

fn default_partial_threshold() -> f64 {
    0.6
}

fn default_per_call_timeout_ms() -> u64 {
    25_000
}

fn default_session_slack_ms() -> u64 {
    10_000
}

fn default_damping() -> f64 {
    0.8
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            min_rounds: default_min_rounds(),
            max_rounds: default_max_rounds(),
            consensus_threshold: default_consensus_threshold(),
            partial_consensus_threshold: default_partial_threshold(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
            session_slack_ms: default_session_slack_ms(),
            round_limit_damping: default_damping(),
        }
    }
}

impl DebateConfig {
    pub fn per_call_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    /// Outer bound on a whole session:
    /// `max_rounds * per_call_timeout + slack`
    pub fn session_deadline(&self) -> Duration {
        self.per_call_timeout() * self.max_rounds + Duration::from_millis(self.session_slack_ms)
    }

    /// Check the session rules on their own, as the orchestrator does before round 1
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        self.validate_into(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_into(&self, errors: &mut Vec<String>) {
        if self.min_rounds < 1 {
            errors.push("debate.min_rounds must be at least 1".to_string());
        }
        if self.min_rounds > self.max_rounds {
            errors.push(format!(
                "debate.min_rounds ({}) must not exceed debate.max_rounds ({})",
                self.min_rounds, self.max_rounds
            ));
        }
        if !(self.consensus_threshold > 0.0 && self.consensus_threshold <= 1.0) {
            errors.push("debate.consensus_threshold must be in (0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.partial_consensus_threshold)
            || self.partial_consensus_threshold > self.consensus_threshold
        {
            errors.push(
                "debate.partial_consensus_threshold must be in [0, consensus_threshold]".to_string(),
            );
        }
        if !(self.round_limit_damping > 0.0 && self.round_limit_damping < 1.0) {
            errors.push("debate.round_limit_damping must be between 0 and 1".to_string());
        }
        if self.per_call_timeout_ms == 0 {
            errors.push("debate.per_call_timeout_ms must be positive".to_string());
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternConfig {
    /// JSON file of historical cases; empty library when unset
    #[serde(default)]
    pub library_path: Option<PathBuf>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

fn default_top_k() -> usize {
    5
}

fn default_min_similarity() -> f64 {
    0.5
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
        }
    }
}

/// Which implementation backs a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    HeuristicValue,
    HeuristicMomentum,
    ClaudeCli,
    ChatApi,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::HeuristicValue => "heuristic_value",
            AgentKind::HeuristicMomentum => "heuristic_momentum",
            AgentKind::ClaudeCli => "claude_cli",
            AgentKind::ChatApi => "chat_api",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Unique voice name
    pub name: String,
    pub kind: AgentKind,
    /// LLM persona: value, growth or risk (default value)
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Chat API base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Env var holding the chat API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Path to the claude executable
    #[serde(default)]
    pub cli_path: Option<String>,
}

impl AgentConfig {
    pub fn heuristic(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            persona: None,
            model: None,
            base_url: None,
            api_key_env: None,
            cli_path: None,
        }
    }
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig::heuristic("value", AgentKind::HeuristicValue),
        AgentConfig::heuristic("momentum", AgentKind::HeuristicMomentum),
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub database_url: Option<String>,
    /// Append decisions to this JSON-lines file
    #[serde(default)]
    pub jsonl_path: Option<PathBuf>,
    #[serde(default = "default_save_timeout_ms")]
    pub save_timeout_ms: u64,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_save_timeout_ms() -> u64 {
    5_000
}

fn default_max_connections() -> u32 {
    5
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            jsonl_path: None,
            save_timeout_ms: default_save_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl PersistenceConfig {
    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Lowest status that triggers a notification (inconclusive, none, partial, strong)
    #[serde(default = "default_min_status")]
    pub min_status: String,
}

fn default_min_status() -> String {
    "partial".to_string()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            min_status: default_min_status(),
        }
    }
}

impl NotificationConfig {
    pub fn min_status(&self) -> Option<ConsensusStatus> {
        ConsensusStatus::try_from(self.min_status.as_str()).ok()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Also write daily-rolling log files here
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debate: DebateConfig::default(),
            patterns: PatternConfig::default(),
            agents: default_agents(),
            persistence: PersistenceConfig::default(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("debate.min_rounds", 3)?
            .set_default("debate.max_rounds", 6)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CONCLAVE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CONCLAVE__DEBATE__MAX_ROUNDS, etc.)
            .add_source(
                Environment::with_prefix("CONCLAVE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        self.debate.validate_into(&mut errors);

        if self.patterns.top_k < 1 {
            errors.push("patterns.top_k must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.patterns.min_similarity) {
            errors.push("patterns.min_similarity must be in [0, 1]".to_string());
        }

        if self.agents.is_empty() {
            errors.push("at least one agent must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                errors.push("agent names must not be empty".to_string());
            } else if !seen.insert(agent.name.as_str()) {
                errors.push(format!("duplicate agent name: {}", agent.name));
            }
            if let Some(persona) = &agent.persona {
                if !matches!(persona.as_str(), "value" | "growth" | "risk") {
                    errors.push(format!(
                        "agent {}: unknown persona '{}' (value, growth, risk)",
                        agent.name, persona
                    ));
                }
            }
        }

        if self.notifications.min_status().is_none() {
            errors.push(format!(
                "notifications.min_status '{}' is not a consensus status",
                self.notifications.min_status
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debate.min_rounds, 3);
        assert_eq!(config.debate.max_rounds, 6);
        assert_eq!(config.agents.len(), 2);
    }

    #[test]
    fn test_session_deadline() {
        let debate = DebateConfig {
            max_rounds: 4,
            per_call_timeout_ms: 1_000,
            session_slack_ms: 500,
            ..Default::default()
        };
        assert_eq!(debate.session_deadline(), Duration::from_millis(4_500));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default();
        config.debate.min_rounds = 7;
        config.debate.round_limit_damping = 1.5;
        config.patterns.top_k = 0;
        config.agents.push(AgentConfig::heuristic("value", AgentKind::HeuristicMomentum));

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.contains("duplicate agent name: value")));
    }

    #[test]
    fn test_validate_rejects_no_agents() {
        let config = AppConfig {
            agents: vec![],
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("at least one agent"));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = std::env::temp_dir().join(format!("conclave-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            r#"
[debate]
max_rounds = 4
consensus_threshold = 0.9

[[agents]]
name = "claude"
kind = "claude_cli"
persona = "risk"

[notifications]
min_status = "strong"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.debate.max_rounds, 4);
        assert_eq!(config.debate.min_rounds, 3);
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.agents[0].kind, AgentKind::ClaudeCli);
        assert_eq!(
            config.notifications.min_status(),
            Some(ConsensusStatus::StrongConsensus)
        );
        assert!(config.validate().is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }
}
