//! Claude CLI backend using subprocess communication
//!
//! Communicates with Claude via the `claude` CLI tool. The prompt is written
//! to stdin and the reply read from stdout; parsing happens in the adapter.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::adapter::AgentBackend;
use super::protocol::PromptContext;
use crate::error::{ConclaveError, Result};

/// Configuration for the Claude CLI backend
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Path to the claude CLI executable
    pub cli_path: String,
    /// Hard limit for one subprocess call
    pub timeout: Duration,
    /// Attempts per call (1 = no retry)
    pub max_retries: u8,
    /// Model to use (e.g., "sonnet", "opus")
    pub model: Option<String>,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            cli_path: "claude".to_string(),
            timeout: Duration::from_secs(25),
            max_retries: 1,
            model: None,
        }
    }
}

impl ClaudeCliConfig {
    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Text backend that shells out to `claude --print`
pub struct ClaudeCliBackend {
    name: String,
    config: ClaudeCliConfig,
}

impl ClaudeCliBackend {
    pub fn new(name: impl Into<String>, config: ClaudeCliConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Check if the claude CLI is available
    pub async fn check_availability(&self) -> Result<bool> {
        let output = Command::new(&self.config.cli_path)
            .arg("--version")
            .output()
            .await;

        match output {
            Ok(out) => {
                if out.status.success() {
                    let version = String::from_utf8_lossy(&out.stdout);
                    info!("Claude CLI available: {}", version.trim());
                    Ok(true)
                } else {
                    warn!("Claude CLI returned error status");
                    Ok(false)
                }
            }
            Err(e) => {
                error!("Claude CLI not found at '{}': {}", self.config.cli_path, e);
                Ok(false)
            }
        }
    }

    fn build_command(&self, system: &str) -> Command {
        let mut cmd = Command::new(&self.config.cli_path);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--system-prompt")
            .arg(system)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref model) = self.config.model {
            cmd.arg("--model").arg(model);
        }
        cmd
    }

    /// Execute a single query attempt
    async fn execute(&self, prompt: &PromptContext) -> Result<String> {
        let mut cmd = self.build_command(&prompt.system);

        debug!(agent = %self.name, "spawning claude process");
        let mut child = cmd.spawn().map_err(|e| {
            ConclaveError::agent_unavailable(&self.name, format!("failed to spawn claude: {}", e))
        })?;

        // Write prompt to stdin, then close it so the CLI starts processing
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.user.as_bytes()).await.map_err(|e| {
                ConclaveError::agent_unavailable(&self.name, format!("failed to write stdin: {}", e))
            })?;
        }

        let output = timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConclaveError::Timeout {
                agent: self.name.clone(),
                elapsed_ms: self.config.timeout.as_millis() as u64,
            })?
            .map_err(|e| {
                ConclaveError::agent_unavailable(&self.name, format!("failed to read output: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConclaveError::agent_unavailable(
                &self.name,
                format!("claude exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(agent = %self.name, chars = text.len(), "claude reply received");
        Ok(text)
    }
}

#[async_trait]
impl AgentBackend for ClaudeCliBackend {
    fn label(&self) -> &str {
        "claude-cli"
    }

    async fn complete(&self, prompt: &PromptContext) -> Result<String> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.execute(prompt).await {
                Ok(text) => return Ok(text),
                // A timeout already spent the call budget
                Err(e @ ConclaveError::Timeout { .. }) => return Err(e),
                Err(e) => {
                    warn!(agent = %self.name, attempt, error = %e, "claude query failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ConclaveError::agent_unavailable(&self.name, "query failed with unknown error")
        }))
    }
}
