//! Debate voices
//!
//! This module provides:
//! - The `AgentAdapter` seam the orchestrator polls each round
//! - LLM-backed voices over the Claude CLI or a chat-completions API
//! - Internal heuristic voices
//! - Lenient parsing of free-form backend output

pub mod adapter;
pub mod chat;
pub mod client;
pub mod heuristic;
pub mod parse;
pub mod protocol;
pub mod registry;

pub use adapter::{AgentAdapter, AgentBackend, LlmAdapter};
pub use chat::{ChatApiConfig, ChatCompletionsBackend};
pub use client::{ClaudeCliBackend, ClaudeCliConfig};
pub use heuristic::{reconsider, MomentumAnalyst, ValueAnalyst};
pub use parse::{extract_json, parse_recommendation};
pub use protocol::{render_round_prompt, DebateContext, Persona, PromptContext};
pub use registry::build_voices;
