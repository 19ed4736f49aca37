//! Decision persistence
//!
//! This module provides the sinks a finished session is handed to:
//! - PostgreSQL decision store (JSONB payload per session)
//! - Append-only JSON-lines file
//!
//! plus a PostgreSQL-backed pattern library loader.

pub mod decision_store;
pub mod jsonl;

use async_trait::async_trait;

use crate::domain::FinalDecision;
use crate::error::Result;

pub use decision_store::{ensure_tables, PostgresDecisionSink, PostgresPatternLoader};
pub use jsonl::JsonlDecisionSink;

/// Destination for finished decisions.
///
/// Called once per session after the decision is built. Errors are logged
/// by the caller and never change the decision.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, decision: &FinalDecision) -> Result<()>;
}
