//! Outbound decision notifications.

pub mod feishu;

use async_trait::async_trait;

use crate::domain::FinalDecision;
use crate::error::Result;

pub use feishu::{format_decision, WebhookNotifier};

/// Receives decisions at or above the configured status
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, decision: &FinalDecision) -> Result<()>;
}
