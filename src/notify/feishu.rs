//! Feishu (Lark) webhook notifications
//!
//! Posts a text message per decision to a Feishu bot or any webhook that
//! accepts the same `{"msg_type": "text", "content": {"text": ...}}` body.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::NotificationSink;
use crate::domain::{ConsensusStatus, FinalDecision};
use crate::error::{ConclaveError, Result};

/// Webhook notification client
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct FeishuMessage {
    msg_type: String,
    content: FeishuContent,
}

#[derive(Serialize)]
struct FeishuContent {
    text: String,
}

impl WebhookNotifier {
    /// Create a new notifier with explicit URL
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConclaveError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        info!("Webhook notifications enabled");
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    /// Send a text message to the webhook
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let message = FeishuMessage {
            msg_type: "text".to_string(),
            content: FeishuContent {
                text: text.to_string(),
            },
        };

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                error!("Webhook request failed: {}", e);
                ConclaveError::Notification(e.to_string())
            })?;

        if resp.status().is_success() {
            debug!("Webhook notification sent successfully");
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!("Webhook notification failed: {} - {}", status, body);
            Err(ConclaveError::Notification(format!("HTTP {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, decision: &FinalDecision) -> Result<()> {
        self.send_message(&format_decision(decision)).await
    }
}

/// Human-readable summary of a decision
pub fn format_decision(decision: &FinalDecision) -> String {
    let emoji = match decision.consensus_status {
        ConsensusStatus::StrongConsensus => "🟢",
        ConsensusStatus::PartialConsensus => "🟡",
        ConsensusStatus::NoConsensus => "🟠",
        ConsensusStatus::Inconclusive => "🔴",
    };

    let levels = match (decision.target_price, decision.stop_loss) {
        (Some(t), Some(s)) => format!("\nTarget: {} | Stop: {}", t, s),
        (Some(t), None) => format!("\nTarget: {}", t),
        (None, Some(s)) => format!("\nStop: {}", s),
        (None, None) => String::new(),
    };

    format!(
        "{} {} {} ({})\n\
         Confidence: {:.0}% | Rounds: {} | Agreement: {}{}\n\
         {}",
        emoji,
        decision.action,
        decision.candidate_id,
        decision.consensus_status,
        decision.confidence * 100.0,
        decision.round_count,
        decision
            .final_score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "n/a".to_string()),
        levels,
        decision.rationale
    )
}
