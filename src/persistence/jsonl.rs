//! Append-only JSON-lines decision log.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::PersistenceSink;
use crate::domain::FinalDecision;
use crate::error::{ConclaveError, Result};

/// Appends one JSON object per decision to a file
pub struct JsonlDecisionSink {
    path: PathBuf,
    // Serialises appends from concurrent sessions
    write_lock: Mutex<()>,
}

impl JsonlDecisionSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceSink for JsonlDecisionSink {
    async fn save(&self, decision: &FinalDecision) -> Result<()> {
        let mut line = serde_json::to_string(decision)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                ConclaveError::Persistence(format!("create {}: {}", parent.display(), e))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ConclaveError::Persistence(format!("open {}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ConclaveError::Persistence(format!("write {}: {}", self.path.display(), e)))?;
        file.flush().await?;

        debug!(path = %self.path.display(), session = %decision.session_id, "decision appended");
        Ok(())
    }
}
