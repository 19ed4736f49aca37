//! Candidate snapshot sources.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::domain::CandidateFeatures;
use crate::error::{ConclaveError, Result};

/// Supplies the features a debate runs on
#[async_trait]
pub trait MarketSnapshotProvider: Send + Sync {
    async fn fetch(&self, candidate_id: &str) -> Result<CandidateFeatures>;
}

/// Serves snapshots from a JSON array of `CandidateFeatures`, loaded once
pub struct FileSnapshotProvider {
    path: PathBuf,
    snapshots: HashMap<String, CandidateFeatures>,
}

impl FileSnapshotProvider {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ConclaveError::SnapshotUnavailable(format!("read {}: {}", path.display(), e))
        })?;
        let list: Vec<CandidateFeatures> = serde_json::from_str(&raw).map_err(|e| {
            ConclaveError::SnapshotUnavailable(format!("parse {}: {}", path.display(), e))
        })?;

        let snapshots: HashMap<String, CandidateFeatures> = list
            .into_iter()
            .map(|f| (f.id.to_uppercase(), f))
            .collect();
        debug!(path = %path.display(), count = snapshots.len(), "loaded snapshots");
        Ok(Self { path, snapshots })
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl MarketSnapshotProvider for FileSnapshotProvider {
    async fn fetch(&self, candidate_id: &str) -> Result<CandidateFeatures> {
        self.snapshots
            .get(&candidate_id.to_uppercase())
            .cloned()
            .ok_or_else(|| {
                ConclaveError::SnapshotUnavailable(format!(
                    "{} not found in {}",
                    candidate_id,
                    self.path.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_provider_lookup_is_case_insensitive() {
        let path = std::env::temp_dir().join(format!("conclave-snapshots-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"[
                {"id": "ACME", "sector": "Industrials", "market_cap": 5.0e9, "pe_ratio": 11.0, "price": "42.10"},
                {"id": "ZED", "sector": "Energy"}
            ]"#,
        )
        .await
        .unwrap();

        let provider = FileSnapshotProvider::load(&path).await.unwrap();
        assert_eq!(provider.len(), 2);

        let acme = provider.fetch("acme").await.unwrap();
        assert_eq!(acme.pe_ratio, Some(11.0));

        let err = provider.fetch("NOPE").await.unwrap_err();
        assert!(matches!(err, ConclaveError::SnapshotUnavailable(_)));

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_snapshot_unavailable() {
        let err = FileSnapshotProvider::load("/nonexistent/snapshots.json")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConclaveError::SnapshotUnavailable(_)));
    }
}
