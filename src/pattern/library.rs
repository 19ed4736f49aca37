//! Historical precedent cases and the loaders that supply them.
//!
//! The library is built once at startup and shared read-only between
//! sessions; nothing mutates a `PatternCase` after load.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::SizeBucket;
use crate::error::{ConclaveError, Result};

/// One labelled historical precedent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCase {
    pub id: String,
    /// Short label for rationales, e.g. "ACME 2019 re-rating"
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    pub sector: String,
    #[serde(default)]
    pub price_to_book: Option<f64>,
    /// Signed outcome in percent (e.g. +45.0 for a 45% gain)
    pub outcome_pct: f64,
    /// Free-text factors that drove the outcome
    #[serde(default)]
    pub factors: Vec<String>,
}

impl PatternCase {
    pub fn size_bucket(&self) -> SizeBucket {
        SizeBucket::from_market_cap(self.market_cap)
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Immutable in-memory precedent set, cheap to clone and share
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    cases: Arc<[PatternCase]>,
}

impl PatternLibrary {
    /// Build a library, dropping cases whose outcome is not a finite number
    pub fn new(cases: Vec<PatternCase>) -> Self {
        let total = cases.len();
        let cases: Vec<PatternCase> = cases
            .into_iter()
            .filter(|c| {
                let keep = c.outcome_pct.is_finite();
                if !keep {
                    warn!(case = %c.id, "dropping pattern case with non-finite outcome");
                }
                keep
            })
            .collect();

        if cases.len() < total {
            warn!(kept = cases.len(), total, "pattern library filtered");
        }

        Self {
            cases: cases.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load through any loader, once, at process start
    pub async fn load_from(loader: &dyn PatternLibraryLoader) -> Result<Self> {
        let cases = loader.load().await?;
        let library = Self::new(cases);
        info!(cases = library.len(), "pattern library loaded");
        Ok(library)
    }

    pub fn cases(&self) -> &[PatternCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// External static dataset of precedents
#[async_trait]
pub trait PatternLibraryLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<PatternCase>>;
}

/// Loads a JSON array of `PatternCase` from disk
pub struct JsonFileLoader {
    path: PathBuf,
}

impl JsonFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PatternLibraryLoader for JsonFileLoader {
    async fn load(&self) -> Result<Vec<PatternCase>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConclaveError::PatternLibrary(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&raw).map_err(|e| {
            ConclaveError::PatternLibrary(format!(
                "failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, outcome: f64) -> PatternCase {
        PatternCase {
            id: id.to_string(),
            label: None,
            market_cap: Some(1e9),
            pe_ratio: Some(15.0),
            sector: "Tech".to_string(),
            price_to_book: None,
            outcome_pct: outcome,
            factors: vec![],
        }
    }

    #[test]
    fn test_library_drops_non_finite_outcomes() {
        let lib = PatternLibrary::new(vec![case("a", 10.0), case("b", f64::NAN), case("c", -5.0)]);
        assert_eq!(lib.len(), 2);
        assert!(lib.cases().iter().all(|c| c.outcome_pct.is_finite()));
    }

    #[test]
    fn test_empty_library() {
        let lib = PatternLibrary::empty();
        assert!(lib.is_empty());
        assert_eq!(lib.len(), 0);
    }

    #[test]
    fn test_json_file_loader() {
        let path = std::env::temp_dir().join(format!("conclave-patterns-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"[{"id": "p1", "sector": "Energy", "market_cap": 3e9, "outcome_pct": 22.5, "factors": ["margin expansion"]}]"#,
        )
        .unwrap();

        let loader = JsonFileLoader::new(&path);
        let lib = tokio_test::block_on(PatternLibrary::load_from(&loader)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(lib.len(), 1);
        assert_eq!(lib.cases()[0].factors, vec!["margin expansion".to_string()]);
        assert_eq!(lib.cases()[0].display_label(), "p1");
    }

    #[test]
    fn test_json_file_loader_missing_file() {
        let loader = JsonFileLoader::new("/nonexistent/conclave/patterns.json");
        let err = tokio_test::block_on(loader.load()).unwrap_err();
        assert!(matches!(err, ConclaveError::PatternLibrary(_)));
    }
}
