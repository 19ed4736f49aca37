//! Core precedent-similarity engine (no market IO).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use super::library::{PatternCase, PatternLibrary};
use crate::domain::{CandidateFeatures, SizeBucket};

/// Neutral starting point for the success estimate.
const BASE_PROBABILITY: f64 = 0.5;
const MIN_PROBABILITY: f64 = 0.1;
const MAX_PROBABILITY: f64 = 0.9;

/// Ratio similarity of two positive magnitudes in [0, 1].
///
/// `min(a, b) / max(a, b)`; 0.0 when either side is missing, zero,
/// negative or not finite.
pub fn magnitude_similarity(a: Option<f64>, b: Option<f64>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0 => {
            if a == b {
                1.0
            } else {
                (a.min(b) / a.max(b)).clamp(0.0, 1.0)
            }
        }
        _ => 0.0,
    }
}

/// Binary category match, case-insensitive
pub fn category_similarity(a: &str, b: &str) -> f64 {
    if !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim()) {
        1.0
    } else {
        0.0
    }
}

/// Per-feature weight schedule; weights sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub size: f64,
    pub valuation: f64,
    pub category: f64,
    pub secondary: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            size: 0.4,
            valuation: 0.3,
            category: 0.2,
            secondary: 0.1,
        }
    }
}

impl SimilarityWeights {
    /// Weighted similarity between a candidate and one precedent, in [0, 1]
    pub fn similarity(&self, features: &CandidateFeatures, case: &PatternCase) -> f64 {
        let score = self.size * magnitude_similarity(features.market_cap, case.market_cap)
            + self.valuation * magnitude_similarity(features.pe_ratio, case.pe_ratio)
            + self.category * category_similarity(&features.sector, &case.sector)
            + self.secondary * magnitude_similarity(features.price_to_book, case.price_to_book);

        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Matcher tuning knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherConfig {
    /// Precedents kept per side
    pub top_k: usize,
    /// Precedents below this similarity are ignored
    pub min_similarity: f64,
    /// Similarity above which a precedent counts as a strong match
    pub strong_match: f64,
    pub winner_bonus: f64,
    pub loser_penalty: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.5,
            strong_match: 0.7,
            winner_bonus: 0.2,
            loser_penalty: 0.2,
        }
    }
}

/// Coarse risk classification derived from precedents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    Low,
    Moderate,
    High,
    Extreme,
}

impl RiskBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBucket::Low => "low",
            RiskBucket::Moderate => "moderate",
            RiskBucket::High => "high",
            RiskBucket::Extreme => "extreme",
        }
    }

    fn classify(success_probability: f64, strong_negative: bool) -> Self {
        let bucket = if success_probability >= 0.65 {
            RiskBucket::Low
        } else if success_probability >= 0.45 {
            RiskBucket::Moderate
        } else if success_probability >= 0.25 {
            RiskBucket::High
        } else {
            RiskBucket::Extreme
        };

        if strong_negative && bucket == RiskBucket::Low {
            RiskBucket::Moderate
        } else {
            bucket
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A precedent matched against the current candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precedent {
    pub case_id: String,
    pub label: String,
    pub sector: String,
    pub size_bucket: SizeBucket,
    pub similarity: f64,
    pub outcome_pct: f64,
    pub factors: Vec<String>,
}

impl Precedent {
    fn from_case(case: &PatternCase, similarity: f64) -> Self {
        Self {
            case_id: case.id.clone(),
            label: case.display_label().to_string(),
            sector: case.sector.clone(),
            size_bucket: case.size_bucket(),
            similarity,
            outcome_pct: case.outcome_pct,
            factors: case.factors.clone(),
        }
    }
}

/// Per-candidate result of matching against the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsights {
    /// Winning precedents, similarity descending
    pub positive: Vec<Precedent>,
    /// Losing precedents, similarity descending
    pub negative: Vec<Precedent>,
    /// Always within [0.1, 0.9]
    pub success_probability: f64,
    pub risk: RiskBucket,
    /// Most frequent size bucket among the retained winners
    pub winners_bucket: Option<SizeBucket>,
    pub library_size: usize,
}

impl PatternInsights {
    /// Result for an empty library or a candidate with no usable precedents
    pub fn neutral(library_size: usize) -> Self {
        Self {
            positive: Vec::new(),
            negative: Vec::new(),
            success_probability: BASE_PROBABILITY,
            risk: RiskBucket::Moderate,
            winners_bucket: None,
            library_size,
        }
    }

    pub fn best_positive(&self) -> Option<&Precedent> {
        self.positive.first()
    }

    pub fn best_negative(&self) -> Option<&Precedent> {
        self.negative.first()
    }

    /// One sentence comparing the candidate with its closest precedents
    pub fn historical_comparison(&self) -> String {
        match (self.best_positive(), self.best_negative()) {
            (None, None) => format!(
                "No close historical precedents among {} cases; pattern success estimate stays neutral at {:.0}%.",
                self.library_size,
                self.success_probability * 100.0
            ),
            (Some(win), None) => format!(
                "Closest precedent {} ({:.0}% similar) returned {:+.1}%; pattern success estimate {:.0}%.",
                win.label,
                win.similarity * 100.0,
                win.outcome_pct,
                self.success_probability * 100.0
            ),
            (None, Some(loss)) => format!(
                "Closest precedent {} ({:.0}% similar) returned {:+.1}%; pattern success estimate {:.0}%.",
                loss.label,
                loss.similarity * 100.0,
                loss.outcome_pct,
                self.success_probability * 100.0
            ),
            (Some(win), Some(loss)) => format!(
                "Resembles {} ({:.0}% similar, {:+.1}%) more than cautionary case {} ({:.0}% similar, {:+.1}%); pattern success estimate {:.0}%.",
                win.label,
                win.similarity * 100.0,
                win.outcome_pct,
                loss.label,
                loss.similarity * 100.0,
                loss.outcome_pct,
                self.success_probability * 100.0
            ),
        }
    }
}

/// Scores a candidate against every library entry
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    config: MatcherConfig,
    weights: SimilarityWeights,
}

impl PatternMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            weights: SimilarityWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: SimilarityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Rank precedents and estimate a success probability. Never fails.
    pub fn match_candidate(
        &self,
        features: &CandidateFeatures,
        library: &PatternLibrary,
    ) -> PatternInsights {
        if library.is_empty() {
            return PatternInsights::neutral(0);
        }

        let mut positive = Vec::new();
        let mut negative = Vec::new();

        for case in library.cases() {
            let similarity = self.weights.similarity(features, case);
            if similarity < self.config.min_similarity {
                continue;
            }
            if case.outcome_pct > 0.0 {
                positive.push(Precedent::from_case(case, similarity));
            } else if case.outcome_pct < 0.0 {
                negative.push(Precedent::from_case(case, similarity));
            }
        }

        rank(&mut positive, self.config.top_k);
        rank(&mut negative, self.config.top_k);

        let winners_bucket = dominant_bucket(&positive);
        let candidate_bucket = features.size_bucket();

        let mut probability = BASE_PROBABILITY;

        let strong_positive = positive
            .first()
            .is_some_and(|p| p.similarity > self.config.strong_match);
        if strong_positive
            && candidate_bucket != SizeBucket::Unknown
            && winners_bucket == Some(candidate_bucket)
        {
            probability += self.config.winner_bonus;
        }

        let strong_negative = negative
            .first()
            .is_some_and(|p| p.similarity > self.config.strong_match);
        if strong_negative {
            probability -= self.config.loser_penalty;
        }

        let success_probability = clamp_probability(probability);

        PatternInsights {
            positive,
            negative,
            success_probability,
            risk: RiskBucket::classify(success_probability, strong_negative),
            winners_bucket,
            library_size: library.len(),
        }
    }
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(MIN_PROBABILITY, MAX_PROBABILITY)
    } else {
        BASE_PROBABILITY
    }
}

/// Sort by similarity descending (ties by case id) and keep the first `top_k`
fn rank(precedents: &mut Vec<Precedent>, top_k: usize) {
    precedents.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.case_id.cmp(&b.case_id))
    });
    precedents.truncate(top_k);
}

/// Most frequent known size bucket; ties go to the larger bucket
fn dominant_bucket(precedents: &[Precedent]) -> Option<SizeBucket> {
    let mut counts: HashMap<SizeBucket, usize> = HashMap::new();
    for p in precedents {
        if p.size_bucket != SizeBucket::Unknown {
            *counts.entry(p.size_bucket).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(ba, ca), (bb, cb)| ca.cmp(cb).then_with(|| ba.cmp(bb)))
        .map(|(bucket, _)| bucket)
}
