//! Historical-precedent matching.

pub mod engine;
pub mod library;

pub use engine::{
    magnitude_similarity, MatcherConfig, PatternInsights, PatternMatcher, Precedent, RiskBucket,
    SimilarityWeights,
};
pub use library::{JsonFileLoader, PatternCase, PatternLibrary, PatternLibraryLoader};
