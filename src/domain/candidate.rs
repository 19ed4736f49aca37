use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market-capitalisation bucket of a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Unknown,
    Micro,
    Small,
    Mid,
    Large,
    Mega,
}

impl SizeBucket {
    /// Bucket for a market capitalisation in currency units
    pub fn from_market_cap(market_cap: Option<f64>) -> Self {
        match market_cap {
            Some(cap) if cap.is_finite() && cap > 0.0 => {
                if cap >= 200e9 {
                    SizeBucket::Mega
                } else if cap >= 10e9 {
                    SizeBucket::Large
                } else if cap >= 2e9 {
                    SizeBucket::Mid
                } else if cap >= 300e6 {
                    SizeBucket::Small
                } else {
                    SizeBucket::Micro
                }
            }
            _ => SizeBucket::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Unknown => "unknown",
            SizeBucket::Micro => "micro",
            SizeBucket::Small => "small",
            SizeBucket::Mid => "mid",
            SizeBucket::Large => "large",
            SizeBucket::Mega => "mega",
        }
    }
}

impl std::fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attributes of the entity under analysis for one debate session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFeatures {
    /// Ticker or other stable identifier
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,
    /// Market capitalisation (size metric)
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// Price / earnings (valuation metric)
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    /// Sector or industry label
    pub sector: String,
    /// Price / book (secondary ratio)
    #[serde(default)]
    pub price_to_book: Option<f64>,
    /// Last traded price
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Percentage change over the last session
    #[serde(default)]
    pub change_1d_pct: Option<f64>,
    /// Percentage change over the last 5 sessions
    #[serde(default)]
    pub change_5d_pct: Option<f64>,
    /// Percentage change over the last 20 sessions
    #[serde(default)]
    pub change_20d_pct: Option<f64>,
}

impl CandidateFeatures {
    pub fn new(id: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            market_cap: None,
            pe_ratio: None,
            sector: sector.into(),
            price_to_book: None,
            price: None,
            change_1d_pct: None,
            change_5d_pct: None,
            change_20d_pct: None,
        }
    }

    pub fn with_market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    pub fn with_pe_ratio(mut self, pe_ratio: f64) -> Self {
        self.pe_ratio = Some(pe_ratio);
        self
    }

    pub fn with_price_to_book(mut self, price_to_book: f64) -> Self {
        self.price_to_book = Some(price_to_book);
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_changes(mut self, d1: f64, d5: f64, d20: f64) -> Self {
        self.change_1d_pct = Some(d1);
        self.change_5d_pct = Some(d5);
        self.change_20d_pct = Some(d20);
        self
    }

    pub fn size_bucket(&self) -> SizeBucket {
        SizeBucket::from_market_cap(self.market_cap)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_buckets() {
        assert_eq!(SizeBucket::from_market_cap(Some(2.5e12)), SizeBucket::Mega);
        assert_eq!(SizeBucket::from_market_cap(Some(50e9)), SizeBucket::Large);
        assert_eq!(SizeBucket::from_market_cap(Some(5e9)), SizeBucket::Mid);
        assert_eq!(SizeBucket::from_market_cap(Some(1e9)), SizeBucket::Small);
        assert_eq!(SizeBucket::from_market_cap(Some(50e6)), SizeBucket::Micro);
        assert_eq!(SizeBucket::from_market_cap(None), SizeBucket::Unknown);
        assert_eq!(SizeBucket::from_market_cap(Some(0.0)), SizeBucket::Unknown);
        assert_eq!(SizeBucket::from_market_cap(Some(f64::NAN)), SizeBucket::Unknown);
    }

    #[test]
    fn test_deserialize_with_missing_optionals() {
        let json = r#"{"id": "ACME", "sector": "Industrials", "market_cap": 4.2e9}"#;
        let features: CandidateFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(features.id, "ACME");
        assert_eq!(features.size_bucket(), SizeBucket::Mid);
        assert!(features.pe_ratio.is_none());
        assert_eq!(features.display_name(), "ACME");
    }
}
