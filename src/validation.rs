//! Input validation for candidate features and agent output
//!
//! Everything that enters a debate session is checked here first, so a
//! malformed snapshot is rejected before round 1 instead of poisoning the
//! similarity math or the consensus score.

use crate::domain::{CandidateFeatures, Recommendation};
use crate::error::{ConclaveError, Result};
use rust_decimal::Decimal;

/// Validate an optional numeric metric (must be finite when present)
///
/// # Arguments
/// * `value` - Metric value
/// * `field_name` - Name of the field for error messages
pub fn validate_metric(value: Option<f64>, field_name: &str) -> Result<()> {
    if let Some(v) = value {
        if !v.is_finite() {
            return Err(ConclaveError::Validation(format!(
                "{} must be a finite number, got {}",
                field_name, v
            )));
        }
    }
    Ok(())
}

/// Validate a price (must be strictly positive)
pub fn validate_price(price: Decimal, field_name: &str) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(ConclaveError::Validation(format!(
            "{} must be positive: {}",
            field_name, price
        )));
    }
    Ok(())
}

/// Validate a percentage change (a price cannot fall more than 100%)
pub fn validate_change_pct(value: Option<f64>, field_name: &str) -> Result<()> {
    validate_metric(value, field_name)?;
    if let Some(v) = value {
        if v < -100.0 {
            return Err(ConclaveError::Validation(format!(
                "{} cannot be below -100%: {}",
                field_name, v
            )));
        }
    }
    Ok(())
}

/// Validate a full candidate snapshot before a session starts
pub fn validate_candidate(features: &CandidateFeatures) -> Result<()> {
    if features.id.trim().is_empty() {
        return Err(ConclaveError::Validation(
            "Candidate ID cannot be empty".to_string(),
        ));
    }

    if features.sector.trim().is_empty() {
        return Err(ConclaveError::Validation(format!(
            "Candidate {} has an empty sector",
            features.id
        )));
    }

    validate_metric(features.market_cap, "market_cap")?;
    if let Some(cap) = features.market_cap {
        if cap < 0.0 {
            return Err(ConclaveError::Validation(format!(
                "market_cap cannot be negative: {}",
                cap
            )));
        }
    }

    validate_metric(features.pe_ratio, "pe_ratio")?;
    validate_metric(features.price_to_book, "price_to_book")?;

    if let Some(price) = features.price {
        validate_price(price, "price")?;
    }

    validate_change_pct(features.change_1d_pct, "change_1d_pct")?;
    validate_change_pct(features.change_5d_pct, "change_5d_pct")?;
    validate_change_pct(features.change_20d_pct, "change_20d_pct")?;

    Ok(())
}

/// Validate an agent recommendation before it is scored
pub fn validate_recommendation(rec: &Recommendation) -> Result<()> {
    if !rec.has_valid_confidence() {
        return Err(ConclaveError::InvalidRound(format!(
            "{} returned confidence {} outside [0, 1]",
            rec.agent, rec.confidence
        )));
    }

    for (price, field) in [(rec.target_price, "target_price"), (rec.stop_loss, "stop_loss")] {
        if let Some(p) = price {
            if p <= Decimal::ZERO {
                return Err(ConclaveError::InvalidRound(format!(
                    "{} returned non-positive {}: {}",
                    rec.agent, field, p
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Action;
    use rust_decimal_macros::dec;

    fn valid_candidate() -> CandidateFeatures {
        CandidateFeatures::new("ACME", "Industrials")
            .with_market_cap(5e9)
            .with_pe_ratio(18.0)
            .with_price(dec!(42.50))
            .with_changes(0.5, -2.0, 8.0)
    }

    #[test]
    fn test_validate_candidate() {
        assert!(validate_candidate(&valid_candidate()).is_ok());

        // Sparse candidates are fine
        assert!(validate_candidate(&CandidateFeatures::new("X", "Tech")).is_ok());
    }

    #[test]
    fn test_validate_candidate_rejects_malformed() {
        let mut c = valid_candidate();
        c.id = "  ".to_string();
        assert!(matches!(validate_candidate(&c), Err(ConclaveError::Validation(_))));

        let mut c = valid_candidate();
        c.sector = String::new();
        assert!(validate_candidate(&c).is_err());

        let mut c = valid_candidate();
        c.pe_ratio = Some(f64::NAN);
        assert!(validate_candidate(&c).is_err());

        let mut c = valid_candidate();
        c.market_cap = Some(-1.0);
        assert!(validate_candidate(&c).is_err());

        let mut c = valid_candidate();
        c.price = Some(dec!(0));
        assert!(validate_candidate(&c).is_err());

        let mut c = valid_candidate();
        c.change_20d_pct = Some(-140.0);
        assert!(validate_candidate(&c).is_err());
    }

    #[test]
    fn test_validate_recommendation() {
        let ok = Recommendation::new("value", Action::Buy, 0.7, "cheap").with_target(dec!(50));
        assert!(validate_recommendation(&ok).is_ok());

        let nan = Recommendation::new("value", Action::Buy, f64::NAN, "cheap");
        assert!(matches!(
            validate_recommendation(&nan),
            Err(ConclaveError::InvalidRound(_))
        ));

        let bad_target = Recommendation::new("value", Action::Buy, 0.7, "").with_target(dec!(-3));
        assert!(validate_recommendation(&bad_target).is_err());
    }
}
