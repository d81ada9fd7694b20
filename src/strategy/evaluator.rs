//! Opportunity evaluator.
//!
//! Filters strategy output against the configured confidence threshold and
//! earnings sanity cap, and rejects malformed records outright.

use rust_decimal::Decimal;
use std::fmt;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::types::Opportunity;

/// Why a candidate was not delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// Confidence below `min_confidence`.
    LowConfidence { confidence: f64, min: f64 },
    /// Earnings above `max_earnings_outliers`.
    EarningsOutlier { earnings: Decimal, cap: Decimal },
    /// Confidence is NaN or outside [0, 1].
    MalformedConfidence(f64),
    NegativeEarnings(Decimal),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::LowConfidence { confidence, min } => write!(
                f,
                "confidence {:.0}% below minimum {:.0}%",
                confidence * 100.0,
                min * 100.0
            ),
            RejectionReason::EarningsOutlier { earnings, cap } => {
                write!(f, "earnings €{earnings:.2} exceed outlier cap €{cap:.2}")
            }
            RejectionReason::MalformedConfidence(c) => write!(f, "malformed confidence {c}"),
            RejectionReason::NegativeEarnings(e) => write!(f, "negative earnings €{e:.2}"),
        }
    }
}

/// Stateless threshold filter. Deterministic, no side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpportunityEvaluator;

impl OpportunityEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Whether `opportunity` may be delivered under `config`.
    pub fn accept(&self, opportunity: &Opportunity, config: &DetectionConfig) -> bool {
        self.evaluate(opportunity, config).is_ok()
    }

    /// Accept, or explain the rejection.
    pub fn evaluate(
        &self,
        opportunity: &Opportunity,
        config: &DetectionConfig,
    ) -> Result<(), RejectionReason> {
        let confidence = opportunity.confidence();
        let earnings = opportunity.estimated_earnings();

        if !(0.0..=1.0).contains(&confidence) {
            return Err(RejectionReason::MalformedConfidence(confidence));
        }
        if earnings < Decimal::ZERO {
            return Err(RejectionReason::NegativeEarnings(earnings));
        }
        if confidence < config.min_confidence {
            return Err(RejectionReason::LowConfidence {
                confidence,
                min: config.min_confidence,
            });
        }
        if earnings > config.max_earnings_outliers {
            return Err(RejectionReason::EarningsOutlier {
                earnings,
                cap: config.max_earnings_outliers,
            });
        }

        debug!(
            id = %opportunity.id(),
            confidence = format!("{:.0}%", confidence * 100.0),
            earnings = %earnings,
            "Candidate accepted"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candidate;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn make_opportunity(earnings: Decimal, confidence: f64) -> Opportunity {
        Candidate::new("Hospital San Raffaele", earnings, 15, confidence).stamp(Utc::now())
    }

    fn config() -> DetectionConfig {
        DetectionConfig {
            interval_ms: 30_000,
            min_confidence: 0.85,
            max_earnings_outliers: dec!(100),
            ..DetectionConfig::default()
        }
    }

    #[test]
    fn test_accepts_at_threshold() {
        let eval = OpportunityEvaluator::new();
        assert!(eval.accept(&make_opportunity(dec!(12.50), 0.85), &config()));
    }

    #[test]
    fn test_rejects_low_confidence() {
        let eval = OpportunityEvaluator::new();
        let result = eval.evaluate(&make_opportunity(dec!(12.50), 0.5), &config());
        assert!(matches!(result, Err(RejectionReason::LowConfidence { .. })));
    }

    #[test]
    fn test_earnings_cap_is_inclusive() {
        let eval = OpportunityEvaluator::new();
        assert!(eval.accept(&make_opportunity(dec!(100), 0.9), &config()));
        let result = eval.evaluate(&make_opportunity(dec!(100.01), 0.9), &config());
        assert!(matches!(result, Err(RejectionReason::EarningsOutlier { .. })));
    }

    #[test]
    fn test_rejects_malformed_output() {
        let eval = OpportunityEvaluator::new();
        let cfg = config();
        assert!(matches!(
            eval.evaluate(&make_opportunity(dec!(10), f64::NAN), &cfg),
            Err(RejectionReason::MalformedConfidence(_))
        ));
        assert!(matches!(
            eval.evaluate(&make_opportunity(dec!(10), 1.5), &cfg),
            Err(RejectionReason::MalformedConfidence(_))
        ));
        assert!(matches!(
            eval.evaluate(&make_opportunity(dec!(-3), 0.9), &cfg),
            Err(RejectionReason::NegativeEarnings(_))
        ));
    }

    #[test]
    fn test_zero_threshold_accepts_everything_well_formed() {
        let eval = OpportunityEvaluator::new();
        let cfg = DetectionConfig {
            min_confidence: 0.0,
            ..config()
        };
        assert!(eval.accept(&make_opportunity(dec!(0), 0.0), &cfg));
    }

    #[test]
    fn test_accepted_always_meets_threshold() {
        let eval = OpportunityEvaluator::new();
        for min in [0.0, 0.25, 0.5, 0.85, 1.0] {
            let cfg = DetectionConfig {
                min_confidence: min,
                ..config()
            };
            for step in 0..=20 {
                let c = step as f64 / 20.0;
                let opp = make_opportunity(dec!(10), c);
                if eval.accept(&opp, &cfg) {
                    assert!(opp.confidence() >= min, "accepted {c} under min {min}");
                }
            }
        }
    }

    #[test]
    fn test_rejection_display() {
        let r = RejectionReason::LowConfidence {
            confidence: 0.5,
            min: 0.85,
        };
        assert_eq!(r.to_string(), "confidence 50% below minimum 85%");
    }
}
