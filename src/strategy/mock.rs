//! Mock detection strategy.
//!
//! Stands in for a real detection model. `stub()` reproduces the fixed
//! opportunity the prototype emitted on every tick; `seeded()` draws
//! candidates from a seeded RNG so runs are reproducible.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::ops::RangeInclusive;
use tracing::debug;

use super::DetectionStrategy;
use crate::config::MockConfig;
use crate::types::{Candidate, DetectionContext, Opportunity};

const STUB_LOCATION: &str = "Hospital San Raffaele";

/// Locations used by the seeded generator when none are configured.
const DEFAULT_LOCATIONS: &[&str] = &[
    "Hospital San Raffaele",
    "Milano Centrale",
    "Linate Airport",
    "Policlinico di Milano",
];

/// Shape of the seeded generator's output.
#[derive(Debug, Clone)]
pub struct MockProfile {
    pub locations: Vec<String>,
    /// Probability that a tick yields a candidate.
    pub hit_rate: f64,
    /// Earnings range in cents.
    pub earnings_cents: RangeInclusive<i64>,
    pub wait_minutes: RangeInclusive<u32>,
    pub confidence: RangeInclusive<f64>,
}

impl Default for MockProfile {
    fn default() -> Self {
        Self {
            locations: DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect(),
            hit_rate: 0.5,
            earnings_cents: 500..=3_000,
            wait_minutes: 5..=45,
            confidence: 0.5..=0.99,
        }
    }
}

impl MockProfile {
    fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            bail!("mock profile needs at least one location");
        }
        if !(0.0..=1.0).contains(&self.hit_rate) {
            bail!("mock hit_rate must be within [0, 1], got {}", self.hit_rate);
        }
        if self.earnings_cents.is_empty() || *self.earnings_cents.start() < 0 {
            bail!("mock earnings range must be non-empty and non-negative");
        }
        if self.wait_minutes.is_empty() {
            bail!("mock wait range must be non-empty");
        }
        let (lo, hi) = (*self.confidence.start(), *self.confidence.end());
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            bail!("mock confidence range must lie within [0, 1]");
        }
        Ok(())
    }
}

enum Mode {
    Fixed(Candidate),
    Seeded { rng: StdRng, profile: MockProfile },
}

/// Deterministic stand-in for a detection model.
pub struct MockStrategy {
    mode: Mode,
}

impl MockStrategy {
    /// Always yield `candidate`.
    pub fn fixed(candidate: Candidate) -> Self {
        Self {
            mode: Mode::Fixed(candidate),
        }
    }

    /// The prototype's hardcoded opportunity, on every tick.
    pub fn stub() -> Self {
        Self::fixed(Candidate::new(STUB_LOCATION, dec!(12.50), 15, 0.85))
    }

    /// Draw candidates from an RNG seeded with `seed`.
    pub fn seeded(seed: u64, profile: MockProfile) -> Result<Self> {
        profile.validate()?;
        Ok(Self {
            mode: Mode::Seeded {
                rng: StdRng::seed_from_u64(seed),
                profile,
            },
        })
    }

    /// Build from the `[mock]` config section.
    pub fn from_config(cfg: &MockConfig) -> Result<Self> {
        match cfg.mode.as_str() {
            "stub" => Ok(Self::stub()),
            "seeded" => {
                let mut profile = MockProfile {
                    hit_rate: cfg.hit_rate,
                    ..MockProfile::default()
                };
                if !cfg.locations.is_empty() {
                    profile.locations = cfg.locations.clone();
                }
                Self::seeded(cfg.seed, profile)
            }
            other => bail!("Unknown mock mode: {other}"),
        }
    }

    fn next_candidate(&mut self) -> Option<Candidate> {
        match &mut self.mode {
            Mode::Fixed(candidate) => Some(candidate.clone()),
            Mode::Seeded { rng, profile } => {
                if !rng.gen_bool(profile.hit_rate) {
                    return None;
                }
                let location = profile.locations[rng.gen_range(0..profile.locations.len())].clone();
                let earnings = Decimal::new(rng.gen_range(profile.earnings_cents.clone()), 2);
                let wait = rng.gen_range(profile.wait_minutes.clone());
                let confidence = rng.gen_range(profile.confidence.clone());
                Some(Candidate::new(location, earnings, wait, confidence))
            }
        }
    }
}

#[async_trait]
impl DetectionStrategy for MockStrategy {
    async fn detect(&mut self, context: &DetectionContext) -> Result<Option<Opportunity>> {
        let opportunity = self.next_candidate().map(|c| c.stamp(context.now));
        if let Some(opp) = &opportunity {
            debug!(tick = context.tick, opportunity = %opp, "Mock opportunity generated");
        }
        Ok(opportunity)
    }

    fn name(&self) -> &str {
        match self.mode {
            Mode::Fixed(_) => "mock-fixed",
            Mode::Seeded { .. } => "mock-seeded",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx(tick: u64) -> DetectionContext {
        DetectionContext::new(tick, Utc::now())
    }

    #[tokio::test]
    async fn test_stub_matches_prototype() {
        let mut strategy = MockStrategy::stub();
        let context = ctx(1);
        let opp = strategy.detect(&context).await.unwrap().unwrap();
        assert_eq!(opp.location(), "Hospital San Raffaele");
        assert_eq!(opp.estimated_earnings(), dec!(12.50));
        assert_eq!(opp.wait_time_minutes(), 15);
        assert!((opp.confidence() - 0.85).abs() < 1e-12);
        assert_eq!(opp.detected_at(), context.now);
        assert_eq!(strategy.name(), "mock-fixed");
    }

    #[tokio::test]
    async fn test_stub_gives_fresh_ids() {
        let mut strategy = MockStrategy::stub();
        let a = strategy.detect(&ctx(1)).await.unwrap().unwrap();
        let b = strategy.detect(&ctx(2)).await.unwrap().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_seeded_is_reproducible() {
        let mut a = MockStrategy::seeded(7, MockProfile::default()).unwrap();
        let mut b = MockStrategy::seeded(7, MockProfile::default()).unwrap();
        for tick in 1..=50 {
            let context = ctx(tick);
            let x = a.detect(&context).await.unwrap();
            let y = b.detect(&context).await.unwrap();
            match (x, y) {
                (None, None) => {}
                (Some(x), Some(y)) => {
                    assert_eq!(x.location(), y.location());
                    assert_eq!(x.estimated_earnings(), y.estimated_earnings());
                    assert_eq!(x.wait_time_minutes(), y.wait_time_minutes());
                    assert_eq!(x.confidence(), y.confidence());
                }
                _ => panic!("seeded strategies diverged at tick {tick}"),
            }
        }
    }

    #[tokio::test]
    async fn test_seeded_respects_profile() {
        let profile = MockProfile {
            locations: vec!["Linate Airport".into()],
            hit_rate: 1.0,
            earnings_cents: 1_000..=2_000,
            wait_minutes: 10..=20,
            confidence: 0.6..=0.7,
        };
        let mut strategy = MockStrategy::seeded(1, profile).unwrap();
        for tick in 1..=100 {
            let opp = strategy.detect(&ctx(tick)).await.unwrap().unwrap();
            assert_eq!(opp.location(), "Linate Airport");
            assert!(opp.estimated_earnings() >= dec!(10) && opp.estimated_earnings() <= dec!(20));
            assert!((10..=20).contains(&opp.wait_time_minutes()));
            assert!((0.6..=0.7).contains(&opp.confidence()));
        }
    }

    #[tokio::test]
    async fn test_zero_hit_rate_never_detects() {
        let profile = MockProfile {
            hit_rate: 0.0,
            ..MockProfile::default()
        };
        let mut strategy = MockStrategy::seeded(3, profile).unwrap();
        for tick in 1..=20 {
            assert!(strategy.detect(&ctx(tick)).await.unwrap().is_none());
        }
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let empty = MockProfile {
            locations: Vec::new(),
            ..MockProfile::default()
        };
        assert!(MockStrategy::seeded(0, empty).is_err());

        let bad_rate = MockProfile {
            hit_rate: 1.5,
            ..MockProfile::default()
        };
        assert!(MockStrategy::seeded(0, bad_rate).is_err());

        let bad_conf = MockProfile {
            confidence: 0.9..=1.2,
            ..MockProfile::default()
        };
        assert!(MockStrategy::seeded(0, bad_conf).is_err());
    }

    #[test]
    fn test_from_config_modes() {
        let stub = MockStrategy::from_config(&MockConfig::default()).unwrap();
        assert_eq!(stub.name(), "mock-fixed");

        let seeded = MockStrategy::from_config(&MockConfig {
            mode: "seeded".into(),
            seed: 9,
            hit_rate: 0.3,
            locations: vec!["Duomo".into()],
        })
        .unwrap();
        assert_eq!(seeded.name(), "mock-seeded");

        let unknown = MockStrategy::from_config(&MockConfig {
            mode: "oracle".into(),
            ..MockConfig::default()
        });
        assert!(unknown.is_err());
    }
}
