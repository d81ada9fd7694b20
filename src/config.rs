//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The engine section becomes a [`DetectionConfig`], which is validated
//! before the engine is allowed to start.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use crate::types::DetectionError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: DetectionConfig,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Detection engine settings. Immutable once the engine starts.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Tick period.
    pub interval_ms: u64,
    /// Candidates below this confidence are dropped.
    pub min_confidence: f64,
    /// Sanity cap on estimated earnings; anything above is treated as malformed.
    pub max_earnings_outliers: Decimal,
    /// Upper bound on a single strategy invocation.
    #[serde(default = "default_strategy_timeout_ms")]
    pub strategy_timeout_ms: u64,
    /// Upper bound on a single sink delivery.
    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,
}

fn default_strategy_timeout_ms() -> u64 {
    5_000
}

fn default_sink_timeout_ms() -> u64 {
    2_000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            min_confidence: 0.85,
            max_earnings_outliers: dec!(100),
            strategy_timeout_ms: default_strategy_timeout_ms(),
            sink_timeout_ms: default_sink_timeout_ms(),
        }
    }
}

impl DetectionConfig {
    /// Check thresholds are in range.
    ///
    /// A zero `interval_ms` is left to the scheduler, which reports it as
    /// `InvalidPeriod`.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(DetectionError::InvalidConfig(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.max_earnings_outliers < Decimal::ZERO {
            return Err(DetectionError::InvalidConfig(format!(
                "max_earnings_outliers must be non-negative, got {}",
                self.max_earnings_outliers
            )));
        }
        if self.strategy_timeout_ms == 0 {
            return Err(DetectionError::InvalidConfig(
                "strategy_timeout_ms must be positive".into(),
            ));
        }
        if self.sink_timeout_ms == 0 {
            return Err(DetectionError::InvalidConfig(
                "sink_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }
}

/// Settings for the mock strategy used by the binary.
#[derive(Debug, Deserialize, Clone)]
pub struct MockConfig {
    /// `"stub"` reproduces the fixed opportunity; `"seeded"` draws from a seeded RNG.
    #[serde(default = "default_mock_mode")]
    pub mode: String,
    #[serde(default)]
    pub seed: u64,
    /// Probability that a tick yields a candidate (seeded mode only).
    #[serde(default = "default_hit_rate")]
    pub hit_rate: f64,
    #[serde(default)]
    pub locations: Vec<String>,
}

fn default_mock_mode() -> String {
    "stub".to_string()
}

fn default_hit_rate() -> f64 {
    0.5
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            mode: default_mock_mode(),
            seed: 0,
            hit_rate: default_hit_rate(),
            locations: Vec::new(),
        }
    }
}

/// Static labels attached to every detection context.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContextConfig {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
