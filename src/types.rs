//! Shared types for the DeadTime detection engine.
//!
//! These types form the data model used across all modules so that the
//! strategy, evaluator, and engine modules can depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A detected dead-time opportunity.
///
/// Immutable once created: fields are private and only readable through
/// accessors. Ownership moves from the strategy to the engine and finally
/// to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    id: Uuid,
    location: String,
    /// Estimated earnings in the account currency.
    estimated_earnings: Decimal,
    wait_time_minutes: u32,
    /// Strategy confidence (0–1).
    confidence: f64,
    detected_at: DateTime<Utc>,
}

impl Opportunity {
    /// Stamp a candidate with a fresh id and the given detection time.
    pub fn new(candidate: Candidate, detected_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            location: candidate.location,
            estimated_earnings: candidate.estimated_earnings,
            wait_time_minutes: candidate.wait_time_minutes,
            confidence: candidate.confidence,
            detected_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn estimated_earnings(&self) -> Decimal {
        self.estimated_earnings
    }

    pub fn wait_time_minutes(&self) -> u32 {
        self.wait_time_minutes
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | €{:.2} | wait {} min | conf={:.0}% [{}]",
            self.location,
            self.estimated_earnings,
            self.wait_time_minutes,
            self.confidence * 100.0,
            self.id,
        )
    }
}

/// The field set of an opportunity before it is given an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub location: String,
    pub estimated_earnings: Decimal,
    pub wait_time_minutes: u32,
    pub confidence: f64,
}

impl Candidate {
    pub fn new(
        location: impl Into<String>,
        estimated_earnings: Decimal,
        wait_time_minutes: u32,
        confidence: f64,
    ) -> Self {
        Self {
            location: location.into(),
            estimated_earnings,
            wait_time_minutes,
            confidence,
        }
    }

    /// Convert into an `Opportunity` detected at `at`.
    pub fn stamp(self, at: DateTime<Utc>) -> Opportunity {
        Opportunity::new(self, at)
    }
}

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Idle,
    Running,
    /// Draining the in-flight tick before returning to `Idle`.
    Stopping,
}

impl EngineState {
    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Running)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "IDLE"),
            EngineState::Running => write!(f, "RUNNING"),
            EngineState::Stopping => write!(f, "STOPPING"),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection context
// ---------------------------------------------------------------------------

/// Signals handed to a strategy on each tick.
///
/// Deliberately opaque beyond the tick counter and wall clock: providers
/// attach whatever they know as labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionContext {
    pub tick: u64,
    pub now: DateTime<Utc>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl DetectionContext {
    pub fn new(tick: u64, now: DateTime<Utc>) -> Self {
        Self {
            tick,
            now,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the detection engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid scheduler period: {period_ms}ms")]
    InvalidPeriod { period_ms: u64 },

    #[error("Engine is already running")]
    AlreadyRunning,

    #[error("Strategy failure ({strategy}): {message}")]
    StrategyFailure { strategy: String, message: String },

    #[error("Sink delivery failure ({sink}): {message}")]
    SinkDeliveryFailure { sink: String, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
