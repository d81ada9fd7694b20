//! Detection strategies and candidate evaluation.
//!
//! Defines the `DetectionStrategy` trait and provides:
//! - `MockStrategy` — fixed or seeded-random candidates standing in for a model
//! - `ScriptedStrategy` — replays a fixed sequence, for replay and testing
//! - `OpportunityEvaluator` — threshold filter applied to every candidate

pub mod evaluator;
pub mod mock;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{DetectionContext, Opportunity};

/// Abstraction over opportunity-detection algorithms.
///
/// A strategy is a function of the context it is handed plus state it owns;
/// it must not read ambient globals. Blocking work belongs in
/// `tokio::task::spawn_blocking` inside `detect`, which the engine bounds
/// with a timeout.
#[async_trait]
pub trait DetectionStrategy: Send {
    /// Produce at most one candidate opportunity for this tick.
    async fn detect(&mut self, context: &DetectionContext) -> Result<Option<Opportunity>>;

    /// Release any resources held by the strategy. Called from engine cleanup,
    /// possibly more than once.
    async fn release(&mut self) -> Result<()> {
        Ok(())
    }

    /// Strategy name for logging and error reporting.
    fn name(&self) -> &str;
}
