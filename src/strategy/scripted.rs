//! Scripted strategy: replays a fixed sequence of candidates, one per tick.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;

use super::DetectionStrategy;
use crate::types::{Candidate, DetectionContext, Opportunity};

/// Yields the next scripted step on each tick; `None` steps and an
/// exhausted script both mean "nothing detected".
pub struct ScriptedStrategy {
    script: VecDeque<Option<Candidate>>,
}

impl ScriptedStrategy {
    pub fn new(script: impl IntoIterator<Item = Option<Candidate>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// A script with a candidate on every step.
    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        Self::new(candidates.into_iter().map(Some))
    }

    /// Steps not yet replayed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl DetectionStrategy for ScriptedStrategy {
    async fn detect(&mut self, context: &DetectionContext) -> Result<Option<Opportunity>> {
        Ok(self
            .script
            .pop_front()
            .flatten()
            .map(|c| c.stamp(context.now)))
    }

    async fn release(&mut self) -> Result<()> {
        self.script.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
