//! Detection context providers.
//!
//! The engine asks its provider for a fresh `DetectionContext` on every
//! tick and hands it to the strategy. Real signal sources (location,
//! historical demand) plug in here.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;

use crate::types::DetectionContext;

/// Source of the per-tick detection context.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn snapshot(&self, tick: u64) -> Result<DetectionContext>;
}

/// Tick counter and wall clock only.
#[derive(Debug, Default, Clone)]
pub struct ClockContext;

#[async_trait]
impl ContextProvider for ClockContext {
    async fn snapshot(&self, tick: u64) -> Result<DetectionContext> {
        Ok(DetectionContext::new(tick, Utc::now()))
    }
}

/// Clock context plus a fixed set of labels (e.g. from config).
#[derive(Debug, Default, Clone)]
pub struct StaticContext {
    labels: BTreeMap<String, String>,
}

impl StaticContext {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn snapshot(&self, tick: u64) -> Result<DetectionContext> {
        let mut context = DetectionContext::new(tick, Utc::now());
        context.labels = self.labels.clone();
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clock_context() {
        let before = Utc::now();
        let ctx = ClockContext.snapshot(4).await.unwrap();
        assert_eq!(ctx.tick, 4);
        assert!(ctx.now >= before);
        assert!(ctx.labels.is_empty());
    }

    #[tokio::test]
    async fn test_static_context_labels() {
        let mut labels = BTreeMap::new();
        labels.insert("city".to_string(), "milano".to_string());
        let provider = StaticContext::new(labels);

        let ctx = provider.snapshot(1).await.unwrap();
        assert_eq!(ctx.label("city"), Some("milano"));
    }
}
