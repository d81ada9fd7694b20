//! Opportunity sinks.
//!
//! Sinks are the external consumers of accepted opportunities (notifier,
//! UI bridge, ...). The engine bounds every delivery with a timeout and
//! only logs failures, so a misbehaving sink cannot halt detection.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::types::{DetectionError, Opportunity};

/// Consumer of accepted opportunities.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OpportunitySink: Send + Sync {
    /// Take ownership of an accepted opportunity.
    async fn deliver(&self, opportunity: Opportunity) -> Result<()>;

    /// Sink name for logging and error reporting.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

/// Emits each opportunity as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl OpportunitySink for LogSink {
    async fn deliver(&self, opportunity: Opportunity) -> Result<()> {
        let payload = serde_json::to_string(&opportunity)
            .context("Failed to serialise opportunity")?;
        info!(
            id = %opportunity.id(),
            location = %opportunity.location(),
            earnings = format!("€{:.2}", opportunity.estimated_earnings()),
            wait_min = opportunity.wait_time_minutes(),
            confidence = format!("{:.0}%", opportunity.confidence() * 100.0),
            payload = %payload,
            "Opportunity detected"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// Channel sink
// ---------------------------------------------------------------------------

/// Forwards opportunities into a bounded channel.
///
/// Never waits for capacity: a full channel drops the opportunity and
/// reports a delivery failure.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Opportunity>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Opportunity>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OpportunitySink for ChannelSink {
    async fn deliver(&self, opportunity: Opportunity) -> Result<()> {
        self.tx.try_send(opportunity).map_err(|e| {
            let message = match e {
                mpsc::error::TrySendError::Full(dropped) => {
                    format!("channel full, dropped {}", dropped.id())
                }
                mpsc::error::TrySendError::Closed(_) => "receiver dropped".to_string(),
            };
            DetectionError::SinkDeliveryFailure {
                sink: self.name().to_string(),
                message,
            }
            .into()
        })
    }

    fn name(&self) -> &str {
        "channel"
    }
}

// ---------------------------------------------------------------------------
// Fan-out sink
// ---------------------------------------------------------------------------

/// Delivers to several sinks concurrently. Fails if any inner sink fails,
/// after every sink has been attempted.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn OpportunitySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn OpportunitySink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl OpportunitySink for FanoutSink {
    async fn deliver(&self, opportunity: Opportunity) -> Result<()> {
        let deliveries = self.sinks.iter().map(|sink| {
            let opp = opportunity.clone();
            async move { (sink.name().to_string(), sink.deliver(opp).await) }
        });
        let results = futures::future::join_all(deliveries).await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, r)| r.err().map(|e| format!("{name}: {e}")))
            .collect();

        debug!(
            sinks = self.sinks.len(),
            failed = failures.len(),
            "Fan-out delivery complete"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(failures.join("; ")))
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
