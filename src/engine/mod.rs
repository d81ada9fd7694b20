//! Core engine — the tick → detect → evaluate → deliver loop.
//!
//! `DetectionEngine` owns a `Scheduler`, a strategy, an evaluator and a
//! sink, and exposes an explicit `initialize`/`start`/`stop`/`cleanup`
//! lifecycle. Each tick runs inside the scheduler's timer task; errors are
//! contained to the tick that produced them.

pub mod context;
pub mod scheduler;
pub mod sink;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DetectionConfig;
use crate::strategy::evaluator::{OpportunityEvaluator, RejectionReason};
use crate::strategy::DetectionStrategy;
use crate::types::{DetectionError, EngineState, Opportunity};
use context::{ClockContext, ContextProvider};
use scheduler::Scheduler;
use sink::OpportunitySink;

// ---------------------------------------------------------------------------
// Status & outcomes
// ---------------------------------------------------------------------------

/// Running totals since the engine was constructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub ticks: u64,
    pub candidates: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub strategy_failures: u64,
    pub sink_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    candidates: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
    strategy_failures: AtomicU64,
    sink_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DetectionStats {
        DetectionStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            strategy_failures: self.strategy_failures.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the engine for callers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub is_active: bool,
    pub last_detection_at: Option<DateTime<Utc>>,
    pub stats: DetectionStats,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Engine was not running when the tick (or its delivery) came due.
    Skipped,
    NoCandidate,
    Delivered(Uuid),
    Rejected(RejectionReason),
    StrategyFailed(DetectionError),
    SinkFailed(DetectionError),
}

// ---------------------------------------------------------------------------
// Engine core (shared with the timer task)
// ---------------------------------------------------------------------------

struct EngineCore {
    config: DetectionConfig,
    strategy: Mutex<Box<dyn DetectionStrategy>>,
    evaluator: OpportunityEvaluator,
    sink: Arc<dyn OpportunitySink>,
    context: Arc<dyn ContextProvider>,
    state: watch::Sender<EngineState>,
    /// Held across delivery and across the Running → Stopping transition.
    gate: Mutex<()>,
    last_detection_at: watch::Sender<Option<DateTime<Utc>>>,
    counters: Counters,
}

impl EngineCore {
    fn is_running(&self) -> bool {
        self.state.borrow().is_running()
    }

    /// `run_tick` with panics caught, so the timer task survives a bad tick.
    async fn guarded_tick(&self, tick: u64) -> TickOutcome {
        match AssertUnwindSafe(self.run_tick(tick)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let strategy = self.strategy.lock().await.name().to_string();
                self.strategy_failed(strategy, format!("panicked: {}", panic_message(&*payload)))
            }
        }
    }

    /// One detection cycle: context → strategy → evaluator → sink.
    async fn run_tick(&self, tick: u64) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Skipped;
        }
        Counters::bump(&self.counters.ticks);

        // 1. Detect (context + strategy share one time budget)
        let (strategy_name, detection) = {
            let mut strategy = self.strategy.lock().await;
            let name = strategy.name().to_string();
            let attempt = async {
                let context = self
                    .context
                    .snapshot(tick)
                    .await
                    .context("context provider failed")?;
                strategy.detect(&context).await
            };
            let result = timeout(self.config.strategy_timeout(), attempt).await;
            (name, result)
        };

        let candidate = match detection {
            Ok(Ok(candidate)) => candidate,
            Ok(Err(e)) => return self.strategy_failed(strategy_name, format!("{e:#}")),
            Err(_) => {
                return self.strategy_failed(
                    strategy_name,
                    format!("timed out after {}ms", self.config.strategy_timeout_ms),
                )
            }
        };

        let Some(opportunity) = candidate else {
            return TickOutcome::NoCandidate;
        };
        Counters::bump(&self.counters.candidates);

        // 2. Evaluate
        if let Err(reason) = self.evaluator.evaluate(&opportunity, &self.config) {
            Counters::bump(&self.counters.rejected);
            debug!(
                tick,
                id = %opportunity.id(),
                reason = %reason,
                "Candidate rejected"
            );
            return TickOutcome::Rejected(reason);
        }

        // 3. Deliver
        self.deliver(tick, opportunity).await
    }

    async fn deliver(&self, tick: u64, opportunity: Opportunity) -> TickOutcome {
        let _gate = self.gate.lock().await;
        if !self.is_running() {
            debug!(tick, id = %opportunity.id(), "Engine stopping, delivery dropped");
            return TickOutcome::Skipped;
        }

        let id = opportunity.id();
        let detected_at = opportunity.detected_at();
        let sink_name = self.sink.name().to_string();

        let message = match timeout(self.config.sink_timeout(), self.sink.deliver(opportunity)).await {
            Ok(Ok(())) => {
                Counters::bump(&self.counters.delivered);
                self.last_detection_at.send_replace(Some(detected_at));
                info!(tick, id = %id, sink = %sink_name, "Opportunity delivered");
                return TickOutcome::Delivered(id);
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {}ms", self.config.sink_timeout_ms),
        };

        Counters::bump(&self.counters.sink_failures);
        let err = DetectionError::SinkDeliveryFailure {
            sink: sink_name,
            message,
        };
        warn!(tick, id = %id, error = %err, "Sink delivery failed — continuing");
        TickOutcome::SinkFailed(err)
    }

    fn strategy_failed(&self, strategy: String, message: String) -> TickOutcome {
        Counters::bump(&self.counters.strategy_failures);
        let err = DetectionError::StrategyFailure { strategy, message };
        warn!(error = %err, "Detection tick failed — continuing");
        TickOutcome::StrategyFailed(err)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Periodic opportunity-detection engine.
///
/// Construct explicitly with its collaborators, then drive it with
/// `start`/`stop`. The engine owns its scheduler and strategy exclusively.
pub struct DetectionEngine {
    core: Arc<EngineCore>,
    scheduler: Scheduler,
}

impl DetectionEngine {
    /// Create an engine whose strategy sees only the tick counter and clock.
    pub fn new(
        config: DetectionConfig,
        strategy: Box<dyn DetectionStrategy>,
        sink: Arc<dyn OpportunitySink>,
    ) -> Self {
        Self::with_context(config, strategy, sink, Arc::new(ClockContext))
    }

    /// Create an engine with an injected context provider.
    pub fn with_context(
        config: DetectionConfig,
        strategy: Box<dyn DetectionStrategy>,
        sink: Arc<dyn OpportunitySink>,
        context: Arc<dyn ContextProvider>,
    ) -> Self {
        let (state, _) = watch::channel(EngineState::Idle);
        let (last_detection_at, _) = watch::channel(None);
        Self {
            core: Arc::new(EngineCore {
                config,
                strategy: Mutex::new(strategy),
                evaluator: OpportunityEvaluator::new(),
                sink,
                context,
                state,
                gate: Mutex::new(()),
                last_detection_at,
                counters: Counters::default(),
            }),
            scheduler: Scheduler::new(),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.core.config
    }

    /// Validate configuration. Does not change state.
    pub fn initialize(&self) -> Result<(), DetectionError> {
        self.core.config.validate()?;
        info!(
            interval_ms = self.core.config.interval_ms,
            min_confidence = self.core.config.min_confidence,
            max_earnings = %self.core.config.max_earnings_outliers,
            "DeadTime engine initialised"
        );
        Ok(())
    }

    /// Start ticking. Fails with `AlreadyRunning` if already started, or with
    /// a configuration error.
    pub fn start(&mut self) -> Result<(), DetectionError> {
        if self.state() != EngineState::Idle || self.scheduler.is_running() {
            return Err(DetectionError::AlreadyRunning);
        }
        self.core.config.validate()?;

        self.core.state.send_replace(EngineState::Running);
        let core = self.core.clone();
        let started = self.scheduler.start(self.core.config.interval_ms, move |tick| {
            let core = core.clone();
            async move {
                let outcome = core.guarded_tick(tick).await;
                debug!(tick, outcome = ?outcome, "Tick complete");
            }
        });

        if let Err(e) = started {
            self.core.state.send_replace(EngineState::Idle);
            return Err(e);
        }

        info!(interval_ms = self.core.config.interval_ms, "Detection started");
        Ok(())
    }

    /// Stop ticking. Once this returns no further sink deliveries occur.
    /// Idempotent and safe to call from `Idle`.
    pub async fn stop(&mut self) {
        if self.state() == EngineState::Idle && !self.scheduler.is_running() {
            debug!("Stop requested while idle");
            return;
        }

        {
            let _gate = self.core.gate.lock().await;
            self.core.state.send_replace(EngineState::Stopping);
        }
        self.scheduler.stop().await;
        self.core.state.send_replace(EngineState::Idle);

        let stats = self.stats();
        info!(
            ticks = stats.ticks,
            delivered = stats.delivered,
            rejected = stats.rejected,
            strategy_failures = stats.strategy_failures,
            sink_failures = stats.sink_failures,
            "Detection stopped"
        );
    }

    /// Stop and release strategy-held resources. Safe to call repeatedly.
    pub async fn cleanup(&mut self) {
        self.stop().await;
        let mut strategy = self.core.strategy.lock().await;
        if let Err(e) = strategy.release().await {
            warn!(strategy = strategy.name(), error = %e, "Strategy release failed");
        }
        debug!(strategy = strategy.name(), "Engine cleaned up");
    }

    pub fn state(&self) -> EngineState {
        *self.core.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_running()
    }

    /// Detection time of the most recently delivered opportunity.
    pub fn last_detection_at(&self) -> Option<DateTime<Utc>> {
        *self.core.last_detection_at.borrow()
    }

    pub fn stats(&self) -> DetectionStats {
        self.core.counters.snapshot()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state(),
            is_active: self.is_active(),
            last_detection_at: self.last_detection_at(),
            stats: self.stats(),
        }
    }

    /// Observe state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.core.state.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
