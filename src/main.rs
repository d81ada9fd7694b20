//! DeadTime — periodic opportunity-detection engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the engine explicitly (strategy, context, sinks) and runs until
//! Ctrl+C, then cleans up.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use deadtime::config;
use deadtime::engine::context::StaticContext;
use deadtime::engine::sink::{ChannelSink, FanoutSink, LogSink, OpportunitySink};
use deadtime::engine::DetectionEngine;
use deadtime::strategy::mock::MockStrategy;

const BANNER: &str = r#"
  ___               _ _____ _
 |   \ ___ __ _ __| |_   _(_)_ __  ___
 | |) / -_) _` / _` | | | | | '  \/ -_)
 |___/\___\__,_\__,_| |_| |_|_|_|_\___|

  Dead-time opportunity detection
"#;

/// Buffered opportunities awaiting the downstream consumer.
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("DEADTIME_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging(&cfg);

    println!("{BANNER}");
    info!(
        config = %config_path,
        interval_ms = cfg.engine.interval_ms,
        min_confidence = cfg.engine.min_confidence,
        mock_mode = %cfg.mock.mode,
        "DeadTime starting up"
    );

    // -- Wire components -------------------------------------------------

    let strategy = MockStrategy::from_config(&cfg.mock).context("Invalid [mock] section")?;
    let context = StaticContext::new(cfg.context.labels.clone());

    let (channel_sink, mut opportunities) = ChannelSink::new(OUTPUT_CHANNEL_CAPACITY);
    let sinks: Vec<Arc<dyn OpportunitySink>> = vec![Arc::new(LogSink), Arc::new(channel_sink)];
    let sink = Arc::new(FanoutSink::new(sinks));

    let mut engine = DetectionEngine::with_context(
        cfg.engine.clone(),
        Box::new(strategy),
        sink,
        Arc::new(context),
    );
    engine.initialize()?;
    engine.start()?;

    // Downstream consumer stand-in: the notification layer lives outside this crate.
    let consumer = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(opp) = opportunities.recv().await {
            received += 1;
            info!(received, id = %opp.id(), location = %opp.location(), "Opportunity queued for notification");
        }
        received
    });

    info!("Detection running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received.");

    engine.cleanup().await;
    let status = engine.status();
    drop(engine);

    match consumer.await {
        Ok(received) => info!(received, "Consumer drained"),
        Err(e) => warn!(error = %e, "Consumer task failed"),
    }

    info!(
        ticks = status.stats.ticks,
        delivered = status.stats.delivered,
        rejected = status.stats.rejected,
        last_detection = ?status.last_detection_at,
        "DeadTime shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &config::AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("deadtime=info"));

    let json_logging = cfg.logging.json || std::env::var("DEADTIME_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
