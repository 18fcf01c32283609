pub mod bridge;
pub mod config;
pub mod decision;
pub mod mqtt;
pub mod telemetry;

use crate::bridge::{run_session, BridgePipeline};
use crate::config::{BridgeConfig, Cli};
use crate::decision::DecisionEngine;
use crate::mqtt::message_router::MessageRouter;
use crate::mqtt::mqtt_handler::MqttSession;
use crate::mqtt::subscriptions::SubscriptionSet;
use crate::telemetry::dead_letter::DeadLetterLog;
use crate::telemetry::forwarder::RetryPolicy;
use crate::telemetry::forwarder_handle::join_worker;
use crate::telemetry::influx_writer::InfluxWriter;
use crate::telemetry::{ForwarderHandle, TelemetryForwarder};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup()?;

    let config = BridgeConfig::load(&cli).await?;
    info!(
        "Bridging {} to {} (threshold {} °C)",
        config.broker, config.storage.base_url, config.decision.threshold
    );

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone())?;

    // Storage worker first, so no reading is lost once the session is up
    let writer = InfluxWriter::new(&config.storage)?;
    let forwarder = TelemetryForwarder::new(
        writer,
        config.storage.series.clone(),
        RetryPolicy::from_config(&config.forwarder),
        DeadLetterLog::new(
            config.forwarder.dead_letter_capacity,
            config.forwarder.dead_letter_path.clone(),
        ),
    );
    let (forwarder_handle, forwarder_task) =
        ForwarderHandle::spawn(forwarder, &config.forwarder, shutdown.clone());

    let subscriptions = SubscriptionSet::from_config(&config.topics);
    let (session, client) = MqttSession::create(&config.broker, subscriptions).await?;

    let session = match session.connect().await {
        Ok(session) => session,
        Err(e) => {
            shutdown.cancel();
            join_worker(forwarder_task).await;
            return Err(eyre!("Could not connect to MQTT broker: {}", e));
        }
    };

    let pipeline = BridgePipeline::new(
        MessageRouter::new(),
        DecisionEngine::new(&config.decision),
        forwarder_handle,
        config.topics.control.clone(),
        client,
    );

    run_session(session, pipeline, shutdown.clone()).await;

    shutdown.cancel();
    join_worker(forwarder_task).await;
    info!("Bridge stopped");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn spawn_signal_listener(shutdown: CancellationToken) -> Result<()> {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
        shutdown.cancel();
    });
    Ok(())
}
