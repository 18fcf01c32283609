//! Forwarder Handle - bounded queue in front of the storage worker
//!
//! Decouples the broker event loop from the storage round trip:
//!
//! ```text
//! event loop ─[Reading]→ mpsc::channel(queue_capacity) ─→ worker ─→ InfluxWriter
//!             (send_timeout)                              (one write at a time)
//! ```
//!
//! A single worker consumes the queue, so readings are written in arrival
//! order and never more than once at a time. When the queue stays full for
//! the enqueue timeout the new reading is dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mqtt::message_router::Reading;

use super::error::ForwardError;
use super::forwarder::TelemetryForwarder;
use super::ForwarderConfig;

#[derive(Debug, Clone)]
pub struct ForwarderHandle {
    sender: mpsc::Sender<Reading>,
    enqueue_timeout: Duration,
}

impl ForwarderHandle {
    /// Spawns the storage worker and returns the handle feeding it.
    ///
    /// The worker stops once every handle is dropped or `shutdown` fires;
    /// in both cases it drains what is already queued first.
    pub fn spawn(
        forwarder: TelemetryForwarder,
        config: &ForwarderConfig,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (handle, receiver) = Self::channel(config.queue_capacity, config.enqueue_timeout());
        debug!(
            "Created forwarding queue with capacity {}",
            config.queue_capacity
        );

        info!("Spawning telemetry forwarder task");
        let task = tokio::spawn(async move {
            run_forwarder_loop(forwarder, receiver, shutdown).await;
        });

        (handle, task)
    }

    /// Handle plus the raw queue end, without a worker
    pub fn channel(capacity: usize, enqueue_timeout: Duration) -> (Self, mpsc::Receiver<Reading>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                enqueue_timeout,
            },
            receiver,
        )
    }

    /// Queues a reading for storage.
    ///
    /// Returns `Ok(false)` without queuing when the reading lacks temperature
    /// or pressure.
    pub async fn submit(&self, reading: Reading) -> Result<bool, ForwardError> {
        if !reading.is_storable() {
            debug!("Not forwarding incomplete reading from {}", reading.topic());
            return Ok(false);
        }

        match self.sender.send_timeout(reading, self.enqueue_timeout).await {
            Ok(()) => Ok(true),
            Err(SendTimeoutError::Timeout(_)) => Err(ForwardError::QueueFull(self.enqueue_timeout)),
            Err(SendTimeoutError::Closed(_)) => Err(ForwardError::WorkerStopped),
        }
    }
}

async fn run_forwarder_loop(
    mut forwarder: TelemetryForwarder,
    mut receiver: mpsc::Receiver<Reading>,
    shutdown: CancellationToken,
) {
    info!("Telemetry forwarder started");

    loop {
        tokio::select! {
            next = receiver.recv() => match next {
                Some(reading) => {
                    // failures are logged and dead-lettered by the forwarder
                    let _ = forwarder.forward(&reading).await;
                }
                None => {
                    debug!("All forwarder handles dropped");
                    break;
                }
            },
            _ = shutdown.cancelled() => {
                receiver.close();
                let mut drained = 0;
                while let Some(reading) = receiver.recv().await {
                    let _ = forwarder.forward(&reading).await;
                    drained += 1;
                }
                if drained > 0 {
                    warn!("Flushed {} queued readings during shutdown", drained);
                }
                break;
            }
        }
    }

    forwarder.log_stats();
    info!("Telemetry forwarder stopped");
}

/// Waits for the worker task after shutdown was signalled.
///
/// Returns `false` when the worker panicked or was aborted.
pub async fn join_worker(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("Forwarder task panicked: {}", e);
            false
        }
    }
}
