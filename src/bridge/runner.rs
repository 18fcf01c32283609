use rumqttc::AsyncClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::mqtt::mqtt_handler::{Connected, MqttSession};

use super::pipeline::BridgePipeline;

/// Event loop of the bridge.
///
/// Delivers every inbound publish to the pipeline before polling the broker
/// again. A lost session goes through the fixed-delay reconnect loop; only
/// `shutdown` ends the loop.
pub async fn run_session(
    session: MqttSession<Connected>,
    mut pipeline: BridgePipeline<AsyncClient>,
    shutdown: CancellationToken,
) {
    info!("Starting MQTT loop");
    let mut session = session;

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => None,
            event = session.next_message() => Some(event),
        };

        let Some(event) = event else {
            let closed = session.shutdown().await;
            info!(
                "MQTT loop stopped after {} messages and {} reconnects",
                closed.status().messages_received,
                closed.status().disconnects
            );
            return;
        };

        match event {
            Ok(Some(message)) => {
                if let Err(e) = pipeline
                    .handle_message(&message.topic, &message.payload)
                    .await
                {
                    warn!("Dropping message: {}", e);
                }
            }
            Ok(None) => {}
            Err(reason) => {
                let disconnected = session.disconnected(&reason);
                session = tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Shutdown requested while reconnecting");
                        return;
                    }
                    connected = disconnected.reconnect() => connected,
                };
            }
        }
    }
}
