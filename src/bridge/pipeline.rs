use tracing::{debug, error, info};

use crate::decision::{ActuationCommand, Decision, DecisionEngine};
use crate::mqtt::client::BrokerClient;
use crate::mqtt::message_router::{MessageRouter, ParseError};
use crate::telemetry::ForwarderHandle;

/// What one inbound message led to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOutcome {
    pub command: Option<ActuationCommand>,
    pub command_queued: bool,
    pub queued_for_storage: bool,
}

/// Inbound path for one message: route, decide, forward.
///
/// The command is queued on the broker client before the reading is handed
/// to the storage queue. Publish and storage failures are logged here and do
/// not affect each other; only a [`ParseError`] is returned, since nothing
/// downstream ran in that case.
pub struct BridgePipeline<C: BrokerClient> {
    router: MessageRouter,
    engine: DecisionEngine,
    forwarder: ForwarderHandle,
    control_topic: String,
    client: C,
}

impl<C: BrokerClient> BridgePipeline<C> {
    pub fn new(
        router: MessageRouter,
        engine: DecisionEngine,
        forwarder: ForwarderHandle,
        control_topic: String,
        client: C,
    ) -> Self {
        Self {
            router,
            engine,
            forwarder,
            control_topic,
            client,
        }
    }

    pub async fn handle_message(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<PipelineOutcome, ParseError> {
        let reading = self.router.route(topic, payload)?;
        info!("Received {}", reading);

        let mut outcome = PipelineOutcome::default();

        if let Decision::Command(command) = self.engine.evaluate(&reading) {
            outcome.command = Some(command);
            match self
                .client
                .publish_payload(&self.control_topic, command.payload().as_bytes())
            {
                Ok(()) => {
                    info!("Sending '{}' to {}", command, self.control_topic);
                    outcome.command_queued = true;
                }
                Err(e) => error!("Failed to send '{}': {}", command, e),
            }
        }

        match self.forwarder.submit(reading).await {
            Ok(queued) => outcome.queued_for_storage = queued,
            Err(e) => error!("Reading not forwarded: {}", e),
        }

        debug!("Pipeline outcome: {:?}", outcome);
        Ok(outcome)
    }
}
