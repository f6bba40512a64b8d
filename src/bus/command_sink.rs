use crate::bus::BusError;
use crate::mapping::VelocityCommand;
use rumqttc::{AsyncClient, QoS};
use tracing::debug;

/// Destination of emitted velocity commands
pub trait CommandSink: Send + Sync + 'static {
    /// Non-blocking send; the caller never waits for delivery
    fn send(&self, command: &VelocityCommand) -> Result<(), BusError>;
}

/// Publishes commands as twist JSON on the output channel
pub struct MqttCommandSink {
    client: AsyncClient,
    topic: String,
}

impl MqttCommandSink {
    pub fn new(client: AsyncClient, topic: String) -> Self {
        Self { client, topic }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl CommandSink for MqttCommandSink {
    fn send(&self, command: &VelocityCommand) -> Result<(), BusError> {
        let payload = serde_json::to_vec(command).map_err(|e| BusError::Publish {
            topic: self.topic.clone(),
            reason: e.to_string(),
        })?;

        self.client
            .try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
            .map_err(|e| BusError::Publish {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })?;
        debug!("Published {:?} on {}", command, self.topic);
        Ok(())
    }
}
