use crate::bus::{mqtt_options, BusError};
use crate::config::BusConfig;
use crate::controller::sample::JoystickSample;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Forwards samples arriving on `topic` into the node's sample channel
pub struct JoyRoute {
    pub topic: String,
    pub sender: mpsc::Sender<JoystickSample>,
}

/// Broker connection used for command output and, optionally, joystick input
pub struct BusConnection {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl BusConnection {
    pub fn open(bus: &BusConfig) -> Self {
        info!("Opening bus connection to {}:{}", bus.host, bus.port);
        let (client, eventloop) = AsyncClient::new(mqtt_options(bus, "bus"), 100);
        Self { client, eventloop }
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Drives the connection until shutdown; rumqttc reconnects on the next poll
    pub fn spawn(self, route: Option<JoyRoute>, shutdown: CancellationToken) -> BusPump {
        let BusConnection {
            client,
            mut eventloop,
        } = self;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Shutdown signal received for bus pump");
                        break;
                    }

                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("Bus connected");
                            // Clean sessions drop subscriptions, renew them on every connect
                            if let Some(route) = &route {
                                if let Err(e) = client.try_subscribe(route.topic.as_str(), QoS::AtMostOnce) {
                                    error!("{}", BusError::Subscribe {
                                        topic: route.topic.clone(),
                                        reason: e.to_string(),
                                    });
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let Some(route) = &route else { continue };
                            if publish.topic != route.topic {
                                continue;
                            }
                            match decode_sample(&publish.topic, &publish.payload) {
                                Ok(sample) => {
                                    if let Err(e) = route.sender.try_send(sample) {
                                        debug!("Dropping bus sample: {}", e);
                                    }
                                }
                                Err(e) => warn!("{}", e),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("{}", BusError::Connection(e.to_string()));
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            }
        });

        BusPump { task }
    }
}

pub struct BusPump {
    task: JoinHandle<()>,
}

impl BusPump {
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Bus pump task panicked: {}", e);
        }
    }
}

/// Parses a joy JSON payload
pub fn decode_sample(topic: &str, payload: &[u8]) -> Result<JoystickSample, BusError> {
    serde_json::from_slice(payload).map_err(|e| BusError::Decode {
        topic: topic.to_string(),
        reason: e.to_string(),
    })
}
