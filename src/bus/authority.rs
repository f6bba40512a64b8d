//! Client for the mode/ceiling authority
//!
//! The authority owns the canonical control mode and speed maxima. The node
//! requests mode changes on `<name>/set` and receives the authority's full
//! state on `<name>/state` (published retained, so a fresh subscriber gets
//! the current values straight away).
//!
//! Connecting is a bounded retry performed once at startup. An attempt only
//! succeeds once the authority's first state arrives; a broker without a
//! live authority counts as unavailable. The result is either an
//! [`AuthorityConnection`] or nothing, in which case the node runs in
//! local-only mode for the rest of the process lifetime.

use crate::bus::{mqtt_options, BusError};
use crate::config::{AuthorityConfig, BusConfig};
use crate::control::{
    AuthorityLink, AuthorityUpdate, ControlError, ModeAuthority, ModeCycle, SharedControlState,
};
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct ModeRequest<'a> {
    controller: &'a str,
}

/// Mode push side of the authority link
pub struct MqttAuthority {
    client: AsyncClient,
    set_topic: String,
}

impl ModeAuthority for MqttAuthority {
    fn push_mode(&self, mode: &str) -> Result<(), ControlError> {
        let payload = serde_json::to_vec(&ModeRequest { controller: mode })
            .map_err(|e| ControlError::AuthorityPush(e.to_string()))?;
        self.client
            .try_publish(self.set_topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| ControlError::AuthorityPush(e.to_string()))
    }
}

/// An established authority connection whose event pump has not started yet
pub struct AuthorityConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    set_topic: String,
    state_topic: String,
    initial_state: AuthorityUpdate,
}

impl AuthorityConnection {
    /// Connects with up to `connect_attempts` tries, `retry_delay_ms` apart
    pub async fn connect_with_retry(bus: &BusConfig, config: &AuthorityConfig) -> Option<Self> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let result = retry_bounded(
            config.connect_attempts,
            Duration::from_millis(config.retry_delay_ms),
            |attempt| async move {
                info!(
                    "Connecting to authority '{}' (attempt {}/{})",
                    config.name, attempt, config.connect_attempts
                );
                let state_topic = config.state_topic();
                let (client, mut eventloop) =
                    AsyncClient::new(mqtt_options(bus, &config.name), 10);
                if let Err(e) = client.try_subscribe(state_topic.as_str(), QoS::AtLeastOnce) {
                    return Err(BusError::Subscribe {
                        topic: state_topic.clone(),
                        reason: e.to_string(),
                    });
                }

                let first_state = tokio::time::timeout(
                    connect_timeout,
                    wait_for_state(&mut eventloop, &state_topic),
                )
                .await;
                match first_state {
                    Ok(Ok(update)) => Ok((client, eventloop, update)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(BusError::Connection(format!(
                        "no state on {} within {} ms",
                        state_topic, config.connect_timeout_ms
                    ))),
                }
            },
        )
        .await;

        match result {
            Some((client, eventloop, initial_state)) => {
                info!(
                    "Connected to authority '{}', initial state {:?}",
                    config.name, initial_state
                );
                Some(Self {
                    client,
                    eventloop,
                    set_topic: config.set_topic(),
                    state_topic: config.state_topic(),
                    initial_state,
                })
            }
            None => {
                warn!(
                    "No authority '{}' after {} attempts, continuing local-only",
                    config.name, config.connect_attempts
                );
                None
            }
        }
    }

    /// State the authority reported while connecting
    pub fn initial_state(&self) -> &AuthorityUpdate {
        &self.initial_state
    }

    /// Starts the state update pump and hands out the link
    pub fn start(
        self,
        state: SharedControlState,
        modes: ModeCycle,
        shutdown: CancellationToken,
    ) -> AuthorityLink {
        let AuthorityConnection {
            client,
            mut eventloop,
            set_topic,
            state_topic,
            ..
        } = self;

        let pump_client = client.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Shutdown signal received for authority pump");
                        break;
                    }

                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("Authority reconnected, renewing subscription");
                            if let Err(e) = pump_client.try_subscribe(state_topic.as_str(), QoS::AtLeastOnce) {
                                error!("{}", e);
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == state_topic => {
                            if let Err(e) = apply_state_payload(&state, &modes, &publish.topic, &publish.payload).await {
                                warn!("{}", e);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Authority connection error: {}", e);
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            }
        });

        AuthorityLink::Connected(Arc::new(MqttAuthority { client, set_topic }))
    }
}

/// Polls until the first state message arrives on `topic`
async fn wait_for_state(
    eventloop: &mut EventLoop,
    topic: &str,
) -> Result<AuthorityUpdate, BusError> {
    loop {
        let event = eventloop
            .poll()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                debug!("Broker accepted connection, waiting for authority state on {}", topic)
            }
            Event::Incoming(Packet::Publish(publish)) if publish.topic == topic => {
                return decode_update(topic, &publish.payload);
            }
            _ => {}
        }
    }
}

fn decode_update(topic: &str, payload: &[u8]) -> Result<AuthorityUpdate, BusError> {
    serde_json::from_slice(payload).map_err(|e| BusError::Decode {
        topic: topic.to_string(),
        reason: e.to_string(),
    })
}

/// Applies an authority state payload; the authority always wins
pub async fn apply_state_payload(
    state: &SharedControlState,
    modes: &ModeCycle,
    topic: &str,
    payload: &[u8],
) -> Result<AuthorityUpdate, BusError> {
    let update = decode_update(topic, payload)?;

    if let Some(mode) = &update.mode {
        if !modes.contains(mode) {
            warn!(
                "Authority reports mode '{}' outside {:?}, cycling will fail until it returns",
                mode,
                modes.modes()
            );
        }
    }

    state.lock().await.apply_authority_update(&update);
    info!("Parameters have been updated: {:?}", update);
    Ok(update)
}

/// Runs `attempt` up to `attempts` times with a fixed `delay` between tries
pub async fn retry_bounded<T, E, F, Fut>(attempts: u32, delay: Duration, mut attempt: F) -> Option<T>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    for n in 1..=attempts {
        match attempt(n).await {
            Ok(value) => return Some(value),
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", n, attempts, e);
                if n < attempts {
                    debug!("Retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    None
}
