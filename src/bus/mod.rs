//! # MQTT transport
//!
//! The node talks to the rest of the robot over an MQTT broker:
//!
//! ```text
//! bus/
//! ├── command_sink.rs  - velocity commands to the output channel
//! ├── joy_source.rs    - joystick samples from the joy topic, event pump
//! └── authority.rs     - mode/ceiling authority client with bounded retry
//! ```
//!
//! Payloads are JSON. Publishing is always fire-and-forget (`try_publish`)
//! so no caller ever waits on the broker.

pub mod authority;
pub mod command_sink;
pub mod joy_source;

use crate::config::BusConfig;
use rumqttc::MqttOptions;
use std::time::Duration;

pub use authority::{AuthorityConnection, MqttAuthority};
pub use command_sink::{CommandSink, MqttCommandSink};
pub use joy_source::{BusConnection, BusPump};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Failed to decode payload on {topic}: {reason}")]
    Decode { topic: String, reason: String },

    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Broker options for one client; `suffix` keeps client ids unique per connection
pub fn mqtt_options(bus: &BusConfig, suffix: &str) -> MqttOptions {
    let client_id = format!("{}_{}", bus.client_id, suffix);
    let mut options = MqttOptions::new(client_id, bus.host.clone(), bus.port);
    options.set_keep_alive(Duration::from_secs(bus.keep_alive_secs.max(1)));
    options
}
