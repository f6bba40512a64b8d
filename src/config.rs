//! Startup configuration for the teleop node.
//!
//! Everything is read once from a TOML file at startup. A missing file falls
//! back to [`TeleopConfig::default`], which reproduces the stock sewer robot
//! setup (two joystick profiles, three control modes, 20 Hz control loop).

use crate::mapping::key_mapping::KeyMapping;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/joy_teleop";
const CONFIG_FILE: &str = "teleop.toml";

/// Errors raised while loading or validating the startup configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where joystick samples come from
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Local gamepad read through gilrs
    #[default]
    Gamepad,
    /// JSON samples published on the bus joy topic
    Bus,
}

/// Node-level options
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct NodeConfig {
    /// Output channel for velocity commands
    pub cmd_vel_topic: String,
    /// Control loop frequency in Hz
    pub control_freq_hz: u32,
    /// Connect to the configuration authority at startup
    pub use_dynamic_params: bool,
    pub sample_source: SampleSource,
    /// Sampling interval of the local gamepad
    pub gamepad_interval_ms: u64,
    /// Fraction of the maximum the speed ceilings start at
    pub initial_ceiling_fraction: f64,
    /// Stop the node when the active mode is missing from the mode list
    pub fatal_mode_desync: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cmd_vel_topic: "sewer_teleop/set_velocities".to_string(),
            control_freq_hz: 20,
            use_dynamic_params: true,
            sample_source: SampleSource::Gamepad,
            gamepad_interval_ms: 50,
            initial_ceiling_fraction: 0.25,
            fatal_mode_desync: false,
        }
    }
}

/// MQTT broker the node talks to
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topic carrying joystick samples when `sample_source = "bus"`
    pub joy_topic: String,
    pub keep_alive_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "sewer_teleop".to_string(),
            joy_topic: "joy".to_string(),
            keep_alive_secs: 5,
        }
    }
}

/// Connection settings for the mode/ceiling authority
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Authority node name; requests go to `<name>/set`, updates arrive on `<name>/state`
    pub name: String,
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            name: "sewer_motors".to_string(),
            connect_attempts: 3,
            retry_delay_ms: 2000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl AuthorityConfig {
    pub fn set_topic(&self) -> String {
        format!("{}/set", self.name)
    }

    pub fn state_topic(&self) -> String {
        format!("{}/state", self.name)
    }
}

/// Complete startup configuration
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct TeleopConfig {
    pub node: NodeConfig,
    pub bus: BusConfig,
    pub authority: AuthorityConfig,
    /// Ordered control modes, cycled through with the mode button
    pub modes: Vec<String>,
    pub key_mapping: KeyMapping,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            bus: BusConfig::default(),
            authority: AuthorityConfig::default(),
            modes: vec![
                "Joystick".to_string(),
                "Autonomous".to_string(),
                "Interface".to_string(),
            ],
            key_mapping: KeyMapping::default_config(),
        }
    }
}

impl TeleopConfig {
    /// Default location: `~/.config/joy_teleop/teleop.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| {
            warn!("Could not determine home directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the configuration, falling back to defaults when the file does not exist
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!(
                "No config file at {}, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modes.is_empty() {
            return Err(ConfigError::Invalid(
                "mode list cannot be empty".to_string(),
            ));
        }
        if self.node.control_freq_hz == 0 {
            return Err(ConfigError::Invalid(
                "control_freq_hz must be greater than zero".to_string(),
            ));
        }
        if self.node.gamepad_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "gamepad_interval_ms must be greater than zero".to_string(),
            ));
        }
        let fraction = self.node.initial_ceiling_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "initial_ceiling_fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        if self.authority.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "authority.connect_attempts must be at least 1".to_string(),
            ));
        }

        // Incomplete profiles fail closed at translation time; warn once here.
        for problem in self.key_mapping.validate() {
            warn!("Key mapping: {}", problem);
        }
        Ok(())
    }
}
