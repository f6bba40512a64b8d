pub mod bus;
pub mod config;
pub mod control;
pub mod controller;
pub mod mapping;
pub mod node;

use crate::bus::joy_source::JoyRoute;
use crate::bus::{AuthorityConnection, BusConnection, MqttCommandSink};
use crate::config::{SampleSource, TeleopConfig};
use crate::control::{
    AuthorityLink, ControlLoop, ControlLoopHandle, ControlState, LoopSettings, ModeCycle,
};
use crate::controller::{CollectorHandle, CollectorSettings};
use crate::mapping::Ceilings;
use crate::node::TeleopNode;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

// Speed maxima when no authority reports its own
const DEFAULT_MAXIMA: Ceilings = Ceilings {
    linear: 1.0,
    rotational: 1.0,
};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = setup_config().await?;
    let modes = ModeCycle::new(config.modes.clone())?;
    let shutdown = CancellationToken::new();

    // Bus connection for commands and, optionally, remote samples
    let (sample_tx, sample_rx) = mpsc::channel(100);
    let bus = BusConnection::open(&config.bus);
    let sink = Arc::new(MqttCommandSink::new(
        bus.client(),
        config.node.cmd_vel_topic.clone(),
    ));
    info!("Publishing velocity commands on {}", sink.topic());

    let route = match config.node.sample_source {
        SampleSource::Bus => {
            info!("Reading joystick samples from bus topic {}", config.bus.joy_topic);
            Some(JoyRoute {
                topic: config.bus.joy_topic.clone(),
                sender: sample_tx.clone(),
            })
        }
        SampleSource::Gamepad => None,
    };
    let bus_pump = bus.spawn(route, shutdown.clone());

    // Authority is resolved once; without it the node stays local-only
    let connection = if config.node.use_dynamic_params {
        AuthorityConnection::connect_with_retry(&config.bus, &config.authority).await
    } else {
        info!("Dynamic parameters disabled, running without authority");
        None
    };

    let state = match &connection {
        Some(connection) => ControlState::seeded(
            modes.first().to_string(),
            DEFAULT_MAXIMA,
            connection.initial_state(),
            config.node.initial_ceiling_fraction,
        ),
        None => ControlState::new(modes.first().to_string(), DEFAULT_MAXIMA, 1.0),
    };
    if !modes.contains(&state.active_mode) {
        warn!(
            "Authority starts in mode '{}' outside {:?}, cycling will fail until it returns",
            state.active_mode,
            modes.modes()
        );
    }
    let state = state.shared();

    let link = match connection {
        Some(connection) => connection.start(state.clone(), modes.clone(), shutdown.clone()),
        None => AuthorityLink::Unavailable,
    };

    let control_loop = ControlLoop::create(
        state.clone(),
        modes,
        &link,
        LoopSettings {
            control_freq_hz: config.node.control_freq_hz,
            fatal_mode_desync: config.node.fatal_mode_desync,
        },
    );
    let control_handle = ControlLoopHandle::spawn(control_loop, shutdown.clone());

    let collector = match config.node.sample_source {
        SampleSource::Gamepad => {
            let settings = CollectorSettings {
                sample_interval_ms: config.node.gamepad_interval_ms,
            };
            let handle = CollectorHandle::spawn(Some(settings), sample_tx, shutdown.clone())
                .map_err(|e| eyre!("Failed to spawn gamepad collector: {}", e))?;
            Some(handle)
        }
        SampleSource::Bus => {
            drop(sample_tx);
            None
        }
    };

    let teleop = TeleopNode::new(state, config.key_mapping.clone(), sink);
    let node_handle = tokio::spawn(teleop.run(sample_rx, shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Termination signal received, shutting down"),
            Err(e) => error!("Unable to listen for termination signal: {}", e),
        }
        signal_token.cancel();
    });

    let loop_result = control_handle.join().await;
    // A loop that stopped on its own takes the rest of the node down with it
    shutdown.cancel();

    match node_handle.await {
        Ok(stats) => info!("Sample handling finished: {:?}", stats),
        Err(e) => error!("Teleop node task panicked: {}", e),
    }
    bus_pump.join().await;

    if let Some(collector) = collector {
        if !collector.is_finished() {
            warn!("Gamepad collector still finishing its last poll");
        }
    }

    let stats = loop_result.map_err(|e| eyre!("Control loop failed: {}", e))?;
    info!("Control loop finished: {:?}", stats);
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn setup_config() -> Result<TeleopConfig> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(TeleopConfig::default_path);

    let config = TeleopConfig::load(&path).await?;
    config.validate()?;
    Ok(config)
}
