use crate::controller::sample::JoystickSample;
use chrono::Local;
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Button order of the emitted samples (XInput joy layout)
const JOY_BUTTONS: [Button; 11] = [
    Button::South,        // A
    Button::East,         // B
    Button::West,         // X
    Button::North,        // Y
    Button::LeftTrigger,  // LB
    Button::RightTrigger, // RB
    Button::Select,       // Back
    Button::Start,
    Button::Mode, // Guide
    Button::LeftThumb,
    Button::RightThumb,
];

// Collector settings
#[derive(Clone, Debug)]
pub struct CollectorSettings {
    /// Interval between two emitted samples
    pub sample_interval_ms: u64,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 50,
        }
    }
}

// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to spawn collector thread: {0}")]
    SpawnError(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,

    // Gamepad the samples are read from
    active_gamepad: Option<GamepadId>,

    settings: CollectorSettings,

    sample_sender: mpsc::Sender<JoystickSample>,
}

impl EventCollector<Initializing> {
    pub fn create(
        settings: Option<CollectorSettings>,
        sample_sender: mpsc::Sender<JoystickSample>,
    ) -> Result<Self, CollectorError> {
        let settings = settings.unwrap_or_default();
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| {
            error!("Failed to initialize gilrs: {}", e);
            CollectorError::InitializationError(e.to_string())
        })?;

        Ok(Self::new(gilrs, None, settings, sample_sender))
    }

    /// Picks the first connected gamepad and transitions to Collecting
    pub fn initialize(mut self) -> EventCollector<Collecting> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one to appear");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, gamepad.name());
            }
            let (id, gamepad) = &gamepads[0];
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
            self.active_gamepad = Some(*id);
        }

        self.transition()
    }
}

impl EventCollector<Collecting> {
    /// Drains pending gilrs events so the cached gamepad state is current
    fn pump_events(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected if self.active_gamepad.is_none() => {
                    info!("Gamepad {} connected, selecting it", id);
                    self.active_gamepad = Some(id);
                }
                EventType::Disconnected if self.active_gamepad == Some(id) => {
                    warn!("Active gamepad {} disconnected", id);
                    self.active_gamepad = None;
                }
                _ => {}
            }
        }
    }

    /// Reads the active gamepad into a joy layout sample
    pub fn read_sample(&self) -> Option<JoystickSample> {
        let gamepad = self.gilrs.connected_gamepad(self.active_gamepad?)?;

        let buttons = JOY_BUTTONS
            .iter()
            .map(|button| gamepad.is_pressed(*button))
            .collect();

        // Joy convention: left and up are positive, triggers rest at 1.0 and go to -1.0
        let trigger = |button: Button| {
            let pressed = gamepad.button_data(button).map_or(0.0, |data| data.value());
            1.0 - 2.0 * pressed
        };
        let dpad = |positive: Button, negative: Button| {
            match (gamepad.is_pressed(positive), gamepad.is_pressed(negative)) {
                (true, false) => 1.0,
                (false, true) => -1.0,
                _ => 0.0,
            }
        };
        let axes = vec![
            -gamepad.value(Axis::LeftStickX),
            gamepad.value(Axis::LeftStickY),
            trigger(Button::LeftTrigger2),
            -gamepad.value(Axis::RightStickX),
            gamepad.value(Axis::RightStickY),
            trigger(Button::RightTrigger2),
            dpad(Button::DPadLeft, Button::DPadRight),
            dpad(Button::DPadUp, Button::DPadDown),
        ];

        Some(JoystickSample::new(buttons, axes))
    }

    /// Samples the gamepad at a fixed interval until cancelled
    pub fn run_collection_loop(&mut self, shutdown: CancellationToken) {
        info!(
            "Starting Event Collector loop ({} ms interval)",
            self.settings.sample_interval_ms
        );
        let interval = Duration::from_millis(self.settings.sample_interval_ms);

        let mut sample_count: u64 = 0;
        let mut last_log_time = Local::now();
        let log_interval = chrono::Duration::seconds(30);

        while !shutdown.is_cancelled() {
            self.pump_events();

            if let Some(sample) = self.read_sample() {
                match self.sample_sender.try_send(sample) {
                    Ok(_) => sample_count += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!("Sample queue full, dropping sample");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        info!("Sample channel closed, stopping collector");
                        break;
                    }
                }
            }

            let now = Local::now();
            if now - last_log_time > log_interval {
                info!(
                    "Event Collector stats: {} samples in last {} seconds",
                    sample_count,
                    log_interval.num_seconds()
                );
                sample_count = 0;
                last_log_time = now;
            }

            std::thread::sleep(interval);
        }

        info!("Event Collector loop stopped");
    }
}

/// Runs the collector on a dedicated thread; gilrs polling is blocking
pub struct CollectorHandle {
    thread: std::thread::JoinHandle<()>,
}

impl CollectorHandle {
    pub fn spawn(
        settings: Option<CollectorSettings>,
        sample_sender: mpsc::Sender<JoystickSample>,
        shutdown: CancellationToken,
    ) -> Result<Self, CollectorError> {
        info!("Spawning Event Collector with settings: {:?}", settings);

        let thread = std::thread::Builder::new()
            .name("gamepad-collector".to_string())
            .spawn(move || {
                match EventCollector::create(settings, sample_sender) {
                    Ok(collector) => {
                        let mut collecting = collector.initialize();
                        collecting.run_collection_loop(shutdown);
                    }
                    Err(e) => error!("Failed to initialize Event Collector: {}", e),
                }
            })
            .map_err(|e| CollectorError::SpawnError(e.to_string()))?;

        Ok(Self { thread })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}
