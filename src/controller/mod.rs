//! Joystick input subsystem
//!
//! Produces [`JoystickSample`]s in joy message layout for the teleop node:
//!
//! 1. [`sample`] - Sample model, hardware profiles and button phases
//! 2. [`event_collector`] - Local gamepad polling through gilrs
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Collector ──► mpsc<JoystickSample> ──► TeleopNode
//!             (joy layout)
//! ```
//!
//! Samples can also arrive from the bus (see [`crate::bus::joy_source`]);
//! both sources feed the same channel.

pub mod event_collector;
pub mod sample;

pub use event_collector::{CollectorError, CollectorHandle, CollectorSettings};
pub use sample::{ButtonPhase, JoystickSample, Profile};
