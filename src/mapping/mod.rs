//! Translation of joystick samples into velocity commands.
//!
//! A [`KeyMapping`] names the raw button and axis indices of each hardware
//! profile. The [`InputTranslator`] resolves those indices for every sample,
//! scales the stick axes by the current speed ceilings and reports the
//! control requests (dead-man toggle, speed ramp, mode cycle) it detected.

pub mod command;
pub mod error;
pub mod key_mapping;
pub mod translator;

pub use command::VelocityCommand;
pub use error::MappingError;
pub use key_mapping::{KeyMapping, ProfileMapping, ResolvedMapping};
pub use translator::{Ceilings, ControlEvents, InputTranslator, Translation};
