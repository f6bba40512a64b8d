//! Mode and speed state machine.
//!
//! - [`state`] - The shared [`ControlState`] and its per-tick transitions
//! - [`mode`] - The ordered, wrapping [`ModeCycle`]
//! - [`authority`] - The optional external mode authority seam
//! - [`control_loop`] - The fixed-rate task that services pending requests

pub mod authority;
pub mod control_loop;
pub mod error;
pub mod mode;
pub mod state;

pub use authority::{AuthorityLink, ModeAuthority};
pub use control_loop::{ControlLoop, ControlLoopHandle, LoopSettings, LoopStats};
pub use error::ControlError;
pub use mode::ModeCycle;
pub use state::{AuthorityUpdate, ControlState, SharedControlState, TickOutcome};
