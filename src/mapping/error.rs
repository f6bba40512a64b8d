//! Error definitions for the mapping module

use thiserror::Error;

/// Reasons a joystick sample is rejected by the translator
///
/// Every variant is non-fatal: the sample is dropped and no state changes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The axis count matches no known hardware profile
    #[error("Unrecognized joystick profile with {axis_count} axes")]
    UnrecognizedProfile { axis_count: usize },

    /// The mapping table lacks a logical control for this profile
    #[error("Profile '{profile}' has no mapping for {kind} '{name}'")]
    IncompleteProfile {
        profile: String,
        kind: &'static str,
        name: &'static str,
    },

    /// A mapped index points past the end of the sample vector
    #[error("{kind} '{name}' maps to index {index} but the sample has only {len}")]
    IndexOutOfRange {
        kind: &'static str,
        name: &'static str,
        index: usize,
        len: usize,
    },
}
