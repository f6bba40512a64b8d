use thiserror::Error;

/// Errors of the control loop and its authority link
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// The active mode is not in the canonical mode list. Local and
    /// authority state disagree; never resolved by picking a default.
    #[error("Active mode '{mode}' is not one of {known:?}")]
    ModeDesync { mode: String, known: Vec<String> },

    #[error("Mode list cannot be empty")]
    EmptyModeList,

    #[error("Failed to push mode to authority: {0}")]
    AuthorityPush(String),

    #[error("Control loop task failed: {0}")]
    TaskError(String),
}
