use crate::control::ControlError;
use std::sync::Arc;

/// External owner of the canonical mode and speed maxima
pub trait ModeAuthority: Send + Sync + 'static {
    /// Requests a new active mode. Must not block; the authority answers
    /// asynchronously through a state update.
    fn push_mode(&self, mode: &str) -> Result<(), ControlError>;
}

/// Outcome of the startup connection attempt, decided once per process
#[derive(Clone)]
pub enum AuthorityLink {
    Connected(Arc<dyn ModeAuthority>),
    Unavailable,
}

impl AuthorityLink {
    pub fn is_connected(&self) -> bool {
        matches!(self, AuthorityLink::Connected(_))
    }

    pub fn authority(&self) -> Option<Arc<dyn ModeAuthority>> {
        match self {
            AuthorityLink::Connected(authority) => Some(authority.clone()),
            AuthorityLink::Unavailable => None,
        }
    }
}

impl std::fmt::Debug for AuthorityLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorityLink::Connected(_) => write!(f, "Connected"),
            AuthorityLink::Unavailable => write!(f, "Unavailable"),
        }
    }
}
