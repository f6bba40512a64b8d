use crate::control::ControlError;

/// Ordered list of control modes; the single source of truth for valid modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeCycle {
    modes: Vec<String>,
}

impl ModeCycle {
    pub fn new(modes: Vec<String>) -> Result<Self, ControlError> {
        if modes.is_empty() {
            return Err(ControlError::EmptyModeList);
        }
        Ok(Self { modes })
    }

    pub fn first(&self) -> &str {
        &self.modes[0]
    }

    pub fn contains(&self, mode: &str) -> bool {
        self.modes.iter().any(|m| m == mode)
    }

    /// Mode following `current`, wrapping past the end of the list
    pub fn next_after(&self, current: &str) -> Result<&str, ControlError> {
        let idx = self
            .modes
            .iter()
            .position(|m| m == current)
            .ok_or_else(|| ControlError::ModeDesync {
                mode: current.to_string(),
                known: self.modes.clone(),
            })?;
        Ok(&self.modes[(idx + 1) % self.modes.len()])
    }

    pub fn modes(&self) -> &[String] {
        &self.modes
    }
}
