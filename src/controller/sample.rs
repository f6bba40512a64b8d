use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Joystick hardware layout, inferred from the number of axes in a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// XInput pads (8 axes: sticks, analog triggers, d-pad)
    XInput,
    /// DirectInput pads (6 axes: sticks and d-pad)
    DirectInput,
}

impl Profile {
    /// Selects the profile for an axis count; `None` for unknown hardware
    pub fn from_axis_count(count: usize) -> Option<Self> {
        match count {
            8 => Some(Profile::XInput),
            6 => Some(Profile::DirectInput),
            _ => None,
        }
    }

    /// Key of this profile in the key mapping table
    pub fn key(&self) -> &'static str {
        match self {
            Profile::XInput => "x",
            Profile::DirectInput => "d",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::XInput => write!(f, "XInput"),
            Profile::DirectInput => write!(f, "DirectInput"),
        }
    }
}

/// One raw joystick reading in joy message layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoystickSample {
    #[serde(deserialize_with = "deserialize_buttons")]
    pub buttons: Vec<bool>,
    pub axes: Vec<f32>,
    #[serde(skip, default = "Local::now")]
    pub received_at: DateTime<Local>,
}

impl JoystickSample {
    pub fn new(buttons: Vec<bool>, axes: Vec<f32>) -> Self {
        Self {
            buttons,
            axes,
            received_at: Local::now(),
        }
    }

    pub fn profile(&self) -> Option<Profile> {
        Profile::from_axis_count(self.axes.len())
    }

    /// Out-of-range indices read as released
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }

    pub fn axis(&self, index: usize) -> Option<f32> {
        self.axes.get(index).copied()
    }
}

impl Default for JoystickSample {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

// Joy messages carry buttons as 0/1 integers; accept booleans as well.
fn deserialize_buttons<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ButtonValue {
        Bool(bool),
        Int(i64),
    }

    let raw: Vec<ButtonValue> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|value| match value {
            ButtonValue::Bool(pressed) => pressed,
            ButtonValue::Int(level) => level != 0,
        })
        .collect())
}

/// Phase of a single button across two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPhase {
    Idle,    // released before and now
    Rising,  // just pressed
    Held,    // pressed before and now
    Falling, // just released
}

impl ButtonPhase {
    pub fn from_levels(previous: bool, current: bool) -> Self {
        match (previous, current) {
            (false, false) => ButtonPhase::Idle,
            (false, true) => ButtonPhase::Rising,
            (true, true) => ButtonPhase::Held,
            (true, false) => ButtonPhase::Falling,
        }
    }

    /// Derives the phase of button `index` from a sample pair
    pub fn between(previous: &JoystickSample, current: &JoystickSample, index: usize) -> Self {
        Self::from_levels(previous.button(index), current.button(index))
    }

    pub fn is_rising(&self) -> bool {
        matches!(self, ButtonPhase::Rising)
    }

    /// Level semantics: true for every phase where the button is down
    pub fn is_pressed(&self) -> bool {
        matches!(self, ButtonPhase::Rising | ButtonPhase::Held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_by_axis_count() {
        assert_eq!(Profile::from_axis_count(8), Some(Profile::XInput));
        assert_eq!(Profile::from_axis_count(6), Some(Profile::DirectInput));
        assert_eq!(Profile::from_axis_count(7), None);
        assert_eq!(Profile::from_axis_count(0), None);
        assert_eq!(Profile::XInput.key(), "x");
        assert_eq!(Profile::DirectInput.key(), "d");
    }

    #[test]
    fn phase_covers_all_level_pairs() {
        assert_eq!(ButtonPhase::from_levels(false, false), ButtonPhase::Idle);
        assert_eq!(ButtonPhase::from_levels(false, true), ButtonPhase::Rising);
        assert_eq!(ButtonPhase::from_levels(true, true), ButtonPhase::Held);
        assert_eq!(ButtonPhase::from_levels(true, false), ButtonPhase::Falling);

        assert!(ButtonPhase::Rising.is_rising());
        assert!(!ButtonPhase::Held.is_rising());
        assert!(ButtonPhase::Held.is_pressed());
        assert!(!ButtonPhase::Falling.is_pressed());
    }

    #[test]
    fn missing_button_reads_released() {
        let previous = JoystickSample::default();
        let current = JoystickSample::new(vec![false, true], vec![0.0; 8]);
        assert_eq!(ButtonPhase::between(&previous, &current, 1), ButtonPhase::Rising);
        assert_eq!(ButtonPhase::between(&previous, &current, 5), ButtonPhase::Idle);
    }

    #[test]
    fn deserializes_joy_style_payload() {
        let json = r#"{"axes":[0.0,0.5,1.0,0.0,0.0,1.0],"buttons":[0,1,0,1]}"#;
        let sample: JoystickSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.buttons, vec![false, true, false, true]);
        assert_eq!(sample.axes.len(), 6);
        assert_eq!(sample.profile(), Some(Profile::DirectInput));

        let json = r#"{"axes":[],"buttons":[true,false]}"#;
        let sample: JoystickSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.buttons, vec![true, false]);
        assert_eq!(sample.profile(), None);
    }
}
