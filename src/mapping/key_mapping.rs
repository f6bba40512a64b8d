//! Key mapping tables from logical controls to raw joystick indices

use crate::controller::sample::Profile;
use crate::mapping::MappingError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dead-man switch, toggles command publishing
pub const ENABLE_BUTTON: &str = "LB";
/// Requests the next speed ceiling step
pub const SPEED_RAMP_BUTTON: &str = "Y";
/// Requests the next control mode
pub const MODE_CYCLE_BUTTON: &str = "RB";

pub const LINEAR_X_AXIS: &str = "YLJoy";
pub const LINEAR_Y_AXIS: &str = "XLJoy";
pub const ANGULAR_Z_AXIS: &str = "XRJoy";

const BUTTON_NAMES: [&str; 3] = [ENABLE_BUTTON, SPEED_RAMP_BUTTON, MODE_CYCLE_BUTTON];
const AXIS_NAMES: [&str; 3] = [LINEAR_X_AXIS, LINEAR_Y_AXIS, ANGULAR_Z_AXIS];
const SUPPORTED_PROFILES: [Profile; 2] = [Profile::XInput, Profile::DirectInput];

/// Index tables of one hardware profile
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileMapping {
    #[serde(default)]
    pub buttons: HashMap<String, usize>,
    #[serde(default)]
    pub axis: HashMap<String, usize>,
}

/// Indices of every logical control the translator reads, for one profile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedMapping {
    pub enable_button: usize,
    pub speed_ramp_button: usize,
    pub mode_cycle_button: usize,
    pub linear_x_axis: usize,
    pub linear_y_axis: usize,
    pub angular_z_axis: usize,
}

/// Profile name → index tables. Loaded once, never mutated.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct KeyMapping {
    profiles: HashMap<String, ProfileMapping>,
}

impl KeyMapping {
    pub fn new(profiles: HashMap<String, ProfileMapping>) -> Self {
        Self { profiles }
    }

    /// Tables for the two stock pads: XInput (`x`) and DirectInput (`d`)
    pub fn default_config() -> Self {
        let table = |buttons: [(&str, usize); 3], axis: [(&str, usize); 3]| ProfileMapping {
            buttons: buttons
                .iter()
                .map(|(name, idx)| (name.to_string(), *idx))
                .collect(),
            axis: axis
                .iter()
                .map(|(name, idx)| (name.to_string(), *idx))
                .collect(),
        };

        let mut profiles = HashMap::new();
        profiles.insert(
            Profile::XInput.key().to_string(),
            table(
                [(ENABLE_BUTTON, 4), (SPEED_RAMP_BUTTON, 3), (MODE_CYCLE_BUTTON, 5)],
                [(LINEAR_X_AXIS, 1), (LINEAR_Y_AXIS, 0), (ANGULAR_Z_AXIS, 3)],
            ),
        );
        profiles.insert(
            Profile::DirectInput.key().to_string(),
            table(
                [(ENABLE_BUTTON, 4), (SPEED_RAMP_BUTTON, 3), (MODE_CYCLE_BUTTON, 5)],
                [(LINEAR_X_AXIS, 1), (LINEAR_Y_AXIS, 0), (ANGULAR_Z_AXIS, 2)],
            ),
        );
        Self::new(profiles)
    }

    pub fn profile(&self, key: &str) -> Option<&ProfileMapping> {
        self.profiles.get(key)
    }

    /// Looks up every logical control for `profile`; any gap fails closed
    pub fn resolve(&self, profile: Profile) -> Result<ResolvedMapping, MappingError> {
        let incomplete = |kind: &'static str, name: &'static str| MappingError::IncompleteProfile {
            profile: profile.key().to_string(),
            kind,
            name,
        };
        let table = self
            .profiles
            .get(profile.key())
            .ok_or_else(|| incomplete("profile", "*"))?;

        let button = |name: &'static str| {
            table
                .buttons
                .get(name)
                .copied()
                .ok_or_else(|| incomplete("button", name))
        };
        let axis = |name: &'static str| {
            table
                .axis
                .get(name)
                .copied()
                .ok_or_else(|| incomplete("axis", name))
        };

        Ok(ResolvedMapping {
            enable_button: button(ENABLE_BUTTON)?,
            speed_ramp_button: button(SPEED_RAMP_BUTTON)?,
            mode_cycle_button: button(MODE_CYCLE_BUTTON)?,
            linear_x_axis: axis(LINEAR_X_AXIS)?,
            linear_y_axis: axis(LINEAR_Y_AXIS)?,
            angular_z_axis: axis(ANGULAR_Z_AXIS)?,
        })
    }

    /// Lists every supported profile that would reject all samples
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for profile in SUPPORTED_PROFILES {
            let Some(table) = self.profiles.get(profile.key()) else {
                problems.push(format!("profile '{}' ({}) is missing", profile.key(), profile));
                continue;
            };
            for name in BUTTON_NAMES {
                if !table.buttons.contains_key(name) {
                    problems.push(format!("profile '{}' lacks button '{}'", profile.key(), name));
                }
            }
            for name in AXIS_NAMES {
                if !table.axis.contains_key(name) {
                    problems.push(format!("profile '{}' lacks axis '{}'", profile.key(), name));
                }
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_resolves_both_profiles() {
        let mapping = KeyMapping::default_config();
        assert!(mapping.validate().is_empty());

        let x = mapping.resolve(Profile::XInput).unwrap();
        assert_eq!(x.enable_button, 4);
        assert_eq!(x.angular_z_axis, 3);

        let d = mapping.resolve(Profile::DirectInput).unwrap();
        assert_eq!(d.linear_x_axis, 1);
        assert_eq!(d.angular_z_axis, 2);
    }

    #[test]
    fn missing_control_fails_closed() {
        let mut profiles = HashMap::new();
        let mut table = KeyMapping::default_config().profile("x").unwrap().clone();
        table.axis.remove(ANGULAR_Z_AXIS);
        profiles.insert("x".to_string(), table);
        let mapping = KeyMapping::new(profiles);

        assert_eq!(
            mapping.resolve(Profile::XInput),
            Err(MappingError::IncompleteProfile {
                profile: "x".to_string(),
                kind: "axis",
                name: ANGULAR_Z_AXIS,
            })
        );
        assert!(mapping.resolve(Profile::DirectInput).is_err());

        let problems = mapping.validate();
        assert!(problems.iter().any(|p| p.contains("XRJoy")));
        assert!(problems.iter().any(|p| p.contains("'d'")));
    }

    #[test]
    fn parses_toml_tables() {
        let mapping: KeyMapping = toml::from_str(
            r#"
            [x.buttons]
            LB = 4
            Y = 3
            RB = 5
            [x.axis]
            YLJoy = 1
            XLJoy = 0
            XRJoy = 3
            "#,
        )
        .unwrap();

        assert_eq!(mapping.resolve(Profile::XInput).unwrap().angular_z_axis, 3);
        assert!(mapping.resolve(Profile::DirectInput).is_err());
    }
}
