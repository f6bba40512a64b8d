//! Joystick sample → velocity command translation
//!
//! The translator is a pure function of the current sample, the previously
//! accepted sample and the current speed ceilings. It never touches the
//! shared control state; the node applies the returned [`ControlEvents`].
//!
//! Axis values are scaled as-is. There is no deadzone, smoothing or
//! clamping, so a device reporting values outside [-1, 1] yields commands
//! above the ceiling.

use crate::controller::sample::{ButtonPhase, JoystickSample, Profile};
use crate::mapping::command::VelocityCommand;
use crate::mapping::key_mapping::{
    KeyMapping, ANGULAR_Z_AXIS, ENABLE_BUTTON, LINEAR_X_AXIS, LINEAR_Y_AXIS, MODE_CYCLE_BUTTON,
    SPEED_RAMP_BUTTON,
};
use crate::mapping::MappingError;
use tracing::debug;

/// Current speed ceilings used to scale the axes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ceilings {
    pub linear: f64,
    pub rotational: f64,
}

/// Control requests detected in one sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlEvents {
    /// Rising edge on the dead-man button
    pub toggle_enable: bool,
    /// Speed ramp button is down
    pub request_speed_ramp: bool,
    /// Mode cycle button is down
    pub request_mode_cycle: bool,
}

/// Result of a successful translation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Translation {
    pub profile: Profile,
    pub command: VelocityCommand,
    pub events: ControlEvents,
}

pub struct InputTranslator {
    mapping: KeyMapping,
    last_sample: JoystickSample,
}

impl InputTranslator {
    pub fn new(mapping: KeyMapping) -> Self {
        Self {
            mapping,
            last_sample: JoystickSample::default(),
        }
    }

    /// Translates one sample; rejected samples leave the translator untouched
    pub fn translate(
        &mut self,
        sample: JoystickSample,
        ceilings: Ceilings,
    ) -> Result<Translation, MappingError> {
        let profile = sample
            .profile()
            .ok_or(MappingError::UnrecognizedProfile {
                axis_count: sample.axes.len(),
            })?;
        let indices = self.mapping.resolve(profile)?;

        let button_phase = |name: &'static str, index: usize| {
            if index >= sample.buttons.len() {
                return Err(MappingError::IndexOutOfRange {
                    kind: "button",
                    name,
                    index,
                    len: sample.buttons.len(),
                });
            }
            Ok(ButtonPhase::between(&self.last_sample, &sample, index))
        };
        let axis = |name: &'static str, index: usize| {
            sample.axis(index).ok_or(MappingError::IndexOutOfRange {
                kind: "axis",
                name,
                index,
                len: sample.axes.len(),
            })
        };

        let enable = button_phase(ENABLE_BUTTON, indices.enable_button)?;
        let speed_ramp = button_phase(SPEED_RAMP_BUTTON, indices.speed_ramp_button)?;
        let mode_cycle = button_phase(MODE_CYCLE_BUTTON, indices.mode_cycle_button)?;

        let command = VelocityCommand {
            linear_x: f64::from(axis(LINEAR_X_AXIS, indices.linear_x_axis)?) * ceilings.linear,
            linear_y: f64::from(axis(LINEAR_Y_AXIS, indices.linear_y_axis)?) * ceilings.linear,
            angular_z: f64::from(axis(ANGULAR_Z_AXIS, indices.angular_z_axis)?)
                * ceilings.rotational,
        };

        let events = ControlEvents {
            toggle_enable: enable.is_rising(),
            request_speed_ramp: speed_ramp.is_pressed(),
            request_mode_cycle: mode_cycle.is_pressed(),
        };
        debug!(
            "Translated {} sample: {:?}, enable={:?} ramp={:?} cycle={:?}",
            profile, command, enable, speed_ramp, mode_cycle
        );

        self.last_sample = sample;
        Ok(Translation {
            profile,
            command,
            events,
        })
    }

    pub fn last_sample(&self) -> &JoystickSample {
        &self.last_sample
    }
}
