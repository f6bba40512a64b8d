//! Session state shared by the sample handler, the control loop and the
//! authority update pump.
//!
//! All access goes through one [`SharedControlState`] mutex. Each multi-field
//! change (a control tick, an authority update) happens inside a single guard,
//! so readers never observe a mode change without its matching ceilings.

use crate::control::mode::ModeCycle;
use crate::control::ControlError;
use crate::mapping::{Ceilings, ControlEvents};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type SharedControlState = Arc<Mutex<ControlState>>;

/// State pushed by the configuration authority; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorityUpdate {
    #[serde(rename = "max_vel", default)]
    pub max_linear: Option<f64>,
    #[serde(rename = "max_rot", default)]
    pub max_rotational: Option<f64>,
    #[serde(rename = "controller", default)]
    pub mode: Option<String>,
}

/// Effects of one control tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// New mode to push to the authority
    pub mode_change: Option<String>,
    /// Ceilings after a serviced speed ramp
    pub speed_ramp: Option<Ceilings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    /// Dead-man switch: commands reach the sink only while set
    pub publish_enabled: bool,
    pub pending_speed_ramp: bool,
    pub pending_mode_cycle: bool,
    pub ceiling_linear: f64,
    pub ceiling_rotational: f64,
    pub max_linear: f64,
    pub max_rotational: f64,
    pub active_mode: String,
}

impl ControlState {
    /// Ceilings start at `initial_fraction` of the maxima
    pub fn new(active_mode: String, maxima: Ceilings, initial_fraction: f64) -> Self {
        Self {
            publish_enabled: false,
            pending_speed_ramp: false,
            pending_mode_cycle: false,
            ceiling_linear: maxima.linear * initial_fraction,
            ceiling_rotational: maxima.rotational * initial_fraction,
            max_linear: maxima.linear,
            max_rotational: maxima.rotational,
            active_mode,
        }
    }

    /// Starts from the state the authority reported while connecting; fields it
    /// left out fall back to `default_mode` and `defaults`
    pub fn seeded(
        default_mode: String,
        defaults: Ceilings,
        initial: &AuthorityUpdate,
        initial_fraction: f64,
    ) -> Self {
        let maxima = Ceilings {
            linear: initial.max_linear.unwrap_or(defaults.linear),
            rotational: initial.max_rotational.unwrap_or(defaults.rotational),
        };
        let mode = initial.mode.clone().unwrap_or(default_mode);
        Self::new(mode, maxima, initial_fraction)
    }

    pub fn shared(self) -> SharedControlState {
        Arc::new(Mutex::new(self))
    }

    pub fn ceilings(&self) -> Ceilings {
        Ceilings {
            linear: self.ceiling_linear,
            rotational: self.ceiling_rotational,
        }
    }

    /// Applies the requests of one translated sample; returns whether publishing is enabled
    pub fn apply_events(&mut self, events: &ControlEvents) -> bool {
        if events.toggle_enable {
            self.publish_enabled = !self.publish_enabled;
            info!(
                "Dead-man switch toggled, publishing {}",
                if self.publish_enabled { "enabled" } else { "disabled" }
            );
        }
        if events.request_speed_ramp {
            self.pending_speed_ramp = true;
        }
        if events.request_mode_cycle {
            self.pending_mode_cycle = true;
        }
        self.publish_enabled
    }

    /// Doubles both ceilings, capped at the maxima
    pub fn ramp_speed(&mut self) -> Ceilings {
        self.ceiling_linear = (2.0 * self.ceiling_linear).min(self.max_linear);
        self.ceiling_rotational = (2.0 * self.ceiling_rotational).min(self.max_rotational);
        self.ceilings()
    }

    /// Services pending requests. Either every effect of the tick is applied or none is.
    pub fn tick(
        &mut self,
        modes: &ModeCycle,
        authority_connected: bool,
    ) -> Result<TickOutcome, ControlError> {
        let mode_change = if authority_connected && self.pending_mode_cycle {
            match modes.next_after(&self.active_mode) {
                Ok(next) => Some(next.to_string()),
                Err(e) => {
                    // Request consumed; the speed ramp stays pending for the next tick
                    self.pending_mode_cycle = false;
                    return Err(e);
                }
            }
        } else {
            None
        };

        if let Some(next) = &mode_change {
            debug!("Cycling mode {} -> {}", self.active_mode, next);
            self.active_mode = next.clone();
            self.pending_mode_cycle = false;
        }

        let speed_ramp = if self.pending_speed_ramp {
            self.pending_speed_ramp = false;
            Some(self.ramp_speed())
        } else {
            None
        };

        Ok(TickOutcome {
            mode_change,
            speed_ramp,
        })
    }

    /// Overwrites local copies with the authority's values
    pub fn apply_authority_update(&mut self, update: &AuthorityUpdate) {
        if let Some(max_linear) = update.max_linear {
            self.max_linear = max_linear;
        }
        if let Some(max_rotational) = update.max_rotational {
            self.max_rotational = max_rotational;
        }
        if let Some(mode) = &update.mode {
            self.active_mode = mode.clone();
        }
    }
}
