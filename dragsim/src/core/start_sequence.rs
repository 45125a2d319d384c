use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const TIME_EPS: f64 = 1e-9;

/// * `red_stage_count` - Number of red lights, switched on one after another
/// * `red_interval` - (s) Time between two red lights
/// * `red_yellow_hold` - (s) Time all reds plus the transition light are shown before green
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct StartLightTimings {
    #[serde(default = "default_red_stage_count")]
    pub red_stage_count: u32,
    #[serde(default = "default_red_interval")]
    pub red_interval: f64,
    #[serde(default = "default_red_yellow_hold")]
    pub red_yellow_hold: f64,
}

fn default_red_stage_count() -> u32 {
    3
}

fn default_red_interval() -> f64 {
    0.8
}

fn default_red_yellow_hold() -> f64 {
    0.6
}

impl Default for StartLightTimings {
    fn default() -> Self {
        StartLightTimings {
            red_stage_count: default_red_stage_count(),
            red_interval: default_red_interval(),
            red_yellow_hold: default_red_yellow_hold(),
        }
    }
}

impl StartLightTimings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.red_stage_count == 0 {
            return Err(ConfigurationError::InsufficientLightStages(
                self.red_stage_count,
            ));
        }
        if !(self.red_interval > 0.0 && self.red_interval.is_finite()) {
            return Err(ConfigurationError::InvalidLightTiming {
                field: "red_interval",
                value: self.red_interval,
            });
        }
        if !(self.red_yellow_hold >= 0.0 && self.red_yellow_hold.is_finite()) {
            return Err(ConfigurationError::InvalidLightTiming {
                field: "red_yellow_hold",
                value: self.red_yellow_hold,
            });
        }
        Ok(())
    }

    /// green_time returns the scheduled time of the green light, counted from the start of the
    /// sequence.
    pub fn green_time(&self) -> f64 {
        self.red_stage_count as f64 * self.red_interval + self.red_yellow_hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StartLightState {
    RedStage(u32),
    RedYellow,
    Green,
}

impl Default for StartLightState {
    fn default() -> Self {
        StartLightState::RedStage(1)
    }
}

/// StartSequenceController runs the start lights on a shared clock. The stages are purely
/// time-driven. The clock keeps running after green so that every competitor can derive its own
/// throttle-eligible moment from its reaction time.
#[derive(Debug, Clone)]
pub struct StartSequenceController {
    timings: StartLightTimings,
    light_state: StartLightState,
    clock: f64,
    green_timestamp: Option<f64>,
}

impl Default for StartSequenceController {
    fn default() -> Self {
        StartSequenceController {
            timings: StartLightTimings::default(),
            light_state: StartLightState::default(),
            clock: 0.0,
            green_timestamp: None,
        }
    }
}

impl StartSequenceController {
    pub fn new(timings: StartLightTimings) -> Result<StartSequenceController, ConfigurationError> {
        timings.validate()?;
        Ok(StartSequenceController {
            timings,
            light_state: StartLightState::RedStage(1),
            clock: 0.0,
            green_timestamp: None,
        })
    }

    pub fn timings(&self) -> &StartLightTimings {
        &self.timings
    }

    pub fn light_state(&self) -> StartLightState {
        self.light_state
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn green_timestamp(&self) -> Option<f64> {
        self.green_timestamp
    }

    pub fn is_green(&self) -> bool {
        self.green_timestamp.is_some()
    }

    fn light_state_at(&self, t: f64) -> StartLightState {
        let reds_done = self.timings.red_stage_count as f64 * self.timings.red_interval;

        if t + TIME_EPS >= self.timings.green_time() {
            StartLightState::Green
        } else if t + TIME_EPS >= reds_done {
            StartLightState::RedYellow
        } else {
            let stage = ((t + TIME_EPS) / self.timings.red_interval).floor() as u32 + 1;
            StartLightState::RedStage(stage.min(self.timings.red_stage_count))
        }
    }

    /// advance moves the clock forward by dt. Returns true exactly once, in the call in which the
    /// lights turn green.
    pub fn advance(&mut self, dt: f64) -> bool {
        self.clock += dt;

        let light_state = self.light_state_at(self.clock);
        if light_state != self.light_state {
            debug!("Start lights switched to {:?} at {:.3}s", light_state, self.clock);
        }
        self.light_state = light_state;

        if self.green_timestamp.is_none() && light_state == StartLightState::Green {
            let green_time = self.timings.green_time();
            info!("Green light at {:.3}s", green_time);
            self.green_timestamp = Some(green_time);
            return true;
        }
        false
    }

    /// throttle_eligible_at returns the time from which a competitor with the given reaction time
    /// may apply throttle, None before green.
    pub fn throttle_eligible_at(&self, reaction_time: f64) -> Option<f64> {
        self.green_timestamp
            .map(|green_timestamp| green_timestamp + reaction_time)
    }

    /// throttle_window splits the last `interval` seconds of the clock into the part before and
    /// the part after the competitor may apply throttle, returned as (coast, drive).
    pub fn throttle_window(&self, reaction_time: f64, interval: f64) -> (f64, f64) {
        let eligible_at = match self.throttle_eligible_at(reaction_time) {
            Some(eligible_at) => eligible_at,
            None => return (interval, 0.0),
        };
        let interval_start = self.clock - interval;

        if eligible_at <= interval_start + TIME_EPS {
            (0.0, interval)
        } else if eligible_at + TIME_EPS >= self.clock {
            (interval, 0.0)
        } else {
            let coast = eligible_at - interval_start;
            (coast, interval - coast)
        }
    }

    /// race_time returns the time passed since green, 0 before green.
    pub fn race_time(&self) -> f64 {
        match self.green_timestamp {
            Some(green_timestamp) => (self.clock - green_timestamp).max(0.0),
            None => 0.0,
        }
    }
}
