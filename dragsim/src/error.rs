use crate::core::race::RaceState;
use thiserror::Error;

/// ConfigurationError is raised when a vehicle specification or race configuration does not
/// fulfill the posed requirements. It is only ever returned by `RaceSession::start` (and the
/// constructors it delegates to), never during a tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("vehicle '{vehicle}' has no gear ratios")]
    EmptyGearRatios { vehicle: String },

    #[error("vehicle '{vehicle}' has non-positive mass {mass}kg")]
    NonPositiveMass { vehicle: String, mass: f64 },

    #[error("vehicle '{vehicle}' has redline {redline_rpm}rpm not above idle {idle_rpm}rpm")]
    RedlineNotAboveIdle {
        vehicle: String,
        idle_rpm: f64,
        redline_rpm: f64,
    },

    #[error("vehicle '{vehicle}' has max rpm {max_rpm} below redline {redline_rpm}")]
    MaxRpmBelowRedline {
        vehicle: String,
        redline_rpm: f64,
        max_rpm: f64,
    },

    #[error("vehicle '{vehicle}': {field} must be positive and finite, got {value}")]
    NonPositiveValue {
        vehicle: String,
        field: &'static str,
        value: f64,
    },

    #[error("vehicle '{vehicle}': {field} must be non-negative and finite, got {value}")]
    NegativeValue {
        vehicle: String,
        field: &'static str,
        value: f64,
    },

    #[error("vehicle '{vehicle}' has neither power nor torque curve samples")]
    MissingCurve { vehicle: String },

    #[error("race distance must be positive and finite, got {0}m")]
    NonPositiveDistance(f64),

    #[error("race has no competitors")]
    NoCompetitors,

    #[error("start sequence needs at least one red light stage, got {0}")]
    InsufficientLightStages(u32),

    #[error("start sequence timing '{field}' is invalid: {value}s")]
    InvalidLightTiming { field: &'static str, value: f64 },

    #[error("competitor '{competitor}' has invalid difficulty {difficulty}, expected 1..=5")]
    InvalidDifficulty { competitor: String, difficulty: u8 },

    #[error("competitor '{competitor}' has invalid reaction time {reaction_time}s")]
    InvalidReactionTime {
        competitor: String,
        reaction_time: f64,
    },

    #[error("false start time penalty must be non-negative and finite, got {0}s")]
    InvalidTimePenalty(f64),
}

/// InvalidTransitionError reports a call that does not fit the current state of a race state
/// machine. The call is treated as a no-op.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidTransitionError {
    #[error("cannot tick a race in state {0:?}")]
    TickInState(RaceState),

    #[error("time step must be positive and finite, got {0}s")]
    InvalidTimestep(f64),

    #[error("competitor index {0} does not exist")]
    UnknownCompetitor(usize),

    #[error("competitor {0} is AI controlled and does not accept external input")]
    NotHumanControlled(usize),

    #[error("cannot apply input while race is in state {0:?}")]
    InputInState(RaceState),
}
