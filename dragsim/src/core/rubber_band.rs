use crate::core::vehicle::{DriverInput, PerformanceBias, VehicleRuntimeState};
use crate::error::ConfigurationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

const TIME_EPS: f64 = 1e-9;
pub const SHIFT_BIAS_RPM_PER_CORRECTION: f64 = 1000.0;

/// * `activation_distance` - (m) Gap below which no correction is built up
/// * `delay` - (s) Time the gap must stay above activation_distance before correcting
/// * `saturation_distance` - (m) Gap at which the correction saturates
/// * `max_correction` - (-) Bound of the correction factor, clamped to [0, 1]
/// * `decay_rate` - (1/s) Rate at which the correction returns to 0 while in band
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct RubberBandPars {
    #[serde(default = "default_activation_distance")]
    pub activation_distance: f64,
    #[serde(default = "default_delay")]
    pub delay: f64,
    #[serde(default = "default_saturation_distance")]
    pub saturation_distance: f64,
    #[serde(default = "default_max_correction")]
    pub max_correction: f64,
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
}

fn default_activation_distance() -> f64 {
    10.0
}

fn default_delay() -> f64 {
    2.0
}

fn default_saturation_distance() -> f64 {
    100.0
}

fn default_max_correction() -> f64 {
    0.3
}

fn default_decay_rate() -> f64 {
    0.15
}

impl Default for RubberBandPars {
    fn default() -> Self {
        RubberBandPars {
            activation_distance: default_activation_distance(),
            delay: default_delay(),
            saturation_distance: default_saturation_distance(),
            max_correction: default_max_correction(),
            decay_rate: default_decay_rate(),
        }
    }
}

/// RubberBandController biases one AI competitor towards a reference distance (player or
/// leader). A positive correction factor means the AI is behind and gets a bonus. The factor is
/// always within [-max_correction, max_correction]; invalid parameters are clamped.
#[derive(Debug, Clone)]
pub struct RubberBandController {
    pars: RubberBandPars,
    aggressiveness: f64,
    since_out_of_band: f64,
    correction_factor: f64,
}

impl RubberBandController {
    pub fn new(pars: RubberBandPars, aggressiveness: f64) -> RubberBandController {
        let pars = RubberBandPars {
            activation_distance: finite_or(pars.activation_distance, 0.0).max(0.0),
            delay: finite_or(pars.delay, 0.0).max(0.0),
            saturation_distance: finite_or(pars.saturation_distance, 1.0).max(f64::EPSILON),
            max_correction: finite_or(pars.max_correction, 0.0).clamp(0.0, 1.0),
            decay_rate: finite_or(pars.decay_rate, 0.0).max(0.0),
        };

        RubberBandController {
            pars,
            aggressiveness: finite_or(aggressiveness, 0.0).clamp(0.0, 1.0),
            since_out_of_band: 0.0,
            correction_factor: 0.0,
        }
    }

    pub fn correction_factor(&self) -> f64 {
        self.correction_factor
    }

    pub fn max_correction(&self) -> f64 {
        self.pars.max_correction
    }

    pub fn aggressiveness(&self) -> f64 {
        self.aggressiveness
    }

    /// update processes one tick and returns the new correction factor.
    pub fn update(&mut self, reference_distance: f64, self_distance: f64, dt: f64) -> f64 {
        let diff = reference_distance - self_distance;

        if diff.abs() > self.pars.activation_distance {
            self.since_out_of_band += dt;
        } else {
            self.since_out_of_band = 0.0;
            let step = self.pars.decay_rate * dt;
            self.correction_factor = if self.correction_factor > 0.0 {
                (self.correction_factor - step).max(0.0)
            } else {
                (self.correction_factor + step).min(0.0)
            };
        }

        if self.since_out_of_band + TIME_EPS >= self.pars.delay && self.since_out_of_band > 0.0 {
            let ratio = (diff.abs() / self.pars.saturation_distance).clamp(0.0, 1.0);
            let max_correction = self.pars.max_correction;
            self.correction_factor = (diff.signum() * ratio * max_correction * self.aggressiveness)
                .clamp(-max_correction, max_correction);
        }

        trace!(
            "Rubber band: diff {:.2}m, out of band {:.2}s, correction {:.3}",
            diff,
            self.since_out_of_band,
            self.correction_factor
        );
        self.correction_factor
    }

    /// bias converts the correction factor into the power and shift point bias of the vehicle.
    pub fn bias(&self) -> PerformanceBias {
        PerformanceBias {
            power: self.correction_factor,
            shift_threshold_rpm: self.correction_factor * SHIFT_BIAS_RPM_PER_CORRECTION,
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// * `reaction_time` - (s) Delay between green light and throttle
/// * `shift_skill` - (-) Shift quality in [0, 1], see GearboxController
/// * `aggressiveness` - (-) Scales the rubber band correction, in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifficultyPreset {
    pub reaction_time: f64,
    pub shift_skill: f64,
    pub aggressiveness: f64,
}

const DIFFICULTY_PRESETS: [DifficultyPreset; 5] = [
    DifficultyPreset {
        reaction_time: 0.9,
        shift_skill: 0.6,
        aggressiveness: 0.2,
    },
    DifficultyPreset {
        reaction_time: 0.7,
        shift_skill: 0.7,
        aggressiveness: 0.4,
    },
    DifficultyPreset {
        reaction_time: 0.5,
        shift_skill: 0.8,
        aggressiveness: 0.6,
    },
    DifficultyPreset {
        reaction_time: 0.35,
        shift_skill: 0.9,
        aggressiveness: 0.8,
    },
    DifficultyPreset {
        reaction_time: 0.25,
        shift_skill: 1.0,
        aggressiveness: 1.0,
    },
];

/// difficulty_preset returns the preset for difficulty 1 (easiest) to 5 (hardest).
pub fn difficulty_preset(difficulty: u8) -> Option<DifficultyPreset> {
    match difficulty {
        1..=5 => Some(DIFFICULTY_PRESETS[difficulty as usize - 1]),
        _ => None,
    }
}

/// * `difficulty` - Preset 1..=5, the explicit values below override it
/// * `reaction_time` - (s) Explicit reaction time
/// * `shift_skill` - (-) Explicit shift skill
/// * `aggressiveness` - (-) Explicit rubber band aggressiveness
/// * `rubber_band` - Rubber band parameters
/// * `nitro_min_speed` - (m/s) Speed from which the AI considers nitro
/// * `nitro_min_charge` - (-) Fraction of the nitro capacity required to fire nitro
/// * `nitro_chance_per_s` - (1/s) Firing probability per second when a seeded RNG is used
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AiPars {
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub reaction_time: Option<f64>,
    #[serde(default)]
    pub shift_skill: Option<f64>,
    #[serde(default)]
    pub aggressiveness: Option<f64>,
    #[serde(default)]
    pub rubber_band: RubberBandPars,
    #[serde(default = "default_nitro_min_speed")]
    pub nitro_min_speed: f64,
    #[serde(default = "default_nitro_min_charge")]
    pub nitro_min_charge: f64,
    #[serde(default = "default_nitro_chance_per_s")]
    pub nitro_chance_per_s: f64,
}

fn default_difficulty() -> u8 {
    3
}

fn default_nitro_min_speed() -> f64 {
    25.0
}

fn default_nitro_min_charge() -> f64 {
    0.5
}

fn default_nitro_chance_per_s() -> f64 {
    0.8
}

impl Default for AiPars {
    fn default() -> Self {
        AiPars::with_difficulty(default_difficulty())
    }
}

impl AiPars {
    pub fn with_difficulty(difficulty: u8) -> AiPars {
        AiPars {
            difficulty,
            reaction_time: None,
            shift_skill: None,
            aggressiveness: None,
            rubber_band: RubberBandPars::default(),
            nitro_min_speed: default_nitro_min_speed(),
            nitro_min_charge: default_nitro_min_charge(),
            nitro_chance_per_s: default_nitro_chance_per_s(),
        }
    }

    /// resolve merges the difficulty preset with the explicit overrides.
    pub fn resolve(&self, competitor: &str) -> Result<DifficultyPreset, ConfigurationError> {
        let preset = difficulty_preset(self.difficulty).ok_or_else(|| {
            ConfigurationError::InvalidDifficulty {
                competitor: competitor.to_owned(),
                difficulty: self.difficulty,
            }
        })?;

        let reaction_time = self.reaction_time.unwrap_or(preset.reaction_time);
        if !(reaction_time >= 0.0 && reaction_time.is_finite()) {
            return Err(ConfigurationError::InvalidReactionTime {
                competitor: competitor.to_owned(),
                reaction_time,
            });
        }

        Ok(DifficultyPreset {
            reaction_time,
            shift_skill: self.shift_skill.unwrap_or(preset.shift_skill),
            aggressiveness: self.aggressiveness.unwrap_or(preset.aggressiveness),
        })
    }
}

/// AiDriver produces the input of an AI competitor: throttle as soon as allowed, nitro above a
/// speed and charge threshold, and the rubber band bias.
#[derive(Debug, Clone)]
pub struct AiDriver {
    pub reaction_time: f64,
    pub shift_skill: f64,
    rubber_band: RubberBandController,
    nitro_min_speed: f64,
    nitro_min_charge: f64,
    nitro_chance_per_s: f64,
    nitro_latched: bool,
}

impl AiDriver {
    pub fn new(ai_pars: &AiPars, competitor: &str) -> Result<AiDriver, ConfigurationError> {
        let preset = ai_pars.resolve(competitor)?;

        Ok(AiDriver {
            reaction_time: preset.reaction_time,
            shift_skill: preset.shift_skill.clamp(0.0, 1.0),
            rubber_band: RubberBandController::new(ai_pars.rubber_band, preset.aggressiveness),
            nitro_min_speed: ai_pars.nitro_min_speed,
            nitro_min_charge: ai_pars.nitro_min_charge.clamp(0.0, 1.0),
            nitro_chance_per_s: ai_pars.nitro_chance_per_s.max(0.0),
            nitro_latched: false,
        })
    }

    pub fn rubber_band(&self) -> &RubberBandController {
        &self.rubber_band
    }

    /// update_rubber_band runs the rubber band for this tick and returns the resulting bias.
    pub fn update_rubber_band(
        &mut self,
        reference_distance: f64,
        self_distance: f64,
        dt: f64,
    ) -> PerformanceBias {
        self.rubber_band
            .update(reference_distance, self_distance, dt);
        self.rubber_band.bias()
    }

    /// decide returns the input for this tick. Without an RNG nitro is fired as soon as the
    /// thresholds are met; with an RNG it is fired with probability nitro_chance_per_s * dt per
    /// tick. Once fired, nitro is held until the tank is empty.
    pub fn decide<R: Rng>(
        &mut self,
        state: &VehicleRuntimeState,
        nitro_capacity: f64,
        dt: f64,
        rng: Option<&mut R>,
    ) -> DriverInput {
        if state.nitro_charge <= 0.0 {
            self.nitro_latched = false;
        } else if !self.nitro_latched
            && state.throttle
            && state.velocity >= self.nitro_min_speed
            && state.nitro_charge >= self.nitro_min_charge * nitro_capacity
        {
            self.nitro_latched = match rng {
                Some(rng) => rng.gen_bool((self.nitro_chance_per_s * dt).clamp(0.0, 1.0)),
                None => true,
            };
        }

        DriverInput {
            throttle: true,
            shift_up_requested: false,
            shift_down_requested: false,
            nitro_requested: self.nitro_latched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_saturated_correction_after_delay() {
        let mut ctrl = RubberBandController::new(RubberBandPars::default(), 0.6);
        for _ in 0..25 {
            ctrl.update(150.0, 0.0, 0.1);
        }
        assert_relative_eq!(ctrl.correction_factor(), 0.18, epsilon = 1e-12);
    }

    #[test]
    fn test_no_correction_before_delay() {
        let mut ctrl = RubberBandController::new(RubberBandPars::default(), 1.0);
        for _ in 0..19 {
            ctrl.update(50.0, 0.0, 0.1);
        }
        assert_eq!(ctrl.correction_factor(), 0.0);
        ctrl.update(50.0, 0.0, 0.1);
        assert_relative_eq!(ctrl.correction_factor(), 0.5 * 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_ahead_gets_penalty() {
        let mut ctrl = RubberBandController::new(RubberBandPars::default(), 1.0);
        for _ in 0..30 {
            ctrl.update(0.0, 60.0, 0.1);
        }
        assert_relative_eq!(ctrl.correction_factor(), -0.18, epsilon = 1e-12);
        assert_relative_eq!(ctrl.bias().shift_threshold_rpm, -180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_decay_in_band() {
        let mut ctrl = RubberBandController::new(RubberBandPars::default(), 1.0);
        for _ in 0..30 {
            ctrl.update(200.0, 0.0, 0.1);
        }
        assert_relative_eq!(ctrl.correction_factor(), 0.3, epsilon = 1e-12);

        ctrl.update(5.0, 0.0, 1.0);
        assert_relative_eq!(ctrl.correction_factor(), 0.15, epsilon = 1e-12);
        for _ in 0..10 {
            ctrl.update(5.0, 0.0, 1.0);
        }
        assert_eq!(ctrl.correction_factor(), 0.0);
    }

    #[test]
    fn test_short_excursions_ignored() {
        let mut ctrl = RubberBandController::new(RubberBandPars::default(), 1.0);
        for _ in 0..10 {
            for _ in 0..15 {
                ctrl.update(80.0, 0.0, 0.1);
            }
            ctrl.update(0.0, 0.0, 0.1);
        }
        assert_eq!(ctrl.correction_factor(), 0.0);
    }

    #[test]
    fn test_out_of_range_parameters_clamped() {
        let pars = RubberBandPars {
            max_correction: 4.0,
            ..RubberBandPars::default()
        };
        let mut ctrl = RubberBandController::new(pars, 7.0);
        assert_eq!(ctrl.max_correction(), 1.0);
        assert_eq!(ctrl.aggressiveness(), 1.0);
        for _ in 0..40 {
            ctrl.update(1000.0, 0.0, 0.1);
        }
        assert_relative_eq!(ctrl.correction_factor(), 1.0);

        let ctrl = RubberBandController::new(RubberBandPars::default(), -1.0);
        assert_eq!(ctrl.aggressiveness(), 0.0);
    }

    #[test]
    fn test_difficulty_presets() {
        assert!(difficulty_preset(0).is_none());
        assert!(difficulty_preset(6).is_none());
        let easy = difficulty_preset(1).unwrap();
        let hard = difficulty_preset(5).unwrap();
        assert!(easy.reaction_time > hard.reaction_time);
        assert!(easy.aggressiveness < hard.aggressiveness);
        assert!(easy.shift_skill < hard.shift_skill);
    }

    #[test]
    fn test_ai_pars_overrides_and_errors() {
        let pars = AiPars {
            reaction_time: Some(0.7),
            ..AiPars::with_difficulty(5)
        };
        let resolved = pars.resolve("AI").unwrap();
        assert_eq!(resolved.reaction_time, 0.7);
        assert_eq!(resolved.aggressiveness, 1.0);

        let pars = AiPars::with_difficulty(9);
        assert_eq!(
            pars.resolve("AI"),
            Err(ConfigurationError::InvalidDifficulty {
                competitor: "AI".to_owned(),
                difficulty: 9
            })
        );
    }

    fn fast_state() -> VehicleRuntimeState {
        VehicleRuntimeState {
            velocity: 30.0,
            throttle: true,
            nitro_charge: 100.0,
            ..VehicleRuntimeState::default()
        }
    }

    #[test]
    fn test_ai_nitro_deterministic_without_rng() {
        let mut ai = AiDriver::new(&AiPars::default(), "AI").unwrap();
        let slow = VehicleRuntimeState {
            velocity: 10.0,
            ..fast_state()
        };
        let input = ai.decide::<ChaCha8Rng>(&slow, 100.0, 0.01, None);
        assert!(input.throttle);
        assert!(!input.nitro_requested);

        let input = ai.decide::<ChaCha8Rng>(&fast_state(), 100.0, 0.01, None);
        assert!(input.nitro_requested);

        // held while charge remains, even below the charge threshold
        let low = VehicleRuntimeState {
            nitro_charge: 10.0,
            ..fast_state()
        };
        assert!(ai.decide::<ChaCha8Rng>(&low, 100.0, 0.01, None).nitro_requested);
        let empty = VehicleRuntimeState {
            nitro_charge: 0.0,
            ..fast_state()
        };
        assert!(!ai.decide::<ChaCha8Rng>(&empty, 100.0, 0.01, None).nitro_requested);
    }

    #[test]
    fn test_ai_nitro_seeded_rng_is_reproducible() {
        let fire_tick = |seed: u64| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut ai = AiDriver::new(&AiPars::default(), "AI").unwrap();
            (0..10_000).position(|_| {
                ai.decide(&fast_state(), 100.0, 0.01, Some(&mut rng))
                    .nitro_requested
            })
        };
        let first = fire_tick(42);
        assert!(first.is_some());
        assert_eq!(first, fire_tick(42));
    }
}
