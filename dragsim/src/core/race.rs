use crate::core::gearbox::ShiftMode;
use crate::core::rubber_band::{AiDriver, AiPars};
use crate::core::start_sequence::{StartLightTimings, StartSequenceController};
use crate::core::vehicle::{DriverInput, PerformanceBias, VehicleSimulator};
use crate::core::vehicle_spec::VehicleSpecification;
use crate::error::{ConfigurationError, InvalidTransitionError};
use crate::interfaces::dashboard::{RaceSnapshot, VehicleSnapshot};
use crate::post::race_result::RaceResult;
use helpers::general::{argsort, SortOrder};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const QUARTER_MILE: f64 = 402.336; // m

const TIME_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceState {
    Waiting,
    Countdown,
    Racing,
    Finished,
}

impl Default for RaceState {
    fn default() -> Self {
        RaceState::Waiting
    }
}

/// What happens to a human competitor that applies throttle before the green light.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FalseStartPolicy {
    Ignore,
    TimePenalty { seconds: f64 },
    Disqualify,
}

impl Default for FalseStartPolicy {
    fn default() -> Self {
        FalseStartPolicy::Ignore
    }
}

/// Distance the rubber band of every AI competitor is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RubberBandTarget {
    /// the furthest human competitor, the leader if there is none
    Player,
    Leader,
}

impl Default for RubberBandTarget {
    fn default() -> Self {
        RubberBandTarget::Player
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverKind {
    Human {
        #[serde(default)]
        reaction_time: f64,
        #[serde(default)]
        shift_mode: ShiftMode,
    },
    Ai(AiPars),
}

#[derive(Debug, Clone)]
pub struct CompetitorConfig {
    pub name: String,
    pub vehicle: Arc<VehicleSpecification>,
    pub driver: DriverKind,
}

/// * `distance` - (m) Race distance
/// * `competitors` - Competitors in grid order, the index is used as final tie-break
/// * `lights` - Start light timings
/// * `false_start_policy` - Handling of human false starts
/// * `rubber_band_target` - Reference distance of the AI rubber band
/// * `seed` - Seed for the AI nitro decisions, deterministic policy if None
#[derive(Debug, Clone)]
pub struct RaceConfiguration {
    pub distance: f64,
    pub competitors: Vec<CompetitorConfig>,
    pub lights: StartLightTimings,
    pub false_start_policy: FalseStartPolicy,
    pub rubber_band_target: RubberBandTarget,
    pub seed: Option<u64>,
}

impl RaceConfiguration {
    pub fn new(distance: f64, competitors: Vec<CompetitorConfig>) -> RaceConfiguration {
        RaceConfiguration {
            distance,
            competitors,
            lights: StartLightTimings::default(),
            false_start_policy: FalseStartPolicy::default(),
            rubber_band_target: RubberBandTarget::default(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Control {
    Human { reaction_time: f64 },
    Ai(AiDriver),
}

/// Competitor bundles the simulator of one vehicle with the way it is driven.
#[derive(Debug, Clone)]
pub struct Competitor {
    name: String,
    simulator: VehicleSimulator,
    control: Control,
    input: DriverInput,
    false_start: bool,
    crossing_rank: Option<u32>,
}

impl Competitor {
    fn new(config: &CompetitorConfig) -> Result<Competitor, ConfigurationError> {
        let (control, shift_mode, shift_skill) = match &config.driver {
            DriverKind::Human {
                reaction_time,
                shift_mode,
            } => {
                if !(*reaction_time >= 0.0 && reaction_time.is_finite()) {
                    return Err(ConfigurationError::InvalidReactionTime {
                        competitor: config.name.to_owned(),
                        reaction_time: *reaction_time,
                    });
                }
                let control = Control::Human {
                    reaction_time: *reaction_time,
                };
                (control, *shift_mode, 1.0)
            }
            DriverKind::Ai(ai_pars) => {
                let ai = AiDriver::new(ai_pars, &config.name)?;
                let shift_skill = ai.shift_skill;
                (Control::Ai(ai), ShiftMode::Automatic, shift_skill)
            }
        };

        Ok(Competitor {
            name: config.name.to_owned(),
            simulator: VehicleSimulator::new(Arc::clone(&config.vehicle), shift_mode, shift_skill)?,
            control,
            input: DriverInput::default(),
            false_start: false,
            crossing_rank: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simulator(&self) -> &VehicleSimulator {
        &self.simulator
    }

    pub fn is_human(&self) -> bool {
        matches!(self.control, Control::Human { .. })
    }

    pub fn reaction_time(&self) -> f64 {
        match &self.control {
            Control::Human { reaction_time } => *reaction_time,
            Control::Ai(ai) => ai.reaction_time,
        }
    }

    pub fn false_start(&self) -> bool {
        self.false_start
    }

    /// crossing_rank is the order in which the finish line was crossed, ignoring penalties.
    pub fn crossing_rank(&self) -> Option<u32> {
        self.crossing_rank
    }

    /// correction_factor returns the rubber band correction of an AI competitor.
    pub fn correction_factor(&self) -> Option<f64> {
        match &self.control {
            Control::Human { .. } => None,
            Control::Ai(ai) => Some(ai.rubber_band().correction_factor()),
        }
    }
}

/// Finish line crossing, as returned by `RaceSession::drain_finished`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishEvent {
    pub competitor: usize,
    pub name: String,
    pub crossing_rank: u32,
    pub finish_time: f64,
    pub finish_speed: f64,
}

/// Data required to rank one competitor after the race.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishRecord {
    pub competitor: usize,
    pub ranked_time: f64,
    pub finish_speed: f64,
    pub disqualified: bool,
}

/// finish_order returns the competitor indices ordered by final position: disqualified
/// competitors last, then ascending ranked time, then higher finish speed (same tick), then
/// lower competitor index.
pub fn finish_order(records: &[FinishRecord]) -> Vec<usize> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        a.disqualified
            .cmp(&b.disqualified)
            .then_with(|| a.ranked_time.total_cmp(&b.ranked_time))
            .then_with(|| b.finish_speed.total_cmp(&a.finish_speed))
            .then_with(|| a.competitor.cmp(&b.competitor))
    });
    sorted.iter().map(|record| record.competitor).collect()
}

/// RaceSession runs one drag race: Waiting -> Countdown -> Racing -> Finished. All per-race
/// state is created in `start` and discarded in `reset` or the next `start`.
#[derive(Debug, Default)]
pub struct RaceSession {
    state: RaceState,
    distance: f64,
    competitors: Vec<Competitor>,
    start_sequence: StartSequenceController,
    false_start_policy: FalseStartPolicy,
    rubber_band_target: RubberBandTarget,
    rng: Option<ChaCha8Rng>,
    next_rank: u32,
    finish_events: Vec<FinishEvent>,
    results: Option<Vec<RaceResult>>,
}

impl RaceSession {
    pub fn new() -> RaceSession {
        RaceSession::default()
    }

    // ---------------------------------------------------------------------------------------------
    // STATE MACHINE -------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// start validates the configuration, creates all per-race state and enters the countdown.
    /// On error the session is left in Waiting.
    pub fn start(&mut self, config: &RaceConfiguration) -> Result<(), ConfigurationError> {
        self.reset();

        if !(config.distance > 0.0 && config.distance.is_finite()) {
            return Err(ConfigurationError::NonPositiveDistance(config.distance));
        }
        if config.competitors.is_empty() {
            return Err(ConfigurationError::NoCompetitors);
        }
        if let FalseStartPolicy::TimePenalty { seconds } = config.false_start_policy {
            if !(seconds >= 0.0 && seconds.is_finite()) {
                return Err(ConfigurationError::InvalidTimePenalty(seconds));
            }
        }
        let start_sequence = StartSequenceController::new(config.lights)?;
        let competitors = config
            .competitors
            .iter()
            .map(Competitor::new)
            .collect::<Result<Vec<Competitor>, ConfigurationError>>()?;

        self.distance = config.distance;
        self.competitors = competitors;
        self.start_sequence = start_sequence;
        self.false_start_policy = config.false_start_policy;
        self.rubber_band_target = config.rubber_band_target;
        self.rng = config.seed.map(ChaCha8Rng::seed_from_u64);
        self.next_rank = 1;
        self.state = RaceState::Countdown;

        info!(
            "Race started over {:.1}m with {} competitors",
            self.distance,
            self.competitors.len()
        );
        Ok(())
    }

    /// reset discards all per-race state and returns to Waiting. Callable in any state.
    pub fn reset(&mut self) {
        if self.state != RaceState::Waiting {
            debug!("Resetting race session from state {:?}", self.state);
        }
        *self = RaceSession::new();
    }

    /// set_input latches the input of a human competitor. Shift requests are consumed by the
    /// next tick, throttle and nitro stay applied until changed.
    pub fn set_input(
        &mut self,
        competitor: usize,
        input: DriverInput,
    ) -> Result<(), InvalidTransitionError> {
        if !matches!(self.state, RaceState::Countdown | RaceState::Racing) {
            return Err(InvalidTransitionError::InputInState(self.state));
        }
        let entry = self
            .competitors
            .get_mut(competitor)
            .ok_or(InvalidTransitionError::UnknownCompetitor(competitor))?;
        if !entry.is_human() {
            return Err(InvalidTransitionError::NotHumanControlled(competitor));
        }
        entry.input = input;
        Ok(())
    }

    /// tick advances the race by dt. Returns the ordered results in the tick the last competitor
    /// finishes. Ticking a race that is not running is rejected and changes nothing.
    pub fn tick(&mut self, dt: f64) -> Result<Option<Vec<RaceResult>>, InvalidTransitionError> {
        if !(dt > 0.0 && dt.is_finite()) {
            warn!("Rejected tick with time step {}", dt);
            return Err(InvalidTransitionError::InvalidTimestep(dt));
        }

        match self.state {
            RaceState::Waiting | RaceState::Finished => {
                warn!("Rejected tick in state {:?}", self.state);
                return Err(InvalidTransitionError::TickInState(self.state));
            }
            RaceState::Countdown => {
                if !self.start_sequence.advance(dt) {
                    self.record_false_starts();
                    self.clear_shift_requests();
                    return Ok(None);
                }
                self.state = RaceState::Racing;
            }
            RaceState::Racing => {
                self.start_sequence.advance(dt);
            }
        }

        // only the part of the tick after green is raced
        let racing_dt = self.start_sequence.race_time().min(dt);
        if racing_dt > TIME_EPS {
            self.step_competitors(racing_dt);
        }
        self.clear_shift_requests();

        if self.competitors.iter().all(|c| c.simulator.is_finished()) {
            let results = self.build_results();
            info!("Race finished after {:.3}s", self.start_sequence.race_time());
            self.results = Some(results.to_owned());
            self.state = RaceState::Finished;
            return Ok(Some(results));
        }
        Ok(None)
    }

    // ---------------------------------------------------------------------------------------------
    // RACE SIMULATOR PARTS ------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    fn record_false_starts(&mut self) {
        if self.start_sequence.is_green() {
            return;
        }
        for competitor in self.competitors.iter_mut() {
            if competitor.is_human() && competitor.input.throttle && !competitor.false_start {
                warn!(
                    "False start by {} at {:.3}s",
                    competitor.name,
                    self.start_sequence.clock()
                );
                competitor.false_start = true;
            }
        }
    }

    fn clear_shift_requests(&mut self) {
        for competitor in self.competitors.iter_mut() {
            competitor.input.shift_up_requested = false;
            competitor.input.shift_down_requested = false;
        }
    }

    /// Distance the rubber band of all AI competitors is measured against, taken before anybody
    /// moves in this tick so the update order does not matter.
    fn reference_distance(&self) -> f64 {
        let leader = self
            .competitors
            .iter()
            .map(|c| c.simulator.state().distance)
            .fold(0.0, f64::max);

        match self.rubber_band_target {
            RubberBandTarget::Leader => leader,
            RubberBandTarget::Player => self
                .competitors
                .iter()
                .filter(|c| c.is_human())
                .map(|c| c.simulator.state().distance)
                .reduce(f64::max)
                .unwrap_or(leader),
        }
    }

    fn step_competitors(&mut self, dt: f64) {
        let reference_distance = self.reference_distance();
        let race_time = self.start_sequence.race_time();
        let mut crossed: Vec<usize> = Vec::new();

        // fixed index order
        for (idx, competitor) in self.competitors.iter_mut().enumerate() {
            if competitor.simulator.is_finished() {
                continue;
            }

            let (input, bias, reaction_time) = match &mut competitor.control {
                Control::Human { reaction_time } => {
                    (competitor.input, PerformanceBias::default(), *reaction_time)
                }
                Control::Ai(ai) => {
                    let bias = ai.update_rubber_band(
                        reference_distance,
                        competitor.simulator.state().distance,
                        dt,
                    );
                    let input = ai.decide(
                        competitor.simulator.state(),
                        competitor.simulator.spec().nitro_capacity,
                        dt,
                        self.rng.as_mut(),
                    );
                    (input, bias, ai.reaction_time)
                }
            };

            let (coast_dt, drive_dt) = self.start_sequence.throttle_window(reaction_time, dt);
            if coast_dt > 0.0 {
                competitor.simulator.step(coast_dt, &input, &bias, false);
            }
            if drive_dt > 0.0 {
                // shift requests were consumed by the coasting part
                let input = if coast_dt > 0.0 {
                    DriverInput {
                        shift_up_requested: false,
                        shift_down_requested: false,
                        ..input
                    }
                } else {
                    input
                };
                competitor.simulator.step(drive_dt, &input, &bias, true);
            }

            if competitor.simulator.state().distance >= self.distance {
                crossed.push(idx);
            }
        }

        // same tick: higher speed first, stable sort keeps the lower index first on ties
        let speeds: Vec<f64> = crossed
            .iter()
            .map(|&idx| self.competitors[idx].simulator.state().velocity)
            .collect();

        for idx in argsort(&speeds, SortOrder::Descending)
            .into_iter()
            .map(|i| crossed[i])
        {
            let rank = self.next_rank;
            self.next_rank += 1;

            let competitor = &mut self.competitors[idx];
            competitor.simulator.mark_finished(race_time);
            competitor.crossing_rank = Some(rank);

            let finish_speed = competitor.simulator.state().velocity;
            debug!(
                "{} crossed the finish line as #{} after {:.3}s at {:.1}km/h",
                competitor.name,
                rank,
                race_time,
                finish_speed * 3.6
            );
            self.finish_events.push(FinishEvent {
                competitor: idx,
                name: competitor.name.to_owned(),
                crossing_rank: rank,
                finish_time: race_time,
                finish_speed,
            });
        }
    }

    fn time_penalty(&self, competitor: &Competitor) -> f64 {
        match self.false_start_policy {
            FalseStartPolicy::TimePenalty { seconds } if competitor.false_start => seconds,
            _ => 0.0,
        }
    }

    fn is_disqualified(&self, competitor: &Competitor) -> bool {
        competitor.false_start && self.false_start_policy == FalseStartPolicy::Disqualify
    }

    fn build_results(&self) -> Vec<RaceResult> {
        let records: Vec<FinishRecord> = self
            .competitors
            .iter()
            .enumerate()
            .map(|(idx, competitor)| {
                let state = competitor.simulator.state();
                FinishRecord {
                    competitor: idx,
                    ranked_time: state.finish_time.unwrap_or(f64::INFINITY)
                        + self.time_penalty(competitor),
                    finish_speed: state.finish_speed.unwrap_or(0.0),
                    disqualified: self.is_disqualified(competitor),
                }
            })
            .collect();

        finish_order(&records)
            .into_iter()
            .enumerate()
            .map(|(pos, idx)| {
                let competitor = &self.competitors[idx];
                let state = competitor.simulator.state();
                RaceResult {
                    competitor: idx,
                    name: competitor.name.to_owned(),
                    vehicle_name: competitor.simulator.spec().name.to_owned(),
                    is_player: competitor.is_human(),
                    position: pos as u32 + 1,
                    finish_time: state.finish_time.unwrap_or(f64::INFINITY),
                    time_penalty: self.time_penalty(competitor),
                    finish_speed: state.finish_speed.unwrap_or(0.0),
                    top_speed: state.top_speed,
                    distance: state.distance,
                    nitro_used: state.nitro_used,
                    false_start: competitor.false_start,
                    disqualified: self.is_disqualified(competitor),
                    vehicle: self.vehicle_snapshot(idx),
                }
            })
            .collect()
    }

    // ---------------------------------------------------------------------------------------------
    // METHODS (HELPERS) ---------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn state(&self) -> RaceState {
        self.state
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    pub fn competitor(&self, idx: usize) -> Option<&Competitor> {
        self.competitors.get(idx)
    }

    pub fn start_sequence(&self) -> &StartSequenceController {
        &self.start_sequence
    }

    pub fn race_time(&self) -> f64 {
        self.start_sequence.race_time()
    }

    pub fn results(&self) -> Option<&[RaceResult]> {
        self.results.as_deref()
    }

    /// drain_finished returns the finish line crossings recorded since the last call.
    pub fn drain_finished(&mut self) -> Vec<FinishEvent> {
        std::mem::take(&mut self.finish_events)
    }

    fn vehicle_snapshot(&self, idx: usize) -> VehicleSnapshot {
        let competitor = &self.competitors[idx];
        let state = competitor.simulator.state();
        VehicleSnapshot {
            competitor: idx,
            name: competitor.name.to_owned(),
            distance: state.distance,
            velocity: state.velocity,
            engine_rpm: state.engine_rpm,
            gear: state.gear,
            nitro_charge: state.nitro_charge,
            nitro_active: state.nitro_active,
            throttle: state.throttle,
            finished: state.finished,
            correction_factor: competitor.correction_factor(),
        }
    }

    /// snapshot returns a read-only view of the race for dashboards.
    pub fn snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            state: self.state,
            light_state: self.start_sequence.light_state(),
            clock: self.start_sequence.clock(),
            race_time: self.start_sequence.race_time(),
            race_distance: self.distance,
            vehicles: (0..self.competitors.len())
                .map(|idx| self.vehicle_snapshot(idx))
                .collect(),
            final_result: self.results.to_owned(),
        }
    }
}
