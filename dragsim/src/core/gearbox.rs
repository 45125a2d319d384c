use crate::core::vehicle_spec::VehicleSpecification;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SHIFT_UP_FRACTION: f64 = 0.9; // of redline, for a perfect shift skill
pub const SHIFT_UP_FRACTION_SKILL_SPREAD: f64 = 0.1; // lost at shift skill 0
pub const SHIFT_DOWN_FRACTION: f64 = 0.35; // of redline
const TIME_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum GearboxState {
    Idle,
    Engaged(usize),
    Shifting {
        from: usize,
        to: usize,
        remaining: f64,
    },
}

/// Automatic gearboxes shift on their own based on the engine speed. Manual gearboxes only
/// shift on explicit requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftMode {
    Automatic,
    Manual,
}

impl Default for ShiftMode {
    fn default() -> Self {
        ShiftMode::Automatic
    }
}

/// GearboxController is the shift state machine of one vehicle:
/// Idle -> Engaged(1) on first throttle, Engaged(g) -> Shifting(g, g +- 1) on a shift point or
/// request, Shifting -> Engaged(to) once the shift duration has passed. Shift attempts while
/// shifting are ignored, not queued.
#[derive(Debug, Clone)]
pub struct GearboxController {
    state: GearboxState,
    mode: ShiftMode,
    gear_ratios: Vec<f64>,
    idle_rpm: f64,
    max_rpm: f64,
    redline_rpm: f64,
    shift_duration: f64,
    shift_up_fraction: f64,
    threshold_bias_rpm: f64,
}

impl GearboxController {
    /// `shift_skill` in [0, 1] scales the shift duration by (2 - skill) and moves the shift-up
    /// point below its optimum for less skilled drivers.
    pub fn new(spec: &VehicleSpecification, mode: ShiftMode, shift_skill: f64) -> GearboxController {
        let shift_skill = shift_skill.clamp(0.0, 1.0);

        GearboxController {
            state: GearboxState::Idle,
            mode,
            gear_ratios: spec.gear_ratios.to_owned(),
            idle_rpm: spec.idle_rpm,
            max_rpm: spec.max_rpm,
            redline_rpm: spec.redline_rpm,
            shift_duration: spec.shift_duration * (2.0 - shift_skill),
            shift_up_fraction: SHIFT_UP_FRACTION
                - (1.0 - shift_skill) * SHIFT_UP_FRACTION_SKILL_SPREAD,
            threshold_bias_rpm: 0.0,
        }
    }

    pub fn state(&self) -> GearboxState {
        self.state
    }

    pub fn mode(&self) -> ShiftMode {
        self.mode
    }

    pub fn gear_count(&self) -> usize {
        self.gear_ratios.len()
    }

    pub fn shift_duration(&self) -> f64 {
        self.shift_duration
    }

    /// gear returns the current gear, 0 for neutral. While shifting the target gear is
    /// returned.
    pub fn gear(&self) -> usize {
        match self.state {
            GearboxState::Idle => 0,
            GearboxState::Engaged(gear) => gear,
            GearboxState::Shifting { to, .. } => to,
        }
    }

    pub fn is_shifting(&self) -> bool {
        matches!(self.state, GearboxState::Shifting { .. })
    }

    /// set_threshold_bias moves the shift-up point by the given engine speed (rubber banding).
    pub fn set_threshold_bias(&mut self, bias_rpm: f64) {
        self.threshold_bias_rpm = bias_rpm;
    }

    pub fn shift_up_threshold(&self, _gear: usize) -> f64 {
        (self.redline_rpm * self.shift_up_fraction + self.threshold_bias_rpm)
            .clamp(self.idle_rpm, self.max_rpm)
    }

    pub fn shift_down_threshold(&self, _gear: usize) -> f64 {
        (self.redline_rpm * SHIFT_DOWN_FRACTION).clamp(self.idle_rpm, self.max_rpm)
    }

    /// engage puts the gearbox into first gear when throttle is applied for the first time.
    pub fn engage(&mut self) {
        if matches!(self.state, GearboxState::Idle) {
            self.state = GearboxState::Engaged(1);
        }
    }

    pub fn request_shift_up(&mut self) -> bool {
        match self.state {
            GearboxState::Engaged(gear) if gear < self.gear_count() => {
                self.begin_shift(gear, gear + 1);
                true
            }
            _ => false,
        }
    }

    pub fn request_shift_down(&mut self) -> bool {
        match self.state {
            GearboxState::Engaged(gear) if gear > 1 => {
                self.begin_shift(gear, gear - 1);
                true
            }
            _ => false,
        }
    }

    fn begin_shift(&mut self, from: usize, to: usize) {
        debug!("Shifting from gear {} to gear {}", from, to);
        self.state = GearboxState::Shifting {
            from,
            to,
            remaining: self.shift_duration,
        };
        if self.shift_duration <= TIME_EPS {
            self.state = GearboxState::Engaged(to);
        }
    }

    /// Engine speed the engine would run at in `to` if it runs at `rpm` in `from` now.
    fn projected_rpm(&self, rpm: f64, from: usize, to: usize) -> f64 {
        rpm * self.gear_ratios[to - 1] / self.gear_ratios[from - 1]
    }

    /// update advances a running shift by dt, and lets an automatic gearbox check its shift
    /// points against the current engine speed.
    pub fn update(&mut self, dt: f64, rpm: f64) {
        match self.state {
            GearboxState::Idle => {}

            GearboxState::Engaged(gear) => {
                if self.mode != ShiftMode::Automatic {
                    return;
                }

                if gear < self.gear_count() && rpm >= self.shift_up_threshold(gear) {
                    self.begin_shift(gear, gear + 1);
                } else if gear > 1
                    && rpm < self.shift_down_threshold(gear)
                    && self.projected_rpm(rpm, gear, gear - 1) < self.shift_up_threshold(gear - 1)
                {
                    self.begin_shift(gear, gear - 1);
                }
            }

            GearboxState::Shifting {
                from,
                to,
                remaining,
            } => {
                let remaining = remaining - dt;
                self.state = if remaining <= TIME_EPS {
                    GearboxState::Engaged(to)
                } else {
                    GearboxState::Shifting {
                        from,
                        to,
                        remaining,
                    }
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vehicle_spec::tests::test_spec;
    use approx::assert_relative_eq;

    fn engaged_gearbox(mode: ShiftMode) -> GearboxController {
        let mut gearbox = GearboxController::new(&test_spec(), mode, 1.0);
        gearbox.engage();
        gearbox
    }

    #[test]
    fn test_idle_until_engaged() {
        let mut gearbox = GearboxController::new(&test_spec(), ShiftMode::Automatic, 1.0);
        assert_eq!(gearbox.gear(), 0);
        gearbox.update(0.1, 7000.0);
        assert_eq!(gearbox.state(), GearboxState::Idle);
        gearbox.engage();
        assert_eq!(gearbox.state(), GearboxState::Engaged(1));
    }

    #[test]
    fn test_automatic_shift_up_and_complete() {
        let mut gearbox = engaged_gearbox(ShiftMode::Automatic);
        assert_relative_eq!(gearbox.shift_up_threshold(1), 6300.0);

        gearbox.update(0.1, 6299.0);
        assert_eq!(gearbox.state(), GearboxState::Engaged(1));

        gearbox.update(0.1, 6300.0);
        assert!(gearbox.is_shifting());
        assert_eq!(gearbox.gear(), 2);

        gearbox.update(0.1, 4000.0);
        gearbox.update(0.1, 4000.0);
        assert!(gearbox.is_shifting());
        gearbox.update(0.1, 4000.0);
        assert_eq!(gearbox.state(), GearboxState::Engaged(2));
    }

    #[test]
    fn test_no_shift_up_in_top_gear() {
        let mut gearbox = engaged_gearbox(ShiftMode::Automatic);
        for _ in 0..4 {
            assert!(gearbox.request_shift_up());
            for _ in 0..3 {
                gearbox.update(0.1, 3000.0);
            }
        }
        assert_eq!(gearbox.state(), GearboxState::Engaged(5));
        gearbox.update(0.1, 7500.0);
        assert_eq!(gearbox.state(), GearboxState::Engaged(5));
        assert!(!gearbox.request_shift_up());
    }

    #[test]
    fn test_manual_gearbox_ignores_shift_points() {
        let mut gearbox = engaged_gearbox(ShiftMode::Manual);
        gearbox.update(0.1, 7400.0);
        assert_eq!(gearbox.state(), GearboxState::Engaged(1));
        assert!(gearbox.request_shift_up());
        assert_eq!(gearbox.gear(), 2);
    }

    #[test]
    fn test_requests_while_shifting_are_ignored() {
        let mut gearbox = engaged_gearbox(ShiftMode::Manual);
        assert!(gearbox.request_shift_up());
        assert!(!gearbox.request_shift_up());
        assert!(!gearbox.request_shift_down());
        assert_eq!(gearbox.gear(), 2);
    }

    #[test]
    fn test_automatic_shift_down_with_hysteresis() {
        let mut gearbox = engaged_gearbox(ShiftMode::Automatic);
        gearbox.request_shift_up();
        for _ in 0..3 {
            gearbox.update(0.1, 3000.0);
        }
        assert_eq!(gearbox.state(), GearboxState::Engaged(2));

        // 2400rpm is below 0.35 * 7000, in first gear it would be 3927rpm < 6300rpm
        gearbox.update(0.1, 2400.0);
        assert_eq!(
            gearbox.state(),
            GearboxState::Shifting {
                from: 2,
                to: 1,
                remaining: gearbox.shift_duration()
            }
        );
    }

    #[test]
    fn test_threshold_bias_and_clamp() {
        let mut gearbox = engaged_gearbox(ShiftMode::Automatic);
        gearbox.set_threshold_bias(300.0);
        assert_relative_eq!(gearbox.shift_up_threshold(1), 6600.0);
        gearbox.set_threshold_bias(5000.0);
        assert_relative_eq!(gearbox.shift_up_threshold(1), 7500.0);
    }

    #[test]
    fn test_shift_skill_scales_duration_and_threshold() {
        let gearbox = GearboxController::new(&test_spec(), ShiftMode::Automatic, 0.5);
        assert_relative_eq!(gearbox.shift_duration(), 0.45, epsilon = 1e-12);
        assert_relative_eq!(gearbox.shift_up_threshold(1), 7000.0 * 0.85, epsilon = 1e-9);
    }
}
