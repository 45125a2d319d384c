use crate::core::drivetrain::DrivetrainModel;
use crate::core::gearbox::{GearboxController, GearboxState, ShiftMode};
use crate::core::power_curve::PowerCurveModel;
use crate::core::vehicle_spec::VehicleSpecification;
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SHIFT_RPM_DECAY_RATE: f64 = 3000.0; // 1/min per s, clutch open

/// Input signal of one competitor for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DriverInput {
    pub throttle: bool,
    pub shift_up_requested: bool,
    pub shift_down_requested: bool,
    pub nitro_requested: bool,
}

/// VehicleRuntimeState is the kinematic state of one competitor. It is owned and mutated by
/// exactly one VehicleSimulator.
/// * `distance` - (m) Distance travelled since the start line
/// * `velocity` - (m/s) Current speed, never negative
/// * `top_speed` - (m/s) Highest speed reached so far
/// * `engine_rpm` - (1/min) Current engine speed
/// * `gear` - Current gear, 0 is neutral
/// * `throttle` - True if throttle was effectively applied in the last tick
/// * `nitro_charge` - Remaining nitro charge
/// * `elapsed_time` - (s) Time this vehicle has been simulated while racing
/// * `finish_time` - (s) Race time at which the finish line was crossed, set once
/// * `finish_speed` - (m/s) Speed at the finish line, set once
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleRuntimeState {
    pub distance: f64,
    pub velocity: f64,
    pub top_speed: f64,
    pub engine_rpm: f64,
    pub gear: usize,
    pub throttle: bool,
    pub nitro_charge: f64,
    pub nitro_active: bool,
    pub nitro_used: bool,
    pub elapsed_time: f64,
    pub finished: bool,
    pub finish_time: Option<f64>,
    pub finish_speed: Option<f64>,
}

/// Biases applied to one vehicle for one tick, e.g. by rubber banding.
/// * `power` - (-) Relative wheel force change, 0.1 is +10 %
/// * `shift_threshold_rpm` - (1/min) Offset of the shift-up point
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceBias {
    pub power: f64,
    pub shift_threshold_rpm: f64,
}

/// VehicleSimulator integrates the longitudinal motion of one competitor.
#[derive(Debug, Clone)]
pub struct VehicleSimulator {
    spec: Arc<VehicleSpecification>,
    power_curve: PowerCurveModel,
    drivetrain: DrivetrainModel,
    gearbox: GearboxController,
    state: VehicleRuntimeState,
}

impl VehicleSimulator {
    pub fn new(
        spec: Arc<VehicleSpecification>,
        shift_mode: ShiftMode,
        shift_skill: f64,
    ) -> Result<VehicleSimulator, ConfigurationError> {
        spec.validate()?;

        let state = VehicleRuntimeState {
            engine_rpm: spec.idle_rpm,
            nitro_charge: spec.nitro_capacity,
            ..VehicleRuntimeState::default()
        };

        Ok(VehicleSimulator {
            power_curve: PowerCurveModel::new(&spec),
            drivetrain: DrivetrainModel,
            gearbox: GearboxController::new(&spec, shift_mode, shift_skill),
            state,
            spec,
        })
    }

    pub fn spec(&self) -> &VehicleSpecification {
        &self.spec
    }

    pub fn state(&self) -> &VehicleRuntimeState {
        &self.state
    }

    pub fn gearbox(&self) -> &GearboxController {
        &self.gearbox
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    /// step integrates the vehicle by dt (semi-implicit Euler). `may_throttle` is false until the
    /// competitor is allowed to leave the start line; throttle input before that is ignored.
    pub fn step(&mut self, dt: f64, input: &DriverInput, bias: &PerformanceBias, may_throttle: bool) {
        if self.state.finished {
            return;
        }

        let throttle = input.throttle && may_throttle;
        self.state.throttle = throttle;

        if throttle {
            self.gearbox.engage();
        }
        if input.shift_up_requested {
            self.gearbox.request_shift_up();
        } else if input.shift_down_requested {
            self.gearbox.request_shift_down();
        }
        self.gearbox.set_threshold_bias(bias.shift_threshold_rpm);
        self.gearbox.update(dt, self.state.engine_rpm);

        // nitro
        self.state.nitro_active = throttle && input.nitro_requested && self.state.nitro_charge > 0.0;
        if self.state.nitro_active {
            self.state.nitro_used = true;
            let drain_rate = if self.spec.nitro_duration > 0.0 {
                self.spec.nitro_capacity / self.spec.nitro_duration
            } else {
                f64::INFINITY
            };
            self.state.nitro_charge = (self.state.nitro_charge - drain_rate * dt).max(0.0);
        }

        // forces
        let wheel_force = match self.gearbox.state() {
            GearboxState::Engaged(gear) if throttle => self.drive_force(gear, bias.power),
            _ => 0.0,
        };
        let net_force = self
            .drivetrain
            .net_force(wheel_force, self.state.velocity, &self.spec);
        let acceleration = net_force / self.spec.mass;

        // semi-implicit Euler
        self.state.velocity = (self.state.velocity + acceleration * dt).max(0.0);
        self.state.distance += self.state.velocity * dt;
        self.state.top_speed = self.state.top_speed.max(self.state.velocity);
        self.state.elapsed_time += dt;

        // engine speed
        self.state.engine_rpm = match self.gearbox.state() {
            GearboxState::Engaged(gear) => {
                self.drivetrain
                    .engine_rpm(self.state.velocity, gear, &self.spec)
            }
            GearboxState::Shifting { .. } => {
                (self.state.engine_rpm - SHIFT_RPM_DECAY_RATE * dt).max(self.spec.idle_rpm)
            }
            GearboxState::Idle => self.spec.idle_rpm,
        };
        self.state.gear = self.gearbox.gear();
    }

    fn drive_force(&self, gear: usize, power_bias: f64) -> f64 {
        // rev limiter
        let rpm = self
            .drivetrain
            .unclamped_engine_rpm(self.state.velocity, gear, &self.spec);
        if rpm >= self.spec.max_rpm {
            return 0.0;
        }

        let nitro_factor = if self.state.nitro_active {
            1.0 + self.spec.nitro_power_bonus
        } else {
            1.0
        };
        let torque =
            self.power_curve.torque_at(self.state.engine_rpm) * nitro_factor * (1.0 + power_bias);
        self.drivetrain.wheel_force(torque, gear, &self.spec)
    }

    /// mark_finished stamps finish time and speed. Only the first call has an effect.
    pub fn mark_finished(&mut self, finish_time: f64) {
        if self.state.finished {
            return;
        }
        self.state.finished = true;
        self.state.finish_time = Some(finish_time);
        self.state.finish_speed = Some(self.state.velocity);
    }
}
