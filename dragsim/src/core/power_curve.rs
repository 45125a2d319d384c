use crate::core::vehicle_spec::VehicleSpecification;
use helpers::general::{clamped_lin_interp, sort_samples};
use std::f64::consts::PI;

/// Converts an engine speed in 1/min into an angular velocity in rad/s.
pub fn rpm_to_rad_per_s(rpm: f64) -> f64 {
    rpm * 2.0 * PI / 60.0
}

/// PowerCurveModel maps the engine speed onto torque and power. Both curves are interpolated
/// piecewise-linearly between their samples, with the engine speed clamped to
/// [idle_rpm, max_rpm]. A missing curve is derived from the other one via P = T * omega.
#[derive(Debug, Clone)]
pub struct PowerCurveModel {
    idle_rpm: f64,
    max_rpm: f64,
    power_samples: Vec<[f64; 2]>,
    torque_samples: Vec<[f64; 2]>,
}

impl PowerCurveModel {
    pub fn new(spec: &VehicleSpecification) -> PowerCurveModel {
        let mut power_samples = spec.power_curve.to_owned();
        let mut torque_samples = spec.torque_curve.to_owned();
        sort_samples(&mut power_samples);
        sort_samples(&mut torque_samples);

        PowerCurveModel {
            idle_rpm: spec.idle_rpm,
            max_rpm: spec.max_rpm,
            power_samples,
            torque_samples,
        }
    }

    fn clamp_rpm(&self, rpm: f64) -> f64 {
        rpm.clamp(self.idle_rpm, self.max_rpm)
    }

    /// power_at returns the engine power in W at the given engine speed.
    pub fn power_at(&self, rpm: f64) -> f64 {
        if !self.power_samples.is_empty() {
            return clamped_lin_interp(rpm, self.idle_rpm, self.max_rpm, &self.power_samples);
        }
        let rpm = self.clamp_rpm(rpm);
        self.torque_at(rpm) * rpm_to_rad_per_s(rpm)
    }

    /// torque_at returns the engine torque in Nm at the given engine speed.
    pub fn torque_at(&self, rpm: f64) -> f64 {
        if !self.torque_samples.is_empty() {
            return clamped_lin_interp(rpm, self.idle_rpm, self.max_rpm, &self.torque_samples);
        }
        let rpm = self.clamp_rpm(rpm);
        // idle_rpm > 0 is guaranteed by the specification check
        self.power_at(rpm) / rpm_to_rad_per_s(rpm)
    }
}
