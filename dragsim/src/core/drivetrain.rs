use crate::core::vehicle_spec::VehicleSpecification;
use std::f64::consts::PI;

pub const GRAVITY: f64 = 9.81; // m/s^2
pub const AIR_DENSITY: f64 = 1.225; // kg/m^3
pub const ROLLING_RESISTANCE_COEFF: f64 = 0.015; // -

/// DrivetrainModel converts engine torque into longitudinal force and engine speed into vehicle
/// speed (and vice versa). It holds no state of its own, all inputs come from the specification.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrivetrainModel;

impl DrivetrainModel {
    /// overall_ratio returns gear ratio times final drive for the given gear, None for neutral or
    /// a gear that does not exist.
    pub fn overall_ratio(&self, gear: usize, spec: &VehicleSpecification) -> Option<f64> {
        if gear == 0 {
            return None;
        }
        spec.gear_ratios
            .get(gear - 1)
            .map(|ratio| ratio * spec.final_drive)
    }

    /// wheel_force returns the driving force in N at the contact patch. The force is limited by
    /// the traction available from the tires.
    pub fn wheel_force(&self, torque: f64, gear: usize, spec: &VehicleSpecification) -> f64 {
        let ratio = match self.overall_ratio(gear, spec) {
            Some(ratio) => ratio,
            None => return 0.0,
        };
        let force = torque * ratio / spec.wheel_radius;
        let traction_limit = spec.grip_coefficient * spec.mass * GRAVITY;
        force.clamp(-traction_limit, traction_limit)
    }

    pub fn drag_force(&self, velocity: f64, spec: &VehicleSpecification) -> f64 {
        0.5 * AIR_DENSITY * velocity.powi(2) * spec.drag_coefficient * spec.frontal_area
    }

    pub fn rolling_force(&self, spec: &VehicleSpecification) -> f64 {
        ROLLING_RESISTANCE_COEFF * spec.mass * GRAVITY
    }

    /// net_force returns wheel force minus drag and rolling resistance. Resistances cannot push a
    /// stationary vehicle backwards, so the result is zero if the vehicle stands and the wheel
    /// force does not overcome them.
    pub fn net_force(&self, wheel_force: f64, velocity: f64, spec: &VehicleSpecification) -> f64 {
        let resistance = self.drag_force(velocity, spec) + self.rolling_force(spec);

        if velocity <= 0.0 && wheel_force <= resistance {
            return 0.0;
        }
        wheel_force - resistance
    }

    /// engine_rpm returns the engine speed that belongs to the vehicle speed in the given gear,
    /// assuming no wheel slip. Below idle the clutch slips, so the result is clamped to
    /// [idle_rpm, max_rpm].
    pub fn engine_rpm(&self, velocity: f64, gear: usize, spec: &VehicleSpecification) -> f64 {
        match self.overall_ratio(gear, spec) {
            Some(ratio) => {
                let wheel_rpm = velocity / (2.0 * PI * spec.wheel_radius) * 60.0;
                (wheel_rpm * ratio).clamp(spec.idle_rpm, spec.max_rpm)
            }
            None => spec.idle_rpm,
        }
    }

    /// unclamped_engine_rpm is engine_rpm without the idle/limiter clamp, used to detect the rev
    /// limiter.
    pub fn unclamped_engine_rpm(
        &self,
        velocity: f64,
        gear: usize,
        spec: &VehicleSpecification,
    ) -> f64 {
        match self.overall_ratio(gear, spec) {
            Some(ratio) => velocity / (2.0 * PI * spec.wheel_radius) * 60.0 * ratio,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vehicle_spec::tests::test_spec;
    use approx::assert_relative_eq;

    #[test]
    fn test_wheel_force_formula() {
        let spec = test_spec();
        let force = DrivetrainModel.wheel_force(300.0, 3, &spec);
        assert_relative_eq!(force, 300.0 * 1.5 * 3.7 / 0.33, epsilon = 1e-9);
    }

    #[test]
    fn test_wheel_force_neutral_and_traction_limit() {
        let spec = test_spec();
        assert_eq!(DrivetrainModel.wheel_force(300.0, 0, &spec), 0.0);
        assert_eq!(DrivetrainModel.wheel_force(300.0, 9, &spec), 0.0);

        let limit = 1.1 * 1300.0 * GRAVITY;
        assert_relative_eq!(DrivetrainModel.wheel_force(420.0, 1, &spec), limit);
    }

    #[test]
    fn test_drag_force() {
        let spec = test_spec();
        let expected = 0.5 * AIR_DENSITY * 900.0 * 0.32 * 2.1;
        assert_relative_eq!(DrivetrainModel.drag_force(30.0, &spec), expected);
    }

    #[test]
    fn test_stationary_vehicle_not_reversed() {
        let spec = test_spec();
        assert_eq!(DrivetrainModel.net_force(0.0, 0.0, &spec), 0.0);
        assert_eq!(DrivetrainModel.net_force(50.0, 0.0, &spec), 0.0);
        assert!(DrivetrainModel.net_force(0.0, 10.0, &spec) < 0.0);
    }

    #[test]
    fn test_engine_rpm_follows_speed() {
        let spec = test_spec();
        let rpm = DrivetrainModel.engine_rpm(20.0, 2, &spec);
        let expected = 20.0 / (2.0 * PI * 0.33) * 60.0 * 2.2 * 3.7;
        assert_relative_eq!(rpm, expected, epsilon = 1e-9);

        assert_eq!(DrivetrainModel.engine_rpm(0.0, 1, &spec), 900.0);
        assert_eq!(DrivetrainModel.engine_rpm(200.0, 1, &spec), 7500.0);
        assert_eq!(DrivetrainModel.engine_rpm(20.0, 0, &spec), 900.0);
    }
}
