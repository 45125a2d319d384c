use crate::error::ConfigurationError;
use helpers::general::sort_samples;
use serde::{Deserialize, Serialize};

/// * `name` - Vehicle name, e.g. Falcon GT
/// * `mass` - (kg) Vehicle mass including driver
/// * `drag_coefficient` - (-) Aerodynamic drag coefficient c_w
/// * `frontal_area` - (m^2) Frontal area
/// * `grip_coefficient` - (-) Tire friction coefficient, limits the transferable wheel force
/// * `idle_rpm` - (1/min) Idle engine speed
/// * `max_rpm` - (1/min) Rev limiter, torque is cut above this engine speed
/// * `redline_rpm` - (1/min) Redline, reference for the shift points
/// * `power_curve` - (1/min, W) Power samples [rpm, power], may be empty if a torque curve exists
/// * `torque_curve` - (1/min, Nm) Torque samples [rpm, torque], may be empty if a power curve
/// exists
/// * `gear_ratios` - (-) Ordered forward gear ratios, first gear first
/// * `final_drive` - (-) Final drive ratio
/// * `wheel_radius` - (m) Dynamic wheel radius
/// * `shift_duration` - (s) Duration of a gear change (torque cut)
/// * `nitro_power_bonus` - (-) Relative wheel force bonus while nitro is active, e.g. 0.3
/// * `nitro_duration` - (s) Time it takes to empty a full nitro tank
/// * `nitro_capacity` - (-) Nitro charge of a full tank
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VehicleSpecification {
    pub name: String,
    pub mass: f64,
    pub drag_coefficient: f64,
    pub frontal_area: f64,
    pub grip_coefficient: f64,
    pub idle_rpm: f64,
    pub max_rpm: f64,
    pub redline_rpm: f64,
    #[serde(default)]
    pub power_curve: Vec<[f64; 2]>,
    #[serde(default)]
    pub torque_curve: Vec<[f64; 2]>,
    pub gear_ratios: Vec<f64>,
    pub final_drive: f64,
    #[serde(default = "default_wheel_radius")]
    pub wheel_radius: f64,
    pub shift_duration: f64,
    #[serde(default)]
    pub nitro_power_bonus: f64,
    #[serde(default)]
    pub nitro_duration: f64,
    #[serde(default)]
    pub nitro_capacity: f64,
}

fn default_wheel_radius() -> f64 {
    0.33
}

/// Catalog slot a part is installed in. The slot only matters for the catalog (one part per
/// slot); all parts affect the vehicle through the same `PartEffect` fields.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartSlot {
    Engine,
    Transmission,
    Tires,
    Nitro,
    Body,
}

/// * `slot` - Catalog slot of the part
/// * `power_bonus` - (-) Relative bonus on the power curve, e.g. 0.1 for +10 %
/// * `torque_bonus` - (-) Relative bonus on the torque curve
/// * `weight_change` - (kg) Added (positive) or removed (negative) mass
/// * `grip_bonus` - (-) Absolute change of the grip coefficient
/// * `nitro_capacity_bonus` - (-) Added nitro charge
/// * `torque_curve` - Replacement torque curve (e.g. a different engine)
/// * `gear_ratios` - Replacement gear ratios (e.g. a close-ratio gearbox)
/// * `redline_rpm` - Replacement redline
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PartEffect {
    pub slot: PartSlot,
    #[serde(default)]
    pub power_bonus: f64,
    #[serde(default)]
    pub torque_bonus: f64,
    #[serde(default)]
    pub weight_change: f64,
    #[serde(default)]
    pub grip_bonus: f64,
    #[serde(default)]
    pub nitro_capacity_bonus: f64,
    #[serde(default)]
    pub torque_curve: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub gear_ratios: Option<Vec<f64>>,
    #[serde(default)]
    pub redline_rpm: Option<f64>,
}

impl PartEffect {
    pub fn new(slot: PartSlot) -> PartEffect {
        PartEffect {
            slot,
            power_bonus: 0.0,
            torque_bonus: 0.0,
            weight_change: 0.0,
            grip_bonus: 0.0,
            nitro_capacity_bonus: 0.0,
            torque_curve: None,
            gear_ratios: None,
            redline_rpm: None,
        }
    }
}

impl VehicleSpecification {
    pub fn gear_count(&self) -> usize {
        self.gear_ratios.len()
    }

    /// validate checks everything the simulation relies on so that no physics step can fail
    /// later on.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let vehicle = || self.name.to_owned();

        if self.gear_ratios.is_empty() {
            return Err(ConfigurationError::EmptyGearRatios { vehicle: vehicle() });
        }
        if !(self.mass > 0.0 && self.mass.is_finite()) {
            return Err(ConfigurationError::NonPositiveMass {
                vehicle: vehicle(),
                mass: self.mass,
            });
        }
        if !(self.redline_rpm > self.idle_rpm) {
            return Err(ConfigurationError::RedlineNotAboveIdle {
                vehicle: vehicle(),
                idle_rpm: self.idle_rpm,
                redline_rpm: self.redline_rpm,
            });
        }
        if self.max_rpm < self.redline_rpm {
            return Err(ConfigurationError::MaxRpmBelowRedline {
                vehicle: vehicle(),
                redline_rpm: self.redline_rpm,
                max_rpm: self.max_rpm,
            });
        }

        let positive = [
            ("final_drive", self.final_drive),
            ("wheel_radius", self.wheel_radius),
            ("idle_rpm", self.idle_rpm),
            ("max_rpm", self.max_rpm),
        ];
        let ratios = self.gear_ratios.iter().map(|&ratio| ("gear_ratios", ratio));
        for (field, value) in positive.into_iter().chain(ratios) {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigurationError::NonPositiveValue {
                    vehicle: vehicle(),
                    field,
                    value,
                });
            }
        }

        let non_negative = [
            ("drag_coefficient", self.drag_coefficient),
            ("frontal_area", self.frontal_area),
            ("grip_coefficient", self.grip_coefficient),
            ("shift_duration", self.shift_duration),
            ("nitro_power_bonus", self.nitro_power_bonus),
            ("nitro_duration", self.nitro_duration),
            ("nitro_capacity", self.nitro_capacity),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigurationError::NegativeValue {
                    vehicle: vehicle(),
                    field,
                    value,
                });
            }
        }

        if self.power_curve.is_empty() && self.torque_curve.is_empty() {
            return Err(ConfigurationError::MissingCurve { vehicle: vehicle() });
        }
        for &[rpm, value] in self.power_curve.iter().chain(self.torque_curve.iter()) {
            if !(rpm.is_finite() && value.is_finite()) {
                return Err(ConfigurationError::NegativeValue {
                    vehicle: vehicle(),
                    field: "curve sample",
                    value: if rpm.is_finite() { value } else { rpm },
                });
            }
        }

        Ok(())
    }

    /// with_parts returns a copy of the specification with all part effects applied in order.
    /// Replacement fields of later parts win over earlier ones.
    pub fn with_parts(&self, parts: &[PartEffect]) -> VehicleSpecification {
        let mut spec = self.clone();

        for part in parts {
            if let Some(curve) = &part.torque_curve {
                spec.torque_curve = curve.to_owned();
            }
            if let Some(ratios) = &part.gear_ratios {
                spec.gear_ratios = ratios.to_owned();
            }
            if let Some(redline) = part.redline_rpm {
                spec.redline_rpm = redline;
                spec.max_rpm = spec.max_rpm.max(redline);
            }

            for sample in spec.power_curve.iter_mut() {
                sample[1] *= 1.0 + part.power_bonus;
            }
            for sample in spec.torque_curve.iter_mut() {
                sample[1] *= 1.0 + part.torque_bonus;
            }

            spec.mass += part.weight_change;
            spec.grip_coefficient = (spec.grip_coefficient + part.grip_bonus).max(0.0);
            spec.nitro_capacity = (spec.nitro_capacity + part.nitro_capacity_bonus).max(0.0);
        }

        sort_samples(&mut spec.power_curve);
        sort_samples(&mut spec.torque_curve);
        spec
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) fn test_spec() -> VehicleSpecification {
        VehicleSpecification {
            name: "Test Coupe".to_owned(),
            mass: 1300.0,
            drag_coefficient: 0.32,
            frontal_area: 2.1,
            grip_coefficient: 1.1,
            idle_rpm: 900.0,
            max_rpm: 7500.0,
            redline_rpm: 7000.0,
            power_curve: Vec::new(),
            torque_curve: vec![
                [1000.0, 300.0],
                [3000.0, 380.0],
                [4500.0, 420.0],
                [6000.0, 400.0],
                [7500.0, 330.0],
            ],
            gear_ratios: vec![3.6, 2.2, 1.5, 1.15, 0.9],
            final_drive: 3.7,
            wheel_radius: 0.33,
            shift_duration: 0.3,
            nitro_power_bonus: 0.35,
            nitro_duration: 3.0,
            nitro_capacity: 100.0,
        }
    }

    #[test]
    fn test_valid_spec() {
        assert_eq!(test_spec().validate(), Ok(()));
    }

    #[test]
    fn test_empty_gear_ratios_rejected() {
        let spec = VehicleSpecification {
            gear_ratios: Vec::new(),
            ..test_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(ConfigurationError::EmptyGearRatios { .. })
        ));
    }

    #[test]
    fn test_non_positive_mass_rejected() {
        let spec = VehicleSpecification {
            mass: 0.0,
            ..test_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(ConfigurationError::NonPositiveMass { .. })
        ));
    }

    #[test]
    fn test_redline_must_exceed_idle() {
        let spec = VehicleSpecification {
            idle_rpm: 7000.0,
            ..test_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(ConfigurationError::RedlineNotAboveIdle { .. })
        ));
    }

    #[test]
    fn test_missing_curves_rejected() {
        let spec = VehicleSpecification {
            torque_curve: Vec::new(),
            ..test_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(ConfigurationError::MissingCurve { .. })
        ));
    }

    #[test]
    fn test_negative_gear_ratio_rejected() {
        let spec = VehicleSpecification {
            gear_ratios: vec![3.0, -1.0],
            ..test_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(ConfigurationError::NonPositiveValue {
                field: "gear_ratios",
                ..
            })
        ));
    }

    #[test]
    fn test_parts_are_applied_uniformly() {
        let mut engine = PartEffect::new(PartSlot::Engine);
        engine.torque_bonus = 0.1;
        let mut body = PartEffect::new(PartSlot::Body);
        body.weight_change = -100.0;
        let mut tires = PartEffect::new(PartSlot::Tires);
        tires.grip_bonus = 0.2;

        let spec = test_spec().with_parts(&[engine, body, tires]);
        assert_relative_eq!(spec.torque_curve[2][1], 462.0, epsilon = 1e-9);
        assert_relative_eq!(spec.mass, 1200.0);
        assert_relative_eq!(spec.grip_coefficient, 1.3, epsilon = 1e-12);
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn test_part_replaces_gearbox() {
        let mut gearbox = PartEffect::new(PartSlot::Transmission);
        gearbox.gear_ratios = Some(vec![3.2, 2.1, 1.6, 1.25, 1.0, 0.82]);
        let spec = test_spec().with_parts(&[gearbox]);
        assert_eq!(spec.gear_count(), 6);
    }
}
