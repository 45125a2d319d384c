use crate::core::gearbox::ShiftMode;
use crate::core::race::{
    CompetitorConfig, DriverKind, FalseStartPolicy, RaceConfiguration, RubberBandTarget,
    QUARTER_MILE,
};
use crate::core::rubber_band::AiPars;
use crate::core::start_sequence::StartLightTimings;
use crate::core::vehicle_spec::{PartEffect, PartSlot, VehicleSpecification};
use crate::post::score::{RewardPolicy, StarConditionRule};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

/// * `name` - Competitor name shown in the results
/// * `vehicle` - Name of the vehicle in the vehicle catalog
/// * `parts` - Names of installed parts in the parts catalog, applied in order
/// * `driver` - Human or AI driver parameters
#[derive(Debug, Deserialize, Clone)]
pub struct ParticipantPars {
    pub name: String,
    pub vehicle: String,
    #[serde(default)]
    pub parts: Vec<String>,
    pub driver: DriverKind,
}

/// * `distance` - (m) Race distance
/// * `lights` - Start light timings
/// * `false_start_policy` - Handling of human false starts
/// * `rubber_band_target` - Reference distance of the AI rubber band
/// * `seed` - Seed for the AI nitro decisions (OPTIONAL)
/// * `participants` - Competitors in grid order
#[derive(Debug, Deserialize, Clone)]
pub struct RacePars {
    #[serde(default = "default_distance")]
    pub distance: f64,
    #[serde(default)]
    pub lights: StartLightTimings,
    #[serde(default)]
    pub false_start_policy: FalseStartPolicy,
    #[serde(default)]
    pub rubber_band_target: RubberBandTarget,
    #[serde(default)]
    pub seed: Option<u64>,
    pub participants: Vec<ParticipantPars>,
}

fn default_distance() -> f64 {
    QUARTER_MILE
}

/// SimPars is used to store all other parameter structs.
#[derive(Debug, Deserialize, Clone)]
pub struct SimPars {
    pub race_pars: RacePars,
    pub vehicle_catalog: HashMap<String, VehicleSpecification>,
    #[serde(default)]
    pub parts_catalog: HashMap<String, PartEffect>,
    #[serde(default)]
    pub star_rules: Vec<StarConditionRule>,
    #[serde(default)]
    pub reward_policy: RewardPolicy,
}

impl SimPars {
    /// to_race_configuration resolves the catalog names of all participants. Semantic checks of
    /// the resulting configuration are left to `RaceSession::start`.
    pub fn to_race_configuration(&self) -> anyhow::Result<RaceConfiguration> {
        let mut competitors = Vec::with_capacity(self.race_pars.participants.len());

        for participant in self.race_pars.participants.iter() {
            let vehicle = self.vehicle_catalog.get(&participant.vehicle).with_context(|| {
                format!(
                    "Unknown vehicle {} for participant {}!",
                    participant.vehicle, participant.name
                )
            })?;

            let parts = participant
                .parts
                .iter()
                .map(|part_name| {
                    self.parts_catalog.get(part_name).cloned().with_context(|| {
                        format!(
                            "Unknown part {} for participant {}!",
                            part_name, participant.name
                        )
                    })
                })
                .collect::<anyhow::Result<Vec<PartEffect>>>()?;

            competitors.push(CompetitorConfig {
                name: participant.name.to_owned(),
                vehicle: Arc::new(vehicle.with_parts(&parts)),
                driver: participant.driver.to_owned(),
            });
        }

        Ok(RaceConfiguration {
            distance: self.race_pars.distance,
            competitors,
            lights: self.race_pars.lights,
            false_start_policy: self.race_pars.false_start_policy,
            rubber_band_target: self.race_pars.rubber_band_target,
            seed: self.race_pars.seed,
        })
    }

    /// player_index returns the index of the first human participant.
    pub fn player_index(&self) -> Option<usize> {
        self.race_pars
            .participants
            .iter()
            .position(|p| matches!(p.driver, DriverKind::Human { .. }))
    }
}

/// read_sim_pars reads the JSON file and decodes the JSON string into the simulation parameters
/// struct.
pub fn read_sim_pars(filepath: &Path) -> anyhow::Result<SimPars> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .with_context(|| format!("Failed to open parameter file {}!", filepath.display()))?;
    let pars = serde_json::from_reader(&fh)
        .with_context(|| format!("Failed to parse parameter file {}!", filepath.display()))?;
    Ok(pars)
}

/// default_sim_pars returns the built-in quarter mile race: player against one AI of medium
/// difficulty.
pub fn default_sim_pars() -> SimPars {
    let street = VehicleSpecification {
        name: "Falcon GT".to_owned(),
        mass: 1450.0,
        drag_coefficient: 0.34,
        frontal_area: 2.2,
        grip_coefficient: 1.05,
        idle_rpm: 850.0,
        max_rpm: 7200.0,
        redline_rpm: 6800.0,
        power_curve: Vec::new(),
        torque_curve: vec![
            [1000.0, 380.0],
            [2500.0, 480.0],
            [4000.0, 530.0],
            [5500.0, 500.0],
            [7200.0, 410.0],
        ],
        gear_ratios: vec![3.3, 2.1, 1.45, 1.1, 0.88, 0.72],
        final_drive: 3.55,
        wheel_radius: 0.34,
        shift_duration: 0.35,
        nitro_power_bonus: 0.3,
        nitro_duration: 3.0,
        nitro_capacity: 100.0,
    };

    let tuner = VehicleSpecification {
        name: "Kestrel R".to_owned(),
        mass: 1180.0,
        drag_coefficient: 0.3,
        frontal_area: 1.95,
        grip_coefficient: 1.15,
        idle_rpm: 1000.0,
        max_rpm: 8600.0,
        redline_rpm: 8200.0,
        power_curve: vec![
            [1000.0, 30_000.0],
            [3000.0, 95_000.0],
            [5000.0, 165_000.0],
            [7000.0, 215_000.0],
            [8600.0, 205_000.0],
        ],
        torque_curve: Vec::new(),
        gear_ratios: vec![3.5, 2.3, 1.65, 1.25, 1.0, 0.82],
        final_drive: 4.1,
        wheel_radius: 0.31,
        shift_duration: 0.25,
        nitro_power_bonus: 0.35,
        nitro_duration: 2.5,
        nitro_capacity: 100.0,
    };

    let mut vehicle_catalog = HashMap::new();
    vehicle_catalog.insert(street.name.to_owned(), street);
    vehicle_catalog.insert(tuner.name.to_owned(), tuner);

    let mut parts_catalog = HashMap::new();
    parts_catalog.insert(
        "Stage 1 Intake".to_owned(),
        PartEffect {
            torque_bonus: 0.06,
            power_bonus: 0.06,
            ..PartEffect::new(PartSlot::Engine)
        },
    );
    parts_catalog.insert(
        "Drag Radials".to_owned(),
        PartEffect {
            grip_bonus: 0.15,
            weight_change: 4.0,
            ..PartEffect::new(PartSlot::Tires)
        },
    );

    SimPars {
        race_pars: RacePars {
            distance: QUARTER_MILE,
            lights: StartLightTimings::default(),
            false_start_policy: FalseStartPolicy::default(),
            rubber_band_target: RubberBandTarget::default(),
            seed: Some(42),
            participants: vec![
                ParticipantPars {
                    name: "Player".to_owned(),
                    vehicle: "Falcon GT".to_owned(),
                    parts: vec!["Stage 1 Intake".to_owned(), "Drag Radials".to_owned()],
                    driver: DriverKind::Human {
                        reaction_time: 0.25,
                        shift_mode: ShiftMode::Automatic,
                    },
                },
                ParticipantPars {
                    name: "Rival".to_owned(),
                    vehicle: "Kestrel R".to_owned(),
                    parts: Vec::new(),
                    driver: DriverKind::Ai(AiPars::with_difficulty(3)),
                },
            ],
        },
        vehicle_catalog,
        parts_catalog,
        star_rules: vec![
            StarConditionRule::Win,
            StarConditionRule::BeatTime { threshold: 13.0 },
            StarConditionRule::NoNitro,
        ],
        reward_policy: RewardPolicy::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::race::RaceSession;

    const SIM_PARS_JSON: &str = r#"{
        "race_pars": {
            "false_start_policy": {"kind": "time_penalty", "seconds": 1.0},
            "seed": 7,
            "participants": [
                {"name": "Player", "vehicle": "Coupe", "parts": ["Slicks"],
                 "driver": {"kind": "human", "reaction_time": 0.3}},
                {"name": "AI", "vehicle": "Coupe",
                 "driver": {"kind": "ai", "difficulty": 4, "aggressiveness": 0.0}}
            ]
        },
        "vehicle_catalog": {
            "Coupe": {
                "name": "Coupe", "mass": 1300.0, "drag_coefficient": 0.32,
                "frontal_area": 2.1, "grip_coefficient": 1.1, "idle_rpm": 900.0,
                "max_rpm": 7500.0, "redline_rpm": 7000.0,
                "torque_curve": [[1000.0, 300.0], [4500.0, 420.0], [7500.0, 330.0]],
                "gear_ratios": [3.6, 2.2, 1.5, 1.15, 0.9], "final_drive": 3.7,
                "shift_duration": 0.3
            }
        },
        "parts_catalog": {
            "Slicks": {"slot": "tires", "grip_bonus": 0.2}
        },
        "star_rules": [{"kind": "win"}, {"kind": "margin", "seconds": 0.5}]
    }"#;

    #[test]
    fn test_parse_and_convert() {
        let sim_pars: SimPars = serde_json::from_str(SIM_PARS_JSON).unwrap();
        assert_eq!(sim_pars.race_pars.distance, QUARTER_MILE);
        assert_eq!(sim_pars.player_index(), Some(0));
        assert_eq!(sim_pars.star_rules.len(), 2);
        assert_eq!(sim_pars.reward_policy, RewardPolicy::default());

        let config = sim_pars.to_race_configuration().unwrap();
        assert_eq!(config.competitors.len(), 2);
        assert_eq!(config.seed, Some(7));
        assert_eq!(
            config.false_start_policy,
            FalseStartPolicy::TimePenalty { seconds: 1.0 }
        );
        assert!((config.competitors[0].vehicle.grip_coefficient - 1.3).abs() < 1e-12);
        assert_eq!(config.competitors[1].vehicle.wheel_radius, 0.33);
        match &config.competitors[1].driver {
            DriverKind::Ai(ai_pars) => {
                assert_eq!(ai_pars.difficulty, 4);
                assert_eq!(ai_pars.aggressiveness, Some(0.0));
            }
            DriverKind::Human { .. } => panic!("expected an AI driver"),
        }
    }

    #[test]
    fn test_unknown_vehicle_is_reported() {
        let mut sim_pars: SimPars = serde_json::from_str(SIM_PARS_JSON).unwrap();
        sim_pars.race_pars.participants[1].vehicle = "Truck".to_owned();
        let err = sim_pars.to_race_configuration().unwrap_err();
        assert!(err.to_string().contains("Truck"));
    }

    #[test]
    fn test_default_scenario_starts() {
        let config = default_sim_pars().to_race_configuration().unwrap();
        let mut session = RaceSession::new();
        assert!(session.start(&config).is_ok());
    }
}
