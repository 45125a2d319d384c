use crate::core::race::RaceState;
use crate::core::start_sequence::StartLightState;
use crate::post::race_result::RaceResult;
use serde::{Deserialize, Serialize};

pub const MAX_DASHBOARD_UPDATE_FREQUENCY: f64 = 20.0; // per second of race time

/// VehicleSnapshot is the read-only view of one vehicle, used for the live dashboard and stored
/// with the final results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VehicleSnapshot {
    pub competitor: usize,
    pub name: String,
    pub distance: f64,
    pub velocity: f64,
    pub engine_rpm: f64,
    pub gear: usize,
    pub nitro_charge: f64,
    pub nitro_active: bool,
    pub throttle: bool,
    pub finished: bool,
    // AI competitors only
    pub correction_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RaceSnapshot {
    pub state: RaceState,
    pub light_state: StartLightState,
    pub clock: f64,
    pub race_time: f64,
    pub race_distance: f64,
    pub vehicles: Vec<VehicleSnapshot>,

    // final results payload (sent once when the race finishes)
    pub final_result: Option<Vec<RaceResult>>,
}

impl RaceSnapshot {
    /// format_line creates a one-line summary of the race for console dashboards.
    pub fn format_line(&self) -> String {
        let vehicles: Vec<String> = self
            .vehicles
            .iter()
            .map(|v| {
                format!(
                    "{} {:6.1}m {:5.1}km/h G{} {:4.0}rpm{}",
                    v.name,
                    v.distance,
                    v.velocity * 3.6,
                    v.gear,
                    v.engine_rpm,
                    if v.nitro_active { " N2O" } else { "" }
                )
            })
            .collect();

        format!(
            "{:?} {:?} t={:.2}s | {}",
            self.state,
            self.light_state,
            self.race_time,
            vehicles.join(" | ")
        )
    }
}
