pub mod core {
    pub mod drivetrain;
    pub mod gearbox;
    pub mod handle_race;
    pub mod power_curve;
    pub mod race;
    pub mod rubber_band;
    pub mod start_sequence;
    pub mod vehicle;
    pub mod vehicle_spec;
}
pub mod error;
pub mod interfaces {
    pub mod dashboard;
}
pub mod post {
    pub mod race_result;
    pub mod score;
}
pub mod pre {
    pub mod read_sim_pars;
    pub mod sim_opts;
}
