use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "dragsim",
    about = "A time-discrete drag race simulator written in Rust"
)]
pub struct SimOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug logging (overrides the log level)
    #[clap(short, long)]
    pub debug: bool,

    /// Activate the live dashboard - race will be simulated in real-time with console output
    #[clap(short, long)]
    pub live: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set log level (trace, debug, info, warn, error)
    #[clap(long, default_value = "info")]
    pub log_level: String,

    /// Set number of simulation runs (ignored in live mode)
    #[clap(short, long, default_value = "1")]
    pub no_sim_runs: u32,

    /// Set path to the simulation parameter file (OPTIONAL: if not set, uses the built-in quarter
    /// mile race)
    #[clap(short, long)]
    pub parfile_path: Option<PathBuf>,

    /// Set real-time factor (only relevant in live mode)
    #[clap(short, long, default_value = "1.0")]
    pub realtime_factor: f64,

    /// Set simulation timestep size in seconds, should be in the range [0.001, 0.1]
    #[clap(short, long, default_value = "0.01")]
    pub timestep_size: f64,

    /// Set the maximum simulated race time in seconds before a run is aborted
    #[clap(short, long, default_value = "120.0")]
    pub max_race_time: f64,

    /// Set the player's previous best time in seconds, used for the record bonus
    #[clap(long)]
    pub prior_best: Option<f64>,

    /// Set the directory result files are written to
    #[clap(short, long, default_value = "output")]
    pub output_dir: PathBuf,
}

impl SimOpts {
    /// check_timestep_size makes sure the time step lies within [0.001, 0.1]s.
    pub fn check_timestep_size(&self) -> anyhow::Result<()> {
        if !(0.001..=0.1).contains(&self.timestep_size) {
            anyhow::bail!(
                "Time step size {}s is outside the allowed range [0.001, 0.1]s!",
                self.timestep_size
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SimOpts::parse_from(["dragsim"]);
        assert!(!opts.debug);
        assert_eq!(opts.no_sim_runs, 1);
        assert_eq!(opts.timestep_size, 0.01);
        assert_eq!(opts.log_level, "info");
        assert!(opts.check_timestep_size().is_ok());
    }

    #[test]
    fn test_timestep_range() {
        let opts = SimOpts::parse_from(["dragsim", "--timestep-size", "0.5"]);
        assert!(opts.check_timestep_size().is_err());
    }
}
