use crate::core::race::{RaceConfiguration, RaceSession, RaceState};
use crate::core::vehicle::DriverInput;
use crate::interfaces::dashboard::{RaceSnapshot, MAX_DASHBOARD_UPDATE_FREQUENCY};
use crate::post::race_result::RaceResult;
use anyhow::Context;
use flume::Sender;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// PlayerAutopilot drives the human competitors in headless runs: throttle from the first tick
/// after green, nitro above a speed threshold.
///
/// * `use_nitro` - Fire nitro once the speed threshold is reached
/// * `nitro_min_speed` - (m/s) Speed from which nitro is fired
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerAutopilot {
    pub use_nitro: bool,
    pub nitro_min_speed: f64,
}

impl Default for PlayerAutopilot {
    fn default() -> Self {
        PlayerAutopilot {
            use_nitro: false,
            nitro_min_speed: 30.0,
        }
    }
}

impl PlayerAutopilot {
    fn input(&self, session: &RaceSession, competitor: usize) -> DriverInput {
        let velocity = session
            .competitor(competitor)
            .map(|c| c.simulator().state().velocity)
            .unwrap_or(0.0);

        DriverInput {
            throttle: session.start_sequence().is_green(),
            nitro_requested: self.use_nitro && velocity >= self.nitro_min_speed,
            ..DriverInput::default()
        }
    }

    fn apply(&self, session: &mut RaceSession) -> anyhow::Result<()> {
        if session.state() == RaceState::Finished {
            return Ok(());
        }
        let humans: Vec<usize> = session
            .competitors()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_human())
            .map(|(idx, _)| idx)
            .collect();

        for idx in humans {
            let input = self.input(session, idx);
            session.set_input(idx, input)?;
        }
        Ok(())
    }
}

/// handle_race creates and simulates a race on the basis of the inserted configuration, and
/// returns the ordered results for post-processing. If a sender is inserted, the race is
/// simulated in real-time and snapshots are sent for the live dashboard.
pub fn handle_race(
    config: &RaceConfiguration,
    timestep_size: f64,
    player_autopilot: &PlayerAutopilot,
    tx: Option<&Sender<RaceSnapshot>>,
    realtime_factor: f64,
    max_race_time: f64,
) -> anyhow::Result<Vec<RaceResult>> {
    let mut session = RaceSession::new();
    session
        .start(config)
        .context("Failed to start the race with the given configuration!")?;

    let mut t_race_update_print = 0.0;
    let mut t_race_update_dashboard = f64::NEG_INFINITY;

    loop {
        let t_start = Instant::now();

        player_autopilot.apply(&mut session)?;
        let outcome = session.tick(timestep_size)?;

        for event in session.drain_finished() {
            info!(
                "{} finished as #{} in {:.3}s",
                event.name, event.crossing_rank, event.finish_time
            );
        }

        if let Some(results) = outcome {
            // send final result once
            if let Some(tx) = tx {
                tx.send(session.snapshot())
                    .context("Failed to send final race snapshot to the dashboard!")?;
            }
            return Ok(results);
        }

        if session.race_time() > max_race_time {
            anyhow::bail!(
                "Race did not finish within {:.1}s of simulated race time!",
                max_race_time
            );
        }

        if session.race_time() > t_race_update_print + 0.9999 {
            debug!(
                "Simulating... Current race time is {:.3}s",
                session.race_time()
            );
            t_race_update_print = session.race_time();
        }

        if let Some(tx) = tx {
            let clock = session.start_sequence().clock();
            if clock > t_race_update_dashboard + 1.0 / MAX_DASHBOARD_UPDATE_FREQUENCY - 0.001 {
                tx.send(session.snapshot())
                    .context("Failed to send race snapshot to the dashboard!")?;
                t_race_update_dashboard = clock;
            }

            // sleep until time step is finished in real-time as well (calculation in ms)
            let t_sleep = (timestep_size * 1000.0 / realtime_factor) as i64
                - t_start.elapsed().as_millis() as i64;

            if t_sleep > 0 {
                sleep(Duration::from_millis(t_sleep as u64));
            } else {
                warn!("Could not keep up with real-time!")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gearbox::ShiftMode;
    use crate::core::race::{CompetitorConfig, DriverKind, QUARTER_MILE};
    use crate::core::rubber_band::AiPars;
    use crate::core::vehicle_spec::tests::test_spec;
    use std::sync::Arc;

    fn config() -> RaceConfiguration {
        RaceConfiguration::new(
            QUARTER_MILE,
            vec![
                CompetitorConfig {
                    name: "Player".to_owned(),
                    vehicle: Arc::new(test_spec()),
                    driver: DriverKind::Human {
                        reaction_time: 0.2,
                        shift_mode: ShiftMode::Automatic,
                    },
                },
                CompetitorConfig {
                    name: "AI".to_owned(),
                    vehicle: Arc::new(test_spec()),
                    driver: DriverKind::Ai(AiPars::with_difficulty(2)),
                },
            ],
        )
    }

    #[test]
    fn test_headless_race_finishes() {
        let results = handle_race(
            &config(),
            0.01,
            &PlayerAutopilot::default(),
            None,
            1.0,
            120.0,
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.false_start));
        assert!(results.iter().all(|r| r.finish_time > 0.0 && r.finish_time < 30.0));
    }

    #[test]
    fn test_max_race_time_aborts() {
        assert!(handle_race(
            &config(),
            0.01,
            &PlayerAutopilot::default(),
            None,
            1.0,
            2.0
        )
        .is_err());
    }

    #[test]
    fn test_snapshots_are_sent() {
        let (tx, rx) = flume::unbounded();
        let results = handle_race(
            &config(),
            0.01,
            &PlayerAutopilot::default(),
            Some(&tx),
            1000.0,
            120.0,
        )
        .unwrap();

        let snapshots: Vec<RaceSnapshot> = rx.try_iter().collect();
        assert!(snapshots.len() > 10);
        let last = snapshots.last().unwrap();
        assert_eq!(last.state, RaceState::Finished);
        assert_eq!(last.final_result.as_ref(), Some(&results));
        assert!(snapshots[..snapshots.len() - 1]
            .iter()
            .all(|s| s.final_result.is_none()));
    }
}
