use clap::Parser;
use dragsim::core::handle_race::{handle_race, PlayerAutopilot};
use dragsim::core::race::RaceConfiguration;
use dragsim::post::race_result::{
    print_results, write_results_csv, write_results_to_file, RaceResult,
};
use dragsim::post::score::{compute_reward, evaluate_stars};
use dragsim::pre::read_sim_pars::{default_sim_pars, read_sim_pars, SimPars};
use dragsim::pre::sim_opts::SimOpts;
use rayon::prelude::*;
use std::thread;
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn init_logging(sim_opts: &SimOpts) -> anyhow::Result<()> {
    let log_level = if sim_opts.debug {
        Level::DEBUG
    } else {
        match sim_opts.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// report prints the classification, the player's stars and reward, and writes the result files.
fn report(results: &[RaceResult], sim_pars: &SimPars, sim_opts: &SimOpts) -> anyhow::Result<()> {
    print_results(results)?;

    let player_result = sim_pars
        .player_index()
        .and_then(|idx| results.iter().find(|r| r.competitor == idx));

    if let Some(player) = player_result {
        let runner_up = results.iter().find(|r| r.position == player.position + 1);
        let stars = evaluate_stars(player, &sim_pars.star_rules, runner_up);
        let reward = compute_reward(player, &sim_pars.reward_policy, sim_opts.prior_best);

        println!(
            "RESULT: {} finished P{} in {:.3}s, stars: {}/{}",
            player.name,
            player.position,
            player.ranked_time(),
            stars,
            sim_pars.star_rules.len().min(3)
        );
        println!(
            "RESULT: Reward {} money, {} xp{}",
            reward.money,
            reward.xp,
            if reward.new_record { ", new personal record!" } else { "" }
        );
    }

    let txt_path = write_results_to_file(results, Some(&sim_opts.output_dir.join("last_run.txt")))?;
    let csv_path = write_results_csv(results, Some(&sim_opts.output_dir.join("last_run.csv")))?;
    info!("Results written to {} and {}", txt_path, csv_path);
    Ok(())
}

fn run_live(config: RaceConfiguration, sim_pars: &SimPars, sim_opts: &SimOpts) -> anyhow::Result<()> {
    info!("Starting live simulation...");

    // channel between simulator thread and dashboard
    let (tx, rx) = flume::unbounded();

    let timestep_size = sim_opts.timestep_size;
    let realtime_factor = sim_opts.realtime_factor;
    let max_race_time = sim_opts.max_race_time;
    let sim_thread = thread::spawn(move || {
        handle_race(
            &config,
            timestep_size,
            &PlayerAutopilot::default(),
            Some(&tx),
            realtime_factor,
            max_race_time,
        )
    });

    let mut final_result = None;
    for snapshot in rx.iter() {
        println!("{}", snapshot.format_line());
        if snapshot.final_result.is_some() {
            final_result = snapshot.final_result;
        }
    }

    let results = match sim_thread.join() {
        Ok(outcome) => outcome?,
        Err(_) => anyhow::bail!("Simulation thread panicked!"),
    };
    if final_result.as_ref() != Some(&results) {
        warn!("Dashboard did not receive the final result!");
    }
    report(&results, sim_pars, sim_opts)
}

fn run_batch(
    config: &RaceConfiguration,
    sim_pars: &SimPars,
    sim_opts: &SimOpts,
) -> anyhow::Result<()> {
    info!("Running {} simulations in parallel...", sim_opts.no_sim_runs);
    let base_seed = config.seed.unwrap_or(0);

    let all_results = (0..sim_opts.no_sim_runs as u64)
        .into_par_iter()
        .map(|run| {
            let mut run_config = config.clone();
            run_config.seed = Some(base_seed.wrapping_add(run));
            handle_race(
                &run_config,
                sim_opts.timestep_size,
                &PlayerAutopilot::default(),
                None,
                1.0,
                sim_opts.max_race_time,
            )
        })
        .collect::<anyhow::Result<Vec<Vec<RaceResult>>>>()?;

    let player_idx = sim_pars.player_index();
    let player_results: Vec<&RaceResult> = all_results
        .iter()
        .filter_map(|results| results.iter().find(|r| Some(r.competitor) == player_idx))
        .collect();
    if player_results.is_empty() {
        println!("RESULT: {} runs finished, no player participated", all_results.len());
        return Ok(());
    }

    let wins = player_results.iter().filter(|r| r.position == 1).count();
    let mean_time = player_results.iter().map(|r| r.ranked_time()).sum::<f64>()
        / player_results.len() as f64;
    println!(
        "RESULT: Player won {}/{} runs ({:.1}%), mean finish time {:.3}s",
        wins,
        player_results.len(),
        100.0 * wins as f64 / player_results.len() as f64,
        mean_time
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get simulation options from the command line arguments
    let sim_opts: SimOpts = SimOpts::parse();
    init_logging(&sim_opts)?;
    sim_opts.check_timestep_size()?;

    // get simulation parameters
    let sim_pars = if let Some(parfile_path) = &sim_opts.parfile_path {
        info!("Reading simulation parameters from {:?}", parfile_path);
        read_sim_pars(parfile_path)?
    } else {
        info!("No parameter file given, using the built-in quarter mile race");
        default_sim_pars()
    };
    let config = sim_pars.to_race_configuration()?;

    info!(
        "Simulating a {:.1}m race with {} competitors and a time step size of {:.3}s",
        config.distance,
        config.competitors.len(),
        sim_opts.timestep_size
    );

    // EXECUTION -----------------------------------------------------------------------------------
    let t_start = Instant::now();

    if sim_opts.live {
        run_live(config, &sim_pars, &sim_opts)?;
    } else if sim_opts.no_sim_runs <= 1 {
        let results = handle_race(
            &config,
            sim_opts.timestep_size,
            &PlayerAutopilot::default(),
            None,
            1.0,
            sim_opts.max_race_time,
        )?;
        info!("Execution time: {}ms", t_start.elapsed().as_millis());
        report(&results, &sim_pars, &sim_opts)?;
    } else {
        run_batch(&config, &sim_pars, &sim_opts)?;
        info!("Execution time: {}ms", t_start.elapsed().as_millis());
    }

    Ok(())
}
