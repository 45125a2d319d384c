use crate::interfaces::dashboard::VehicleSnapshot;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::io::Write as IoWrite;
use std::path::Path;

/// RaceResult contains everything known about one competitor after the race, in final order.
///
/// * `competitor` - Index of the competitor in the race configuration
/// * `position` - Final position, starting at 1
/// * `finish_time` - (s) Time from green to crossing the finish line, quantised to the time step
/// * `time_penalty` - (s) False start penalty, added to the finish time for ranking
/// * `finish_speed` - (m/s) Velocity when crossing the finish line
/// * `top_speed` - (m/s) Highest velocity reached
/// * `vehicle` - Vehicle state at the end of the race
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RaceResult {
    pub competitor: usize,
    pub name: String,
    pub vehicle_name: String,
    pub is_player: bool,
    pub position: u32,
    pub finish_time: f64,
    pub time_penalty: f64,
    pub finish_speed: f64,
    pub top_speed: f64,
    pub distance: f64,
    pub nitro_used: bool,
    pub false_start: bool,
    pub disqualified: bool,
    pub vehicle: VehicleSnapshot,
}

impl RaceResult {
    /// ranked_time returns the finish time including a false start penalty.
    pub fn ranked_time(&self) -> f64 {
        self.finish_time + self.time_penalty
    }

    fn status(&self) -> &'static str {
        if self.disqualified {
            "DSQ"
        } else if self.false_start {
            "JMP"
        } else {
            "OK"
        }
    }
}

/// Flat representation of a result, one csv line per competitor.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    position: u32,
    name: &'a str,
    vehicle: &'a str,
    player: bool,
    finish_time_s: f64,
    time_penalty_s: f64,
    ranked_time_s: f64,
    finish_speed_kmh: f64,
    top_speed_kmh: f64,
    nitro_used: bool,
    false_start: bool,
    disqualified: bool,
}

impl<'a> From<&'a RaceResult> for CsvRow<'a> {
    fn from(result: &'a RaceResult) -> Self {
        CsvRow {
            position: result.position,
            name: &result.name,
            vehicle: &result.vehicle_name,
            player: result.is_player,
            finish_time_s: result.finish_time,
            time_penalty_s: result.time_penalty,
            ranked_time_s: result.ranked_time(),
            finish_speed_kmh: result.finish_speed * 3.6,
            top_speed_kmh: result.top_speed * 3.6,
            nitro_used: result.nitro_used,
            false_start: result.false_start,
            disqualified: result.disqualified,
        }
    }
}

/// format_results creates the result table as it is printed to the console.
pub fn format_results(results: &[RaceResult]) -> Result<String, std::fmt::Error> {
    let mut content = String::new();
    let leader_time = results
        .first()
        .map(|result| result.ranked_time())
        .unwrap_or(0.0);

    writeln!(&mut content, "RESULT: Final classification")?;
    writeln!(
        &mut content,
        "pos, {:>16}, {:>16}, {:>9}, {:>9}, {:>10}, {:>10}, status",
        "name", "vehicle", "time", "gap", "v_fin", "v_max"
    )?;
    for result in results.iter() {
        writeln!(
            &mut content,
            "{:3}, {:>16}, {:>16}, {:8.3}s, {:+8.3}s, {:5.1}km/h, {:5.1}km/h, {}{}",
            result.position,
            result.name,
            result.vehicle_name,
            result.ranked_time(),
            result.ranked_time() - leader_time,
            result.finish_speed * 3.6,
            result.top_speed * 3.6,
            result.status(),
            if result.is_player { " (player)" } else { "" }
        )?;
    }
    Ok(content)
}

/// print_results prints the final classification to the console output.
pub fn print_results(results: &[RaceResult]) -> anyhow::Result<()> {
    print!("{}", format_results(results)?);
    Ok(())
}

fn output_path(path: Option<&Path>, default_name: &str) -> anyhow::Result<std::path::PathBuf> {
    match path {
        Some(p) => {
            if let Some(parent) = p.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Ok(p.to_path_buf())
        }
        None => {
            let out_dir = Path::new("output");
            std::fs::create_dir_all(out_dir)?;
            Ok(out_dir.join(default_name))
        }
    }
}

/// write_results_to_file writes the final classification to a text file, output/last_run.txt if
/// no path is given. Returns the path to the written file.
pub fn write_results_to_file(results: &[RaceResult], path: Option<&Path>) -> anyhow::Result<String> {
    let content = format_results(results)?;
    let out_path = output_path(path, "last_run.txt")?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&out_path)
        .with_context(|| format!("Failed to open result file {}!", out_path.display()))?;
    file.write_all(content.as_bytes())?;
    file.flush()?;

    Ok(out_path.to_string_lossy().into_owned())
}

/// write_results_csv writes one csv line per competitor, output/last_run.csv if no path is given.
/// Returns the path to the written file.
pub fn write_results_csv(results: &[RaceResult], path: Option<&Path>) -> anyhow::Result<String> {
    let out_path = output_path(path, "last_run.csv")?;

    let mut writer = csv::Writer::from_path(&out_path)
        .with_context(|| format!("Failed to create csv file {}!", out_path.display()))?;
    for result in results.iter() {
        writer.serialize(CsvRow::from(result))?;
    }
    writer.flush()?;

    Ok(out_path.to_string_lossy().into_owned())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_result(name: &str, position: u32, finish_time: f64) -> RaceResult {
        RaceResult {
            competitor: position as usize - 1,
            name: name.to_owned(),
            vehicle_name: "Test Coupe".to_owned(),
            is_player: position == 1,
            position,
            finish_time,
            time_penalty: 0.0,
            finish_speed: 45.0,
            top_speed: 45.0,
            distance: 402.5,
            nitro_used: false,
            false_start: false,
            disqualified: false,
            vehicle: VehicleSnapshot::default(),
        }
    }

    #[test]
    fn test_format_results_contains_gap() {
        let results = vec![test_result("Alice", 1, 10.0), test_result("Bob", 2, 10.25)];
        let table = format_results(&results).unwrap();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("Alice"));
        assert!(lines[2].contains("(player)"));
        assert!(lines[3].contains("+0.250s"));
    }

    #[test]
    fn test_write_results_csv() {
        let path = std::env::temp_dir().join("dragsim_test_results.csv");
        let results = vec![test_result("Alice", 1, 10.0), test_result("Bob", 2, 10.25)];
        let written = write_results_csv(&results, Some(&path)).unwrap();

        let mut reader = csv::Reader::from_path(&written).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "position");
        assert_eq!(reader.records().count(), 2);
        std::fs::remove_file(path).unwrap();
    }
}
