use chrono::{TimeZone, Utc};
use chrono_tz::{America, Europe, UTC};
use std::fs;
use tempfile::tempdir;

use night_display::common::constants::DEFAULT_USER;
use night_display::config::{Config, Policy, load_from_path};
use night_display::core::ActivationState;
use night_display::logger::Log;
use night_display::time::simulate::Simulation;
use night_display::time::source::parse_datetime_in_tz;

fn custom(start: &str, end: &str, timezone: &str) -> Config {
    Config {
        auto_mode: Some(Policy::FixedWindow),
        custom_start: Some(start.to_string()),
        custom_end: Some(end.to_string()),
        timezone: Some(timezone.to_string()),
        ..Config::default()
    }
}

fn local_flips(simulation: &Simulation) -> Vec<(String, bool)> {
    simulation
        .transitions()
        .iter()
        .map(|t| (t.at.format("%m-%d %H:%M %Z").to_string(), t.activated))
        .collect()
}

#[test]
fn test_window_keeps_wall_clock_times_across_dst_end() {
    Log::set_enabled(false);
    let from = parse_datetime_in_tz("2026-10-24 12:00:00", Europe::Berlin).unwrap();
    let mut simulation =
        Simulation::new(custom("22:00", "06:00", "Europe/Berlin"), from, DEFAULT_USER).unwrap();

    simulation
        .run_until(Utc.with_ymd_and_hms(2026, 10, 26, 12, 0, 0).unwrap())
        .unwrap();

    assert_eq!(
        local_flips(&simulation),
        vec![
            ("10-24 12:00 CEST".to_string(), false),
            ("10-24 22:00 CEST".to_string(), true),
            ("10-25 06:00 CET".to_string(), false),
            ("10-25 22:00 CET".to_string(), true),
            ("10-26 06:00 CET".to_string(), false),
        ]
    );
}

#[test]
fn test_window_survives_spring_forward() {
    Log::set_enabled(false);
    // 02:30 does not exist on 2026-03-08 in New York
    let from = parse_datetime_in_tz("2026-03-07 12:00:00", America::New_York).unwrap();
    let mut simulation =
        Simulation::new(custom("02:30", "05:00", "America/New_York"), from, DEFAULT_USER).unwrap();

    simulation
        .run_until(Utc.with_ymd_and_hms(2026, 3, 8, 18, 0, 0).unwrap())
        .unwrap();

    let flips = local_flips(&simulation);
    assert_eq!(flips.len(), 3);
    assert_eq!(flips[1], ("03-08 03:30 EDT".to_string(), true));
    assert_eq!(flips[2], ("03-08 05:00 EDT".to_string(), false));
}

#[test]
fn test_timezone_jump_mid_run() {
    Log::set_enabled(false);
    let from = parse_datetime_in_tz("2026-10-15 21:00:00", UTC).unwrap();
    let mut simulation =
        Simulation::new(custom("22:00", "06:00", "UTC"), from, DEFAULT_USER).unwrap();

    simulation
        .run_until(Utc.with_ymd_and_hms(2026, 10, 15, 22, 10, 0).unwrap())
        .unwrap();
    assert_eq!(simulation.service().activation(), ActivationState::On);

    // 22:10 UTC is 07:10 in Tokyo: the night is over there
    simulation.set_timezone(chrono_tz::Asia::Tokyo);
    assert_eq!(simulation.service().activation(), ActivationState::Off);

    let alarms = simulation.alarms().pending();
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].1, Utc.with_ymd_and_hms(2026, 10, 16, 13, 0, 0).unwrap());
}

#[test]
fn test_clock_set_back_into_the_window() {
    Log::set_enabled(false);
    let from = parse_datetime_in_tz("2026-10-16 07:00:00", UTC).unwrap();
    let mut simulation =
        Simulation::new(custom("22:00", "06:00", "UTC"), from, DEFAULT_USER).unwrap();
    assert_eq!(simulation.service().activation(), ActivationState::Off);

    simulation.set_time(Utc.with_ymd_and_hms(2026, 10, 16, 3, 0, 0).unwrap());

    assert_eq!(simulation.service().activation(), ActivationState::On);
    let report = simulation.finish();
    assert_eq!(report.final_state, ActivationState::On);
}

#[test]
fn test_simulation_from_config_file() {
    Log::set_enabled(false);
    let dir = tempdir().unwrap();
    let path = dir.path().join("night-display.toml");
    fs::write(
        &path,
        r#"
auto_mode = "twilight"
sunset = "18:30"
sunrise = "06:45"
timezone = "UTC"
"#,
    )
    .unwrap();
    let config = load_from_path(&path).unwrap();

    let from = parse_datetime_in_tz("2026-10-15 12:00:00", UTC).unwrap();
    let mut simulation = Simulation::new(config, from, DEFAULT_USER).unwrap();
    simulation
        .run_until(Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap())
        .unwrap();
    let report = simulation.finish();

    let times: Vec<String> = report
        .transitions
        .iter()
        .map(|t| t.at.format("%H:%M").to_string())
        .collect();
    assert_eq!(times, vec!["12:00", "18:30", "06:45"]);
    assert_eq!(report.twilight_changes, 2);
    assert_eq!(report.final_state, ActivationState::Off);
}
