//! Main application entry point and high-level flow coordination.
//!
//! After argument parsing this module wires the library together:
//!
//! - `config`: loading `night-display.toml` and watching it for edits
//! - `io`: the event queue, alarms, twilight, time broadcasts and signals
//! - `core`: the service that owns the activation decision
//! - `time::simulate`: the `simulate` command
//!
//! The live flow is managed through [`ApplicationRunner`]:
//! 1. Load configuration and create the collaborators
//! 2. Start the background threads (signals, config watcher, time changes, twilight)
//! 3. Queue boot completion and the default user's session
//! 4. Run the service loop until a shutdown event arrives

use anyhow::{Context, Result};
use std::sync::Arc;

use night_display::args::{self, CliAction, ParsedArgs};
use night_display::backend::{ColorTransformSink, LoggingSink};
use night_display::common::constants::{DEFAULT_USER, EXIT_FAILURE};
use night_display::config::{self, ReloadTargets, SettingsRegistry};
use night_display::core::{EngineEnv, NightDisplayService, ServiceParams};
use night_display::io::alarm::AlarmQueue;
use night_display::io::events::{Event, EventLoop, channel};
use night_display::io::signals::setup_signal_handler;
use night_display::io::time_change::{LocalBroadcast, start_time_change_monitor};
use night_display::io::twilight::{FixedTwilight, start_twilight_clock};
use night_display::logger::Log;
use night_display::time::SystemClock;
use night_display::time::simulate::run_simulation;
use night_display::time::source::{parse_datetime_in_tz, parse_timezone};
use night_display::{log_block_start, log_end, log_error, log_indented, log_version, log_warning};

/// Runs the service on the real clock.
pub struct ApplicationRunner {
    debug_enabled: bool,
}

impl ApplicationRunner {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }

    pub fn run(self) -> Result<()> {
        Log::set_debug(self.debug_enabled);
        log_version!();

        let (config, config_path) = config::load()?;
        config.log_config(Some(&config_path));

        let clock = Arc::new(SystemClock::new(config.timezone()?));
        let (sunset, sunrise) = config.twilight_boundaries()?;
        let alarms = Arc::new(AlarmQueue::new());
        let twilight = Arc::new(FixedTwilight::new(clock.clone(), sunset, sunrise));
        let time_changes = Arc::new(LocalBroadcast::new());
        let settings = Arc::new(SettingsRegistry::new(config));
        let sink: Arc<dyn ColorTransformSink> = Arc::new(LoggingSink);
        let (events, receiver) = channel();

        let _signals = setup_signal_handler(events.clone())?;

        let targets = ReloadTargets {
            settings: settings.clone(),
            clock: clock.clone(),
            time_changes: time_changes.clone(),
        };
        if let Err(e) = config::start_config_watcher(config_path, targets) {
            log_warning!("Failed to start config watcher: {e:#}");
            log_indented!("Configuration edits will need a restart");
        }
        if let Err(e) = start_time_change_monitor(time_changes.clone()) {
            log_warning!("Failed to watch the system clock: {e:#}");
            log_indented!("Clock changes will only be noticed at the next alarm");
        }
        start_twilight_clock(twilight.clone())?;

        let mut service = NightDisplayService::new(ServiceParams {
            settings,
            sink: sink.clone(),
            env: EngineEnv {
                clock: clock.clone(),
                alarms: alarms.clone(),
                twilight,
                time_changes,
                events: events.clone(),
            },
        });
        log_block_start!("Applying to {} output", sink.sink_name());

        events.send(Event::BootCompleted);
        events.send(Event::SessionStarted(DEFAULT_USER));
        drop(events);

        let event_loop = EventLoop::new(receiver, alarms, clock);
        service.run(&event_loop)?;

        log_end!();
        Ok(())
    }
}

fn run_simulate_command(
    from: &str,
    to: &str,
    timezone: Option<&str>,
    debug_enabled: bool,
) -> Result<()> {
    Log::set_debug(debug_enabled);
    log_version!();

    let (config, config_path) = config::load()?;
    config.log_config(Some(&config_path));

    let timezone = match timezone {
        Some(name) => parse_timezone(name)?,
        None => config.timezone()?,
    };
    let from = parse_datetime_in_tz(from, timezone).context("Invalid --from time")?;
    let to = parse_datetime_in_tz(to, timezone).context("Invalid --to time")?;

    run_simulation(config, from, to)?;
    log_end!();
    Ok(())
}

fn main() {
    let parsed_args = ParsedArgs::from_env();

    let result = match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run {
            debug_enabled,
            config_dir,
        } => config::set_config_dir(config_dir)
            .and_then(|()| ApplicationRunner::new(debug_enabled).run()),
        CliAction::Simulate {
            debug_enabled,
            config_dir,
            from,
            to,
            timezone,
        } => config::set_config_dir(config_dir).and_then(|()| {
            run_simulate_command(&from, &to, timezone.as_deref(), debug_enabled)
        }),
    };

    if let Err(e) = result {
        log_error!("{e:#}");
        log_end!();
        std::process::exit(EXIT_FAILURE);
    }
}
