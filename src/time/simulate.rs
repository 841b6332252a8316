//! Simulated runs of the scheduler.
//!
//! A [`Simulation`] wires the real service to a simulated clock, the in-process
//! alarm queue and a fixed twilight source, then walks time forward from one
//! event to the next: each step jumps straight to the earliest pending alarm or
//! twilight change, fires it and lets the service handle the fallout. Nothing
//! sleeps, so a month of schedule runs in milliseconds.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::ColorTransformSink;
use crate::config::{Config, SettingsRegistry};
use crate::core::{ActivationState, EngineEnv, NightDisplayService, ServiceParams};
use crate::io::alarm::AlarmQueue;
use crate::io::events::{Event, EventSender, UserId, channel};
use crate::io::time_change::LocalBroadcast;
use crate::io::twilight::FixedTwilight;
use crate::time::{Clock, SimulatedClock};

/// Steps after which a run is considered stuck.
const MAX_STEPS: usize = 100_000;

/// One applied activation change.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub at: DateTime<Tz>,
    pub activated: bool,
}

/// Sink that records every change with the simulated time it happened at.
pub struct TransitionRecorder {
    clock: Arc<SimulatedClock>,
    transitions: Mutex<Vec<Transition>>,
}

impl TransitionRecorder {
    fn new(clock: Arc<SimulatedClock>) -> Self {
        Self {
            clock,
            transitions: Mutex::new(Vec::new()),
        }
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ColorTransformSink for TransitionRecorder {
    fn apply_night_matrix(&self, enabled: bool) {
        let at = self.clock.now();
        log_decorated!(
            "Night matrix {}",
            if enabled { "applied" } else { "cleared" }
        );
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Transition {
                at,
                activated: enabled,
            });
    }

    fn sink_name(&self) -> &'static str {
        "simulation"
    }
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub transitions: Vec<Transition>,
    pub alarms_fired: usize,
    pub twilight_changes: usize,
    pub final_state: ActivationState,
}

/// The service running against simulated collaborators.
pub struct Simulation {
    clock: Arc<SimulatedClock>,
    alarms: Arc<AlarmQueue>,
    twilight: Arc<FixedTwilight>,
    time_changes: Arc<LocalBroadcast>,
    settings: Arc<SettingsRegistry>,
    recorder: Arc<TransitionRecorder>,
    events: EventSender,
    receiver: Receiver<Event>,
    service: NightDisplayService,
    alarms_fired: usize,
    twilight_changes: usize,
}

impl Simulation {
    /// Build a simulation starting at `start`, with boot completed and `user`
    /// signed in.
    pub fn new(config: Config, start: DateTime<Tz>, user: UserId) -> Result<Self> {
        let clock = Arc::new(SimulatedClock::new(start));
        let alarms = Arc::new(AlarmQueue::new());
        let (sunset, sunrise) = config.twilight_boundaries()?;
        let twilight = Arc::new(FixedTwilight::new(clock.clone(), sunset, sunrise));
        let time_changes = Arc::new(LocalBroadcast::new());
        let settings = Arc::new(SettingsRegistry::new(config));
        let recorder = Arc::new(TransitionRecorder::new(clock.clone()));
        let (events, receiver) = channel();

        let service = NightDisplayService::new(ServiceParams {
            settings: settings.clone(),
            sink: recorder.clone(),
            env: EngineEnv {
                clock: clock.clone(),
                alarms: alarms.clone(),
                twilight: twilight.clone(),
                time_changes: time_changes.clone(),
                events: events.clone(),
            },
        });

        let mut simulation = Self {
            clock,
            alarms,
            twilight,
            time_changes,
            settings,
            recorder,
            events,
            receiver,
            service,
            alarms_fired: 0,
            twilight_changes: 0,
        };
        simulation.send(Event::BootCompleted);
        simulation.send(Event::SessionStarted(user));
        Ok(simulation)
    }

    pub fn clock(&self) -> &Arc<SimulatedClock> {
        &self.clock
    }

    pub fn settings(&self) -> &Arc<SettingsRegistry> {
        &self.settings
    }

    pub fn service(&self) -> &NightDisplayService {
        &self.service
    }

    pub fn alarms(&self) -> &Arc<AlarmQueue> {
        &self.alarms
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.recorder.transitions()
    }

    /// Queue `event` and let the service handle everything it leads to.
    pub fn send(&mut self, event: Event) {
        self.events.send(event);
        self.settle();
    }

    /// Handle whatever is queued, e.g. after editing settings directly.
    pub fn settle(&mut self) {
        self.service.process_pending(&self.receiver);
    }

    /// Move the wall clock to a new instant, as if the user set the time.
    pub fn set_time(&mut self, instant: DateTime<Utc>) {
        self.clock.set_instant(instant);
        self.time_changes.notify_time_set();
        self.settle();
    }

    pub fn set_timezone(&mut self, timezone: Tz) {
        self.clock.set_timezone(timezone);
        self.time_changes.notify_timezone_changed();
        self.settle();
    }

    /// Walk time forward to `until`, firing alarms and twilight changes in order.
    pub fn run_until(&mut self, until: DateTime<Utc>) -> Result<()> {
        for _ in 0..MAX_STEPS {
            let now = self.clock.now().with_timezone(&Utc);
            let next_alarm = self.alarms.next_due();
            let next_twilight =
                (self.twilight.listener_count() > 0).then(|| self.twilight.next_change());

            let next = [next_alarm, next_twilight]
                .into_iter()
                .flatten()
                .filter(|at| *at >= now && *at <= until)
                .min();
            let Some(next) = next else {
                self.clock.set_instant(until.max(now));
                self.settle();
                return Ok(());
            };

            self.clock.set_instant(next);
            self.alarms_fired += self.alarms.fire_due(next);
            if next_twilight == Some(next) {
                self.twilight_changes += 1;
                self.twilight.notify_changed();
            }
            self.settle();
        }
        anyhow::bail!("Simulation did not reach {until} after {MAX_STEPS} steps")
    }

    /// Shut the service down and summarize the run.
    pub fn finish(mut self) -> SimulationReport {
        let final_state = self.service.activation();
        self.send(Event::Shutdown);
        SimulationReport {
            transitions: self.recorder.transitions(),
            alarms_fired: self.alarms_fired,
            twilight_changes: self.twilight_changes,
            final_state,
        }
    }
}

/// Run the service over `[from, to]` and log what happened.
pub fn run_simulation(
    config: Config,
    from: DateTime<Tz>,
    to: DateTime<Tz>,
) -> Result<SimulationReport> {
    if to <= from {
        anyhow::bail!("Simulation end must be after its start");
    }

    log_block_start!(
        "Simulating {} to {} ({})",
        from.format("%Y-%m-%d %H:%M:%S"),
        to.format("%Y-%m-%d %H:%M:%S"),
        from.timezone()
    );

    let mut simulation = Simulation::new(config, from, crate::common::constants::DEFAULT_USER)?;
    crate::logger::Log::set_simulation_clock(simulation.clock().clone());
    simulation.run_until(to.with_timezone(&Utc))?;
    let report = simulation.finish();

    log_block_start!("Simulation summary");
    for transition in &report.transitions {
        log_indented!(
            "{}  {}",
            transition.at.format("%Y-%m-%d %H:%M:%S %Z"),
            if transition.activated { "on" } else { "off" }
        );
    }
    log_indented!(
        "{} transitions, {} alarms, {} twilight changes, ended {}",
        report.transitions.len(),
        report.alarms_fired,
        report.twilight_changes,
        report.final_state
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Policy;
    use crate::time::source::parse_datetime_in_tz;
    use chrono_tz::UTC;

    fn at(s: &str) -> DateTime<Tz> {
        parse_datetime_in_tz(s, UTC).unwrap()
    }

    #[test]
    fn test_fixed_window_over_two_days() {
        let config = Config {
            auto_mode: Some(Policy::FixedWindow),
            ..Config::default()
        };
        let report =
            run_simulation(config, at("2026-10-15 12:00:00"), at("2026-10-17 12:00:00")).unwrap();

        let flips: Vec<_> = report
            .transitions
            .iter()
            .map(|t| (t.at.format("%d %H:%M").to_string(), t.activated))
            .collect();
        assert_eq!(
            flips,
            vec![
                ("15 12:00".to_string(), false),
                ("15 22:00".to_string(), true),
                ("16 06:00".to_string(), false),
                ("16 22:00".to_string(), true),
                ("17 06:00".to_string(), false),
            ]
        );
        assert_eq!(report.alarms_fired, 4);
        assert_eq!(report.final_state, ActivationState::Off);
    }

    #[test]
    fn test_twilight_follows_fixed_boundaries() {
        let config = Config {
            auto_mode: Some(Policy::Twilight),
            ..Config::default()
        };
        let report =
            run_simulation(config, at("2026-10-15 12:00:00"), at("2026-10-16 12:00:00")).unwrap();

        let flips: Vec<_> = report
            .transitions
            .iter()
            .map(|t| (t.at.format("%d %H:%M").to_string(), t.activated))
            .collect();
        assert_eq!(
            flips,
            vec![
                ("15 12:00".to_string(), false),
                ("15 19:00".to_string(), true),
                ("16 07:00".to_string(), false),
            ]
        );
        assert_eq!(report.twilight_changes, 2);
    }

    #[test]
    fn test_rejects_empty_span() {
        let from = at("2026-10-15 12:00:00");
        assert!(run_simulation(Config::default(), from, from).is_err());
    }
}
