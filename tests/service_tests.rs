use chrono::{DateTime, Utc};
use chrono_tz::{Asia, UTC};
use std::sync::Arc;

use night_display::config::{Config, Controller, Policy, SettingsRegistry};
use night_display::core::{ActivationState, AutoMode, NightDisplayService, ServiceParams};
use night_display::io::events::{Event, UserId};
use night_display::logger::Log;
use night_display::testing::{RecordingSink, TestEnv};

struct Harness {
    t: TestEnv,
    settings: Arc<SettingsRegistry>,
    sink: Arc<RecordingSink>,
    service: NightDisplayService,
}

impl Harness {
    fn new(now: &str, config: Config) -> Self {
        Log::set_enabled(false);
        let t = TestEnv::at(now, UTC);
        let settings = Arc::new(SettingsRegistry::new(config));
        let sink = Arc::new(RecordingSink::new());
        let service = NightDisplayService::new(ServiceParams {
            settings: settings.clone(),
            sink: sink.clone(),
            env: t.env.clone(),
        });
        Self {
            t,
            settings,
            sink,
            service,
        }
    }

    /// Boot with user 0 signed in.
    fn armed(now: &str, config: Config) -> Self {
        let mut h = Self::new(now, config);
        h.send(Event::BootCompleted);
        h.send(Event::SessionStarted(0));
        h
    }

    fn send(&mut self, event: Event) {
        self.service.handle_event(event);
        self.settle();
    }

    fn settle(&mut self) {
        self.service.process_pending(&self.t.receiver);
    }

    fn controller(&self, user: UserId) -> Arc<night_display::config::SettingsController> {
        self.settings.controller(user).unwrap()
    }

    /// Move the clock to `at` and deliver whatever alarms came due.
    fn advance_to(&mut self, at: &str) {
        let at = self.t.utc(at);
        self.t.clock.set_instant(at);
        self.t.alarms.fire_due(at);
        self.settle();
    }

    fn pending_alarms(&self) -> Vec<DateTime<Utc>> {
        self.t.alarms.pending().into_iter().map(|(_, at)| at).collect()
    }
}

fn fixed_window(start: &str, end: &str) -> Config {
    Config {
        auto_mode: Some(Policy::FixedWindow),
        custom_start: Some(start.to_string()),
        custom_end: Some(end.to_string()),
        ..Config::default()
    }
}

fn twilight() -> Config {
    Config {
        auto_mode: Some(Policy::Twilight),
        ..Config::default()
    }
}

#[test]
fn test_inside_window_turns_on_with_one_alarm_at_end() {
    let h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));

    assert_eq!(h.service.activation(), ActivationState::On);
    assert_eq!(h.sink.calls(), vec![true]);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-16 06:00:00")]);
    assert!(h.controller(0).is_activated().unwrap());
}

#[test]
fn test_empty_window_degrades_to_off_until_edited() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("08:00", "08:00"));

    assert!(h.service.is_running());
    assert_eq!(h.service.policy(), Policy::FixedWindow);
    assert!(h.service.auto_mode().is_none());
    assert_eq!(h.service.activation(), ActivationState::Off);
    assert!(h.pending_alarms().is_empty());

    // A usable window brings the engine back
    h.controller(0)
        .set_fixed_window("22:00".parse().unwrap(), "06:00".parse().unwrap());
    h.settle();

    assert!(matches!(h.service.auto_mode(), Some(AutoMode::FixedWindow(_))));
    assert_eq!(h.service.activation(), ActivationState::On);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-16 06:00:00")]);
}

#[test]
fn test_repeated_day_reports_never_touch_the_sink() {
    let mut h = Harness::new("2026-10-15 12:00:00", twilight());
    h.t.twilight.set_night(Some(false));
    h.send(Event::BootCompleted);
    h.send(Event::SessionStarted(0));
    let after_arming = h.sink.calls().len();

    for _ in 0..3 {
        h.t.twilight.notify();
        h.settle();
    }

    assert_eq!(h.sink.calls().len(), after_arming);
    assert_eq!(h.service.activation(), ActivationState::Off);
}

#[test]
fn test_twilight_flip_turns_on_once() {
    let mut h = Harness::new("2026-10-15 12:00:00", twilight());
    h.t.twilight.set_night(Some(false));
    h.send(Event::BootCompleted);
    h.send(Event::SessionStarted(0));

    h.t.twilight.set_night(Some(true));
    h.t.twilight.notify();
    h.t.twilight.notify();
    h.settle();

    assert_eq!(h.sink.calls(), vec![false, true]);
    assert_eq!(h.service.activation(), ActivationState::On);
}

#[test]
fn test_alarm_at_end_turns_off_and_programs_start() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));

    h.advance_to("2026-10-16 06:00:00");

    assert_eq!(h.service.activation(), ActivationState::Off);
    assert_eq!(h.sink.calls(), vec![true, false]);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-16 22:00:00")]);
}

#[test]
fn test_policy_switch_replaces_the_engine() {
    let mut h = Harness::new("2026-10-15 23:30:00", twilight());
    h.t.twilight.set_night(Some(true));
    h.send(Event::BootCompleted);
    h.send(Event::SessionStarted(0));
    assert_eq!(h.t.twilight.listener_count(), 1);
    assert!(h.pending_alarms().is_empty());

    h.controller(0).set_policy(Policy::FixedWindow);
    h.settle();

    assert_eq!(h.service.policy(), Policy::FixedWindow);
    assert!(matches!(h.service.auto_mode(), Some(AutoMode::FixedWindow(_))));
    assert_eq!(h.t.twilight.listener_count(), 0);
    assert_eq!(h.t.time_changes.receiver_count(), 1);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-16 06:00:00")]);
    // Already on from twilight; the window agrees
    assert_eq!(h.sink.calls(), vec![true]);

    h.controller(0).set_policy(Policy::Off);
    h.settle();
    assert!(h.service.auto_mode().is_none());
    assert!(h.pending_alarms().is_empty());
    assert_eq!(h.t.time_changes.receiver_count(), 0);
    assert_eq!(h.service.activation(), ActivationState::On);
}

#[test]
fn test_repeated_time_broadcasts_are_idempotent() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));
    let alarms = h.pending_alarms();

    for _ in 0..3 {
        h.t.time_changes.notify_time_set();
        h.settle();
    }

    assert_eq!(h.sink.calls(), vec![true]);
    assert_eq!(h.pending_alarms(), alarms);
}

#[test]
fn test_timezone_change_after_flip_turns_off() {
    let mut h = Harness::armed("2026-10-15 22:00:00", fixed_window("22:00", "06:00"));
    assert_eq!(h.service.activation(), ActivationState::On);

    // 22:10 UTC is 07:10 the next morning in Tokyo
    h.t.clock.set_instant(h.t.utc("2026-10-15 22:10:00"));
    h.t.clock.set_timezone(Asia::Tokyo);
    h.t.time_changes.notify_timezone_changed();
    h.settle();

    assert_eq!(h.service.activation(), ActivationState::Off);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-16 22:00:00")]);
}

#[test]
fn test_manual_toggle_holds_until_next_boundary() {
    let mut h = Harness::armed("2026-10-15 23:00:00", fixed_window("22:00", "06:00"));

    h.t.clock.set_instant(h.t.utc("2026-10-15 23:45:00"));
    h.controller(0).set_activated(false).unwrap();
    h.settle();
    assert_eq!(h.service.activation(), ActivationState::Off);

    h.t.clock.set_instant(h.t.utc("2026-10-15 23:50:00"));
    h.t.time_changes.notify_time_set();
    h.settle();
    assert_eq!(h.service.activation(), ActivationState::Off);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-16 22:00:00")]);

    h.advance_to("2026-10-16 22:00:00");
    assert_eq!(h.service.activation(), ActivationState::On);
    assert_eq!(h.sink.calls(), vec![true, false, true]);
}

#[test]
fn test_window_edit_recomputes_immediately() {
    let mut h = Harness::armed("2026-10-15 21:00:00", fixed_window("22:00", "06:00"));
    assert_eq!(h.service.activation(), ActivationState::Off);

    h.controller(0).set_window_start("20:30".parse().unwrap());
    h.settle();

    assert_eq!(h.service.activation(), ActivationState::On);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-16 06:00:00")]);
}

#[test]
fn test_editing_both_boundaries_does_not_flicker() {
    let mut h = Harness::armed("2026-10-15 23:00:00", fixed_window("22:00", "06:00"));
    assert_eq!(h.sink.calls(), vec![true]);

    // 06:00 as the new start would briefly equal the old end
    h.controller(0)
        .set_fixed_window("06:00".parse().unwrap(), "23:30".parse().unwrap());
    h.settle();

    assert_eq!(h.sink.calls(), vec![true]);
    assert_eq!(h.service.activation(), ActivationState::On);
    assert_eq!(h.pending_alarms(), vec![h.t.utc("2026-10-15 23:30:00")]);
}

#[test]
fn test_session_start_only_binds_when_free() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));
    h.send(Event::SessionStarted(7));
    assert_eq!(h.service.current_user(), Some(0));
    assert!(h.controller(0).has_subscriber());
}

#[test]
fn test_session_stop_only_unbinds_the_bound_user() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));

    h.send(Event::SessionStopped(7));
    assert!(h.service.is_running());

    h.send(Event::SessionStopped(0));
    assert!(!h.service.is_running());
    assert_eq!(h.service.current_user(), None);
    assert_eq!(h.service.activation(), ActivationState::Unknown);
    assert!(h.pending_alarms().is_empty());
    assert!(!h.controller(0).has_subscriber());
}

#[test]
fn test_session_switch_rebinds() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));
    h.controller(1).set_policy(Policy::Off);

    h.send(Event::SessionSwitched(1));

    assert_eq!(h.service.current_user(), Some(1));
    assert!(!h.controller(0).has_subscriber());
    assert!(h.controller(1).has_subscriber());
    assert!(h.service.auto_mode().is_none());
    assert!(h.pending_alarms().is_empty());
    // User 1 starts from the configured flag
    assert_eq!(h.service.activation(), ActivationState::Off);
}

#[test]
fn test_user_setup_gate() {
    let mut h = Harness::new("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));
    h.settings.begin_user_setup(3);

    h.send(Event::BootCompleted);
    h.send(Event::SessionStarted(3));
    assert!(!h.service.is_running());
    assert_eq!(h.settings.setup_watcher_count(), 1);

    h.settings.complete_user_setup(3);
    h.settle();

    assert!(h.service.is_running());
    assert_eq!(h.service.activation(), ActivationState::On);
    assert_eq!(h.settings.setup_watcher_count(), 0);
}

#[test]
fn test_setup_watch_is_dropped_on_switch() {
    let mut h = Harness::new("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));
    h.settings.begin_user_setup(3);
    h.send(Event::BootCompleted);
    h.send(Event::SessionStarted(3));

    h.send(Event::SessionSwitched(0));

    assert_eq!(h.settings.setup_watcher_count(), 0);
    assert_eq!(h.service.current_user(), Some(0));
    assert!(h.service.is_running());
}

#[test]
fn test_unavailable_settings_keep_last_activation() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));
    h.controller(0).disconnect();

    h.advance_to("2026-10-16 06:00:00");

    assert_eq!(h.service.activation(), ActivationState::On);
    assert_eq!(h.sink.calls(), vec![true]);
    // The engine stays armed for the next boundary
    assert_eq!(h.pending_alarms().len(), 1);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut h = Harness::armed("2026-10-15 23:30:00", fixed_window("22:00", "06:00"));

    assert!(!h.service.handle_event(Event::Shutdown));

    assert!(!h.service.is_running());
    assert!(h.pending_alarms().is_empty());
    assert_eq!(h.t.time_changes.receiver_count(), 0);
    assert!(!h.controller(0).has_subscriber());
}

mod with_mock_sink {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;
    use night_display::backend::ColorTransformSink;

    mock! {
        pub Sink {}
        impl ColorTransformSink for Sink {
            fn apply_night_matrix(&self, enabled: bool);
            fn sink_name(&self) -> &'static str;
        }
    }

    #[test]
    fn test_full_night_applies_each_flip_once() {
        Log::set_enabled(false);
        let t = TestEnv::at("2026-10-15 12:00:00", UTC);
        let mut sink = MockSink::new();
        let mut seq = mockall::Sequence::new();
        for enabled in [false, true, false] {
            sink.expect_apply_night_matrix()
                .with(eq(enabled))
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }

        let mut service = NightDisplayService::new(ServiceParams {
            settings: Arc::new(SettingsRegistry::new(fixed_window("22:00", "06:00"))),
            sink: Arc::new(sink),
            env: t.env.clone(),
        });
        service.handle_event(Event::BootCompleted);
        service.handle_event(Event::SessionStarted(0));
        service.process_pending(&t.receiver);

        for at in ["2026-10-15 22:00:00", "2026-10-16 06:00:00"] {
            let at = t.utc(at);
            t.clock.set_instant(at);
            t.alarms.fire_due(at);
            service.process_pending(&t.receiver);
        }
    }
}
