//! Test doubles for the service's collaborators.
//!
//! Compiled for the crate's own tests and, through the `testing-support`
//! feature, for the integration tests under `tests/`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::ColorTransformSink;
use crate::core::EngineEnv;
use crate::io::Token;
use crate::io::alarm::AlarmQueue;
use crate::io::events::{Event, EventSender, channel};
use crate::io::time_change::LocalBroadcast;
use crate::io::twilight::{TwilightSource, TwilightState};
use crate::time::SimulatedClock;
use crate::time::source::parse_datetime_in_tz;

/// Twilight source whose state is set by the test.
#[derive(Default)]
pub struct ScriptedTwilight {
    state: Mutex<Option<TwilightState>>,
    failing: AtomicBool,
    listeners: Mutex<HashMap<Token, EventSender>>,
}

impl ScriptedTwilight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reported state; `None` means "no state available".
    pub fn set_night(&self, is_night: Option<bool>) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            is_night.map(|is_night| TwilightState { is_night });
    }

    /// Make `current_state` fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Send a change notification to every registered listener.
    pub fn notify(&self) {
        for events in self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
        {
            events.send(Event::TwilightChanged);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl TwilightSource for ScriptedTwilight {
    fn current_state(&self) -> Result<Option<TwilightState>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("twilight service unavailable");
        }
        Ok(*self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn register_listener(&self, token: Token, events: EventSender) -> Result<()> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, events);
        Ok(())
    }

    fn unregister_listener(&self, token: Token) -> Result<()> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
        Ok(())
    }
}

/// Sink that remembers every call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<bool>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<bool> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<bool> {
        self.calls().last().copied()
    }
}

impl ColorTransformSink for RecordingSink {
    fn apply_night_matrix(&self, enabled: bool) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(enabled);
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}

/// Engine environment over a simulated clock, with handles on every fake.
pub struct TestEnv {
    pub clock: Arc<SimulatedClock>,
    pub alarms: Arc<AlarmQueue>,
    pub twilight: Arc<ScriptedTwilight>,
    pub time_changes: Arc<LocalBroadcast>,
    pub env: EngineEnv,
    pub receiver: Receiver<Event>,
}

impl TestEnv {
    /// Start the clock at `now` (`YYYY-MM-DD HH:MM:SS`) in `tz`.
    ///
    /// Panics on a malformed `now`; for tests only.
    pub fn at(now: &str, tz: Tz) -> Self {
        let start = match parse_datetime_in_tz(now, tz) {
            Ok(start) => start,
            Err(e) => panic!("bad test time '{now}': {e:#}"),
        };
        let clock = Arc::new(SimulatedClock::new(start));
        let alarms = Arc::new(AlarmQueue::new());
        let twilight = Arc::new(ScriptedTwilight::new());
        let time_changes = Arc::new(LocalBroadcast::new());
        let (events, receiver) = channel();

        let env = EngineEnv {
            clock: clock.clone(),
            alarms: alarms.clone(),
            twilight: twilight.clone(),
            time_changes: time_changes.clone(),
            events,
        };

        Self {
            clock,
            alarms,
            twilight,
            time_changes,
            env,
            receiver,
        }
    }

    /// `YYYY-MM-DD HH:MM:SS` in the clock's current zone, as UTC.
    pub fn utc(&self, local: &str) -> DateTime<Utc> {
        use crate::time::Clock;
        match parse_datetime_in_tz(local, self.clock.timezone()) {
            Ok(time) => time.with_timezone(&Utc),
            Err(e) => panic!("bad test time '{local}': {e:#}"),
        }
    }

    /// Take every queued event.
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}
