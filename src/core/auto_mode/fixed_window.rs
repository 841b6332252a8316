//! Fixed daily window: night display is on from `start` until the next `end`.
//!
//! The engine recomputes on start, on time and timezone broadcasts, on its own
//! alarm and on window edits. Outside of the first computation a flip is only
//! requested once "now" has left the window occurrence that contained the last
//! applied flip, which keeps a manual toggle in force until the next real
//! boundary. Exactly one alarm is kept pending, at the next boundary for the
//! applied state.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use super::{ActivationState, EngineEnv};
use crate::common::constants::ALARM_TAG;
use crate::io::alarm::{AlarmFacility, PendingAlarm};
use crate::io::{ListenerGuard, Token};
use crate::time::LocalTime;
use crate::time::local_time::{reanchor, window_contains};

#[derive(Debug)]
pub struct FixedWindowMode {
    start: LocalTime,
    end: LocalTime,
    /// When the applied activation last changed, in the zone it was recorded in
    last_activation: Option<DateTime<Tz>>,
    alarm: PendingAlarm,
    time_listener: Option<ListenerGuard>,
}

impl FixedWindowMode {
    pub fn new(start: LocalTime, end: LocalTime, alarms: Arc<dyn AlarmFacility>) -> Self {
        Self {
            start,
            end,
            last_activation: None,
            alarm: PendingAlarm::new(alarms, ALARM_TAG),
            time_listener: None,
        }
    }

    pub fn window(&self) -> (LocalTime, LocalTime) {
        (self.start, self.end)
    }

    pub fn last_activation(&self) -> Option<DateTime<Tz>> {
        self.last_activation
    }

    pub fn alarm_token(&self) -> Token {
        self.alarm.token()
    }

    pub fn next_alarm(&self) -> Option<DateTime<Utc>> {
        self.alarm.scheduled_at()
    }

    pub fn start(&mut self, env: &EngineEnv, current: ActivationState) -> Option<bool> {
        let token = Token::next();
        match env.time_changes.subscribe(token, env.events.clone()) {
            Ok(()) => {
                let broadcast = env.time_changes.clone();
                self.time_listener = Some(ListenerGuard::new("time change receiver", move || {
                    broadcast.unsubscribe(token)
                }));
            }
            Err(e) => {
                log_warning!("Failed to subscribe to time changes: {e:#}");
                log_indented!("Clock and timezone changes will only be noticed at the next alarm");
            }
        }

        log_decorated!("Fixed window: {} to {}", self.start, self.end);
        self.recompute(env, current)
    }

    pub fn stop(&mut self) {
        if let Some(listener) = self.time_listener.take() {
            listener.release();
        }
        self.alarm.cancel();
        self.last_activation = None;
    }

    /// Work out whether the window is active and what, if anything, to request.
    pub fn recompute(&mut self, env: &EngineEnv, current: ActivationState) -> Option<bool> {
        let now = env.clock.now();
        let activated = window_contains(self.start, self.end, &now);

        let request = match (current.as_bool(), self.last_activation) {
            (Some(applied), Some(last)) if applied != activated => {
                let last = reanchor(last, now.timezone());
                self.last_activation = Some(last);
                self.left_flip_occurrence(applied, &last, &now)
                    .then_some(activated)
            }
            (Some(_), Some(_)) => None,
            _ => Some(activated),
        };

        log_debug!(
            "Window {} to {} at {}: {} (applied {current})",
            self.start,
            self.end,
            now.format("%Y-%m-%d %H:%M:%S %Z"),
            if activated { "inside" } else { "outside" }
        );

        self.schedule_next(env, request.or(current.as_bool()));
        request
    }

    pub fn on_activated(&mut self, activated: bool, env: &EngineEnv) {
        self.last_activation = Some(env.clock.now());
        self.schedule_next(env, Some(activated));
    }

    pub fn on_alarm(
        &mut self,
        token: Token,
        env: &EngineEnv,
        current: ActivationState,
    ) -> Option<bool> {
        if token != self.alarm.token() {
            log_debug!("Ignoring stale alarm {token}");
            return None;
        }
        self.alarm.mark_fired();
        self.recompute(env, current)
    }

    /// Install a new window and recompute once against it.
    pub fn set_window(
        &mut self,
        start: LocalTime,
        end: LocalTime,
        env: &EngineEnv,
        current: ActivationState,
    ) -> Option<bool> {
        self.start = start;
        self.end = end;
        self.last_activation = None;
        self.recompute(env, current)
    }

    /// Keep one alarm pending at the next boundary for `state`: the end when
    /// on, the start when off. Nothing is programmed while the state is unknown.
    pub(crate) fn schedule_next(&mut self, env: &EngineEnv, state: Option<bool>) {
        let Some(activated) = state else {
            return;
        };
        let now = env.clock.now();
        let next = if activated {
            self.end.occurrence_after(&now)
        } else {
            self.start.occurrence_after(&now)
        };
        self.alarm.schedule(next.with_timezone(&Utc), &env.events);
    }

    /// Whether `now` lies outside the window occurrence around the last flip.
    ///
    /// A boundary instant counts as outside, so an alarm firing exactly at a
    /// boundary flips.
    fn left_flip_occurrence(
        &self,
        applied: bool,
        last: &DateTime<Tz>,
        now: &DateTime<Tz>,
    ) -> bool {
        let (opened_by, closed_by) = if applied {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        };
        *now < opened_by.occurrence_at_or_before(last)
            || *now >= closed_by.occurrence_at_or_after(last)
    }
}
