//! Exact wall-clock alarms.
//!
//! The fixed-window engine needs exactly one wake-up at the next window
//! boundary. [`AlarmFacility`] is the contract; [`PendingAlarm`] is the engine's
//! handle on its single registration; [`AlarmQueue`] is the in-process facility
//! used by the event loop and the simulator.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::io::Token;
use crate::io::events::{Event, EventSender};

/// Fires one [`Event::AlarmFired`] at an absolute time.
pub trait AlarmFacility: Send + Sync {
    /// Register a one-shot alarm. At most one registration exists per token;
    /// registering again replaces the previous one.
    fn set_exact(&self, at: DateTime<Utc>, tag: &str, token: Token, events: EventSender)
    -> Result<()>;

    /// Remove the registration for `token`, if any.
    fn cancel(&self, token: Token) -> Result<()>;
}

/// An engine's single alarm registration.
///
/// Rescheduling cancels the previous registration first; dropping the handle
/// cancels whatever is still pending.
pub struct PendingAlarm {
    facility: Arc<dyn AlarmFacility>,
    token: Token,
    tag: &'static str,
    at: Option<DateTime<Utc>>,
}

impl PendingAlarm {
    pub fn new(facility: Arc<dyn AlarmFacility>, tag: &'static str) -> Self {
        Self {
            facility,
            token: Token::next(),
            tag,
            at: None,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    /// When the pending alarm is due, if one is pending.
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.at
    }

    /// Program the alarm for `at`, replacing any earlier registration.
    ///
    /// Returns false when nothing was (re)programmed: either the same instant is
    /// already pending or the facility refused the request.
    pub fn schedule(&mut self, at: DateTime<Utc>, events: &EventSender) -> bool {
        if self.at == Some(at) {
            return false;
        }

        self.cancel();
        match self
            .facility
            .set_exact(at, self.tag, self.token, events.clone())
        {
            Ok(()) => {
                log_debug!("Next alarm {} at {}", self.token, at.format("%Y-%m-%d %H:%M:%S UTC"));
                self.at = Some(at);
                true
            }
            Err(e) => {
                log_warning!("Failed to schedule alarm: {e:#}");
                log_indented!("The next time change or settings edit will retry");
                false
            }
        }
    }

    /// The alarm fired; the facility no longer holds a registration for it.
    pub fn mark_fired(&mut self) {
        self.at = None;
    }

    /// Cancel the pending registration, if any.
    pub fn cancel(&mut self) {
        if self.at.take().is_some()
            && let Err(e) = self.facility.cancel(self.token)
        {
            log_warning!("Failed to cancel alarm {}: {e:#}", self.token);
        }
    }
}

impl Drop for PendingAlarm {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for PendingAlarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAlarm")
            .field("token", &self.token)
            .field("at", &self.at)
            .finish()
    }
}

struct AlarmEntry {
    at: DateTime<Utc>,
    tag: String,
    events: EventSender,
}

/// In-process alarm facility.
///
/// Keeps registrations in memory; whoever owns the clock calls [`fire_due`]
/// when time reaches [`next_due`].
///
/// [`fire_due`]: AlarmQueue::fire_due
/// [`next_due`]: AlarmQueue::next_due
#[derive(Default)]
pub struct AlarmQueue {
    entries: Mutex<HashMap<Token, AlarmEntry>>,
}

impl AlarmQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest due time among pending alarms.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(|entry| entry.at).min()
    }

    /// Fire every alarm due at or before `now`, in due order. Returns how many fired.
    pub fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let mut due: Vec<(Token, AlarmEntry)> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let tokens: Vec<Token> = entries
                .iter()
                .filter(|(_, entry)| entry.at <= now)
                .map(|(token, _)| *token)
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| entries.remove(&token).map(|entry| (token, entry)))
                .collect()
        };
        due.sort_by_key(|(token, entry)| (entry.at, *token));

        for (token, entry) in &due {
            log_debug!("Alarm {token} ({}) fired", entry.tag);
            entry.events.send(Event::AlarmFired(*token));
        }
        due.len()
    }

    /// Pending alarms as `(token, due)` pairs, earliest first.
    pub fn pending(&self) -> Vec<(Token, DateTime<Utc>)> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<_> = entries.iter().map(|(token, entry)| (*token, entry.at)).collect();
        pending.sort_by_key(|(token, at)| (*at, *token));
        pending
    }
}

impl AlarmFacility for AlarmQueue {
    fn set_exact(
        &self,
        at: DateTime<Utc>,
        tag: &str,
        token: Token,
        events: EventSender,
    ) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            token,
            AlarmEntry {
                at,
                tag: tag.to_string(),
                events,
            },
        );
        Ok(())
    }

    fn cancel(&self, token: Token) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&token);
        Ok(())
    }
}
