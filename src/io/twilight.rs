//! Day/night state for the twilight policy.
//!
//! The astronomy itself is out of scope: a [`TwilightSource`] is a black box
//! that knows whether it is currently night and tells its listeners when that
//! changes. [`FixedTwilight`] is the stand-in used by the binary and the
//! simulator, with sunset and sunrise at fixed local times.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::io::Token;
use crate::io::events::{Event, EventSender};
use crate::time::{Clock, LocalTime, window_contains};

/// Snapshot of the astronomical state at the device location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwilightState {
    pub is_night: bool,
}

/// Provider of the current twilight state.
pub trait TwilightSource: Send + Sync {
    /// Current state, or `None` while the source has no fix yet.
    fn current_state(&self) -> Result<Option<TwilightState>>;

    /// Deliver [`Event::TwilightChanged`] to `events` whenever the state changes.
    fn register_listener(&self, token: Token, events: EventSender) -> Result<()>;

    fn unregister_listener(&self, token: Token) -> Result<()>;
}

/// Twilight with sunset and sunrise at fixed local times.
///
/// It is night from `sunset` until the following `sunrise`. The owner of the
/// clock calls [`notify_changed`](FixedTwilight::notify_changed) when time
/// crosses [`next_change`](FixedTwilight::next_change).
pub struct FixedTwilight {
    clock: Arc<dyn Clock>,
    sunset: LocalTime,
    sunrise: LocalTime,
    listeners: Mutex<HashMap<Token, EventSender>>,
}

impl FixedTwilight {
    pub fn new(clock: Arc<dyn Clock>, sunset: LocalTime, sunrise: LocalTime) -> Self {
        Self {
            clock,
            sunset,
            sunrise,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_night_at(&self, now: &DateTime<Tz>) -> bool {
        window_contains(self.sunset, self.sunrise, now)
    }

    /// The next instant the day/night state flips.
    pub fn next_change(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let next = if self.is_night_at(&now) {
            self.sunrise.occurrence_after(&now)
        } else {
            self.sunset.occurrence_after(&now)
        };
        next.with_timezone(&Utc)
    }

    /// Tell every listener the state changed.
    pub fn notify_changed(&self) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for events in listeners.values() {
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

/// Longest single sleep of the twilight thread, so wall-clock jumps are noticed.
const TWILIGHT_POLL: std::time::Duration = std::time::Duration::from_secs(60);

/// Drive `twilight` off the real clock: notify listeners each time sunset or
/// sunrise passes.
pub fn start_twilight_clock(twilight: Arc<FixedTwilight>) -> Result<()> {
    use anyhow::Context;

    std::thread::Builder::new()
        .name("twilight".to_string())
        .spawn(move || {
            let mut was_night = twilight.is_night_at(&twilight.clock.now());
            loop {
                let now = twilight.clock.now().with_timezone(&Utc);
                let wait = (twilight.next_change() - now)
                    .to_std()
                    .unwrap_or_default()
                    .min(TWILIGHT_POLL);
                std::thread::sleep(wait);

                let is_night = twilight.is_night_at(&twilight.clock.now());
                if is_night != was_night {
                    was_night = is_night;
                    log_debug!("Twilight changed to {}", if is_night { "night" } else { "day" });
                    twilight.notify_changed();
                }
            }
        })
        .context("failed to spawn twilight thread")?;

    Ok(())
}

impl TwilightSource for FixedTwilight {
    fn current_state(&self) -> Result<Option<TwilightState>> {
        let now = self.clock.now();
        Ok(Some(TwilightState {
            is_night: self.is_night_at(&now),
        }))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::events::channel;
    use crate::time::SimulatedClock;
    use crate::time::source::parse_datetime_in_tz;

    fn twilight_at(now: &str) -> (Arc<SimulatedClock>, FixedTwilight) {
        let clock = Arc::new(SimulatedClock::new(
            parse_datetime_in_tz(now, chrono_tz::UTC).unwrap(),
        ));
        let twilight = FixedTwilight::new(
            clock.clone(),
            "19:00".parse().unwrap(),
            "07:00".parse().unwrap(),
        );
        (clock, twilight)
    }

    #[test]
    fn test_state_follows_fixed_boundaries() {
        let (clock, twilight) = twilight_at("2026-10-15 18:59:00");
        assert_eq!(
            twilight.current_state().unwrap(),
            Some(TwilightState { is_night: false })
        );

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(
            twilight.current_state().unwrap(),
            Some(TwilightState { is_night: true })
        );
    }

    #[test]
    fn test_next_change() {
        let (_clock, twilight) = twilight_at("2026-10-15 23:00:00");
        let expected = parse_datetime_in_tz("2026-10-16 07:00:00", chrono_tz::UTC).unwrap();
        assert_eq!(twilight.next_change(), expected.with_timezone(&Utc));
    }

    #[test]
    fn test_listeners_receive_changes_until_unregistered() {
        let (_clock, twilight) = twilight_at("2026-10-15 12:00:00");
        let (tx, rx) = channel();
        let token = Token::next();

        twilight.register_listener(token, tx).unwrap();
        twilight.notify_changed();
        assert_eq!(rx.try_recv().unwrap(), Event::TwilightChanged);

        twilight.unregister_listener(token).unwrap();
        assert_eq!(twilight.listener_count(), 0);
        twilight.notify_changed();
        assert!(rx.try_recv().is_err());
    }
}
