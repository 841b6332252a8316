//! Wall-clock sources for real and simulated time.
//!
//! The scheduler never calls `Utc::now()` directly. It asks a [`Clock`] for the
//! current instant *in the current timezone*, because fixed-window boundaries are
//! local times and a timezone change must be visible to the next recomputation.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::{Mutex, PoisonError};

/// Source of the current zoned wall-clock time.
pub trait Clock: Send + Sync {
    /// Current instant expressed in the clock's timezone.
    fn now(&self) -> DateTime<Tz>;

    /// Timezone the clock currently reports in.
    fn timezone(&self) -> Tz;

    /// Whether time is simulated rather than read from the system.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Real system time, reported in a timezone that can change at runtime.
pub struct SystemClock {
    timezone: Mutex<Tz>,
}

impl SystemClock {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone: Mutex::new(timezone),
        }
    }

    /// Switch the reporting timezone. Returns true when the zone actually changed.
    pub fn set_timezone(&self, timezone: Tz) -> bool {
        let mut current = self.timezone.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *current != timezone;
        *current = timezone;
        changed
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.timezone())
    }

    fn timezone(&self) -> Tz {
        *self.timezone.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulated time that only moves when told to.
///
/// Used by the `simulate` command and by tests: both the instant and the
/// timezone can be changed to reproduce clock jumps and timezone switches.
pub struct SimulatedClock {
    instant: Mutex<DateTime<Utc>>,
    timezone: Mutex<Tz>,
}

impl SimulatedClock {
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            instant: Mutex::new(start.with_timezone(&Utc)),
            timezone: Mutex::new(start.timezone()),
        }
    }

    /// Jump to an absolute instant (forwards or backwards).
    pub fn set_instant(&self, instant: DateTime<Utc>) {
        *self.instant.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut instant = self.instant.lock().unwrap_or_else(PoisonError::into_inner);
        *instant += duration;
    }

    /// Switch the reporting timezone without moving the instant.
    pub fn set_timezone(&self, timezone: Tz) {
        *self.timezone.lock().unwrap_or_else(PoisonError::into_inner) = timezone;
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Tz> {
        let instant = *self.instant.lock().unwrap_or_else(PoisonError::into_inner);
        instant.with_timezone(&self.timezone())
    }

    fn timezone(&self) -> Tz {
        *self.timezone.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Parse an IANA timezone name such as `Europe/Berlin`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| anyhow::anyhow!("Unknown timezone '{name}'"))
}

/// Parse a datetime string in the format "YYYY-MM-DD HH:MM:SS" in a specific timezone.
pub fn parse_datetime_in_tz(s: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("Invalid datetime '{s}'. Use YYYY-MM-DD HH:MM:SS"))?;
    tz.from_local_datetime(&naive)
        .single()
        .ok_or_else(|| anyhow::anyhow!("Ambiguous or invalid time '{s}' in timezone {tz}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_simulated_clock_reports_in_its_timezone() {
        let start = parse_datetime_in_tz("2026-10-15 22:00:00", chrono_tz::UTC).unwrap();
        let clock = SimulatedClock::new(start);
        assert_eq!(clock.now().hour(), 22);

        clock.set_timezone(chrono_tz::Asia::Tokyo);
        let now = clock.now();
        assert_eq!(now.hour(), 7);
        assert_eq!(now.with_timezone(&Utc), start.with_timezone(&Utc));
        assert!(clock.is_simulated());
    }

    #[test]
    fn test_simulated_clock_advance() {
        let start = parse_datetime_in_tz("2026-10-15 23:30:00", chrono_tz::UTC).unwrap();
        let clock = SimulatedClock::new(start);
        clock.advance(Duration::minutes(45));
        assert_eq!(clock.now().hour(), 0);
        assert_eq!(clock.now().minute(), 15);
    }

    #[test]
    fn test_system_clock_timezone_switch() {
        let clock = SystemClock::new(chrono_tz::UTC);
        assert!(!clock.set_timezone(chrono_tz::UTC));
        assert!(clock.set_timezone(chrono_tz::Europe::Berlin));
        assert_eq!(clock.timezone(), chrono_tz::Europe::Berlin);
        assert!(!clock.is_simulated());
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Asia/Tokyo").unwrap(), chrono_tz::Asia::Tokyo);
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn test_parse_datetime_rejects_bad_format() {
        assert!(parse_datetime_in_tz("2026-10-15T22:00", chrono_tz::UTC).is_err());
        // Inside the spring-forward gap
        assert!(parse_datetime_in_tz("2026-03-29 02:30:00", chrono_tz::Europe::Berlin).is_err());
    }
}
