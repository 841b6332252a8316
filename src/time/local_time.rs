//! Timezone-independent time-of-day values and their calendar occurrences.
//!
//! A [`LocalTime`] such as `22:00` has no date and no zone. To compare it with
//! "now" it is projected onto the calendar of a concrete zoned instant: the
//! occurrence on the same local date, or the day before/after. Day arithmetic
//! is done on the wall clock, so `22:00` stays `22:00` across a DST change.

use anyhow::{Context, Result};
use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Timelike,
};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

/// Wall-clock time of day with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalTime {
    hour: u32,
    minute: u32,
}

impl LocalTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            anyhow::bail!("{hour:02}:{minute:02} is not a valid time of day");
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// This time on `date` in `tz`, with seconds zeroed.
    pub fn on_date(&self, tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
        resolve_local(tz, date.and_time(self.as_naive_time()))
    }

    /// The latest occurrence of this time that is not after `time`.
    pub fn occurrence_at_or_before(&self, time: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = time.timezone();
        let date = time.date_naive();
        let candidate = self.on_date(&tz, date);
        if candidate > *time {
            self.on_date(&tz, date.pred_opt().unwrap_or(date))
        } else {
            candidate
        }
    }

    /// The earliest occurrence of this time that is not before `time`.
    pub fn occurrence_at_or_after(&self, time: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = time.timezone();
        let date = time.date_naive();
        let candidate = self.on_date(&tz, date);
        if candidate < *time {
            self.on_date(&tz, date.succ_opt().unwrap_or(date))
        } else {
            candidate
        }
    }

    /// The earliest occurrence of this time strictly after `time`.
    ///
    /// Used for wake-ups: an alarm programmed for "now" would fire straight back
    /// into the recomputation that programmed it.
    pub fn occurrence_after(&self, time: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = time.timezone();
        let date = time.date_naive();
        let candidate = self.on_date(&tz, date);
        if candidate <= *time {
            self.on_date(&tz, date.succ_opt().unwrap_or(date))
        } else {
            candidate
        }
    }

    fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl From<NaiveTime> for LocalTime {
    fn from(time: NaiveTime) -> Self {
        Self {
            hour: time.hour(),
            minute: time.minute(),
        }
    }
}

impl FromStr for LocalTime {
    type Err = anyhow::Error;

    /// Accepts `HH:MM`, and `HH:MM:SS` with the seconds dropped.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map(Self::from)
            .with_context(|| format!("Invalid time '{s}'. Use HH:MM"))
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Whether `now` falls inside the window that opens at the most recent `start`
/// and closes at the first `end` not before that opening.
///
/// The window is half-open, `[start, end)`, and wraps midnight when
/// `end < start`. With `start == end` the window is empty.
pub fn window_contains(start: LocalTime, end: LocalTime, now: &DateTime<Tz>) -> bool {
    let window_start = start.occurrence_at_or_before(now);
    let window_end = end.occurrence_at_or_after(&window_start);
    *now < window_end
}

/// Map a local date-time in `tz` to an instant.
///
/// Ambiguous times (the repeated hour when clocks go back) resolve to the
/// earlier instant. Times skipped when clocks go forward are pushed forward by
/// the size of the gap, so 02:30 in a 02:00→03:00 gap becomes 03:30.
pub fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Offset in force before the gap
            let before = tz.offset_from_utc_datetime(&(naive - Duration::days(1))).fix();
            let utc = naive - Duration::seconds(i64::from(before.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}

/// Carry a recorded timestamp into another timezone by its wall-clock fields.
///
/// The local date, hour, minute and second are kept; only the zone changes. A
/// flip recorded at 22:00 in one zone is treated as 22:00 in the new zone.
pub fn reanchor(timestamp: DateTime<Tz>, tz: Tz) -> DateTime<Tz> {
    if timestamp.timezone() == tz {
        timestamp
    } else {
        resolve_local(&tz, timestamp.naive_local())
    }
}
