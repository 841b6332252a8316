//! Time-set and timezone-changed broadcasts.
//!
//! The fixed-window engine listens for both while it runs: a clock jump or a new
//! timezone can move "now" across a window boundary without any alarm firing.

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::io::Token;
use crate::io::events::{Event, EventSender};

/// Broadcast of wall-clock and timezone changes.
pub trait TimeChangeBroadcast: Send + Sync {
    /// Deliver [`Event::TimeSet`] and [`Event::TimezoneChanged`] to `events`.
    fn subscribe(&self, token: Token, events: EventSender) -> Result<()>;

    fn unsubscribe(&self, token: Token) -> Result<()>;
}

/// In-process broadcaster; whoever changes the clock calls the `notify_*` methods.
#[derive(Default)]
pub struct LocalBroadcast {
    receivers: Mutex<HashMap<Token, EventSender>>,
}

impl LocalBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_time_set(&self) {
        self.broadcast(Event::TimeSet);
    }

    pub fn notify_timezone_changed(&self) {
        self.broadcast(Event::TimezoneChanged);
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn broadcast(&self, event: Event) {
        let receivers = self.receivers.lock().unwrap_or_else(PoisonError::into_inner);
        for events in receivers.values() {
            events.send(event.clone());
        }
    }
}

impl TimeChangeBroadcast for LocalBroadcast {
    fn subscribe(&self, token: Token, events: EventSender) -> Result<()> {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, events);
        Ok(())
    }

    fn unsubscribe(&self, token: Token) -> Result<()> {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
        Ok(())
    }
}

/// Detects wall-clock jumps with a far-future `CLOCK_REALTIME` timer.
///
/// The timer is armed with `TFD_TIMER_CANCEL_ON_SET`, so it only ever wakes
/// when the system time is set.
struct TimeChangeDetector {
    timer: TimerFd,
}

impl TimeChangeDetector {
    fn new() -> nix::Result<Self> {
        let timer = TimerFd::new(ClockId::CLOCK_REALTIME, TimerFlags::empty())?;
        let mut detector = TimeChangeDetector { timer };
        detector.arm_timer()?;
        Ok(detector)
    }

    fn arm_timer(&mut self) -> nix::Result<()> {
        let flags =
            TimerSetTimeFlags::TFD_TIMER_ABSTIME | TimerSetTimeFlags::TFD_TIMER_CANCEL_ON_SET;
        let far_future = TimeSpec::new(i64::MAX / 1000, 0);
        self.timer.set(Expiration::OneShot(far_future), flags)
    }

    /// Block until the system time is set.
    fn wait_for_time_change(&mut self) -> Result<()> {
        match self.timer.wait() {
            Ok(_) | Err(Errno::ECANCELED) => self
                .arm_timer()
                .context("Failed to re-arm timer after time change"),
            Err(e) => Err(anyhow::anyhow!("Timer wait error: {e}")),
        }
    }
}

/// Watch the system clock and broadcast [`Event::TimeSet`] whenever it is set.
pub fn start_time_change_monitor(broadcast: Arc<LocalBroadcast>) -> Result<()> {
    let mut detector =
        TimeChangeDetector::new().context("Failed to create time change detector")?;

    thread::Builder::new()
        .name("time-change".to_string())
        .spawn(move || {
            loop {
                if let Err(e) = detector.wait_for_time_change() {
                    log_pipe!();
                    log_error!("Time change detection stopped: {e:#}");
                    return;
                }
                log_pipe!();
                log_info!("System time changed");
                broadcast.notify_time_set();
            }
        })
        .context("failed to spawn time change monitor thread")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::events::channel;

    #[test]
    fn test_broadcast_reaches_subscribers() {
        let broadcast = LocalBroadcast::new();
        let (tx, rx) = channel();
        let token = Token::next();
        broadcast.subscribe(token, tx).unwrap();

        broadcast.notify_time_set();
        broadcast.notify_timezone_changed();
        assert_eq!(rx.try_recv().unwrap(), Event::TimeSet);
        assert_eq!(rx.try_recv().unwrap(), Event::TimezoneChanged);

        broadcast.unsubscribe(token).unwrap();
        assert_eq!(broadcast.receiver_count(), 0);
    }
}
