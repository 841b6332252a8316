//! The service's single event queue.
//!
//! Everything that can change the night display decision (session lifecycle,
//! settings edits, time and timezone broadcasts, twilight updates, alarm
//! firings) arrives as an [`Event`] on one `mpsc` channel and is handled one at a
//! time by the service. Producers on other threads only ever hold an
//! [`EventSender`].

use chrono::Utc;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::config::Policy;
use crate::io::alarm::AlarmQueue;
use crate::io::Token;
use crate::time::{Clock, LocalTime};

/// Identifier of a user session.
pub type UserId = u32;

/// Unified message type for everything the service reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Boot has reached the phase where settings and alarms are usable
    BootCompleted,
    /// A user session started (binds only when no user is bound)
    SessionStarted(UserId),
    /// The foreground user changed
    SessionSwitched(UserId),
    /// A user session stopped (unbinds only the bound user)
    SessionStopped(UserId),
    /// The user-setup flag of a watched user changed
    UserSetupChanged(UserId),
    /// The configured policy changed
    PolicyChanged(Policy),
    /// The fixed-window start time changed
    WindowStartChanged(LocalTime),
    /// The fixed-window end time changed
    WindowEndChanged(LocalTime),
    /// The persisted activation flag changed (manual toggle or our own write)
    ActivationChanged(bool),
    /// The system wall clock was set
    TimeSet,
    /// The system timezone changed
    TimezoneChanged,
    /// The twilight source has a new state
    TwilightChanged,
    /// An alarm registered under this token fired
    AlarmFired(Token),
    /// Stop processing and tear everything down
    Shutdown,
}

/// Cloneable handle for pushing events onto the queue.
#[derive(Debug, Clone)]
pub struct EventSender(Sender<Event>);

impl EventSender {
    /// Queue an event. Returns false when the queue has been closed.
    pub fn send(&self, event: Event) -> bool {
        match self.0.send(event) {
            Ok(()) => true,
            Err(mpsc::SendError(event)) => {
                log_debug!("Event queue closed, dropping {event:?}");
                false
            }
        }
    }
}

/// Create a new event queue.
pub fn channel() -> (EventSender, Receiver<Event>) {
    let (tx, rx) = mpsc::channel();
    (EventSender(tx), rx)
}

/// Blocking event source for a live service.
///
/// Waits on the queue, but never past the next due alarm: when an alarm comes
/// due the loop fires it, which queues its [`Event::AlarmFired`].
pub struct EventLoop {
    receiver: Receiver<Event>,
    alarms: Arc<AlarmQueue>,
    clock: Arc<dyn Clock>,
}

impl EventLoop {
    pub fn new(receiver: Receiver<Event>, alarms: Arc<AlarmQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            receiver,
            alarms,
            clock,
        }
    }

    /// Next event to process, or `None` once every sender is gone.
    pub fn next_event(&self) -> Option<Event> {
        loop {
            let now = self.clock.now().with_timezone(&Utc);
            let received = match self.alarms.next_due() {
                Some(due) => {
                    let wait = (due - now).to_std().unwrap_or(Duration::ZERO);
                    self.receiver.recv_timeout(wait)
                }
                None => self
                    .receiver
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(event) => return Some(event),
                Err(RecvTimeoutError::Timeout) => {
                    self.alarms.fire_due(self.clock.now().with_timezone(&Utc));
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive_in_order() {
        let (tx, rx) = channel();
        assert!(tx.send(Event::BootCompleted));
        assert!(tx.send(Event::SessionStarted(10)));
        assert_eq!(rx.try_recv().unwrap(), Event::BootCompleted);
        assert_eq!(rx.try_recv().unwrap(), Event::SessionStarted(10));
    }

    #[test]
    fn test_send_after_close_reports_failure() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.send(Event::TimeSet));
    }
}
