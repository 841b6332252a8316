//! Unix signal handling.
//!
//! SIGINT, SIGTERM and SIGHUP are turned into [`Event::Shutdown`] on the
//! service queue, so teardown runs on the service thread like every other event.

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::{Handle, Signals},
};
use std::thread;

use crate::io::events::{Event, EventSender};

/// Running signal listener. Dropping it stops the listener thread.
pub struct SignalListener {
    handle: Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start forwarding termination signals into the event queue.
pub fn setup_signal_handler(events: EventSender) -> Result<SignalListener> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to register signal handlers")?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                let name = match sig {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    SIGHUP => "SIGHUP",
                    _ => continue,
                };

                log_pipe!();
                log_info!("Received {name}, shutting down");

                if !events.send(Event::Shutdown) {
                    break;
                }
            }
        })
        .context("failed to spawn signal handler thread")?;

    Ok(SignalListener {
        handle,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::events::channel;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_listener_starts_and_stops() {
        let (tx, _rx) = channel();
        let listener = setup_signal_handler(tx).unwrap();
        drop(listener);
    }
}
