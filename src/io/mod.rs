//! Boundaries to the outside world.
//!
//! Each collaborator the scheduler depends on is a trait here, next to the
//! implementation the binary and the simulator use:
//!
//! - `alarm`: exact wall-clock wake-ups ([`AlarmFacility`](alarm::AlarmFacility))
//! - `twilight`: day/night state ([`TwilightSource`](twilight::TwilightSource))
//! - `time_change`: time-set and timezone broadcasts
//! - `events`: the single queue all of them deliver into
//! - `signals`: Unix signals turned into queue events

pub mod alarm;
pub mod events;
pub mod signals;
pub mod time_change;
pub mod twilight;

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of one registration (listener, receiver or alarm).
///
/// Collaborators key their registrations by token, so registering the same
/// token twice replaces the first registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// A token never handed out before in this process.
    pub fn next() -> Self {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Release = Box<dyn FnOnce() -> Result<()> + Send>;

/// Releases a listener registration when dropped.
///
/// Engines hold one of these per subscription, so a listener is released on
/// every path that ends the engine: `stop()`, replacement, or drop.
pub struct ListenerGuard {
    name: &'static str,
    release: Option<Release>,
}

impl ListenerGuard {
    pub fn new(name: &'static str, release: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            name,
            release: Some(Box::new(release)),
        }
    }

    /// Release now instead of at drop.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take()
            && let Err(e) = release()
        {
            log_warning!("Failed to release {}: {e:#}", self.name);
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("name", &self.name)
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_tokens_are_unique() {
        let a = Token::next();
        let b = Token::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_guard_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let guard = ListenerGuard::new("test listener", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        guard.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        {
            let _guard = ListenerGuard::new("test listener", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("already gone")
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
