//! Per-user settings as seen by the service.
//!
//! [`Controller`] is one user's view of the night display settings: the
//! activation flag, the automatic mode and the fixed window. Edits are pushed to
//! the subscribed service as events. [`SettingsStore`] hands out controllers and
//! tracks whether a user has finished setup.
//!
//! [`SettingsController`] and [`SettingsRegistry`] are the in-memory
//! implementations built from the loaded [`Config`]; nothing is persisted.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Config, Policy};
use crate::io::events::{Event, EventSender, UserId};
use crate::time::LocalTime;

/// Settings facade for one user.
pub trait Controller: Send + Sync {
    fn policy(&self) -> Result<Policy>;

    /// The fixed window as `(start, end)`, as stored. An empty window
    /// (`start == end`) is returned like any other.
    fn fixed_window(&self) -> Result<(LocalTime, LocalTime)>;

    fn is_activated(&self) -> Result<bool>;

    /// Persist the activation flag. Subscribers hear about it like any other edit.
    fn set_activated(&self, activated: bool) -> Result<()>;

    /// Push policy, window and activation edits to `events`, replacing any
    /// previous subscriber.
    fn subscribe(&self, events: EventSender) -> Result<()>;

    fn unsubscribe(&self) -> Result<()>;
}

/// Source of per-user controllers and the user-setup flag.
pub trait SettingsStore: Send + Sync {
    fn controller_for(&self, user: UserId) -> Result<Arc<dyn Controller>>;

    fn is_user_setup_complete(&self, user: UserId) -> Result<bool>;

    /// Send [`Event::UserSetupChanged`] to `events` when `user`'s setup flag changes.
    fn watch_user_setup(&self, user: UserId, events: EventSender) -> Result<()>;

    fn unwatch_user_setup(&self, user: UserId) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Settings {
    policy: Policy,
    start: LocalTime,
    end: LocalTime,
    activated: bool,
}

#[derive(Default)]
struct Inner {
    settings: Option<Settings>,
    subscriber: Option<EventSender>,
}

/// In-memory controller. Every setter notifies the subscriber only when the
/// value actually changed.
pub struct SettingsController {
    inner: Mutex<Inner>,
}

impl SettingsController {
    pub fn from_config(config: &Config) -> Result<Self> {
        let (start, end) = config.fixed_window()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                settings: Some(Settings {
                    policy: config.policy(),
                    start,
                    end,
                    activated: config.activated(),
                }),
                subscriber: None,
            }),
        })
    }

    pub fn set_policy(&self, policy: Policy) {
        self.update(|s| {
            if s.policy == policy {
                return None;
            }
            s.policy = policy;
            Some(Event::PolicyChanged(policy))
        });
    }

    pub fn set_window_start(&self, start: LocalTime) {
        self.update(|s| {
            if s.start == start {
                return None;
            }
            s.start = start;
            Some(Event::WindowStartChanged(start))
        });
    }

    pub fn set_window_end(&self, end: LocalTime) {
        self.update(|s| {
            if s.end == end {
                return None;
            }
            s.end = end;
            Some(Event::WindowEndChanged(end))
        });
    }

    pub fn set_fixed_window(&self, start: LocalTime, end: LocalTime) {
        self.set_window_start(start);
        self.set_window_end(end);
    }

    /// Apply a reloaded configuration as a series of individual edits.
    ///
    /// The activation flag is left alone: it only seeds the first session.
    pub fn apply_config(&self, config: &Config) -> Result<()> {
        let (start, end) = config.fixed_window()?;
        self.set_fixed_window(start, end);
        self.set_policy(config.policy());
        Ok(())
    }

    /// Make the controller unavailable; every read and write fails from now on.
    pub fn disconnect(&self) {
        self.lock().settings = None;
    }

    pub fn has_subscriber(&self) -> bool {
        self.lock().subscriber.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&Settings) -> T) -> Result<T> {
        let inner = self.lock();
        match &inner.settings {
            Some(settings) => Ok(f(settings)),
            None => anyhow::bail!("settings are unavailable"),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Settings) -> Option<Event>) {
        let mut inner = self.lock();
        let Some(settings) = inner.settings.as_mut() else {
            log_warning!("Settings are unavailable, edit dropped");
            return;
        };
        if let Some(event) = f(settings)
            && let Some(subscriber) = &inner.subscriber
        {
            subscriber.send(event);
        }
    }
}

impl Controller for SettingsController {
    fn policy(&self) -> Result<Policy> {
        self.read(|s| s.policy)
    }

    fn fixed_window(&self) -> Result<(LocalTime, LocalTime)> {
        self.read(|s| (s.start, s.end))
    }

    fn is_activated(&self) -> Result<bool> {
        self.read(|s| s.activated)
    }

    fn set_activated(&self, activated: bool) -> Result<()> {
        let mut inner = self.lock();
        let Some(settings) = inner.settings.as_mut() else {
            anyhow::bail!("settings are unavailable");
        };
        if settings.activated != activated {
            settings.activated = activated;
            if let Some(subscriber) = &inner.subscriber {
                subscriber.send(Event::ActivationChanged(activated));
            }
        }
        Ok(())
    }

    fn subscribe(&self, events: EventSender) -> Result<()> {
        self.lock().subscriber = Some(events);
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        self.lock().subscriber = None;
        Ok(())
    }
}

#[derive(Default)]
struct Registry {
    controllers: HashMap<UserId, Arc<SettingsController>>,
    setup_pending: HashMap<UserId, bool>,
    setup_watchers: HashMap<UserId, EventSender>,
}

/// In-memory settings store. Every user starts from the same configuration and
/// gets a controller of their own on first use.
pub struct SettingsRegistry {
    config: Config,
    registry: Mutex<Registry>,
}

impl SettingsRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// The concrete controller for `user`, created on first use.
    pub fn controller(&self, user: UserId) -> Result<Arc<SettingsController>> {
        let mut registry = self.lock();
        if let Some(controller) = registry.controllers.get(&user) {
            return Ok(controller.clone());
        }
        let controller = Arc::new(SettingsController::from_config(&self.config)?);
        registry.controllers.insert(user, controller.clone());
        Ok(controller)
    }

    /// Controllers created so far, for pushing reloaded settings to every user.
    pub fn controllers(&self) -> Vec<(UserId, Arc<SettingsController>)> {
        let registry = self.lock();
        let mut controllers: Vec<_> = registry
            .controllers
            .iter()
            .map(|(user, controller)| (*user, controller.clone()))
            .collect();
        controllers.sort_by_key(|(user, _)| *user);
        controllers
    }

    /// Mark `user` as still going through setup.
    pub fn begin_user_setup(&self, user: UserId) {
        self.lock().setup_pending.insert(user, true);
    }

    /// Finish setup for `user` and notify its watcher, if any.
    pub fn complete_user_setup(&self, user: UserId) {
        let mut registry = self.lock();
        if registry.setup_pending.insert(user, false) == Some(true)
            && let Some(watcher) = registry.setup_watchers.get(&user)
        {
            watcher.send(Event::UserSetupChanged(user));
        }
    }

    pub fn setup_watcher_count(&self) -> usize {
        self.lock().setup_watchers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for SettingsRegistry {
    fn controller_for(&self, user: UserId) -> Result<Arc<dyn Controller>> {
        let controller: Arc<dyn Controller> = self.controller(user)?;
        Ok(controller)
    }

    fn is_user_setup_complete(&self, user: UserId) -> Result<bool> {
        Ok(!self.lock().setup_pending.get(&user).copied().unwrap_or(false))
    }

    fn watch_user_setup(&self, user: UserId, events: EventSender) -> Result<()> {
        self.lock().setup_watchers.insert(user, events);
        Ok(())
    }

    fn unwatch_user_setup(&self, user: UserId) -> Result<()> {
        self.lock().setup_watchers.remove(&user);
        Ok(())
    }
}
