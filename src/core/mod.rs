//! The night display service.
//!
//! [`NightDisplayService`] owns the activation decision. It binds to one user
//! session at a time, builds the engine for that user's policy, and applies
//! whatever the engine (or a manual toggle) decides to the color transform
//! sink. All input arrives as [`Event`]s on one queue and is handled one event
//! at a time, so the service itself needs no locking.
//!
//! Lifecycle:
//!
//! - **Idle**: no user bound, boot not completed, or user setup still running.
//! - **Running**: controller bound, engine built for the current policy (none
//!   for `off`), activation known.
//! - Back to idle on session stop, user switch or shutdown: engine stopped,
//!   controller released, activation forgotten.
//!
//! Every collaborator failure is logged and treated as "nothing changed".

pub mod auto_mode;

use anyhow::Result;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::backend::ColorTransformSink;
use crate::config::validation::validate_window;
use crate::config::{Controller, Policy, SettingsStore};
use crate::io::events::{Event, EventLoop, UserId};
use crate::time::LocalTime;

pub use auto_mode::{ActivationState, AutoMode, EngineEnv};

/// Everything the service needs, bundled to keep `new` readable.
pub struct ServiceParams {
    pub settings: Arc<dyn SettingsStore>,
    pub sink: Arc<dyn ColorTransformSink>,
    pub env: EngineEnv,
}

/// A controller subscribed to the service's queue. Unsubscribes when dropped.
struct ControllerBinding {
    controller: Arc<dyn Controller>,
}

impl Drop for ControllerBinding {
    fn drop(&mut self) {
        if let Err(e) = self.controller.unsubscribe() {
            log_warning!("Failed to unsubscribe from settings: {e:#}");
        }
    }
}

pub struct NightDisplayService {
    settings: Arc<dyn SettingsStore>,
    sink: Arc<dyn ColorTransformSink>,
    env: EngineEnv,
    current_user: Option<UserId>,
    boot_completed: bool,
    /// A one-shot user-setup watch is registered for `current_user`
    awaiting_setup: bool,
    controller: Option<ControllerBinding>,
    policy: Policy,
    activation: ActivationState,
    auto_mode: Option<AutoMode>,
}

impl NightDisplayService {
    pub fn new(params: ServiceParams) -> Self {
        Self {
            settings: params.settings,
            sink: params.sink,
            env: params.env,
            current_user: None,
            boot_completed: false,
            awaiting_setup: false,
            controller: None,
            policy: Policy::Off,
            activation: ActivationState::Unknown,
            auto_mode: None,
        }
    }

    pub fn activation(&self) -> ActivationState {
        self.activation
    }

    /// The policy read from the bound controller, `off` while idle.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn auto_mode(&self) -> Option<&AutoMode> {
        self.auto_mode.as_ref()
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.current_user
    }

    /// Whether a controller is bound, i.e. the service is past the idle state.
    pub fn is_running(&self) -> bool {
        self.controller.is_some()
    }

    /// Process events until the queue closes or a shutdown arrives.
    pub fn run(&mut self, events: &EventLoop) -> Result<()> {
        while let Some(event) = events.next_event() {
            if !self.handle_event(event) {
                break;
            }
        }
        Ok(())
    }

    /// Handle every event already queued on `receiver`. Returns false once a
    /// shutdown has been handled.
    pub fn process_pending(&mut self, receiver: &Receiver<Event>) -> bool {
        while let Ok(event) = receiver.try_recv() {
            if !self.handle_event(event) {
                return false;
            }
        }
        true
    }

    /// Handle one event. Returns false when the service should stop.
    pub fn handle_event(&mut self, event: Event) -> bool {
        log_debug!("Event: {event:?}");

        match event {
            Event::BootCompleted => self.on_boot_completed(),
            Event::SessionStarted(user) => {
                if self.current_user.is_none() {
                    self.on_user_changed(Some(user));
                }
            }
            Event::SessionSwitched(user) => self.on_user_changed(Some(user)),
            Event::SessionStopped(user) => {
                if self.current_user == Some(user) {
                    self.on_user_changed(None);
                }
            }
            Event::UserSetupChanged(user) => self.on_user_setup_changed(user),
            Event::PolicyChanged(_) => {
                if let Some(policy) = self.read_controller("policy", |c| c.policy()) {
                    self.on_policy_changed(policy);
                }
            }
            Event::WindowStartChanged(_) | Event::WindowEndChanged(_) => self.on_window_changed(),
            Event::ActivationChanged(_) => {
                // The queued value may already be stale; the controller has the latest
                if let Some(activated) = self.read_controller("activation", |c| c.is_activated()) {
                    self.apply_activation(activated);
                }
            }
            Event::TimeSet | Event::TimezoneChanged => {
                self.dispatch(|mode, env, current| mode.on_time_changed(env, current));
            }
            Event::TwilightChanged => {
                self.dispatch(|mode, env, current| mode.on_twilight_changed(env, current));
            }
            Event::AlarmFired(token) => {
                self.dispatch(|mode, env, current| mode.on_alarm(token, env, current));
            }
            Event::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn on_boot_completed(&mut self) {
        self.boot_completed = true;
        if self.current_user.is_some() && !self.awaiting_setup && self.controller.is_none() {
            self.set_up();
        }
    }

    fn on_user_changed(&mut self, user: Option<UserId>) {
        if let Some(previous) = self.current_user {
            if self.awaiting_setup {
                self.stop_setup_watch(previous);
            } else if self.boot_completed {
                self.tear_down();
            }
        }

        self.current_user = user;

        let Some(user) = user else {
            return;
        };
        match self.settings.is_user_setup_complete(user) {
            Ok(true) => {
                if self.boot_completed {
                    self.set_up();
                }
            }
            Ok(false) => match self.settings.watch_user_setup(user, self.env.events.clone()) {
                Ok(()) => {
                    log_block_start!("Waiting for user {user} to finish setup");
                    self.awaiting_setup = true;
                }
                Err(e) => log_warning!("Failed to watch setup of user {user}: {e:#}"),
            },
            Err(e) => log_warning!("Failed to read setup state of user {user}: {e:#}"),
        }
    }

    fn on_user_setup_changed(&mut self, user: UserId) {
        if !self.awaiting_setup || self.current_user != Some(user) {
            return;
        }
        match self.settings.is_user_setup_complete(user) {
            Ok(true) => {
                self.stop_setup_watch(user);
                if self.boot_completed {
                    self.set_up();
                }
            }
            Ok(false) => {}
            Err(e) => log_warning!("Failed to read setup state of user {user}: {e:#}"),
        }
    }

    fn stop_setup_watch(&mut self, user: UserId) {
        if let Err(e) = self.settings.unwatch_user_setup(user) {
            log_warning!("Failed to stop watching setup of user {user}: {e:#}");
        }
        self.awaiting_setup = false;
    }

    fn set_up(&mut self) {
        let Some(user) = self.current_user else {
            return;
        };
        let controller = match self.settings.controller_for(user) {
            Ok(controller) => controller,
            Err(e) => {
                log_warning!("Failed to open settings for user {user}: {e:#}");
                return;
            }
        };
        if let Err(e) = controller.subscribe(self.env.events.clone()) {
            log_warning!("Failed to subscribe to settings of user {user}: {e:#}");
            log_indented!("Settings edits will not be noticed");
        }
        self.controller = Some(ControllerBinding { controller });

        log_block_start!("Night display running for user {user}");

        let policy = self
            .read_controller("policy", |c| c.policy())
            .unwrap_or(Policy::Off);
        self.on_policy_changed(policy);

        if !self.activation.is_known()
            && let Some(activated) = self.read_controller("activation", |c| c.is_activated())
        {
            self.apply_activation(activated);
        }
    }

    fn tear_down(&mut self) {
        self.controller = None;
        if let Some(mut mode) = self.auto_mode.take() {
            mode.stop();
        }
        self.policy = Policy::Off;
        self.activation = ActivationState::Unknown;
    }

    fn shutdown(&mut self) {
        if let Some(user) = self.current_user
            && self.awaiting_setup
        {
            self.stop_setup_watch(user);
        }
        self.tear_down();
        self.current_user = None;
        log_block_start!("Night display stopped");
    }

    fn on_policy_changed(&mut self, policy: Policy) {
        if let Some(mut old) = self.auto_mode.take() {
            old.stop();
        }
        self.policy = policy;

        let mut mode = match policy {
            Policy::Off => None,
            Policy::FixedWindow => self
                .read_window()
                .map(|(start, end)| AutoMode::fixed_window(start, end, &self.env)),
            Policy::Twilight => Some(AutoMode::twilight()),
        };
        log_decorated!("Automatic mode: {policy}");

        let request = mode
            .as_mut()
            .and_then(|mode| mode.start(&self.env, self.activation));
        self.auto_mode = mode;

        if let Some(activated) = request {
            self.request_activation(activated);
        }
    }

    fn on_window_changed(&mut self) {
        if self.policy != Policy::FixedWindow || self.controller.is_none() {
            return;
        }

        let Some((start, end)) = self.read_window() else {
            if let Some(mut mode) = self.auto_mode.take() {
                mode.stop();
            }
            return;
        };

        let current_window = match &self.auto_mode {
            Some(AutoMode::FixedWindow(mode)) => mode.window(),
            _ => {
                // Recovering from an empty window
                self.on_policy_changed(Policy::FixedWindow);
                return;
            }
        };

        if current_window != (start, end) {
            self.dispatch(|mode, env, current| mode.on_window_changed(start, end, env, current));
        }
    }

    /// The fixed window, or `None` when it cannot be used and the policy
    /// behaves as `off`.
    fn read_window(&self) -> Option<(LocalTime, LocalTime)> {
        let (start, end) = self.read_controller("fixed window", |c| c.fixed_window())?;
        match validate_window(start, end) {
            Ok(()) => Some((start, end)),
            Err(e) => {
                log_warning!("{e:#}");
                log_indented!("Automatic mode is off until the window is changed");
                None
            }
        }
    }

    fn read_controller<T>(
        &self,
        what: &str,
        read: impl FnOnce(&dyn Controller) -> Result<T>,
    ) -> Option<T> {
        let binding = self.controller.as_ref()?;
        match read(binding.controller.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                log_warning!("Failed to read {what}: {e:#}");
                None
            }
        }
    }

    /// Run an engine entry point and act on what it asks for.
    fn dispatch(
        &mut self,
        f: impl FnOnce(&mut AutoMode, &EngineEnv, ActivationState) -> Option<bool>,
    ) {
        let Some(mode) = self.auto_mode.as_mut() else {
            return;
        };
        if let Some(activated) = f(mode, &self.env, self.activation) {
            self.request_activation(activated);
        }
    }

    /// Store an engine's decision in the settings, then apply it.
    fn request_activation(&mut self, activated: bool) {
        let stored = match &self.controller {
            Some(binding) => binding.controller.set_activated(activated),
            None => return,
        };
        match stored {
            Ok(()) => self.apply_activation(activated),
            Err(e) => {
                log_warning!("Failed to store activation: {e:#}");
                if let Some(mode) = self.auto_mode.as_mut() {
                    mode.on_request_failed(&self.env, self.activation);
                }
            }
        }
    }

    fn apply_activation(&mut self, activated: bool) {
        if self.activation.as_bool() == Some(activated) {
            return;
        }

        log_block_start!(
            "Turning {} night display",
            if activated { "on" } else { "off" }
        );
        self.activation = activated.into();

        if let Some(mode) = self.auto_mode.as_mut() {
            mode.on_activated(activated, &self.env);
        }
        self.sink.apply_night_matrix(activated);
    }
}

impl Drop for NightDisplayService {
    fn drop(&mut self) {
        if let Some(user) = self.current_user
            && self.awaiting_setup
        {
            self.stop_setup_watch(user);
        }
    }
}
