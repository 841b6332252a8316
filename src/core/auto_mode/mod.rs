//! Automatic activation engines.
//!
//! An engine decides when night display should flip and keeps whatever
//! registrations it needs to hear about it (time broadcasts and an alarm for
//! the fixed window, a listener for twilight). Engines never touch the
//! activation themselves: every entry point returns the activation it wants,
//! and the service decides what to do with it.
//!
//! The two variants live in one closed enum. A policy change drops the old
//! engine (releasing its registrations) and builds a new one from scratch, so
//! no state survives a switch between variants.

pub mod fixed_window;
pub mod twilight;

use std::sync::Arc;

use crate::io::Token;
use crate::io::alarm::AlarmFacility;
use crate::io::events::EventSender;
use crate::io::time_change::TimeChangeBroadcast;
use crate::io::twilight::TwilightSource;
use crate::time::{Clock, LocalTime};

pub use fixed_window::FixedWindowMode;
pub use twilight::TwilightMode;

/// Collaborators shared by every engine, owned by the service.
#[derive(Clone)]
pub struct EngineEnv {
    pub clock: Arc<dyn Clock>,
    pub alarms: Arc<dyn AlarmFacility>,
    pub twilight: Arc<dyn TwilightSource>,
    pub time_changes: Arc<dyn TimeChangeBroadcast>,
    /// Where registrations deliver their events.
    pub events: EventSender,
}

/// The activation the service has applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    /// Nothing applied yet in this session.
    #[default]
    Unknown,
    On,
    Off,
}

impl ActivationState {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            ActivationState::Unknown => None,
            ActivationState::On => Some(true),
            ActivationState::Off => Some(false),
        }
    }

    pub fn is_known(self) -> bool {
        self != ActivationState::Unknown
    }
}

impl From<bool> for ActivationState {
    fn from(activated: bool) -> Self {
        if activated {
            ActivationState::On
        } else {
            ActivationState::Off
        }
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationState::Unknown => write!(f, "unknown"),
            ActivationState::On => write!(f, "on"),
            ActivationState::Off => write!(f, "off"),
        }
    }
}

/// The engine for the active policy.
#[derive(Debug)]
pub enum AutoMode {
    FixedWindow(FixedWindowMode),
    Twilight(TwilightMode),
}

impl AutoMode {
    pub fn fixed_window(start: LocalTime, end: LocalTime, env: &EngineEnv) -> Self {
        AutoMode::FixedWindow(FixedWindowMode::new(start, end, env.alarms.clone()))
    }

    pub fn twilight() -> Self {
        AutoMode::Twilight(TwilightMode::new())
    }

    /// Subscribe to the engine's inputs and compute the activation once.
    pub fn start(&mut self, env: &EngineEnv, current: ActivationState) -> Option<bool> {
        match self {
            AutoMode::FixedWindow(mode) => mode.start(env, current),
            AutoMode::Twilight(mode) => mode.start(env, current),
        }
    }

    /// Release every registration and forget what the engine remembered.
    pub fn stop(&mut self) {
        match self {
            AutoMode::FixedWindow(mode) => mode.stop(),
            AutoMode::Twilight(mode) => mode.stop(),
        }
    }

    /// The service applied a new activation, whatever asked for it.
    pub fn on_activated(&mut self, activated: bool, env: &EngineEnv) {
        match self {
            AutoMode::FixedWindow(mode) => mode.on_activated(activated, env),
            AutoMode::Twilight(_) => {}
        }
    }

    /// A requested activation could not be applied; bring any pending wake-up
    /// back in line with what is actually applied.
    pub fn on_request_failed(&mut self, env: &EngineEnv, current: ActivationState) {
        match self {
            AutoMode::FixedWindow(mode) => mode.schedule_next(env, current.as_bool()),
            AutoMode::Twilight(_) => {}
        }
    }

    /// The wall clock was set or the timezone changed.
    pub fn on_time_changed(
        &mut self,
        env: &EngineEnv,
        current: ActivationState,
    ) -> Option<bool> {
        match self {
            AutoMode::FixedWindow(mode) => mode.recompute(env, current),
            AutoMode::Twilight(_) => None,
        }
    }

    pub fn on_alarm(
        &mut self,
        token: Token,
        env: &EngineEnv,
        current: ActivationState,
    ) -> Option<bool> {
        match self {
            AutoMode::FixedWindow(mode) => mode.on_alarm(token, env, current),
            AutoMode::Twilight(_) => None,
        }
    }

    pub fn on_twilight_changed(
        &mut self,
        env: &EngineEnv,
        current: ActivationState,
    ) -> Option<bool> {
        match self {
            AutoMode::Twilight(mode) => mode.recompute(env, current),
            AutoMode::FixedWindow(_) => None,
        }
    }

    /// The fixed window was edited; `start` and `end` are both current.
    pub fn on_window_changed(
        &mut self,
        start: LocalTime,
        end: LocalTime,
        env: &EngineEnv,
        current: ActivationState,
    ) -> Option<bool> {
        match self {
            AutoMode::FixedWindow(mode) => mode.set_window(start, end, env, current),
            AutoMode::Twilight(_) => None,
        }
    }
}
