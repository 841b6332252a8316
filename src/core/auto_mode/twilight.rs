//! Twilight: night display follows the day/night state of the twilight source.
//!
//! Only a change of the day/night flag produces a request; repeated reports of
//! the same state are ignored.

use super::{ActivationState, EngineEnv};
use crate::io::{ListenerGuard, Token};

#[derive(Debug, Default)]
pub struct TwilightMode {
    last_known_is_night: bool,
    listener: Option<ListenerGuard>,
}

impl TwilightMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_known_is_night(&self) -> bool {
        self.last_known_is_night
    }

    pub fn start(&mut self, env: &EngineEnv, current: ActivationState) -> Option<bool> {
        let token = Token::next();
        match env.twilight.register_listener(token, env.events.clone()) {
            Ok(()) => {
                let twilight = env.twilight.clone();
                self.listener = Some(ListenerGuard::new("twilight listener", move || {
                    twilight.unregister_listener(token)
                }));
            }
            Err(e) => {
                log_warning!("Failed to register twilight listener: {e:#}");
            }
        }

        self.recompute(env, current)
    }

    pub fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.release();
        }
        self.last_known_is_night = false;
    }

    pub fn recompute(&mut self, env: &EngineEnv, current: ActivationState) -> Option<bool> {
        let state = match env.twilight.current_state() {
            Ok(Some(state)) => state,
            Ok(None) => {
                log_debug!("No twilight state available yet");
                return None;
            }
            Err(e) => {
                log_warning!("Failed to read twilight state: {e:#}");
                return None;
            }
        };

        if state.is_night == self.last_known_is_night {
            return None;
        }
        self.last_known_is_night = state.is_night;
        log_debug!("Twilight is now {}", if state.is_night { "night" } else { "day" });

        (current.as_bool() != Some(state.is_night)).then_some(state.is_night)
    }
}
