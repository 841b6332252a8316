//! # night-display
//!
//! Library behind the `night-display` binary: a scheduler that decides when the
//! display's night tint is on, either inside a fixed daily window or between
//! sunset and sunrise.
//!
//! ## Architecture
//!
//! - **Service**: [`core::NightDisplayService`] binds to a user session, builds
//!   the engine for the configured policy and applies its decisions
//! - **Engines**: [`core::AutoMode`], the fixed-window and twilight policies
//! - **Collaborators**: `io` holds the boundaries (alarms, twilight, time
//!   broadcasts, signals) and the event queue they all deliver into
//! - **Settings**: `config` loads `night-display.toml` and exposes it through
//!   the per-user controller, with hot reload
//! - **Output**: `backend` holds the color transform sink
//! - **Time**: `time` holds clocks, local wall-clock times and the simulator

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod backend;
pub mod common;
pub mod config;
pub mod core;
pub mod io;
pub mod time;

#[cfg(any(test, feature = "testing-support"))]
pub mod testing;
