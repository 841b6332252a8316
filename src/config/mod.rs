//! Configuration for night-display.
//!
//! Settings live in `night-display.toml`, searched in `$XDG_CONFIG_HOME/night-display/`
//! unless a directory was given with `--config`. A missing file is created with
//! defaults on first load.
//!
//! ```toml
//! #[Automatic mode]
//! auto_mode = "custom"        # "off", "custom" (fixed window) or "twilight"
//! custom_start = "22:00"      # Fixed window start (HH:MM)
//! custom_end = "06:00"        # Fixed window end (HH:MM)
//!
//! #[Activation]
//! activated = false           # Manual activation flag at startup
//!
//! #[Clock]
//! timezone = "UTC"            # IANA timezone for the wall clock
//!
//! #[Twilight]
//! sunset = "19:00"            # Start of night for the twilight mode
//! sunrise = "07:00"           # End of night for the twilight mode
//! ```
//!
//! Loading validates the whole file: unknown modes, unparseable times, unknown
//! timezones and an empty window (`custom_start == custom_end`) are rejected.
//! At runtime the same settings are served through [`controller::SettingsController`],
//! which pushes every edit to the service as an event.

pub mod builder;
pub mod controller;
pub mod loading;
pub mod validation;
pub mod watcher;

use anyhow::Result;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;

use crate::common::constants::*;
use crate::common::utils::private_path;
use crate::time::LocalTime;
use crate::time::source::parse_timezone;

pub use builder::create_default_config;
pub use controller::{Controller, SettingsController, SettingsRegistry, SettingsStore};
pub use loading::{get_config_path, load, load_from_path, set_config_dir};
pub use watcher::{ReloadTargets, start_config_watcher};

/// How night display is switched on and off automatically.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Only manual activation.
    #[default]
    Off,
    /// On inside a fixed daily window.
    #[serde(alias = "custom")]
    FixedWindow,
    /// On between sunset and sunrise.
    Twilight,
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::Off => write!(f, "off"),
            Policy::FixedWindow => write!(f, "fixed window"),
            Policy::Twilight => write!(f, "twilight"),
        }
    }
}

/// Contents of `night-display.toml`. Missing fields take the defaults from
/// `common::constants`.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    pub auto_mode: Option<Policy>,
    pub custom_start: Option<String>, // HH:MM
    pub custom_end: Option<String>,   // HH:MM
    pub activated: Option<bool>,
    pub timezone: Option<String>, // IANA name
    pub sunset: Option<String>,
    pub sunrise: Option<String>,
}

impl Config {
    pub fn policy(&self) -> Policy {
        self.auto_mode.unwrap_or_default()
    }

    /// The fixed window as `(start, end)`.
    pub fn fixed_window(&self) -> Result<(LocalTime, LocalTime)> {
        let start = self
            .custom_start
            .as_deref()
            .unwrap_or(DEFAULT_CUSTOM_START)
            .parse()?;
        let end = self
            .custom_end
            .as_deref()
            .unwrap_or(DEFAULT_CUSTOM_END)
            .parse()?;
        Ok((start, end))
    }

    pub fn activated(&self) -> bool {
        self.activated.unwrap_or(DEFAULT_ACTIVATED)
    }

    pub fn timezone(&self) -> Result<Tz> {
        parse_timezone(self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE))
    }

    /// Sunset and sunrise for the fixed twilight source, as `(sunset, sunrise)`.
    pub fn twilight_boundaries(&self) -> Result<(LocalTime, LocalTime)> {
        let sunset = self.sunset.as_deref().unwrap_or(DEFAULT_SUNSET).parse()?;
        let sunrise = self.sunrise.as_deref().unwrap_or(DEFAULT_SUNRISE).parse()?;
        Ok((sunset, sunrise))
    }

    pub fn log_config(&self, path: Option<&Path>) {
        match path {
            Some(path) => log_block_start!("Loaded configuration from {}", private_path(path)),
            None => log_block_start!("Using built-in configuration"),
        }

        let policy = self.policy();
        log_indented!("Automatic mode: {policy}");

        match policy {
            Policy::Off => {}
            Policy::FixedWindow => {
                if let Ok((start, end)) = self.fixed_window() {
                    log_indented!("Window: {start} to {end}");
                }
            }
            Policy::Twilight => {
                if let Ok((sunset, sunrise)) = self.twilight_boundaries() {
                    log_indented!("Night from {sunset} to {sunrise}");
                }
            }
        }

        log_indented!(
            "Timezone: {}",
            self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
        );
        if self.activated() {
            log_indented!("Starts activated");
        }
    }
}
