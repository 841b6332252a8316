//! Default values and fixed names used throughout night-display.

// # Configuration defaults

pub const DEFAULT_AUTO_MODE: &str = "off";
pub const DEFAULT_CUSTOM_START: &str = "22:00";
pub const DEFAULT_CUSTOM_END: &str = "06:00";
pub const DEFAULT_ACTIVATED: bool = false;
pub const DEFAULT_TIMEZONE: &str = "UTC";

// Boundaries for the built-in twilight stand-in (the simulator and `run` without
// a location service). Not astronomical: fixed local times.
pub const DEFAULT_SUNSET: &str = "19:00";
pub const DEFAULT_SUNRISE: &str = "07:00";

// # Files

pub const APP_DIR_NAME: &str = "night-display";
pub const CONFIG_FILE_NAME: &str = "night-display.toml";

/// Editors often write a file in several steps; changes closer together than
/// this are folded into one reload.
pub const CONFIG_DEBOUNCE_MS: u64 = 500;

// # Scheduling

/// Tag attached to every alarm the fixed-window engine programs.
pub const ALARM_TAG: &str = "NightDisplayService";

/// The user bound by the CLI; the library itself supports any user id.
pub const DEFAULT_USER: u32 = 0;

// # Exit codes

pub const EXIT_FAILURE: i32 = 1;
