//! Structured logging with box-drawing output.
//!
//! Every line the scheduler prints goes through the macros in this module so the
//! output keeps one visual shape:
//!
//! ```text
//! ┏ night-display v0.1.0 ━━╸
//! ┃
//! ┣ Night display running for user 0
//! ┣ Automatic mode: fixed-window
//! ┃
//! ┣ Turning on night display
//! ┣[WARNING] Twilight state unavailable
//! ╹
//! ```
//!
//! ## Conventions
//!
//! - **`log_block_start!`** opens a new conceptual block (state flips, session
//!   arming, configuration reloads). It prints a spacer pipe first.
//! - **`log_decorated!`** continues the current block.
//! - **`log_indented!`** prints nested details under the previous line.
//! - **`log_pipe!`** inserts an empty spacer, mostly before a semantic message
//!   that starts its own block.
//! - **`log_info!`, `log_warning!`, `log_error!`, `log_debug!`** carry a
//!   `[LEVEL]` tag. `log_debug!` only prints when debug output is enabled.
//! - **`log_version!`** and **`log_end!`** frame the whole run.
//!
//! When a simulated clock is registered, each line is prefixed with the
//! simulated wall-clock time so a compressed run stays readable.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::time::source::Clock;

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);
static SIMULATION_CLOCK: OnceLock<Arc<dyn Clock>> = OnceLock::new();

/// Line shapes understood by [`emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Block,
    Decorated,
    Indented,
    Info,
    Warning,
    Error,
    Debug,
}

/// Runtime switches for the logger.
pub struct Log;

impl Log {
    /// Enable or disable all output. Tests use this to keep runs quiet.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Enable or disable `log_debug!` output.
    pub fn set_debug(enabled: bool) {
        DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_debug() -> bool {
        DEBUG_ENABLED.load(Ordering::SeqCst)
    }

    /// Register the simulated clock whose time prefixes every line.
    ///
    /// Only the first registration wins; a process runs at most one simulation.
    pub fn set_simulation_clock(clock: Arc<dyn Clock>) {
        let _ = SIMULATION_CLOCK.set(clock);
    }

    /// Timestamp prefix for the current line, empty outside simulation.
    pub fn timestamp_prefix() -> String {
        match SIMULATION_CLOCK.get() {
            Some(clock) => format!("[{}] ", clock.now().format("%Y-%m-%d %H:%M:%S %Z")),
            None => String::new(),
        }
    }
}

/// Format one message in the given style and write it out.
pub fn emit(style: Style, message: &str) {
    if !Log::is_enabled() || (style == Style::Debug && !Log::is_debug()) {
        return;
    }

    let prefix = Log::timestamp_prefix();
    let line = match style {
        Style::Block => format!("{prefix}┃\n{prefix}┣ {message}\n"),
        Style::Decorated => format!("{prefix}┣ {message}\n"),
        Style::Indented => format!("{prefix}┃   {message}\n"),
        Style::Info => format!("{prefix}┣[\x1b[32mINFO\x1b[0m] {message}\n"),
        Style::Warning => format!("{prefix}┣[\x1b[33mWARNING\x1b[0m] {message}\n"),
        Style::Error => format!("{prefix}┣[\x1b[31mERROR\x1b[0m] {message}\n"),
        Style::Debug => format!("{prefix}┣[\x1b[36mDEBUG\x1b[0m] {message}\n"),
    };
    write_output(&line);
}

/// Write raw text to stdout. Public for the framing macros.
pub fn write_output(text: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_styled {
    ($style:ident, $fmt:literal $($arg:tt)*) => {
        $crate::logger::emit($crate::logger::Style::$style, &format!($fmt $($arg)*))
    };
    ($style:ident, $expr:expr) => {
        $crate::logger::emit($crate::logger::Style::$style, &$expr.to_string())
    };
}

/// Start a new block of related lines.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => { $crate::__log_styled!(Block, $($arg)+) };
}

/// Continue the current block.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => { $crate::__log_styled!(Decorated, $($arg)+) };
}

/// Nested detail under the previous line.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => { $crate::__log_styled!(Indented, $($arg)+) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::__log_styled!(Info, $($arg)+) };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => { $crate::__log_styled!(Warning, $($arg)+) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::__log_styled!(Error, $($arg)+) };
}

/// Debug line, printed only after `Log::set_debug(true)`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::__log_styled!(Debug, $($arg)+) };
}

/// Empty spacer line.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let prefix = $crate::logger::Log::timestamp_prefix();
            $crate::logger::write_output(&format!("{prefix}┃\n"));
        }
    }};
}

/// Application header.
#[macro_export]
macro_rules! log_version {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let version = env!("CARGO_PKG_VERSION");
            $crate::logger::write_output(&format!("┏ night-display v{version} ━━╸\n"));
        }
    }};
}

/// Final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let prefix = $crate::logger::Log::timestamp_prefix();
            $crate::logger::write_output(&format!("{prefix}╹\n"));
        }
    }};
}
