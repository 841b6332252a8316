//! Color transform output.
//!
//! The scheduler only decides whether night display is on. Applying the tint is
//! the job of a [`ColorTransformSink`], which receives the on/off decision and
//! installs or clears [`NIGHT_MATRIX`]. Sinks must be idempotent and must not
//! block; the service only calls them when the decision actually changes.

/// Column-major 4×4 color transform applied to display output.
pub type ColorMatrix = [f32; 16];

/// Night display tint, roughly a 3400K white point.
pub const NIGHT_MATRIX: ColorMatrix = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 0.754, 0.0, 0.0, //
    0.0, 0.0, 0.516, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// The matrix to install for a decision, `None` meaning "clear the transform".
pub fn night_matrix(enabled: bool) -> Option<&'static ColorMatrix> {
    enabled.then_some(&NIGHT_MATRIX)
}

/// Receiver of the night display decision.
///
/// Implementations must tolerate being called with the same value twice and
/// must return promptly.
#[cfg_attr(test, mockall::automock)]
pub trait ColorTransformSink: Send + Sync {
    /// Install the night matrix when `enabled`, clear it otherwise.
    fn apply_night_matrix(&self, enabled: bool);

    fn sink_name(&self) -> &'static str {
        "color transform"
    }
}

/// Sink that reports the matrix through the logger.
///
/// Used by the binary, which has no compositor connection of its own.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl ColorTransformSink for LoggingSink {
    fn apply_night_matrix(&self, enabled: bool) {
        match night_matrix(enabled) {
            Some(matrix) => {
                log_decorated!(
                    "Night matrix applied: diag({}, {}, {}, {})",
                    matrix[0],
                    matrix[5],
                    matrix[10],
                    matrix[15]
                );
            }
            None => {
                log_decorated!("Night matrix cleared");
            }
        }
    }

    fn sink_name(&self) -> &'static str {
        "log"
    }
}
