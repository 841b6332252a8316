//! Time handling: wall-clock sources, time-of-day values and the simulator.
//!
//! - `source`: the [`Clock`](source::Clock) trait with system and simulated clocks
//! - `local_time`: [`LocalTime`](local_time::LocalTime) and window arithmetic
//! - `simulate`: drives the scheduler through a span of simulated time

pub mod local_time;
pub mod simulate;
pub mod source;

pub use local_time::{LocalTime, window_contains};
pub use source::{Clock, SimulatedClock, SystemClock};
