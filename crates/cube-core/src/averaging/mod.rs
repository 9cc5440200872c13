//! Moving averages over raw sensor readings
//!
//! Raw readings arrive at the poll rate (about once a second). Each sensor
//! keeps two windows:
//!
//! - **Fast**: ~10 s, feeds the fast history ring
//! - **Slow**: ~5 min, feeds the slow history ring
//!
//! A window's output is the arithmetic mean of the valid readings seen since
//! its last flush. Invalid readings are skipped without touching the window
//! timer.

mod engine;
mod window;

pub use engine::{LiveReadings, MovingAverageEngine};
pub use window::{AverageWindow, DualAverage, Flushed, MeanAccumulator};
