//! Utility Module
//!
//! - [`time`]: frame clock and the CPU stopwatch used by pass statistics

pub mod time;

pub use time::{Stopwatch, Timer};
