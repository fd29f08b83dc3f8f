//! Utility modules: wall clock and jitter sources.

pub mod clock;
pub mod jitter;

pub use clock::{Clock, FixedClock, SystemClock};
pub use jitter::{ClockJitter, Jitter, NoJitter};
