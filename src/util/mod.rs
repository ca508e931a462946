//! Small shared utilities

pub mod time;

pub use time::{Clock, ManualClock, SystemClock};
