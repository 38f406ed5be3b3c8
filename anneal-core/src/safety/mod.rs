//! Safety verdicts
//!
//! Decides whether the furnace may be powered off or must cool first.

pub mod monitor;

pub use monitor::{BlockingReason, SafetyMonitor, SafetyVerdict};
