//! Phase state machine for a furnace run
//!
//! The transition table is explicit, finite and deterministic. Whether an
//! event may fire (device commands confirmed, timers elapsed) is decided
//! by the sequencer before it calls [`Phase::transition`].

pub mod events;
pub mod machine;

pub use events::Event;
pub use machine::{Phase, RunEnd};
