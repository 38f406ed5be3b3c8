//! Wire protocols for the Anneal furnace controller
//!
//! Three independent codecs live here, all pure and allocation-free:
//!
//! - [`up150`] - Yokogawa UP150 program controller, PC-Link ASCII over RS-485
//! - [`mks647b`] - MKS 647B mass-flow controller, ASCII over RS-232
//! - [`frame`] / [`messages`] - binary console link to the operator terminal
//!
//! Console frames use a simple binary layout:
//! ```text
//! ┌───────┬────────┬──────┬─────────────┬──────────┐
//! │ START │ LENGTH │ TYPE │ PAYLOAD     │ CHECKSUM │
//! │ 1B    │ 1B     │ 1B   │ 0–64B       │ 1B       │
//! └───────┴────────┴──────┴─────────────┴──────────┘
//! ```
//!
//! The console only observes and requests; all sequencing stays on the
//! controller.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod frame;
pub mod messages;
pub mod mks647b;
pub mod up150;

pub use frame::{Frame, FrameError, FrameParser, FRAME_START, MAX_PAYLOAD_SIZE};
pub use messages::{ConsoleCommand, ControllerMessage, MessageError};
pub use mks647b::{FlowRange, FlowUnit};
pub use up150::{ModeCode, Register};
