//! Recipe execution
//!
//! The sequencer advances a run through ramp, hold and cooling phases.
//! Every device command goes through [`Instruments`], which retries with
//! backoff and reports a [`DeviceFault`] once the attempts run out.

mod command;
mod error;
mod stage;

pub use command::{Device, DeviceCommand, DeviceFault, Instruments};
pub use error::SequencerError;
pub use stage::{SequencerState, StageSequencer};
