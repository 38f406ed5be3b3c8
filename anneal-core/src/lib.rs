//! Board-agnostic process logic for the furnace controller
//!
//! This crate contains everything that does not depend on a particular
//! board or instrument wiring:
//!
//! - Recipe and process configuration types with validation
//! - Instrument traits (furnace, flow controller, recipe store)
//! - Safety verdicts for power-off decisions
//! - Phase state machine and the stage sequencer driving it
//! - Sampler and the append-only monitoring series

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod safety;
pub mod sampler;
pub mod sequencer;
pub mod state;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
