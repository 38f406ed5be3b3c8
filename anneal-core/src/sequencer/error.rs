//! Sequencer errors

use core::fmt;

use super::command::{Device, DeviceFault};
use crate::config::RecipeError;
use crate::safety::SafetyVerdict;

/// Errors returned by [`StageSequencer`](super::StageSequencer) operations
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerError {
    /// Recipe failed validation
    InvalidRecipe(RecipeError),
    /// Operation not allowed in the current phase
    InvalidPhase,
    /// Stop requested while the furnace is above the shutdown threshold;
    /// the run is routed through cooling
    UnsafeShutdown(SafetyVerdict),
    /// A device did not confirm a command after all retries
    DeviceUnreachable(DeviceFault),
    /// Flow setpoint rejected by the selected range
    Range(DeviceFault),
    /// Series cannot be cleared while a run is active
    RunActive,
}

impl SequencerError {
    /// Wrap a fault in the variant matching its cause
    pub fn from_fault(fault: DeviceFault) -> Self {
        match fault.error {
            crate::traits::LinkError::Range => SequencerError::Range(fault),
            _ => SequencerError::DeviceUnreachable(fault),
        }
    }
}

impl From<RecipeError> for SequencerError {
    fn from(e: RecipeError) -> Self {
        SequencerError::InvalidRecipe(e)
    }
}

impl From<DeviceFault> for SequencerError {
    fn from(fault: DeviceFault) -> Self {
        Self::from_fault(fault)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Furnace => write!(f, "furnace controller"),
            Device::FlowController => write!(f, "flow controller"),
        }
    }
}

impl fmt::Display for SequencerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerError::InvalidRecipe(e) => write!(f, "invalid recipe: {}", e),
            SequencerError::InvalidPhase => write!(f, "not allowed in current phase"),
            SequencerError::UnsafeShutdown(verdict) => match verdict.blocking_reason {
                Some(reason) => write!(f, "cooling before stop: {}", reason),
                None => write!(f, "cooling before stop"),
            },
            SequencerError::DeviceUnreachable(fault) => write!(
                f,
                "{} unreachable after {} attempts: {}",
                fault.device, fault.attempts, fault.error
            ),
            SequencerError::Range(fault) => write!(f, "{}: {}", fault.device, fault.error),
            SequencerError::RunActive => write!(f, "run in progress"),
        }
    }
}
