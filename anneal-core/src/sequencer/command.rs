//! Device commands and the retrying executor

use anneal_protocol::FlowRange;
use embedded_hal_async::delay::DelayNs;

use crate::config::RetryPolicy;
use crate::traits::{FlowController, Furnace, FurnaceMode, LinkError};

/// Instrument a command goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Device {
    Furnace,
    FlowController,
}

/// One write to an instrument
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceCommand {
    FurnaceSetpoint(i16),
    FurnaceMode(FurnaceMode),
    FlowRange(FlowRange),
    FlowSetpoint(f32),
    OpenValve,
    CloseValve,
}

impl DeviceCommand {
    /// Instrument this command is sent to
    pub fn device(&self) -> Device {
        match self {
            DeviceCommand::FurnaceSetpoint(_) | DeviceCommand::FurnaceMode(_) => Device::Furnace,
            _ => Device::FlowController,
        }
    }
}

/// A command that could not be confirmed
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceFault {
    pub device: Device,
    /// Command that failed; `None` when reads kept failing
    pub command: Option<DeviceCommand>,
    /// Error of the last attempt
    pub error: LinkError,
    /// Attempts made before giving up
    pub attempts: u8,
}

/// Both instrument links plus the delay used for retry backoff
pub struct Instruments<F, M, D> {
    pub furnace: F,
    pub flow: M,
    pub delay: D,
}

impl<F, M, D> Instruments<F, M, D>
where
    F: Furnace,
    M: FlowController,
    D: DelayNs,
{
    pub fn new(furnace: F, flow: M, delay: D) -> Self {
        Self {
            furnace,
            flow,
            delay,
        }
    }

    /// Send one command once
    pub async fn execute(&mut self, command: DeviceCommand) -> Result<(), LinkError> {
        match command {
            DeviceCommand::FurnaceSetpoint(t) => self.furnace.set_setpoint(t).await,
            DeviceCommand::FurnaceMode(mode) => self.furnace.set_mode(mode).await,
            DeviceCommand::FlowRange(range) => self.flow.set_range(range).await,
            DeviceCommand::FlowSetpoint(sccm) => self.flow.set_flow_setpoint(sccm).await,
            DeviceCommand::OpenValve => self.flow.open_valve().await,
            DeviceCommand::CloseValve => self.flow.close_valve().await,
        }
    }

    /// Send a command until it is confirmed or the policy runs out
    ///
    /// Errors that cannot clear on their own ([`LinkError::Range`]) fail
    /// after the first attempt.
    pub async fn execute_with_retry(
        &mut self,
        command: DeviceCommand,
        policy: &RetryPolicy,
    ) -> Result<(), DeviceFault> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match self.execute(command).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if !error.is_retryable() || attempt >= max_attempts {
                return Err(DeviceFault {
                    device: command.device(),
                    command: Some(command),
                    error,
                    attempts: attempt,
                });
            }
            attempt += 1;
            self.delay.delay_ms(policy.backoff_before(attempt)).await;
        }
    }

    /// Send commands in order, stopping at the first that fails
    pub async fn execute_all(
        &mut self,
        commands: &[DeviceCommand],
        policy: &RetryPolicy,
    ) -> Result<(), DeviceFault> {
        for &command in commands {
            self.execute_with_retry(command, policy).await?;
        }
        Ok(())
    }
}
