//! Furnace controller trait

use core::future::Future;

use super::LinkError;

/// Furnace operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FurnaceMode {
    /// Outputs off
    Stop,
    /// Following the commanded setpoint
    Run,
    /// Running the controller's own stored program
    Program,
}

/// One status read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FurnaceStatus {
    /// Measured temperature in 0.1°C
    pub process_value_x10: i16,
    /// Setpoint the controller is following, in 0.1°C
    pub setpoint_x10: i16,
    /// Current mode
    pub mode: FurnaceMode,
}

/// Programmable furnace controller
///
/// Every method is one request/reply exchange bounded by the link's own
/// timeout. Implementations never retry; that is the caller's decision.
pub trait Furnace {
    /// Command a new target temperature in 0.1°C
    fn set_setpoint(&mut self, temp_x10: i16) -> impl Future<Output = Result<(), LinkError>>;

    /// Change operating mode
    fn set_mode(&mut self, mode: FurnaceMode) -> impl Future<Output = Result<(), LinkError>>;

    /// Read process value, setpoint and mode
    fn read_status(&mut self) -> impl Future<Output = Result<FurnaceStatus, LinkError>>;
}
