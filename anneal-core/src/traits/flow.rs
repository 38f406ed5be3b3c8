//! Mass-flow controller trait

use core::future::Future;

use anneal_protocol::FlowRange;

use super::LinkError;

/// Process valve state as last confirmed by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValveState {
    Open,
    Closed,
    /// No valve command confirmed since power-up
    Unknown,
}

/// Single-channel mass-flow controller
///
/// Every method is one or more request/reply exchanges bounded by the
/// link's own timeout. Implementations never retry.
pub trait FlowController {
    /// Select the full-scale range; later setpoints are scaled to it
    fn set_range(&mut self, range: FlowRange) -> impl Future<Output = Result<(), LinkError>>;

    /// Command a flow in sccm
    ///
    /// Fails with [`LinkError::Range`] when no range is selected or the
    /// flow exceeds the selected range's full scale.
    fn set_flow_setpoint(&mut self, sccm: f32) -> impl Future<Output = Result<(), LinkError>>;

    /// Open the process valve
    fn open_valve(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    /// Close the process valve
    fn close_valve(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    /// Read the measured flow in sccm
    fn read_actual_flow(&mut self) -> impl Future<Output = Result<f32, LinkError>>;

    /// Last confirmed valve state
    fn valve_state(&self) -> ValveState;

    /// Currently selected range, if any
    fn range(&self) -> Option<FlowRange>;
}
