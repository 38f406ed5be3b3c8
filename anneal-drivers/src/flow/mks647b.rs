//! MKS 647B flow link
//!
//! Drives one channel of the multi-channel controller. Setpoints and
//! readings travel as per-mille of the selected full-scale range, so the
//! link tracks the range it last confirmed and refuses setpoints until
//! one is selected. The gas correction factor is read once during
//! [`FlowLink::initialize`].

use anneal_core::traits::{FlowController, LinkError, ProtocolFault, ValveState};
use anneal_hal::Uart;
use anneal_protocol::mks647b::{self, Command, ReplyError, CR, MAIN_VALVE, MAX_REPLY_LEN};
use anneal_protocol::FlowRange;
use heapless::String;

use crate::line::transact;

/// Link settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlowLinkConfig {
    /// Process gas channel (1-8)
    pub channel: u8,
    /// Reply timeout per exchange
    pub timeout_ms: u32,
}

impl Default for FlowLinkConfig {
    fn default() -> Self {
        Self {
            channel: 1,
            timeout_ms: 1000,
        }
    }
}

/// MKS 647B over a serial port
pub struct FlowLink<P> {
    port: P,
    config: FlowLinkConfig,
    range: Option<FlowRange>,
    correction: f32,
    valve: ValveState,
}

impl<P: Uart> FlowLink<P> {
    pub fn new(port: P, config: FlowLinkConfig) -> Self {
        Self {
            port,
            config,
            range: None,
            correction: 1.0,
            valve: ValveState::Unknown,
        }
    }

    pub fn config(&self) -> &FlowLinkConfig {
        &self.config
    }

    /// Gas correction factor used to scale setpoints
    pub fn correction(&self) -> f32 {
        self.correction
    }

    /// Bring the channel to a known state
    ///
    /// Selects gas menu X (individual setpoints), reads the correction
    /// factor, selects `range` and zeroes the setpoint.
    pub async fn initialize(&mut self, range: FlowRange) -> Result<(), LinkError> {
        self.command(Command::GasMenu(0)).await?;

        let percent = self.query_number(Command::ReadCorrection(self.config.channel)).await?;
        if percent <= 0 {
            return Err(LinkError::Protocol(ProtocolFault::UnexpectedValue));
        }
        self.correction = percent as f32 / 100.0;

        self.set_range(range).await?;
        self.set_flow_setpoint(0.0).await
    }

    /// Identification string of the controller
    pub async fn identify(&mut self) -> Result<String<MAX_REPLY_LEN>, LinkError> {
        let mut reply = [0u8; MAX_REPLY_LEN];
        let len = self.exchange(Command::Identify, &mut reply).await?;
        let text = mks647b::parse_reply(&reply[..len]).map_err(reply_error)?;
        let mut id = String::new();
        id.push_str(text)
            .map_err(|_| LinkError::Protocol(ProtocolFault::Malformed))?;
        Ok(id)
    }

    /// Close the main gas valve and give the port back
    ///
    /// The port is returned even when the valve could not be closed.
    pub async fn release(mut self) -> (P, Result<(), LinkError>) {
        let closed = self.command(Command::ValveClose(MAIN_VALVE)).await;
        if closed.is_ok() {
            self.valve = ValveState::Closed;
        }
        (self.port, closed)
    }

    async fn exchange(&mut self, command: Command, reply: &mut [u8]) -> Result<usize, LinkError> {
        let request = command.encode().map_err(|e| match e {
            mks647b::EncodeError::ValueOutOfRange => LinkError::Range,
            _ => LinkError::Protocol(ProtocolFault::Malformed),
        })?;
        transact(&mut self.port, &request, reply, CR, self.config.timeout_ms).await
    }

    async fn command(&mut self, command: Command) -> Result<(), LinkError> {
        let mut reply = [0u8; MAX_REPLY_LEN];
        let len = self.exchange(command, &mut reply).await?;
        mks647b::parse_reply(&reply[..len])
            .map(|_| ())
            .map_err(reply_error)
    }

    async fn query_number(&mut self, command: Command) -> Result<i32, LinkError> {
        let mut reply = [0u8; MAX_REPLY_LEN];
        let len = self.exchange(command, &mut reply).await?;
        mks647b::parse_number(&reply[..len]).map_err(reply_error)
    }
}

impl<P: Uart> FlowController for FlowLink<P> {
    async fn set_range(&mut self, range: FlowRange) -> Result<(), LinkError> {
        self.command(Command::SetRange {
            channel: self.config.channel,
            range,
        })
        .await?;
        self.range = Some(range);
        Ok(())
    }

    async fn set_flow_setpoint(&mut self, sccm: f32) -> Result<(), LinkError> {
        let range = self.range.ok_or(LinkError::Range)?;
        if sccm.is_nan() || sccm > range.full_scale_sccm() {
            return Err(LinkError::Range);
        }
        let per_mille = range
            .setpoint_per_mille(sccm, self.correction)
            .ok_or(LinkError::Range)?;
        self.command(Command::SetSetpoint {
            channel: self.config.channel,
            per_mille,
        })
        .await
    }

    /// Opens the channel, then the main valve
    async fn open_valve(&mut self) -> Result<(), LinkError> {
        self.command(Command::ValveOpen(self.config.channel)).await?;
        self.command(Command::ValveOpen(MAIN_VALVE)).await?;
        self.valve = ValveState::Open;
        Ok(())
    }

    /// Closes the channel; the main valve stays as it is
    async fn close_valve(&mut self) -> Result<(), LinkError> {
        self.command(Command::ValveClose(self.config.channel)).await?;
        self.valve = ValveState::Closed;
        Ok(())
    }

    async fn read_actual_flow(&mut self) -> Result<f32, LinkError> {
        let range = self.range.ok_or(LinkError::Range)?;
        let per_mille = self.query_number(Command::ReadFlow(self.config.channel)).await?;
        Ok(range.flow_sccm(per_mille))
    }

    fn valve_state(&self) -> ValveState {
        self.valve
    }

    fn range(&self) -> Option<FlowRange> {
        self.range
    }
}

fn reply_error(e: ReplyError) -> LinkError {
    LinkError::Protocol(match e {
        ReplyError::Malformed => ProtocolFault::Malformed,
        ReplyError::InvalidNumber => ProtocolFault::UnexpectedValue,
        ReplyError::Device(code) => ProtocolFault::Rejected(code.code()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_port::ScriptedPort;
    use anneal_hal::ReadError;
    use embassy_futures::block_on;

    fn link(port: ScriptedPort) -> FlowLink<ScriptedPort> {
        FlowLink::new(port, FlowLinkConfig::default())
    }

    fn ready_link(port: ScriptedPort) -> FlowLink<ScriptedPort> {
        let mut link = link(port);
        link.range = Some(FlowRange::SCCM_500);
        link
    }

    #[test]
    fn test_initialize_sequence() {
        let mut port = ScriptedPort::new();
        port.reply(b"OK").reply(b"0140").reply(b"OK").reply(b"OK");
        let mut link = link(port);

        block_on(link.initialize(FlowRange::SCCM_500)).unwrap();
        assert_eq!(link.range(), Some(FlowRange::SCCM_500));
        assert!((link.correction() - 1.4).abs() < 1e-6);
        assert_eq!(
            link.port.sent(),
            ["GM 0\r", "GC 1 R\r", "RA 1 08\r", "FS 1 0000\r"]
        );
    }

    #[test]
    fn test_setpoint_requires_range() {
        let mut link = link(ScriptedPort::new());
        assert_eq!(block_on(link.set_flow_setpoint(10.0)), Err(LinkError::Range));
        assert!(link.port.written.is_empty());
    }

    #[test]
    fn test_setpoint_above_full_scale() {
        let mut link = ready_link(ScriptedPort::new());
        assert_eq!(block_on(link.set_flow_setpoint(500.5)), Err(LinkError::Range));
        assert_eq!(block_on(link.set_flow_setpoint(-1.0)), Err(LinkError::Range));
    }

    #[test]
    fn test_setpoint_scaled_to_range() {
        let mut port = ScriptedPort::new();
        port.reply(b"OK");
        let mut link = ready_link(port);

        block_on(link.set_flow_setpoint(20.0)).unwrap();
        assert_eq!(link.port.sent(), ["FS 1 0040\r"]);
    }

    #[test]
    fn test_range_change_rescales() {
        let mut port = ScriptedPort::new();
        port.reply(b"OK").reply(b"OK");
        let mut link = ready_link(port);
        let range_100 = FlowRange::from_code(6).unwrap();

        block_on(link.set_range(range_100)).unwrap();
        // Fits 500 sccm but not the newly selected 100 sccm range
        assert_eq!(block_on(link.set_flow_setpoint(200.0)), Err(LinkError::Range));
        block_on(link.set_flow_setpoint(50.0)).unwrap();
        assert_eq!(link.port.sent(), ["RA 1 06\r", "FS 1 0500\r"]);
    }

    #[test]
    fn test_valve_open_and_close() {
        let mut port = ScriptedPort::new();
        port.reply(b"OK").reply(b"OK").reply(b"OK");
        let mut link = ready_link(port);
        assert_eq!(link.valve_state(), ValveState::Unknown);

        block_on(link.open_valve()).unwrap();
        assert_eq!(link.valve_state(), ValveState::Open);
        block_on(link.close_valve()).unwrap();
        assert_eq!(link.valve_state(), ValveState::Closed);
        assert_eq!(link.port.sent(), ["ON 1\r", "ON 0\r", "OF 1\r"]);
    }

    #[test]
    fn test_failed_open_keeps_valve_state() {
        let mut port = ScriptedPort::new();
        port.reply(b"OK").reply(b"E4");
        let mut link = ready_link(port);

        assert_eq!(
            block_on(link.open_valve()),
            Err(LinkError::Protocol(ProtocolFault::Rejected(4)))
        );
        assert_eq!(link.valve_state(), ValveState::Unknown);
    }

    #[test]
    fn test_read_actual_flow() {
        let mut port = ScriptedPort::new();
        port.reply(b"0123").reply(b"-0002");
        let mut link = ready_link(port);

        let flow = block_on(link.read_actual_flow()).unwrap();
        assert!((flow - 61.5).abs() < 1e-3);
        let flow = block_on(link.read_actual_flow()).unwrap();
        assert!((flow + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_read_timeout_and_garbage() {
        let mut port = ScriptedPort::new();
        port.reply_err(ReadError::Timeout).reply(b"abc");
        let mut link = ready_link(port);

        assert_eq!(block_on(link.read_actual_flow()), Err(LinkError::Timeout));
        assert_eq!(
            block_on(link.read_actual_flow()),
            Err(LinkError::Protocol(ProtocolFault::UnexpectedValue))
        );
    }

    #[test]
    fn test_identify() {
        let mut port = ScriptedPort::new();
        port.reply(b"MKS 647B V3.1\r\n");
        let mut link = link(port);
        assert_eq!(block_on(link.identify()).unwrap().as_str(), "MKS 647B V3.1");
    }

    #[test]
    fn test_release_closes_main_valve() {
        let mut port = ScriptedPort::new();
        port.reply(b"OK");
        let (port, closed) = block_on(link(port).release());
        assert_eq!(closed, Ok(()));
        assert_eq!(port.sent(), ["OF 0\r"]);
    }

    #[test]
    fn test_release_returns_port_on_failure() {
        let mut port = ScriptedPort::new();
        port.reply_err(ReadError::Timeout);
        let (port, closed) = block_on(link(port).release());
        assert_eq!(closed, Err(LinkError::Timeout));
        assert_eq!(port.sent(), ["OF 0\r"]);
    }
}
