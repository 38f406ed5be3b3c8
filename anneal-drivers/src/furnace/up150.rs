//! Yokogawa UP150 furnace link
//!
//! The controller runs in fixed-setpoint mode: the sequencer writes the
//! target setpoint register and switches between reset and run. Status is
//! three single-word reads (process value, current setpoint, mode).

use anneal_core::traits::{Furnace, FurnaceMode, FurnaceStatus, LinkError, ProtocolFault};
use anneal_hal::Uart;
use anneal_protocol::up150::{self, ModeCode, Register, ReplyError, CR, MAX_REPLY_LEN};

use crate::line::transact;

/// Link settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FurnaceLinkConfig {
    /// PC-Link station number (1-99)
    pub station: u8,
    /// Reply timeout per exchange
    pub timeout_ms: u32,
}

impl Default for FurnaceLinkConfig {
    fn default() -> Self {
        Self {
            station: 1,
            timeout_ms: 1000,
        }
    }
}

/// UP150 over a serial port
pub struct FurnaceLink<P> {
    port: P,
    config: FurnaceLinkConfig,
}

impl<P: Uart> FurnaceLink<P> {
    pub fn new(port: P, config: FurnaceLinkConfig) -> Self {
        Self { port, config }
    }

    pub fn config(&self) -> &FurnaceLinkConfig {
        &self.config
    }

    /// Put the controller in reset and give the port back
    ///
    /// The port is returned even when the mode write failed.
    pub async fn release(mut self) -> (P, Result<(), LinkError>) {
        let reset = self.set_mode(FurnaceMode::Stop).await;
        (self.port, reset)
    }

    async fn read_register(&mut self, register: Register) -> Result<u16, LinkError> {
        let request = up150::read_word(self.config.station, register)
            .map_err(|_| LinkError::Protocol(ProtocolFault::Malformed))?;
        let mut reply = [0u8; MAX_REPLY_LEN];
        let len = transact(
            &mut self.port,
            &request,
            &mut reply,
            CR,
            self.config.timeout_ms,
        )
        .await?;
        up150::parse_word(&reply[..len], self.config.station).map_err(reply_error)
    }

    async fn write_register(&mut self, register: Register, value: u16) -> Result<(), LinkError> {
        let request = up150::write_word(self.config.station, register, value)
            .map_err(|_| LinkError::Protocol(ProtocolFault::Malformed))?;
        let mut reply = [0u8; MAX_REPLY_LEN];
        let len = transact(
            &mut self.port,
            &request,
            &mut reply,
            CR,
            self.config.timeout_ms,
        )
        .await?;
        up150::parse_ack(&reply[..len], self.config.station).map_err(reply_error)
    }
}

impl<P: Uart> Furnace for FurnaceLink<P> {
    /// Fails with [`LinkError::Range`] outside the controller's 0-1200°C span
    async fn set_setpoint(&mut self, temp_x10: i16) -> Result<(), LinkError> {
        if !(up150::MIN_TEMPERATURE_X10..=up150::MAX_TEMPERATURE_X10).contains(&temp_x10) {
            return Err(LinkError::Range);
        }
        self.write_register(
            Register::TARGET_SETPOINT,
            up150::temperature_to_word(temp_x10),
        )
        .await
    }

    async fn set_mode(&mut self, mode: FurnaceMode) -> Result<(), LinkError> {
        let code = match mode {
            FurnaceMode::Stop => ModeCode::Reset,
            FurnaceMode::Run => ModeCode::Run,
            FurnaceMode::Program => ModeCode::Program,
        };
        self.write_register(Register::MODE, code as u16).await
    }

    async fn read_status(&mut self) -> Result<FurnaceStatus, LinkError> {
        let pv = self.read_register(Register::PROCESS_VALUE).await?;
        let sp = self.read_register(Register::CURRENT_SETPOINT).await?;
        let mode_word = self.read_register(Register::MODE).await?;

        let mode = match ModeCode::from_word(mode_word) {
            Some(ModeCode::Reset) => FurnaceMode::Stop,
            Some(ModeCode::Run) => FurnaceMode::Run,
            Some(ModeCode::Program) => FurnaceMode::Program,
            None => return Err(LinkError::Protocol(ProtocolFault::UnexpectedValue)),
        };

        Ok(FurnaceStatus {
            process_value_x10: up150::word_to_temperature(pv),
            setpoint_x10: up150::word_to_temperature(sp),
            mode,
        })
    }
}

fn reply_error(e: ReplyError) -> LinkError {
    LinkError::Protocol(match e {
        ReplyError::Malformed | ReplyError::WrongStation => ProtocolFault::Malformed,
        ReplyError::InvalidData => ProtocolFault::UnexpectedValue,
        ReplyError::Device { ec1, .. } => ProtocolFault::Rejected(ec1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_port::ScriptedPort;
    use anneal_hal::ReadError;
    use embassy_futures::block_on;
    use std::vec::Vec;

    const STX: u8 = up150::STX;
    const ETX: u8 = up150::ETX;

    fn ok(data: &str) -> Vec<u8> {
        let mut line = Vec::new();
        line.push(STX);
        line.extend_from_slice(b"0101OK");
        line.extend_from_slice(data.as_bytes());
        line.push(ETX);
        line
    }

    fn link(port: ScriptedPort) -> FurnaceLink<ScriptedPort> {
        FurnaceLink::new(port, FurnaceLinkConfig::default())
    }

    #[test]
    fn test_set_setpoint_writes_target_register() {
        let mut port = ScriptedPort::new();
        port.reply(&ok(""));
        let mut link = link(port);

        block_on(link.set_setpoint(5000)).unwrap();
        let port = &link.port;
        assert_eq!(port.sent(), ["\x0201010WWRD0228,01,1388\x03\r"]);
        assert_eq!(port.discards, 1);
    }

    #[test]
    fn test_set_mode_codes() {
        let mut port = ScriptedPort::new();
        port.reply(&ok("")).reply(&ok(""));
        let mut link = link(port);

        block_on(link.set_mode(FurnaceMode::Run)).unwrap();
        block_on(link.set_mode(FurnaceMode::Stop)).unwrap();
        let sent = link.port.sent();
        assert!(sent[0].contains("WWRD0121,01,0001"));
        assert!(sent[1].contains("WWRD0121,01,0000"));
    }

    #[test]
    fn test_read_status() {
        let mut port = ScriptedPort::new();
        port.reply(&ok("12F5")).reply(&ok("1388")).reply(&ok("0001"));
        let mut link = link(port);

        let status = block_on(link.read_status()).unwrap();
        assert_eq!(status.process_value_x10, 4853);
        assert_eq!(status.setpoint_x10, 5000);
        assert_eq!(status.mode, FurnaceMode::Run);
    }

    #[test]
    fn test_timeout_distinct_from_malformed() {
        let mut port = ScriptedPort::new();
        port.reply_err(ReadError::Timeout);
        port.reply(b"garbage");
        let mut link = link(port);

        assert_eq!(block_on(link.read_status()), Err(LinkError::Timeout));
        assert_eq!(
            block_on(link.read_status()),
            Err(LinkError::Protocol(ProtocolFault::Malformed))
        );
    }

    #[test]
    fn test_error_reply_rejected() {
        let mut port = ScriptedPort::new();
        let mut line = Vec::new();
        line.push(STX);
        line.extend_from_slice(b"0101ER0300");
        line.push(ETX);
        port.reply(&line);
        let mut link = link(port);

        assert_eq!(
            block_on(link.set_setpoint(3000)),
            Err(LinkError::Protocol(ProtocolFault::Rejected(3)))
        );
    }

    #[test]
    fn test_unknown_mode_word() {
        let mut port = ScriptedPort::new();
        port.reply(&ok("00FA")).reply(&ok("00FA")).reply(&ok("0007"));
        let mut link = link(port);

        assert_eq!(
            block_on(link.read_status()),
            Err(LinkError::Protocol(ProtocolFault::UnexpectedValue))
        );
    }

    #[test]
    fn test_setpoint_outside_span_not_sent() {
        let mut link = link(ScriptedPort::new());
        assert_eq!(block_on(link.set_setpoint(12_500)), Err(LinkError::Range));
        assert!(link.port.written.is_empty());
    }

    #[test]
    fn test_release_resets_controller() {
        let mut port = ScriptedPort::new();
        port.reply(&ok(""));
        let (port, reset) = block_on(link(port).release());
        assert_eq!(reset, Ok(()));
        let sent = port.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("WWRD0121,01,0000"));
    }

    #[test]
    fn test_bus_error_on_write() {
        let mut port = ScriptedPort::new();
        port.fail_writes = true;
        let mut link = link(port);
        assert_eq!(block_on(link.set_mode(FurnaceMode::Run)), Err(LinkError::Bus));
    }
}
