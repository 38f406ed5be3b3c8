//! Console link messages
//!
//! Message types are divided into two categories:
//! - Console → Controller: recipe upload and run commands
//! - Controller → Console: telemetry, status, export rows, replies
//!
//! Multi-byte fields are little-endian. Temperatures are in 0.1°C,
//! flows in sccm as `f32`, times in milliseconds or seconds as named.

use crate::frame::{Frame, FrameError, MAX_PAYLOAD_SIZE};
use heapless::Vec;

// Message type IDs: Console → Controller
pub const MSG_PING: u8 = 0x01;
pub const MSG_LOAD_STAGE: u8 = 0x02;
pub const MSG_CLEAR_RECIPE: u8 = 0x03;
pub const MSG_START: u8 = 0x04;
pub const MSG_STOP: u8 = 0x05;
pub const MSG_CLEAR_SERIES: u8 = 0x06;
pub const MSG_EXPORT: u8 = 0x07;
pub const MSG_CLOSE_VALVE: u8 = 0x08;
pub const MSG_SAVE_RECIPE: u8 = 0x09;
pub const MSG_ACK_FAULT: u8 = 0x0A;

// Message type IDs: Controller → Console
pub const MSG_PONG: u8 = 0x21;
pub const MSG_SAMPLE: u8 = 0x22;
pub const MSG_STATUS: u8 = 0x23;
pub const MSG_EXPORT_ROW: u8 = 0x24;
pub const MSG_EXPORT_END: u8 = 0x25;
pub const MSG_ACK: u8 = 0x26;
pub const MSG_NAK: u8 = 0x27;

/// Sample flag: furnace read failed, temperature fields are meaningless
pub const FLAG_FURNACE_FAILED: u8 = 0x01;
/// Sample flag: flow read failed, flow field is meaningless
pub const FLAG_FLOW_FAILED: u8 = 0x02;
/// Sample flag: process valve open
pub const FLAG_VALVE_OPEN: u8 = 0x04;

/// Status field value when no finish estimate exists
pub const NO_ESTIMATE: u32 = u32::MAX;

/// Errors decoding a message from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// Unknown message type
    UnknownType(u8),
    /// Payload shorter or longer than the message needs
    BadLength,
    /// Field value out of its domain
    InvalidField,
    /// Frame construction failed
    Frame(FrameError),
}

impl From<FrameError> for MessageError {
    fn from(e: FrameError) -> Self {
        MessageError::Frame(e)
    }
}

/// One recipe stage as uploaded by the console
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StageRecord {
    pub index: u8,
    pub target_x10: i16,
    pub ramp_s: u32,
    pub hold_s: u32,
    pub flow_sccm: f32,
}

/// One time-series point
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleRecord {
    /// Milliseconds since boot
    pub timestamp_ms: u64,
    pub flags: u8,
    pub temperature_x10: i16,
    pub setpoint_x10: i16,
    pub mode: u8,
    pub flow_sccm: f32,
}

/// Sequencer snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusRecord {
    pub phase: u8,
    pub stage: u8,
    pub stage_elapsed_s: u32,
    pub stage_remaining_s: u32,
    pub total_elapsed_s: u32,
    /// Seconds until the estimated finish, or [`NO_ESTIMATE`]
    pub finish_in_s: u32,
    pub safe_to_power_off: bool,
    /// Zero when the sequencer is not frozen on a device fault
    pub fault: u8,
    /// Samples dropped from the front of the series since it was last
    /// cleared; export indexes shift by this much
    pub evicted: u32,
}

/// Export row: (timestamp, temperature, setpoint, flow)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExportRecord {
    pub timestamp_ms: u64,
    pub flags: u8,
    pub temperature_x10: i16,
    pub setpoint_x10: i16,
    pub flow_sccm: f32,
}

/// Reasons a command was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NakReason {
    InvalidRecipe = 1,
    InvalidPhase = 2,
    UnsafeShutdown = 3,
    DeviceUnreachable = 4,
    RunActive = 5,
    Malformed = 6,
    Storage = 7,
    /// Command queue full, nothing was executed
    Busy = 8,
}

impl NakReason {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(NakReason::InvalidRecipe),
            2 => Some(NakReason::InvalidPhase),
            3 => Some(NakReason::UnsafeShutdown),
            4 => Some(NakReason::DeviceUnreachable),
            5 => Some(NakReason::RunActive),
            6 => Some(NakReason::Malformed),
            7 => Some(NakReason::Storage),
            8 => Some(NakReason::Busy),
            _ => None,
        }
    }
}

/// Commands from the console
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleCommand {
    /// Heartbeat request
    Ping,
    /// Put a stage into the pending recipe
    LoadStage(StageRecord),
    /// Empty the pending recipe
    ClearRecipe,
    /// Persist the pending recipe
    SaveRecipe,
    /// Start a run with the pending recipe
    Start,
    /// Request a stop
    Stop,
    /// Drop the recorded time series
    ClearSeries,
    /// Stream the series starting at row `from`
    Export { from: u16 },
    /// Close the process valve outside a run
    CloseValve,
    /// Operator acknowledges a device fault; the frozen step is retried
    AcknowledgeFault,
}

impl ConsoleCommand {
    /// Parse a command from a frame
    pub fn from_frame(frame: &Frame) -> Result<Self, MessageError> {
        let mut r = Reader::new(&frame.payload);
        let cmd = match frame.msg_type {
            MSG_PING => ConsoleCommand::Ping,
            MSG_LOAD_STAGE => ConsoleCommand::LoadStage(StageRecord {
                index: r.u8()?,
                target_x10: r.i16()?,
                ramp_s: r.u32()?,
                hold_s: r.u32()?,
                flow_sccm: r.f32()?,
            }),
            MSG_CLEAR_RECIPE => ConsoleCommand::ClearRecipe,
            MSG_SAVE_RECIPE => ConsoleCommand::SaveRecipe,
            MSG_START => ConsoleCommand::Start,
            MSG_STOP => ConsoleCommand::Stop,
            MSG_CLEAR_SERIES => ConsoleCommand::ClearSeries,
            MSG_EXPORT => ConsoleCommand::Export { from: r.u16()? },
            MSG_CLOSE_VALVE => ConsoleCommand::CloseValve,
            MSG_ACK_FAULT => ConsoleCommand::AcknowledgeFault,
            other => return Err(MessageError::UnknownType(other)),
        };
        r.finish()?;
        Ok(cmd)
    }

    /// Message type byte of this command
    pub fn msg_type(&self) -> u8 {
        match self {
            ConsoleCommand::Ping => MSG_PING,
            ConsoleCommand::LoadStage(_) => MSG_LOAD_STAGE,
            ConsoleCommand::ClearRecipe => MSG_CLEAR_RECIPE,
            ConsoleCommand::SaveRecipe => MSG_SAVE_RECIPE,
            ConsoleCommand::Start => MSG_START,
            ConsoleCommand::Stop => MSG_STOP,
            ConsoleCommand::ClearSeries => MSG_CLEAR_SERIES,
            ConsoleCommand::Export { .. } => MSG_EXPORT,
            ConsoleCommand::CloseValve => MSG_CLOSE_VALVE,
            ConsoleCommand::AcknowledgeFault => MSG_ACK_FAULT,
        }
    }

    /// Encode this command into a frame (console side and tests)
    pub fn to_frame(&self) -> Result<Frame, MessageError> {
        let mut w = Writer::new();
        match *self {
            ConsoleCommand::LoadStage(stage) => {
                w.u8(stage.index)?;
                w.i16(stage.target_x10)?;
                w.u32(stage.ramp_s)?;
                w.u32(stage.hold_s)?;
                w.f32(stage.flow_sccm)?;
            }
            ConsoleCommand::Export { from } => w.u16(from)?,
            _ => {}
        }
        Ok(Frame::new(self.msg_type(), &w.0)?)
    }
}

/// Messages sent to the console
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerMessage {
    /// Heartbeat response
    Pong,
    /// Newest sample
    Sample(SampleRecord),
    /// Sequencer snapshot
    Status(StatusRecord),
    /// One exported row
    ExportRow(ExportRecord),
    /// Export finished after `count` rows
    ExportEnd { count: u16 },
    /// Command accepted
    Ack { command: u8 },
    /// Command refused
    Nak { command: u8, reason: NakReason },
}

impl ControllerMessage {
    /// Encode this message into a frame
    pub fn to_frame(&self) -> Result<Frame, MessageError> {
        let mut w = Writer::new();
        let msg_type = match *self {
            ControllerMessage::Pong => MSG_PONG,
            ControllerMessage::Sample(s) => {
                w.u64(s.timestamp_ms)?;
                w.u8(s.flags)?;
                w.i16(s.temperature_x10)?;
                w.i16(s.setpoint_x10)?;
                w.u8(s.mode)?;
                w.f32(s.flow_sccm)?;
                MSG_SAMPLE
            }
            ControllerMessage::Status(s) => {
                w.u8(s.phase)?;
                w.u8(s.stage)?;
                w.u32(s.stage_elapsed_s)?;
                w.u32(s.stage_remaining_s)?;
                w.u32(s.total_elapsed_s)?;
                w.u32(s.finish_in_s)?;
                w.u8(s.safe_to_power_off as u8)?;
                w.u8(s.fault)?;
                w.u32(s.evicted)?;
                MSG_STATUS
            }
            ControllerMessage::ExportRow(row) => {
                w.u64(row.timestamp_ms)?;
                w.u8(row.flags)?;
                w.i16(row.temperature_x10)?;
                w.i16(row.setpoint_x10)?;
                w.f32(row.flow_sccm)?;
                MSG_EXPORT_ROW
            }
            ControllerMessage::ExportEnd { count } => {
                w.u16(count)?;
                MSG_EXPORT_END
            }
            ControllerMessage::Ack { command } => {
                w.u8(command)?;
                MSG_ACK
            }
            ControllerMessage::Nak { command, reason } => {
                w.u8(command)?;
                w.u8(reason as u8)?;
                MSG_NAK
            }
        };
        Ok(Frame::new(msg_type, &w.0)?)
    }

    /// Parse a message from a frame (console side and tests)
    pub fn from_frame(frame: &Frame) -> Result<Self, MessageError> {
        let mut r = Reader::new(&frame.payload);
        let msg = match frame.msg_type {
            MSG_PONG => ControllerMessage::Pong,
            MSG_SAMPLE => ControllerMessage::Sample(SampleRecord {
                timestamp_ms: r.u64()?,
                flags: r.u8()?,
                temperature_x10: r.i16()?,
                setpoint_x10: r.i16()?,
                mode: r.u8()?,
                flow_sccm: r.f32()?,
            }),
            MSG_STATUS => ControllerMessage::Status(StatusRecord {
                phase: r.u8()?,
                stage: r.u8()?,
                stage_elapsed_s: r.u32()?,
                stage_remaining_s: r.u32()?,
                total_elapsed_s: r.u32()?,
                finish_in_s: r.u32()?,
                safe_to_power_off: r.u8()? != 0,
                fault: r.u8()?,
                evicted: r.u32()?,
            }),
            MSG_EXPORT_ROW => ControllerMessage::ExportRow(ExportRecord {
                timestamp_ms: r.u64()?,
                flags: r.u8()?,
                temperature_x10: r.i16()?,
                setpoint_x10: r.i16()?,
                flow_sccm: r.f32()?,
            }),
            MSG_EXPORT_END => ControllerMessage::ExportEnd { count: r.u16()? },
            MSG_ACK => ControllerMessage::Ack { command: r.u8()? },
            MSG_NAK => ControllerMessage::Nak {
                command: r.u8()?,
                reason: NakReason::from_byte(r.u8()?).ok_or(MessageError::InvalidField)?,
            },
            other => return Err(MessageError::UnknownType(other)),
        };
        r.finish()?;
        Ok(msg)
    }
}

struct Writer(Vec<u8, MAX_PAYLOAD_SIZE>);

impl Writer {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<(), MessageError> {
        self.0
            .extend_from_slice(bytes)
            .map_err(|_| MessageError::Frame(FrameError::PayloadTooLarge))
    }

    fn u8(&mut self, v: u8) -> Result<(), MessageError> {
        self.bytes(&[v])
    }

    fn u16(&mut self, v: u16) -> Result<(), MessageError> {
        self.bytes(&v.to_le_bytes())
    }

    fn i16(&mut self, v: i16) -> Result<(), MessageError> {
        self.bytes(&v.to_le_bytes())
    }

    fn u32(&mut self, v: u32) -> Result<(), MessageError> {
        self.bytes(&v.to_le_bytes())
    }

    fn u64(&mut self, v: u64) -> Result<(), MessageError> {
        self.bytes(&v.to_le_bytes())
    }

    fn f32(&mut self, v: f32) -> Result<(), MessageError> {
        self.bytes(&v.to_le_bytes())
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        if self.data.len() < N {
            return Err(MessageError::BadLength);
        }
        let (head, rest) = self.data.split_at(N);
        self.data = rest;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, MessageError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn i16(&mut self) -> Result<i16, MessageError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, MessageError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, MessageError> {
        Ok(u64::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> Result<f32, MessageError> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn finish(self) -> Result<(), MessageError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(MessageError::BadLength)
        }
    }
}
