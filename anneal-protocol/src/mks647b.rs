//! MKS 647B mass-flow controller codec
//!
//! Requests are short ASCII commands terminated by CR, e.g. `FS 1 0500`.
//! The controller answers every request with one line; a line starting
//! with `E` carries an error code, anything else is the value or echo.
//!
//! Setpoints and readings are expressed in per-mille of the channel's
//! full-scale range, so the active [`FlowRange`] must be known to convert
//! them to sccm.

use core::fmt::Write;

use heapless::{String, Vec};

/// Line terminator for requests and replies
pub const CR: u8 = b'\r';

/// Longest request we ever build
pub const MAX_REQUEST_LEN: usize = 16;

/// Longest reply we accept (terminator excluded)
pub const MAX_REPLY_LEN: usize = 32;

/// Main shut-off valve channel
pub const MAIN_VALVE: u8 = 0;

/// Highest flow channel on the controller
pub const MAX_CHANNEL: u8 = 8;

/// Highest setpoint the controller accepts, per-mille of full scale
pub const MAX_SETPOINT_PER_MILLE: u16 = 1100;

/// Encoded request line
pub type Request = Vec<u8, MAX_REQUEST_LEN>;

/// Engineering unit of a full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowUnit {
    Sccm,
    Slm,
    Scmm,
    Scfh,
    Scfm,
}

impl FlowUnit {
    /// Standard cubic centimetres per minute in one unit
    pub fn sccm_per_unit(self) -> f32 {
        match self {
            FlowUnit::Sccm => 1.0,
            FlowUnit::Slm => 1_000.0,
            FlowUnit::Scmm => 1_000_000.0,
            FlowUnit::Scfh => 471.947,
            FlowUnit::Scfm => 28_316.85,
        }
    }
}

/// Full-scale range codes understood by `RA`
const RANGES: [(u16, FlowUnit); 40] = [
    (1, FlowUnit::Sccm),
    (2, FlowUnit::Sccm),
    (5, FlowUnit::Sccm),
    (10, FlowUnit::Sccm),
    (20, FlowUnit::Sccm),
    (50, FlowUnit::Sccm),
    (100, FlowUnit::Sccm),
    (200, FlowUnit::Sccm),
    (500, FlowUnit::Sccm),
    (1, FlowUnit::Slm),
    (2, FlowUnit::Slm),
    (5, FlowUnit::Slm),
    (10, FlowUnit::Slm),
    (20, FlowUnit::Slm),
    (50, FlowUnit::Slm),
    (100, FlowUnit::Slm),
    (200, FlowUnit::Slm),
    (400, FlowUnit::Slm),
    (500, FlowUnit::Slm),
    (1, FlowUnit::Scmm),
    (1, FlowUnit::Scfh),
    (2, FlowUnit::Scfh),
    (5, FlowUnit::Scfh),
    (10, FlowUnit::Scfh),
    (20, FlowUnit::Scfh),
    (50, FlowUnit::Scfh),
    (100, FlowUnit::Scfh),
    (200, FlowUnit::Scfh),
    (500, FlowUnit::Scfh),
    (1, FlowUnit::Scfm),
    (2, FlowUnit::Scfm),
    (5, FlowUnit::Scfm),
    (10, FlowUnit::Scfm),
    (20, FlowUnit::Scfm),
    (50, FlowUnit::Scfm),
    (100, FlowUnit::Scfm),
    (200, FlowUnit::Scfm),
    (500, FlowUnit::Scfm),
    (30, FlowUnit::Slm),
    (300, FlowUnit::Slm),
];

/// A full-scale range selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlowRange(u8);

impl FlowRange {
    /// 500 SCCM, the range used for purge flow
    pub const SCCM_500: FlowRange = FlowRange(8);

    /// Look up a range by its device code
    pub fn from_code(code: u8) -> Option<Self> {
        if (code as usize) < RANGES.len() {
            Some(FlowRange(code))
        } else {
            None
        }
    }

    /// Device code sent with `RA`
    pub fn code(self) -> u8 {
        self.0
    }

    /// Nominal full scale in the range's own unit
    pub fn full_scale(self) -> (u16, FlowUnit) {
        RANGES[self.0 as usize]
    }

    /// Full scale converted to sccm
    pub fn full_scale_sccm(self) -> f32 {
        let (value, unit) = self.full_scale();
        value as f32 * unit.sccm_per_unit()
    }

    /// Convert a flow in sccm to the per-mille value written with `FS`
    ///
    /// `correction` is the gas correction factor (1.0 for nitrogen).
    /// Returns `None` for negative flows or flows beyond 110% of full scale.
    pub fn setpoint_per_mille(self, flow_sccm: f32, correction: f32) -> Option<u16> {
        if flow_sccm.is_nan() || flow_sccm < 0.0 || correction.is_nan() || correction <= 0.0 {
            return None;
        }
        let per_mille = flow_sccm / self.full_scale_sccm() / correction * 1000.0;
        let rounded = (per_mille + 0.5) as u32;
        if rounded > MAX_SETPOINT_PER_MILLE as u32 {
            return None;
        }
        Some(rounded as u16)
    }

    /// Convert a per-mille reading from `FL` to sccm
    pub fn flow_sccm(self, per_mille: i32) -> f32 {
        per_mille as f32 / 1000.0 * self.full_scale_sccm()
    }
}

/// Requests understood by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `ON ch` - open a channel valve (channel 0 is the main valve)
    ValveOpen(u8),
    /// `OF ch` - close a channel valve
    ValveClose(u8),
    /// `RA ch NN` - select the full-scale range
    SetRange { channel: u8, range: FlowRange },
    /// `FS ch NNNN` - setpoint in per-mille of full scale
    SetSetpoint { channel: u8, per_mille: u16 },
    /// `FL ch` - actual flow in per-mille of full scale
    ReadFlow(u8),
    /// `GC ch R` - gas correction factor in percent
    ReadCorrection(u8),
    /// `GM n` - select gas menu (0 uses the individual setpoints)
    GasMenu(u8),
    /// `ID` - identification string
    Identify,
}

/// Errors building a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Channel outside what the command accepts
    InvalidChannel,
    /// Setpoint above 1100 per-mille
    ValueOutOfRange,
    /// Request did not fit the buffer
    Overflow,
}

impl Command {
    /// Encode the request, terminator included
    pub fn encode(&self) -> Result<Request, EncodeError> {
        let mut text: String<MAX_REQUEST_LEN> = String::new();
        let written = match *self {
            Command::ValveOpen(ch) => {
                check_channel(ch, true)?;
                write!(text, "ON {}", ch)
            }
            Command::ValveClose(ch) => {
                check_channel(ch, true)?;
                write!(text, "OF {}", ch)
            }
            Command::SetRange { channel, range } => {
                check_channel(channel, false)?;
                write!(text, "RA {} {:02}", channel, range.code())
            }
            Command::SetSetpoint { channel, per_mille } => {
                check_channel(channel, false)?;
                if per_mille > MAX_SETPOINT_PER_MILLE {
                    return Err(EncodeError::ValueOutOfRange);
                }
                write!(text, "FS {} {:04}", channel, per_mille)
            }
            Command::ReadFlow(ch) => {
                check_channel(ch, false)?;
                write!(text, "FL {}", ch)
            }
            Command::ReadCorrection(ch) => {
                check_channel(ch, false)?;
                write!(text, "GC {} R", ch)
            }
            Command::GasMenu(menu) => write!(text, "GM {}", menu),
            Command::Identify => write!(text, "ID"),
        };
        written.map_err(|_| EncodeError::Overflow)?;

        let mut request = Request::new();
        request
            .extend_from_slice(text.as_bytes())
            .map_err(|_| EncodeError::Overflow)?;
        request.push(CR).map_err(|_| EncodeError::Overflow)?;
        Ok(request)
    }
}

fn check_channel(channel: u8, allow_main: bool) -> Result<(), EncodeError> {
    let lowest = if allow_main { MAIN_VALVE } else { 1 };
    if channel < lowest || channel > MAX_CHANNEL {
        return Err(EncodeError::InvalidChannel);
    }
    Ok(())
}

/// Error codes reported as `E0`..`E5`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// E0: wrong channel number
    Channel,
    /// E1: unknown command
    UnknownCommand,
    /// E2: syntax error
    Syntax,
    /// E3: invalid expression
    InvalidExpression,
    /// E4: invalid value
    InvalidValue,
    /// E5: autozero in progress
    Autozero,
    /// Any other code
    Other(u8),
}

impl DeviceError {
    fn from_code(code: u8) -> Self {
        match code {
            0 => DeviceError::Channel,
            1 => DeviceError::UnknownCommand,
            2 => DeviceError::Syntax,
            3 => DeviceError::InvalidExpression,
            4 => DeviceError::InvalidValue,
            5 => DeviceError::Autozero,
            other => DeviceError::Other(other),
        }
    }

    /// Numeric code as sent after `E`
    pub fn code(self) -> u8 {
        match self {
            DeviceError::Channel => 0,
            DeviceError::UnknownCommand => 1,
            DeviceError::Syntax => 2,
            DeviceError::InvalidExpression => 3,
            DeviceError::InvalidValue => 4,
            DeviceError::Autozero => 5,
            DeviceError::Other(code) => code,
        }
    }
}

/// Errors decoding a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyError {
    /// Blank line or non-ASCII bytes
    Malformed,
    /// Controller reported an error code
    Device(DeviceError),
    /// Expected a number
    InvalidNumber,
}

/// Trim a reply line and fail on error codes
pub fn parse_reply(line: &[u8]) -> Result<&str, ReplyError> {
    let text = core::str::from_utf8(line).map_err(|_| ReplyError::Malformed)?;
    let text = text.trim_matches(|c: char| c.is_ascii_whitespace());
    if text.is_empty() || !text.is_ascii() {
        return Err(ReplyError::Malformed);
    }
    if let Some(code) = text.strip_prefix('E') {
        let code = code.trim().parse::<u8>().map_err(|_| ReplyError::Malformed)?;
        return Err(ReplyError::Device(DeviceError::from_code(code)));
    }
    Ok(text)
}

/// Decode a numeric reply such as `0500`, `+0500` or `-0002`
pub fn parse_number(line: &[u8]) -> Result<i32, ReplyError> {
    let text = parse_reply(line)?;
    text.parse().map_err(|_| ReplyError::InvalidNumber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encoding() {
        assert_eq!(&Command::ValveOpen(1).encode().unwrap()[..], b"ON 1\r");
        assert_eq!(&Command::ValveClose(0).encode().unwrap()[..], b"OF 0\r");
        assert_eq!(
            &Command::SetRange { channel: 1, range: FlowRange::SCCM_500 }
                .encode()
                .unwrap()[..],
            b"RA 1 08\r"
        );
        assert_eq!(
            &Command::SetSetpoint { channel: 1, per_mille: 40 }
                .encode()
                .unwrap()[..],
            b"FS 1 0040\r"
        );
        assert_eq!(&Command::ReadFlow(1).encode().unwrap()[..], b"FL 1\r");
        assert_eq!(&Command::ReadCorrection(2).encode().unwrap()[..], b"GC 2 R\r");
        assert_eq!(&Command::GasMenu(0).encode().unwrap()[..], b"GM 0\r");
        assert_eq!(&Command::Identify.encode().unwrap()[..], b"ID\r");
    }

    #[test]
    fn test_command_channel_checks() {
        assert_eq!(
            Command::ReadFlow(0).encode(),
            Err(EncodeError::InvalidChannel)
        );
        assert_eq!(
            Command::ValveOpen(9).encode(),
            Err(EncodeError::InvalidChannel)
        );
        assert_eq!(
            Command::SetSetpoint { channel: 1, per_mille: 1101 }.encode(),
            Err(EncodeError::ValueOutOfRange)
        );
    }

    #[test]
    fn test_range_table() {
        assert_eq!(FlowRange::from_code(40), None);
        assert_eq!(FlowRange::SCCM_500.full_scale(), (500, FlowUnit::Sccm));
        assert_eq!(FlowRange::from_code(13).unwrap().full_scale(), (20, FlowUnit::Slm));
        assert_eq!(FlowRange::from_code(39).unwrap().full_scale(), (300, FlowUnit::Slm));
        assert_eq!(FlowRange::from_code(9).unwrap().full_scale_sccm(), 1000.0);
    }

    #[test]
    fn test_setpoint_scaling() {
        let range = FlowRange::SCCM_500;
        assert_eq!(range.setpoint_per_mille(20.0, 1.0), Some(40));
        assert_eq!(range.setpoint_per_mille(500.0, 1.0), Some(1000));
        assert_eq!(range.setpoint_per_mille(550.0, 1.0), Some(1100));
        assert_eq!(range.setpoint_per_mille(600.0, 1.0), None);
        assert_eq!(range.setpoint_per_mille(-1.0, 1.0), None);
        // Argon-like correction factor raises the commanded value
        assert_eq!(range.setpoint_per_mille(20.0, 0.5), Some(80));
    }

    #[test]
    fn test_flow_reading_scaling() {
        let range = FlowRange::SCCM_500;
        let diff = range.flow_sccm(40) - 20.0;
        assert!(diff < 1e-3 && diff > -1e-3);
        assert_eq!(range.flow_sccm(0), 0.0);
    }

    #[test]
    fn test_parse_reply_values() {
        assert_eq!(parse_number(b"0500"), Ok(500));
        assert_eq!(parse_number(b"+0500\n"), Ok(500));
        assert_eq!(parse_number(b"\n-0002"), Ok(-2));
        assert_eq!(parse_reply(b"MKS 647B V1.2"), Ok("MKS 647B V1.2"));
    }

    #[test]
    fn test_parse_reply_errors() {
        assert_eq!(
            parse_reply(b"E1"),
            Err(ReplyError::Device(DeviceError::UnknownCommand))
        );
        assert_eq!(
            parse_number(b"E4"),
            Err(ReplyError::Device(DeviceError::InvalidValue))
        );
        assert_eq!(parse_reply(b"   "), Err(ReplyError::Malformed));
        assert_eq!(parse_number(b"abc"), Err(ReplyError::InvalidNumber));
    }

    proptest::proptest! {
        #[test]
        fn prop_setpoint_never_exceeds_device_limit(flow in 0.0f32..10_000.0, code in 0u8..40) {
            let range = FlowRange::from_code(code).unwrap();
            if let Some(per_mille) = range.setpoint_per_mille(flow, 1.0) {
                proptest::prop_assert!(per_mille <= MAX_SETPOINT_PER_MILLE);
                let encoded = Command::SetSetpoint { channel: 1, per_mille }.encode();
                proptest::prop_assert!(encoded.is_ok());
            }
        }
    }
}
