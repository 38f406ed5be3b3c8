//! Yokogawa UP150 PC-Link codec
//!
//! Every request is a single ASCII line:
//! ```text
//! STX <station:2> <cpu:2> <wait:1> <command> ETX CR
//! ```
//! Word reads use `WRDD<reg>,01`, word writes `WWRD<reg>,01,<HHHH>`.
//! The controller answers with `STX <station> <cpu> OK [HHHH] ETX CR`
//! or `STX <station> <cpu> ER <ec1> <ec2> ETX CR`.
//!
//! Temperatures travel as signed 16-bit words in tenths of a degree.

use core::fmt::Write;

use heapless::{String, Vec};

/// Start of text
pub const STX: u8 = 0x02;

/// End of text
pub const ETX: u8 = 0x03;

/// Line terminator after ETX
pub const CR: u8 = b'\r';

/// CPU number, always 01 on the UP150
const CPU: &str = "01";

/// Response wait time code (0 = no extra delay)
const WAIT: &str = "0";

/// Longest request we ever build
pub const MAX_REQUEST_LEN: usize = 32;

/// Longest reply we accept (terminator excluded)
pub const MAX_REPLY_LEN: usize = 24;

/// Highest setpoint the controller accepts, in 0.1°C
pub const MAX_TEMPERATURE_X10: i16 = 12000;

/// Lowest setpoint the controller accepts, in 0.1°C
pub const MIN_TEMPERATURE_X10: i16 = 0;

/// Encoded request line
pub type Request = Vec<u8, MAX_REQUEST_LEN>;

/// D-register address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register(pub u16);

impl Register {
    /// Measured process value
    pub const PROCESS_VALUE: Register = Register(2);
    /// Setpoint the control loop is currently following
    pub const CURRENT_SETPOINT: Register = Register(3);
    /// Operating mode (reset / run / program)
    pub const MODE: Register = Register(121);
    /// Target setpoint
    pub const TARGET_SETPOINT: Register = Register(228);
}

/// Operating mode codes written to [`Register::MODE`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ModeCode {
    /// Reset: outputs off, program stopped
    Reset = 0,
    /// Run: follow the target setpoint
    Run = 1,
    /// Program operation from the stored segments
    Program = 2,
}

impl ModeCode {
    /// Decode a mode word
    pub fn from_word(word: u16) -> Option<Self> {
        match word {
            0 => Some(ModeCode::Reset),
            1 => Some(ModeCode::Run),
            2 => Some(ModeCode::Program),
            _ => None,
        }
    }
}

/// Errors building a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Station number outside 1..=99
    InvalidStation,
    /// Request did not fit the buffer
    Overflow,
}

/// Errors decoding a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyError {
    /// Missing STX/ETX or too short
    Malformed,
    /// Reply came from another station
    WrongStation,
    /// Data field was not four hex digits
    InvalidData,
    /// Controller answered ER with these error codes
    Device { ec1: u8, ec2: u8 },
}

/// Build a single-word read request for `register`
pub fn read_word(station: u8, register: Register) -> Result<Request, EncodeError> {
    build(station, |body| write!(body, "WRDD{:04},01", register.0))
}

/// Build a single-word write request
pub fn write_word(station: u8, register: Register, value: u16) -> Result<Request, EncodeError> {
    build(station, |body| {
        write!(body, "WWRD{:04},01,{:04X}", register.0, value)
    })
}

fn build<F>(station: u8, command: F) -> Result<Request, EncodeError>
where
    F: FnOnce(&mut String<MAX_REQUEST_LEN>) -> core::fmt::Result,
{
    if !(1..=99).contains(&station) {
        return Err(EncodeError::InvalidStation);
    }

    let mut body: String<MAX_REQUEST_LEN> = String::new();
    write!(body, "{:02}{}{}", station, CPU, WAIT).map_err(|_| EncodeError::Overflow)?;
    command(&mut body).map_err(|_| EncodeError::Overflow)?;

    let mut request = Request::new();
    request.push(STX).map_err(|_| EncodeError::Overflow)?;
    request
        .extend_from_slice(body.as_bytes())
        .map_err(|_| EncodeError::Overflow)?;
    request
        .extend_from_slice(&[ETX, CR])
        .map_err(|_| EncodeError::Overflow)?;
    Ok(request)
}

/// Strip framing from a reply line and check the status field
///
/// `line` is the reply without its trailing CR. Returns the data portion
/// following `OK` (empty for write acknowledgements).
pub fn parse_reply(line: &[u8], station: u8) -> Result<&[u8], ReplyError> {
    // Tolerate a stray LF left over from a previous exchange
    let line = match line.iter().position(|&b| b == STX) {
        Some(start) => &line[start + 1..],
        None => return Err(ReplyError::Malformed),
    };
    let line = match line.split_last() {
        Some((&ETX, rest)) => rest,
        _ => return Err(ReplyError::Malformed),
    };
    if line.len() < 6 {
        return Err(ReplyError::Malformed);
    }

    let reply_station = parse_decimal_pair(&line[0..2]).ok_or(ReplyError::Malformed)?;
    if reply_station != station {
        return Err(ReplyError::WrongStation);
    }

    match &line[4..6] {
        b"OK" => Ok(&line[6..]),
        b"ER" => {
            let codes = &line[6..];
            if codes.len() < 4 {
                return Err(ReplyError::Malformed);
            }
            let ec1 = parse_hex(&codes[0..2]).ok_or(ReplyError::Malformed)? as u8;
            let ec2 = parse_hex(&codes[2..4]).ok_or(ReplyError::Malformed)? as u8;
            Err(ReplyError::Device { ec1, ec2 })
        }
        _ => Err(ReplyError::Malformed),
    }
}

/// Decode the word carried by a read reply
pub fn parse_word(line: &[u8], station: u8) -> Result<u16, ReplyError> {
    let data = parse_reply(line, station)?;
    if data.len() != 4 {
        return Err(ReplyError::InvalidData);
    }
    parse_hex(data).ok_or(ReplyError::InvalidData)
}

/// Check that a write was acknowledged
pub fn parse_ack(line: &[u8], station: u8) -> Result<(), ReplyError> {
    parse_reply(line, station).map(|_| ())
}

/// Encode a temperature in 0.1°C as a register word
pub fn temperature_to_word(temp_x10: i16) -> u16 {
    temp_x10 as u16
}

/// Decode a register word as a temperature in 0.1°C
pub fn word_to_temperature(word: u16) -> i16 {
    word as i16
}

fn parse_hex(digits: &[u8]) -> Option<u16> {
    let text = core::str::from_utf8(digits).ok()?;
    u16::from_str_radix(text, 16).ok()
}

fn parse_decimal_pair(digits: &[u8]) -> Option<u8> {
    let text = core::str::from_utf8(digits).ok()?;
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(body: &[u8]) -> Vec<u8, MAX_REPLY_LEN> {
        let mut line = Vec::new();
        line.push(STX).unwrap();
        line.extend_from_slice(body).unwrap();
        line.push(ETX).unwrap();
        line
    }

    #[test]
    fn test_read_request_framing() {
        let request = read_word(1, Register::PROCESS_VALUE).unwrap();
        assert_eq!(request[0], STX);
        assert_eq!(&request[1..request.len() - 2], b"01010WRDD0002,01");
        assert_eq!(request[request.len() - 2], ETX);
        assert_eq!(request[request.len() - 1], CR);
    }

    #[test]
    fn test_write_request_hex_payload() {
        let request = write_word(1, Register::MODE, ModeCode::Run as u16).unwrap();
        assert_eq!(&request[1..request.len() - 2], b"01010WWRD0121,01,0001");

        let request =
            write_word(1, Register::TARGET_SETPOINT, temperature_to_word(5000)).unwrap();
        assert_eq!(&request[1..request.len() - 2], b"01010WWRD0228,01,1388");
    }

    #[test]
    fn test_station_address() {
        let request = read_word(12, Register::CURRENT_SETPOINT).unwrap();
        assert_eq!(&request[1..6], b"12010");
        assert_eq!(read_word(0, Register::MODE), Err(EncodeError::InvalidStation));
        assert_eq!(read_word(100, Register::MODE), Err(EncodeError::InvalidStation));
    }

    #[test]
    fn test_parse_word_reply() {
        let line = reply(b"0101OK1388");
        assert_eq!(parse_word(&line, 1), Ok(0x1388));
        assert_eq!(word_to_temperature(0x1388), 5000);
    }

    #[test]
    fn test_parse_negative_temperature() {
        let line = reply(b"0101OKFFF6");
        let word = parse_word(&line, 1).unwrap();
        assert_eq!(word_to_temperature(word), -10);
    }

    #[test]
    fn test_parse_ack() {
        let line = reply(b"0101OK");
        assert_eq!(parse_ack(&line, 1), Ok(()));
    }

    #[test]
    fn test_parse_error_reply() {
        let line = reply(b"0101ER0203");
        assert_eq!(
            parse_ack(&line, 1),
            Err(ReplyError::Device { ec1: 2, ec2: 3 })
        );
    }

    #[test]
    fn test_parse_rejects_short_and_unframed() {
        assert_eq!(parse_word(b"0101OK1388", 1), Err(ReplyError::Malformed));
        assert_eq!(parse_word(&reply(b"01"), 1), Err(ReplyError::Malformed));
        assert_eq!(parse_word(&reply(b"0101OK13"), 1), Err(ReplyError::InvalidData));
        assert_eq!(parse_word(&reply(b"0101OKZZZZ"), 1), Err(ReplyError::InvalidData));
        assert_eq!(parse_word(&reply(b"0101XX1388"), 1), Err(ReplyError::Malformed));
    }

    #[test]
    fn test_parse_wrong_station() {
        let line = reply(b"0201OK1388");
        assert_eq!(parse_word(&line, 1), Err(ReplyError::WrongStation));
    }

    #[test]
    fn test_parse_skips_leading_noise() {
        let mut line: Vec<u8, MAX_REPLY_LEN> = Vec::new();
        line.push(b'\n').unwrap();
        line.extend_from_slice(&reply(b"0101OK0001")).unwrap();
        assert_eq!(parse_word(&line, 1), Ok(1));
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!(ModeCode::from_word(0), Some(ModeCode::Reset));
        assert_eq!(ModeCode::from_word(1), Some(ModeCode::Run));
        assert_eq!(ModeCode::from_word(2), Some(ModeCode::Program));
        assert_eq!(ModeCode::from_word(9), None);
    }

    proptest::proptest! {
        #[test]
        fn prop_temperature_word_is_lossless(temp in i16::MIN..=i16::MAX) {
            proptest::prop_assert_eq!(word_to_temperature(temperature_to_word(temp)), temp);
        }

        #[test]
        fn prop_write_request_always_fits(reg in 0u16..10000, value: u16, station in 1u8..=99) {
            let request = write_word(station, Register(reg), value).unwrap();
            proptest::prop_assert_eq!(request.len(), 24);
        }
    }
}
