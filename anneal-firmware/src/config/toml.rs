//! Simple TOML parser for the process configuration
//!
//! This is a minimal TOML parser that handles only the subset used by
//! process.toml. It does NOT support the full TOML grammar.
//!
//! Supported features:
//! - Key = value pairs (string, integer, decimal)
//! - [section] headers
//! - [stage.N] headers for the default recipe
//! - Comments (# ...)
//!
//! NOT supported:
//! - Arrays and inline tables
//! - Multi-line strings
//! - Dotted keys outside section headers

use alloc::vec::Vec;

use anneal_core::config::{RetryPolicy, Stage};
use anneal_hal::uart::{DataBits, Parity, StopBits};
use anneal_protocol::FlowRange;

use super::FirmwareConfig;

/// Parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    /// Invalid section header
    InvalidSection,
    /// Invalid value for a known key
    InvalidValue(&'static str),
    /// Key not recognised in its section
    UnknownKey,
    /// A stage section lacks a field
    MissingKey(&'static str),
    /// Stage index beyond the recipe capacity
    TooManyItems,
}

/// Current parsing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Root,
    Process,
    Retry,
    Furnace,
    Flow,
    Stage(usize),
}

/// Stage fields seen so far in a [stage.N] section
#[derive(Debug, Default)]
struct PartialStage {
    target_x10: Option<i16>,
    ramp_s: Option<u32>,
    hold_s: Option<u32>,
    flow_sccm: Option<f32>,
}

/// Parse TOML configuration into FirmwareConfig
pub fn parse_config(input: &str) -> Result<FirmwareConfig, ParseError> {
    let mut config = FirmwareConfig::new();
    let mut section = Section::Root;
    let mut current_stage: Option<PartialStage> = None;

    for line in input.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            save_stage(&section, &mut config, &mut current_stage)?;

            section = parse_section_header(&line[1..line.len() - 1])?;
            if let Section::Stage(_) = section {
                current_stage = Some(PartialStage::default());
            }
            continue;
        }

        if let Some((key, value)) = parse_key_value(line) {
            apply_value(&section, key, value, &mut config, &mut current_stage)?;
        }
    }

    save_stage(&section, &mut config, &mut current_stage)?;

    Ok(config)
}

/// Parse section header like "process" or "stage.3"
fn parse_section_header(header: &str) -> Result<Section, ParseError> {
    let header = header.trim();

    if header.contains('.') {
        let parts: Vec<&str> = header.split('.').collect();
        if parts.len() != 2 || parts[0] != "stage" {
            return Err(ParseError::InvalidSection);
        }
        let index: usize = parts[1].parse().map_err(|_| ParseError::InvalidSection)?;
        return Ok(Section::Stage(index));
    }

    match header {
        "process" => Ok(Section::Process),
        "retry" => Ok(Section::Retry),
        "furnace" => Ok(Section::Furnace),
        "flow" => Ok(Section::Flow),
        _ => Err(ParseError::InvalidSection),
    }
}

/// Parse "key = value" line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim();
    let value = line[eq_pos + 1..].trim();

    // Remove inline comments
    let value = if let Some(hash_pos) = value.find('#') {
        // Make sure # is not inside a string
        let quote_count = value[..hash_pos].matches('"').count();
        if quote_count % 2 == 0 {
            value[..hash_pos].trim()
        } else {
            value
        }
    } else {
        value
    };

    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key, value))
}

/// Parse a string value (removes quotes)
fn parse_string(value: &str) -> &str {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        &value[1..value.len() - 1]
    } else {
        // Allow unquoted strings for simple values
        value
    }
}

/// Parse an integer value
fn parse_int<T: core::str::FromStr>(value: &str, key: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue(key))
}

/// Parse a decimal value
fn parse_float(value: &str, key: &'static str) -> Result<f32, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue(key))
}

/// Parse a temperature like "25", "30.0" or "485.55" into 0.1°C
///
/// The second decimal rounds half up; further digits are ignored.
fn parse_tenths(value: &str, key: &'static str) -> Result<i16, ParseError> {
    let invalid = ParseError::InvalidValue(key);
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid);
    }

    let whole: i32 = whole.parse().map_err(|_| invalid)?;
    let mut frac_digits = frac.bytes();
    let tenths = frac_digits.next().map_or(0, |b| (b - b'0') as i32);
    let round_up = frac_digits.next().is_some_and(|b| b >= b'5') as i32;

    let magnitude = whole
        .checked_mul(10)
        .and_then(|v| v.checked_add(tenths + round_up))
        .ok_or(invalid)?;
    let value = if negative { -magnitude } else { magnitude };
    i16::try_from(value).map_err(|_| invalid)
}

/// Parse a duration in minutes into seconds
fn parse_minutes(value: &str, key: &'static str) -> Result<u32, ParseError> {
    parse_int::<u32>(value, key)?
        .checked_mul(60)
        .ok_or(ParseError::InvalidValue(key))
}

fn parse_parity(value: &str) -> Result<Parity, ParseError> {
    Parity::from_name(parse_string(value)).ok_or(ParseError::InvalidValue("parity"))
}

fn parse_data_bits(value: &str) -> Result<DataBits, ParseError> {
    match value {
        "7" => Ok(DataBits::Seven),
        "8" => Ok(DataBits::Eight),
        _ => Err(ParseError::InvalidValue("data_bits")),
    }
}

fn parse_stop_bits(value: &str) -> Result<StopBits, ParseError> {
    match value {
        "1" => Ok(StopBits::One),
        "2" => Ok(StopBits::Two),
        _ => Err(ParseError::InvalidValue("stop_bits")),
    }
}

fn parse_range(value: &str, key: &'static str) -> Result<FlowRange, ParseError> {
    FlowRange::from_code(parse_int(value, key)?).ok_or(ParseError::InvalidValue(key))
}

/// Apply a key-value pair to the current section
fn apply_value(
    section: &Section,
    key: &str,
    value: &str,
    config: &mut FirmwareConfig,
    current_stage: &mut Option<PartialStage>,
) -> Result<(), ParseError> {
    match section {
        Section::Root => return Err(ParseError::UnknownKey),
        Section::Process => {
            let process = &mut config.process;
            match key {
                "ambient_c" => process.ambient_x10 = parse_tenths(value, "ambient_c")?,
                "max_temp_c" => process.furnace_max_x10 = parse_tenths(value, "max_temp_c")?,
                "shutdown_threshold_c" => {
                    process.shutdown_threshold_x10 = parse_tenths(value, "shutdown_threshold_c")?
                }
                "ramp_tolerance_c" => {
                    process.ramp_tolerance_x10 = Some(parse_tenths(value, "ramp_tolerance_c")?)
                }
                "purge_flow_sccm" => {
                    process.purge_flow_sccm = Some(parse_float(value, "purge_flow_sccm")?)
                }
                "sample_interval_ms" => {
                    process.sample_interval_ms = parse_int(value, "sample_interval_ms")?
                }
                _ => return Err(ParseError::UnknownKey),
            }
        }
        Section::Retry => {
            let retry: &mut RetryPolicy = &mut config.process.retry;
            match key {
                "max_attempts" => retry.max_attempts = parse_int(value, "max_attempts")?,
                "backoff_ms" => retry.backoff_ms = parse_int(value, "backoff_ms")?,
                "max_backoff_ms" => retry.max_backoff_ms = parse_int(value, "max_backoff_ms")?,
                _ => return Err(ParseError::UnknownKey),
            }
        }
        Section::Furnace => match key {
            "baud" => config.furnace_uart.baudrate = parse_int(value, "baud")?,
            "data_bits" => config.furnace_uart.data_bits = parse_data_bits(value)?,
            "parity" => config.furnace_uart.parity = parse_parity(value)?,
            "stop_bits" => config.furnace_uart.stop_bits = parse_stop_bits(value)?,
            "station" => config.furnace_link.station = parse_int(value, "station")?,
            "timeout_ms" => config.furnace_link.timeout_ms = parse_int(value, "timeout_ms")?,
            _ => return Err(ParseError::UnknownKey),
        },
        Section::Flow => match key {
            "baud" => config.flow_uart.baudrate = parse_int(value, "baud")?,
            "data_bits" => config.flow_uart.data_bits = parse_data_bits(value)?,
            "parity" => config.flow_uart.parity = parse_parity(value)?,
            "stop_bits" => config.flow_uart.stop_bits = parse_stop_bits(value)?,
            "channel" => config.flow_link.channel = parse_int(value, "channel")?,
            "timeout_ms" => config.flow_link.timeout_ms = parse_int(value, "timeout_ms")?,
            "range" => config.process.flow_range = parse_range(value, "range")?,
            "purge_range" => config.process.purge_range = parse_range(value, "purge_range")?,
            _ => return Err(ParseError::UnknownKey),
        },
        Section::Stage(_) => {
            let Some(stage) = current_stage.as_mut() else {
                return Err(ParseError::InvalidSection);
            };
            match key {
                "target_c" => stage.target_x10 = Some(parse_tenths(value, "target_c")?),
                "ramp_min" => stage.ramp_s = Some(parse_minutes(value, "ramp_min")?),
                "hold_min" => stage.hold_s = Some(parse_minutes(value, "hold_min")?),
                "flow_sccm" => stage.flow_sccm = Some(parse_float(value, "flow_sccm")?),
                _ => return Err(ParseError::UnknownKey),
            }
        }
    }
    Ok(())
}

/// Store the stage being built, if the section just ended was a stage
fn save_stage(
    section: &Section,
    config: &mut FirmwareConfig,
    current_stage: &mut Option<PartialStage>,
) -> Result<(), ParseError> {
    let Section::Stage(index) = *section else {
        return Ok(());
    };
    let Some(partial) = current_stage.take() else {
        return Ok(());
    };

    let stage = Stage {
        target_x10: partial.target_x10.ok_or(ParseError::MissingKey("target_c"))?,
        ramp_s: partial.ramp_s.ok_or(ParseError::MissingKey("ramp_min"))?,
        hold_s: partial.hold_s.ok_or(ParseError::MissingKey("hold_min"))?,
        flow_sccm: partial.flow_sccm.ok_or(ParseError::MissingKey("flow_sccm"))?,
    };
    config
        .recipe
        .set_stage(index, stage)
        .map_err(|_| ParseError::TooManyItems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anneal_core::config::{ConfigError, RecipeError};

    const MINIMAL: &str = r#"
[process]
ramp_tolerance_c = 5.0
purge_flow_sccm = 50
"#;

    #[test]
    fn test_parse_tenths() {
        assert_eq!(parse_tenths("25", "t"), Ok(250));
        assert_eq!(parse_tenths("30.0", "t"), Ok(300));
        assert_eq!(parse_tenths("485.5", "t"), Ok(4855));
        assert_eq!(parse_tenths("485.55", "t"), Ok(4856));
        assert_eq!(parse_tenths("-1.5", "t"), Ok(-15));
        assert!(parse_tenths("--1", "t").is_err());
        assert!(parse_tenths("1e3", "t").is_err());
        assert!(parse_tenths("4000", "t").is_err());
    }

    #[test]
    fn test_parse_section_header() {
        assert_eq!(parse_section_header("process"), Ok(Section::Process));
        assert_eq!(parse_section_header("stage.3"), Ok(Section::Stage(3)));
        assert_eq!(parse_section_header("stage.x"), Err(ParseError::InvalidSection));
        assert_eq!(parse_section_header("heater"), Err(ParseError::InvalidSection));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config(MINIMAL).unwrap();
        let process = config.process.build().unwrap();
        assert_eq!(process.ramp_tolerance_x10, 50);
        assert_eq!(process.purge_flow_sccm, 50.0);
        assert_eq!(process.shutdown_threshold_x10, 300);
        assert_eq!(config.flow_uart.parity, Parity::Odd);
        assert_eq!(config.furnace_uart.parity, Parity::None);
        assert_eq!(config.recipe.count(), 0);
    }

    #[test]
    fn test_tolerance_required() {
        let config = parse_config("[process]\npurge_flow_sccm = 50\n").unwrap();
        assert_eq!(
            config.process.build(),
            Err(ConfigError::Missing("ramp_tolerance_c"))
        );
    }

    #[test]
    fn test_parse_links_and_stages() {
        let input = r#"
[process]
ramp_tolerance_c = 2.5
purge_flow_sccm = 100.0  # nitrogen

[furnace]
station = 3
parity = "even"

[flow]
channel = 2
range = 8
timeout_ms = 500

[stage.0]
target_c = 500.0
ramp_min = 5
hold_min = 10
flow_sccm = 20.0
"#;
        let config = parse_config(input).unwrap();
        assert_eq!(config.furnace_link.station, 3);
        assert_eq!(config.furnace_uart.parity, Parity::Even);
        assert_eq!(config.flow_link.channel, 2);
        assert_eq!(config.flow_link.timeout_ms, 500);

        let process = config.process.build().unwrap();
        let recipe = config.recipe.build(&process.limits).unwrap();
        assert_eq!(
            recipe.stages(),
            &[Stage {
                target_x10: 5000,
                ramp_s: 300,
                hold_s: 600,
                flow_sccm: 20.0,
            }]
        );
    }

    #[test]
    fn test_stage_errors() {
        let missing = "[stage.0]\ntarget_c = 500\nramp_min = 5\nhold_min = 10\n";
        assert_eq!(
            parse_config(missing).err(),
            Some(ParseError::MissingKey("flow_sccm"))
        );

        let beyond = "[stage.8]\ntarget_c = 500\nramp_min = 5\nhold_min = 10\nflow_sccm = 1\n";
        assert_eq!(parse_config(beyond).err(), Some(ParseError::TooManyItems));

        // Gaps are caught when the draft becomes a recipe
        let gap = "[stage.1]\ntarget_c = 500\nramp_min = 5\nhold_min = 10\nflow_sccm = 1\n";
        let config = parse_config(gap).unwrap();
        let limits = parse_config(MINIMAL).unwrap().process.build().unwrap().limits;
        assert_eq!(
            config.recipe.build(&limits),
            Err(RecipeError::MissingStage(0))
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert_eq!(
            parse_config("[process]\nramp_tolerence_c = 5\n").err(),
            Some(ParseError::UnknownKey)
        );
    }
}
