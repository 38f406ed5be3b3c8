//! One timestamped reading of both instruments

use crate::traits::{FurnaceMode, FurnaceStatus, ValveState};

/// Snapshot of both instruments at one tick
///
/// A failed read leaves the corresponding field `None`; values are never
/// carried over from an earlier sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Milliseconds since controller start
    pub timestamp_ms: u64,
    /// Furnace status, `None` if the read failed
    pub furnace: Option<FurnaceStatus>,
    /// Measured flow, `None` if the read failed
    pub actual_flow_sccm: Option<f32>,
    /// Last confirmed valve state
    pub valve: ValveState,
}

impl Sample {
    /// Measured furnace temperature in 0.1°C
    pub fn process_temperature_x10(&self) -> Option<i16> {
        self.furnace.map(|f| f.process_value_x10)
    }

    /// Furnace setpoint in 0.1°C
    pub fn setpoint_x10(&self) -> Option<i16> {
        self.furnace.map(|f| f.setpoint_x10)
    }

    /// Furnace operating mode
    pub fn furnace_mode(&self) -> Option<FurnaceMode> {
        self.furnace.map(|f| f.mode)
    }

    /// Check if either read failed
    pub fn is_partial(&self) -> bool {
        self.furnace.is_none() || self.actual_flow_sccm.is_none()
    }

    /// Row for the export layer
    pub fn export_row(&self) -> ExportRow {
        ExportRow {
            timestamp_ms: self.timestamp_ms,
            process_temperature_x10: self.process_temperature_x10(),
            setpoint_x10: self.setpoint_x10(),
            actual_flow_sccm: self.actual_flow_sccm,
        }
    }
}

/// (timestamp, process temperature, setpoint, actual flow)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExportRow {
    pub timestamp_ms: u64,
    pub process_temperature_x10: Option<i16>,
    pub setpoint_x10: Option<i16>,
    pub actual_flow_sccm: Option<f32>,
}
