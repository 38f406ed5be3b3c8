//! Power-off safety evaluation
//!
//! A verdict depends on nothing but the sample and the configured
//! threshold, so it can be recomputed anywhere without coordination.

use core::fmt;

use crate::sampler::Sample;

/// Why power-off is not allowed yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockingReason {
    /// Furnace is above the shutdown threshold
    TooHot {
        temperature_x10: i16,
        threshold_x10: i16,
    },
    /// The last furnace read failed, so the temperature is unknown
    TemperatureUnknown,
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            BlockingReason::TooHot {
                temperature_x10,
                threshold_x10,
            } => write!(
                f,
                "furnace at {}°C, above {}°C shutdown limit",
                Tenths(temperature_x10),
                Tenths(threshold_x10)
            ),
            BlockingReason::TemperatureUnknown => write!(f, "furnace temperature unavailable"),
        }
    }
}

/// Tenths of a degree shown with one decimal
struct Tenths(i16);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{}{}.{}", sign, magnitude / 10, magnitude % 10)
    }
}

/// Result of a safety evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyVerdict {
    pub safe_to_power_off: bool,
    pub requires_cooldown: bool,
    pub blocking_reason: Option<BlockingReason>,
}

impl SafetyVerdict {
    fn safe() -> Self {
        Self {
            safe_to_power_off: true,
            requires_cooldown: false,
            blocking_reason: None,
        }
    }

    fn blocked(reason: BlockingReason) -> Self {
        Self {
            safe_to_power_off: false,
            requires_cooldown: true,
            blocking_reason: Some(reason),
        }
    }
}

/// Evaluates samples against the shutdown threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SafetyMonitor {
    shutdown_threshold_x10: i16,
}

impl SafetyMonitor {
    /// Create a monitor with the highest temperature at which power-off is allowed
    pub const fn new(shutdown_threshold_x10: i16) -> Self {
        Self {
            shutdown_threshold_x10,
        }
    }

    /// Configured threshold in 0.1°C
    pub fn threshold_x10(&self) -> i16 {
        self.shutdown_threshold_x10
    }

    /// Evaluate a sample
    ///
    /// A sample without a furnace reading is never safe.
    pub fn evaluate(&self, sample: &Sample) -> SafetyVerdict {
        self.evaluate_temperature(sample.process_temperature_x10())
    }

    /// Evaluate a bare temperature reading
    pub fn evaluate_temperature(&self, temperature_x10: Option<i16>) -> SafetyVerdict {
        match temperature_x10 {
            None => SafetyVerdict::blocked(BlockingReason::TemperatureUnknown),
            Some(t) if t <= self.shutdown_threshold_x10 => SafetyVerdict::safe(),
            Some(t) => SafetyVerdict::blocked(BlockingReason::TooHot {
                temperature_x10: t,
                threshold_x10: self.shutdown_threshold_x10,
            }),
        }
    }
}
