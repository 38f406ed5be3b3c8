//! Process-wide configuration
//!
//! The ramp tolerance and the purge flow have no defaults: they depend on
//! the furnace and gas line in use and must come from the configuration
//! file.

use core::fmt;

use anneal_protocol::FlowRange;

use super::recipe::DeviceLimits;

/// Retry schedule for commanded device writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u8,
    /// Wait before the second attempt
    pub backoff_ms: u32,
    /// Upper bound for the doubling backoff
    pub max_backoff_ms: u32,
}

impl RetryPolicy {
    /// Wait before attempt number `attempt` (1-based, so attempt 2 is the first retry)
    pub fn backoff_before(&self, attempt: u8) -> u32 {
        if attempt <= 1 {
            return 0;
        }
        let shift = (attempt - 2).min(16) as u32;
        self.backoff_ms
            .saturating_mul(1 << shift)
            .min(self.max_backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            max_backoff_ms: 4000,
        }
    }
}

/// Configuration of one controller installation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProcessConfig {
    /// Recipe limits
    pub limits: DeviceLimits,
    /// Highest temperature at which power-off is allowed, in 0.1°C
    pub shutdown_threshold_x10: i16,
    /// How close to target a ramp must get before holding, in 0.1°C
    pub ramp_tolerance_x10: i16,
    /// Flow held open while cooling, in sccm
    pub purge_flow_sccm: f32,
    /// Range selected for the purge flow
    pub purge_range: FlowRange,
    /// Sampler period
    pub sample_interval_ms: u32,
    /// Retry schedule for device commands
    pub retry: RetryPolicy,
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A required value was not supplied
    Missing(&'static str),
    /// A value is outside what the hardware allows
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required setting `{}`", key),
            ConfigError::Invalid(key) => write!(f, "invalid value for `{}`", key),
        }
    }
}

/// Collects settings and checks them once complete
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessConfigBuilder {
    pub ambient_x10: i16,
    pub furnace_max_x10: i16,
    pub flow_range: FlowRange,
    pub shutdown_threshold_x10: i16,
    pub ramp_tolerance_x10: Option<i16>,
    pub purge_flow_sccm: Option<f32>,
    pub purge_range: FlowRange,
    pub sample_interval_ms: u32,
    pub retry: RetryPolicy,
}

impl Default for ProcessConfigBuilder {
    fn default() -> Self {
        Self {
            ambient_x10: 250,
            furnace_max_x10: anneal_protocol::up150::MAX_TEMPERATURE_X10,
            flow_range: FlowRange::SCCM_500,
            shutdown_threshold_x10: 300,
            ramp_tolerance_x10: None,
            purge_flow_sccm: None,
            purge_range: FlowRange::SCCM_500,
            sample_interval_ms: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

impl ProcessConfigBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Check all values and produce the configuration
    pub fn build(&self) -> Result<ProcessConfig, ConfigError> {
        let ramp_tolerance_x10 = self
            .ramp_tolerance_x10
            .ok_or(ConfigError::Missing("ramp_tolerance_c"))?;
        let purge_flow_sccm = self
            .purge_flow_sccm
            .ok_or(ConfigError::Missing("purge_flow_sccm"))?;

        if self.ambient_x10 < anneal_protocol::up150::MIN_TEMPERATURE_X10
            || self.ambient_x10 >= self.furnace_max_x10
        {
            return Err(ConfigError::Invalid("ambient_c"));
        }
        if self.furnace_max_x10 > anneal_protocol::up150::MAX_TEMPERATURE_X10 {
            return Err(ConfigError::Invalid("max_temp_c"));
        }
        if ramp_tolerance_x10 <= 0 {
            return Err(ConfigError::Invalid("ramp_tolerance_c"));
        }
        if self.shutdown_threshold_x10 < self.ambient_x10
            || self.shutdown_threshold_x10 > self.furnace_max_x10
        {
            return Err(ConfigError::Invalid("shutdown_threshold_c"));
        }
        if !(purge_flow_sccm > 0.0 && purge_flow_sccm <= self.purge_range.full_scale_sccm()) {
            return Err(ConfigError::Invalid("purge_flow_sccm"));
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid("sample_interval_ms"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts"));
        }

        Ok(ProcessConfig {
            limits: DeviceLimits {
                ambient_x10: self.ambient_x10,
                furnace_max_x10: self.furnace_max_x10,
                flow_range: self.flow_range,
            },
            shutdown_threshold_x10: self.shutdown_threshold_x10,
            ramp_tolerance_x10,
            purge_flow_sccm,
            purge_range: self.purge_range,
            sample_interval_ms: self.sample_interval_ms,
            retry: self.retry,
        })
    }
}
