//! Configuration persistence
//!
//! Loads the process configuration from flash storage.
//! Falls back to the embedded process.toml if flash holds no override.

extern crate alloc;

use alloc::vec;
use core::str;
use defmt::*;

use anneal_hal_rp2040::flash::{FlashError, FlashStorage, StorageKey, MAX_VALUE_SIZE};
// Import the FlashStorage trait to bring methods into scope
use anneal_hal_rp2040::FlashStorageTrait;

use super::toml::{parse_config, ParseError};
use super::FirmwareConfig;

/// Configuration persistence errors
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Flash operation failed
    Flash(FlashError),
    /// TOML parsing failed
    TomlParse(ParseError),
    /// Invalid UTF-8 in TOML data
    InvalidUtf8,
}

impl From<FlashError> for ConfigError {
    fn from(e: FlashError) -> Self {
        ConfigError::Flash(e)
    }
}

/// Configuration persistence manager
///
/// Handles loading the process configuration from flash storage.
pub struct ConfigPersistence<'d> {
    storage: FlashStorage<'d>,
}

impl<'d> ConfigPersistence<'d> {
    /// Create a new config persistence manager
    pub fn new(storage: FlashStorage<'d>) -> Self {
        Self { storage }
    }

    /// Consume this persistence manager and return the underlying storage
    ///
    /// The storage moves on to the recipe store once the configuration
    /// is loaded.
    pub fn into_storage(self) -> FlashStorage<'d> {
        self.storage
    }

    /// Load the TOML override from flash
    pub async fn load(&mut self) -> Result<FirmwareConfig, ConfigError> {
        info!("Loading configuration from flash...");

        // Heap buffer keeps the boot future small
        let mut buffer = vec![0u8; MAX_VALUE_SIZE];
        let len = self
            .storage
            .read(StorageKey::ProcessConfigToml, &mut buffer)
            .await?;

        debug!("Read {} bytes of TOML from flash", len);

        let toml_str = str::from_utf8(&buffer[..len]).map_err(|_| ConfigError::InvalidUtf8)?;
        let config = parse_config(toml_str).map_err(ConfigError::TomlParse)?;

        log_config_summary(&config);
        Ok(config)
    }
}

/// Log a summary of the loaded configuration
pub fn log_config_summary(config: &FirmwareConfig) {
    info!("Configuration loaded successfully");
    debug!(
        "  furnace: station {}, {} baud",
        config.furnace_link.station, config.furnace_uart.baudrate
    );
    debug!(
        "  flow: channel {}, range code {}, {} baud",
        config.flow_link.channel,
        config.process.flow_range.code(),
        config.flow_uart.baudrate
    );
    debug!("  {} default stages", config.recipe.count());
}
