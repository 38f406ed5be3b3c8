//! Configuration loading and parsing
//!
//! Loads configuration from flash or embedded defaults.
//! Uses TOML format parsed by a custom no_std parser.

pub mod loader;
pub mod recipe_store;
pub mod toml;

pub use loader::ConfigPersistence;
pub use recipe_store::FlashRecipeStore;
pub use toml::parse_config;

use anneal_core::config::{ProcessConfigBuilder, RecipeDraft};
use anneal_drivers::{FlowLinkConfig, FurnaceLinkConfig};
use anneal_hal::uart::Parity;
use anneal_hal::UartConfig;

/// Everything read from process.toml
#[derive(Debug, Clone)]
pub struct FirmwareConfig {
    /// Process settings, checked by `build()` once parsing is done
    pub process: ProcessConfigBuilder,
    /// Serial settings of the furnace port
    pub furnace_uart: UartConfig,
    pub furnace_link: FurnaceLinkConfig,
    /// Serial settings of the flow controller port
    pub flow_uart: UartConfig,
    pub flow_link: FlowLinkConfig,
    /// Recipe used when none was saved
    pub recipe: RecipeDraft,
}

impl FirmwareConfig {
    /// Factory settings of both instruments, no process values
    pub fn new() -> Self {
        Self {
            process: ProcessConfigBuilder::new(),
            furnace_uart: UartConfig::instrument_default(),
            furnace_link: FurnaceLinkConfig::default(),
            flow_uart: UartConfig {
                parity: Parity::Odd,
                ..UartConfig::instrument_default()
            },
            flow_link: FlowLinkConfig::default(),
            recipe: RecipeDraft::new(),
        }
    }
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self::new()
    }
}
