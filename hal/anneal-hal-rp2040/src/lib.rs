//! RP2040-specific HAL for the furnace controller firmware
//!
//! This crate provides RP2040-specific implementations of the shared
//! `anneal-hal` traits:
//!
//! - Buffered serial adapter with per-line deadlines (implements
//!   `anneal_hal::UartTx` and `anneal_hal::UartRx`)
//! - UART configuration mapping for the instrument ports
//! - Flash storage driver (implements `anneal_hal::FlashStorage`)

#![no_std]

pub mod flash;
pub mod uart;

// Re-export shared traits from anneal-hal for convenience
pub use anneal_hal::{FlashStorage as FlashStorageTrait, StorageKey};
pub use uart::{rp_uart_config, BufferedSerial};
