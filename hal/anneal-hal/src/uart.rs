//! UART serial communication abstractions
//!
//! Both process instruments speak line-oriented ASCII: one command goes
//! out, exactly one reply line comes back. The traits here model that
//! shape so the links never deal with partial reads or deadlines.

use core::future::Future;

/// UART transmitter
pub trait UartTx {
    /// Error type for transmit operations
    type Error;

    /// Write all of `data` to the UART
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;

    /// Wait until buffered data has left the transmitter
    fn flush(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}

/// UART receiver
pub trait UartRx {
    /// Error type for receive operations
    type Error;

    /// Read bytes into `buf` until `terminator` has been received
    ///
    /// Returns the number of bytes stored, terminator excluded. The whole
    /// call is bounded by `timeout_ms`; a line that does not complete in
    /// time yields [`ReadError::Timeout`].
    fn read_line(
        &mut self,
        buf: &mut [u8],
        terminator: u8,
        timeout_ms: u32,
    ) -> impl Future<Output = Result<usize, ReadError<Self::Error>>>;

    /// Drop any bytes already waiting in the receive buffer
    fn discard_input(&mut self) -> Result<(), Self::Error>;
}

/// Combined UART interface
///
/// For UARTs that provide both TX and RX on a single peripheral.
pub trait Uart: UartTx + UartRx {}

// Blanket implementation
impl<T: UartTx + UartRx> Uart for T {}

/// Errors from a bounded line read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadError<E> {
    /// No complete line within the deadline
    Timeout,
    /// The line did not fit in the caller's buffer
    Overrun,
    /// Underlying peripheral error
    Bus(E),
}

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl UartConfig {
    /// 9600 baud, 8 data bits, no parity, 1 stop bit
    pub const fn instrument_default() -> Self {
        Self {
            baudrate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl Default for UartConfig {
    fn default() -> Self {
        Self::instrument_default()
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    /// Parse a config value ("none", "even", "odd")
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Parity::None),
            "even" => Some(Parity::Even),
            "odd" => Some(Parity::Odd),
            _ => None,
        }
    }
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}
