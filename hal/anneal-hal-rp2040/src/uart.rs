//! Buffered serial adapter for the instrument ports
//!
//! Wraps an interrupt-driven buffered UART and implements the
//! line-oriented `anneal-hal` serial traits on top of it. Each line read
//! is bounded by an `embassy-time` deadline.

use embassy_rp::uart;
use embassy_time::{with_deadline, Duration, Instant};

use anneal_hal::uart::{DataBits, Parity, StopBits};
use anneal_hal::{ReadError, UartConfig, UartRx, UartTx};

/// Map instrument serial settings onto the RP2040 UART configuration
pub fn rp_uart_config(config: &UartConfig) -> uart::Config {
    let mut rp = uart::Config::default();
    rp.baudrate = config.baudrate;
    rp.data_bits = match config.data_bits {
        DataBits::Seven => uart::DataBits::DataBits7,
        DataBits::Eight => uart::DataBits::DataBits8,
    };
    rp.parity = match config.parity {
        Parity::None => uart::Parity::ParityNone,
        Parity::Even => uart::Parity::ParityEven,
        Parity::Odd => uart::Parity::ParityOdd,
    };
    rp.stop_bits = match config.stop_bits {
        StopBits::One => uart::StopBits::STOP1,
        StopBits::Two => uart::StopBits::STOP2,
    };
    rp
}

/// Line-oriented serial port over a buffered UART
///
/// `U` is normally `embassy_rp::uart::BufferedUart`; anything with the
/// same `embedded-io` surface works.
pub struct BufferedSerial<U> {
    uart: U,
}

impl<U> BufferedSerial<U> {
    pub fn new(uart: U) -> Self {
        Self { uart }
    }
}

impl<U> UartTx for BufferedSerial<U>
where
    U: embedded_io_async::Write,
{
    type Error = U::Error;

    async fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        embedded_io_async::Write::write_all(&mut self.uart, data).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        embedded_io_async::Write::flush(&mut self.uart).await
    }
}

impl<U> UartRx for BufferedSerial<U>
where
    U: embedded_io_async::Read + embedded_io::Read + embedded_io::ReadReady,
{
    type Error = U::Error;

    async fn read_line(
        &mut self,
        buf: &mut [u8],
        terminator: u8,
        timeout_ms: u32,
    ) -> Result<usize, ReadError<Self::Error>> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        let mut len = 0;
        let mut overrun = false;

        loop {
            if Instant::now() >= deadline {
                return Err(ReadError::Timeout);
            }

            let mut byte = [0u8; 1];
            let n = match with_deadline(
                deadline,
                embedded_io_async::Read::read(&mut self.uart, &mut byte),
            )
            .await
            {
                Err(_) => return Err(ReadError::Timeout),
                Ok(Err(e)) => return Err(ReadError::Bus(e)),
                Ok(Ok(n)) => n,
            };
            if n == 0 {
                continue;
            }

            if byte[0] == terminator {
                // A line that overflowed is consumed up to its terminator so
                // the next read starts on a fresh line
                return if overrun {
                    Err(ReadError::Overrun)
                } else {
                    Ok(len)
                };
            }
            match buf.get_mut(len) {
                Some(slot) => {
                    *slot = byte[0];
                    len += 1;
                }
                None => overrun = true,
            }
        }
    }

    fn discard_input(&mut self) -> Result<(), Self::Error> {
        let mut scratch = [0u8; 16];
        while embedded_io::ReadReady::read_ready(&mut self.uart)? {
            embedded_io::Read::read(&mut self.uart, &mut scratch)?;
        }
        Ok(())
    }
}
