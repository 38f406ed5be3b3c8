//! Console transmit task
//!
//! Frames queued messages and writes them to the console.

use defmt::*;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio_programs::uart::PioUartTx;
use embedded_io_async::Write;

use anneal_protocol::frame::MAX_FRAME_SIZE;
use anneal_protocol::ControllerMessage;

use crate::channels::OUTBOX;

/// Console transmitter on PIO0 state machine 0
pub type ConsoleTx = PioUartTx<'static, PIO0, 0>;

/// Console TX task - sends queued messages in order
#[embassy_executor::task]
pub async fn console_tx_task(mut tx: ConsoleTx) {
    info!("Console TX task started");

    loop {
        let message = OUTBOX.receive().await;
        send_message(&mut tx, &message).await;
    }
}

/// Encode and write one message
async fn send_message(tx: &mut ConsoleTx, message: &ControllerMessage) {
    let frame = match message.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode {:?}: {:?}", message, e);
            return;
        }
    };

    let mut buf = [0u8; MAX_FRAME_SIZE];
    match frame.encode(&mut buf) {
        Ok(len) => {
            if tx.write_all(&buf[..len]).await.is_err() {
                warn!("Failed to send console frame");
            } else {
                trace!("Sent frame type {=u8:#x}", frame.msg_type);
            }
        }
        Err(e) => {
            warn!("Failed to frame message: {:?}", e);
        }
    }
}
