//! Console receive task
//!
//! Receives frames from the operator console and forwards commands to the
//! control task.

use defmt::*;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio_programs::uart::PioUartRx;
use embedded_io_async::Read;

use anneal_protocol::messages::NakReason;
use anneal_protocol::{ConsoleCommand, ControllerMessage, Frame, FrameParser};

use crate::channels::{COMMAND_CHANNEL, OUTBOX};

/// Buffer size for UART receive
const RX_BUF_SIZE: usize = 64;

/// Console receiver on PIO0 state machine 1
pub type ConsoleRx = PioUartRx<'static, PIO0, 1>;

/// Console RX task - receives and parses frames from the console
#[embassy_executor::task]
pub async fn console_rx_task(mut rx: ConsoleRx) {
    info!("Console RX task started");

    let mut parser = FrameParser::new();
    let mut buf = [0u8; RX_BUF_SIZE];

    loop {
        match rx.read(&mut buf).await {
            Ok(n) if n > 0 => {
                trace!("RX: {} bytes", n);

                for &byte in &buf[..n] {
                    match parser.feed(byte) {
                        Ok(Some(frame)) => handle_frame(&frame),
                        Ok(None) => {
                            // Need more bytes
                        }
                        Err(e) => {
                            warn!("Frame parse error: {:?}", e);
                        }
                    }
                }
            }
            Ok(_) => {
                // No bytes read, continue
            }
            Err(_) => {
                warn!("Console read error");
            }
        }
    }
}

/// Dispatch one complete frame
fn handle_frame(frame: &Frame) {
    let reply = dispatch(frame, |command| COMMAND_CHANNEL.try_send(command).is_ok());

    if let Some(reply) = reply {
        if OUTBOX.try_send(reply).is_err() {
            warn!("Console outbox full, dropping reply");
        }
    }
}

/// Decide the immediate reply to a frame
///
/// `enqueue` hands a command to the control task and reports whether it
/// was accepted. Queued commands are answered by the control task.
fn dispatch(frame: &Frame, enqueue: impl FnOnce(ConsoleCommand) -> bool) -> Option<ControllerMessage> {
    match ConsoleCommand::from_frame(frame) {
        Ok(ConsoleCommand::Ping) => {
            trace!("PING received");
            Some(ControllerMessage::Pong)
        }
        Ok(command) => {
            if enqueue(command) {
                None
            } else {
                warn!("Command channel full, refusing {:?}", command);
                Some(ControllerMessage::Nak {
                    command: frame.msg_type,
                    reason: NakReason::Busy,
                })
            }
        }
        Err(e) => {
            warn!("Failed to parse console command: {:?}", e);
            Some(ControllerMessage::Nak {
                command: frame.msg_type,
                reason: NakReason::Malformed,
            })
        }
    }
}
