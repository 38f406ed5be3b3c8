//! Inter-task communication channels
//!
//! Defines the static channels used for communication between Embassy tasks.
//! Uses embassy-sync primitives for safe async communication.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use anneal_protocol::{ConsoleCommand, ControllerMessage};

/// Channel capacity for console commands
const COMMAND_CHANNEL_SIZE: usize = 8;

/// Channel capacity for outgoing console messages
const OUTBOX_SIZE: usize = 16;

/// Commands from the console, executed by the control task between ticks
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, ConsoleCommand, COMMAND_CHANNEL_SIZE> =
    Channel::new();

/// Messages waiting to be framed and sent to the console
pub static OUTBOX: Channel<CriticalSectionRawMutex, ControllerMessage, OUTBOX_SIZE> =
    Channel::new();
