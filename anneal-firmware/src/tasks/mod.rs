//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod console_rx;
pub mod console_tx;
pub mod control;
pub mod tick;

pub use console_rx::{console_rx_task, ConsoleRx};
pub use console_tx::{console_tx_task, ConsoleTx};
pub use control::{control_task, InstrumentPort, ProcessController};
pub use tick::tick_task;
