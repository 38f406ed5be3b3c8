//! Tick task for time-based updates
//!
//! Sets the sampling period: every tick the control task polls both
//! instruments and advances the run.

use defmt::*;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker};

/// Signal to notify the control task of a tick, carrying uptime in ms
pub static TICK_SIGNAL: Signal<CriticalSectionRawMutex, u64> = Signal::new();

/// Milliseconds since boot
pub fn uptime_ms() -> u64 {
    Instant::now().as_millis()
}

/// Tick task - sends periodic tick signals with timestamp
#[embassy_executor::task]
pub async fn tick_task(interval_ms: u32) {
    info!("Tick task started, {} ms period", interval_ms);

    let mut ticker = Ticker::every(Duration::from_millis(interval_ms as u64));

    loop {
        ticker.next().await;

        // Replaces a tick the control task has not consumed yet
        TICK_SIGNAL.signal(uptime_ms());
    }
}
