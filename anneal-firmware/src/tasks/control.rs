//! Control task
//!
//! Owns the controller and with it both instrument links. Ticks and
//! console commands are handled one at a time, so device exchanges never
//! interleave on a link.

use defmt::*;
use embassy_futures::select::{select, Either};
use embassy_rp::uart::BufferedUart;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Delay;

use anneal_core::sampler::Sampler;
use anneal_drivers::{FlowLink, FurnaceLink};
use anneal_hal_rp2040::BufferedSerial;
use anneal_protocol::{ConsoleCommand, ControllerMessage};

use crate::channels::{COMMAND_CHANNEL, OUTBOX};
use crate::config::FlashRecipeStore;
use crate::controller::{export_record, Controller, EXPORT_BATCH, SERIES_CAPACITY};
use crate::tasks::tick::{uptime_ms, TICK_SIGNAL};

/// Serial port of either instrument
pub type InstrumentPort = BufferedSerial<BufferedUart>;

/// Controller as wired on the board
pub type ProcessController = Controller<
    FurnaceLink<InstrumentPort>,
    FlowLink<InstrumentPort>,
    Delay,
    FlashRecipeStore<'static>,
>;

/// Monitoring series
///
/// Kept in a static so the sample buffer lives outside the task future.
/// Only the control task locks it.
pub static SAMPLER: Mutex<CriticalSectionRawMutex, Sampler<SERIES_CAPACITY>> =
    Mutex::new(Sampler::new());

/// Control task - polls, sequences and executes console commands
#[embassy_executor::task]
pub async fn control_task(mut controller: ProcessController) {
    info!("Control task started");

    controller.restore_recipe().await;
    let mut sampler = SAMPLER.lock().await;

    loop {
        match select(COMMAND_CHANNEL.receive(), TICK_SIGNAL.wait()).await {
            Either::First(ConsoleCommand::Export { from }) => {
                send_export(&sampler, from).await;
            }
            Either::First(command) => {
                debug!("Command: {:?}", command);
                let reply = controller.handle(command, uptime_ms(), &mut *sampler).await;
                publish(reply);
            }
            Either::Second(now_ms) => {
                let telemetry = controller.tick(now_ms, &mut *sampler).await;
                publish(ControllerMessage::Sample(telemetry.sample));
                publish(ControllerMessage::Status(telemetry.status));
            }
        }
    }
}

/// Queue a message for the console, dropping it if the console lags
fn publish(message: ControllerMessage) {
    if OUTBOX.try_send(message).is_err() {
        warn!("Console outbox full, dropping message");
    }
}

/// Stream up to one batch of rows starting at `from`
async fn send_export(sampler: &Sampler<SERIES_CAPACITY>, from: u16) {
    let mut count: u16 = 0;
    for row in sampler
        .series()
        .export_rows(from as usize)
        .take(EXPORT_BATCH)
    {
        OUTBOX
            .send(ControllerMessage::ExportRow(export_record(&row)))
            .await;
        count += 1;
    }
    OUTBOX.send(ControllerMessage::ExportEnd { count }).await;
    debug!("Exported {} rows from {}", count, from);
}
