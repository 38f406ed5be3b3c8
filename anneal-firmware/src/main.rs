//! Anneal - Tube Furnace Process Controller Firmware
//!
//! Main firmware binary for the RP2040-based furnace controller board.
//! Drives the furnace temperature controller and the mass-flow controller
//! through a multi-stage heat treatment and streams telemetry to the
//! operator console.

#![no_std]
#![no_main]

extern crate alloc;

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::{PIO0, UART0, UART1};
use embassy_rp::pio::Pio;
use embassy_rp::pio_programs::uart::{PioUartRx, PioUartRxProgram, PioUartTx, PioUartTxProgram};
use embassy_rp::uart::{BufferedInterruptHandler, Uart};
use embassy_time::Delay;
use embedded_alloc::LlffHeap as Heap;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use anneal_core::sequencer::Instruments;
use anneal_drivers::{FlowLink, FurnaceLink};
use anneal_hal_rp2040::flash::FlashStorage;
use anneal_hal_rp2040::{rp_uart_config, BufferedSerial};

use crate::config::{parse_config, ConfigPersistence, FirmwareConfig, FlashRecipeStore};
use crate::controller::Controller;
use crate::tasks::InstrumentPort;

// Heap allocator for TOML parsing
#[global_allocator]
static HEAP: Heap = Heap::empty();

// Heap size: 16KB
const HEAP_SIZE: usize = 16 * 1024;

/// Embedded default configuration (compiled into firmware)
/// Edit process.toml and rebuild to customize
const EMBEDDED_CONFIG: &str = include_str!("../process.toml");

/// Operator console baud rate
const CONSOLE_BAUD: u32 = 115200;

mod channels;
mod config;
mod controller;
mod tasks;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
    UART1_IRQ => BufferedInterruptHandler<UART1>;
    PIO0_IRQ_0 => embassy_rp::pio::InterruptHandler<PIO0>;
});

// Static cells for UART buffers (must live forever)
static FURNACE_TX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static FURNACE_RX_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static FLOW_TX_BUF: StaticCell<[u8; 64]> = StaticCell::new();
static FLOW_RX_BUF: StaticCell<[u8; 128]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Anneal firmware starting...");

    // Initialize heap allocator
    init_heap();

    // Initialize RP2040 peripherals
    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    // Load configuration from flash (or use embedded defaults)
    let mut persistence = ConfigPersistence::new(FlashStorage::new(p.FLASH, p.DMA_CH2));
    let config = load_config(&mut persistence).await;

    // Setup UART0 for the furnace temperature controller
    // Pin assignments are board-specific (GPIO0 TX, GPIO1 RX)
    let furnace_uart = Uart::new_blocking(
        p.UART0,
        p.PIN_0,
        p.PIN_1,
        rp_uart_config(&config.furnace_uart),
    )
    .into_buffered(
        Irqs,
        FURNACE_TX_BUF.init([0u8; 64]),
        FURNACE_RX_BUF.init([0u8; 128]),
    );
    let furnace = FurnaceLink::new(BufferedSerial::new(furnace_uart), config.furnace_link);

    info!("Furnace UART initialized");

    // Setup UART1 for the mass-flow controller
    // Pin assignments are board-specific (GPIO4 TX, GPIO5 RX)
    let flow_uart = Uart::new_blocking(p.UART1, p.PIN_4, p.PIN_5, rp_uart_config(&config.flow_uart))
        .into_buffered(
            Irqs,
            FLOW_TX_BUF.init([0u8; 64]),
            FLOW_RX_BUF.init([0u8; 128]),
        );
    let mut flow = FlowLink::new(BufferedSerial::new(flow_uart), config.flow_link);

    let process = match config.process.build() {
        Ok(process) => process,
        Err(e) => {
            error!("Process configuration incomplete: {}", e);
            shut_down(furnace, flow).await;
            loop {
                embassy_time::Timer::after_secs(60).await;
                error!("Halted: fix process.toml and reflash");
            }
        }
    };
    info!(
        "Process: max {} C x10, purge {} sccm, {} ms sampling",
        process.limits.furnace_max_x10, process.purge_flow_sccm, process.sample_interval_ms
    );

    match flow.identify().await {
        Ok(id) => info!("Flow controller: {}", id.as_str()),
        Err(e) => warn!("Flow controller did not identify: {:?}", e),
    }
    match flow.initialize(process.limits.flow_range).await {
        Ok(()) => info!("Flow controller initialized"),
        Err(e) => warn!("Flow controller init failed: {:?}", e),
    }

    let instruments = Instruments::new(furnace, flow, Delay);

    // Flash moves on to the recipe store now that config is loaded
    let store = FlashRecipeStore::new(persistence.into_storage());
    let controller = Controller::new(instruments, process, config.recipe, store);

    // Setup PIO0 as the operator console UART
    // Pin assignments are board-specific (GPIO8 TX, GPIO9 RX)
    let Pio {
        mut common,
        sm0,
        sm1,
        ..
    } = Pio::new(p.PIO0, Irqs);

    let tx_program = PioUartTxProgram::new(&mut common);
    let console_tx = PioUartTx::new(CONSOLE_BAUD, &mut common, sm0, p.PIN_8, &tx_program);
    let rx_program = PioUartRxProgram::new(&mut common);
    let console_rx = PioUartRx::new(CONSOLE_BAUD, &mut common, sm1, p.PIN_9, &rx_program);

    info!("PIO console initialized");

    // Spawn tasks
    spawner
        .spawn(tasks::tick_task(process.sample_interval_ms))
        .unwrap();
    spawner.spawn(tasks::control_task(controller)).unwrap();
    spawner.spawn(tasks::console_rx_task(console_rx)).unwrap();
    spawner.spawn(tasks::console_tx_task(console_tx)).unwrap();

    info!("All tasks spawned, firmware running");

    // Main task has nothing else to do - all work happens in spawned tasks
    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}

/// Leave both instruments safe: furnace in reset, main gas valve closed
async fn shut_down(furnace: FurnaceLink<InstrumentPort>, flow: FlowLink<InstrumentPort>) {
    let (_, reset) = furnace.release().await;
    if let Err(e) = reset {
        error!("Furnace reset failed: {:?}", e);
    }
    let (_, closed) = flow.release().await;
    if let Err(e) = closed {
        error!("Main valve close failed: {:?}", e);
    }
}

/// Initialize the heap allocator
fn init_heap() {
    use core::mem::MaybeUninit;
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    #[allow(static_mut_refs)]
    unsafe {
        HEAP.init(HEAP_MEM.as_ptr() as usize, HEAP_SIZE)
    }
}

/// Load configuration from flash storage
///
/// Attempts to load the TOML override from flash. If not found or invalid,
/// returns the embedded configuration.
async fn load_config(persistence: &mut ConfigPersistence<'static>) -> FirmwareConfig {
    match persistence.load().await {
        Ok(config) => {
            info!("Loaded configuration from flash");
            config
        }
        Err(_) => {
            info!("No valid configuration in flash, using embedded defaults");
            create_default_config()
        }
    }
}

/// Create the embedded default configuration
///
/// Parses the process.toml file that was embedded at compile time.
fn create_default_config() -> FirmwareConfig {
    match parse_config(EMBEDDED_CONFIG) {
        Ok(config) => {
            info!("Parsed embedded configuration successfully");
            config
        }
        Err(e) => {
            // Only reachable if process.toml slipped past the build script
            error!("Failed to parse embedded config: {:?}", e);
            FirmwareConfig::new()
        }
    }
}
