//! # DALI Bridge
//!
//! Demo binary: runs the master driver against a simulated bus with one
//! responding slave device.
//!
//! The simulated peripheral stands in for the hardware timer bench; the
//! engine, encoder and decoder underneath are the production ones. The
//! smoke sequence mirrors a commissioning pass: broadcast on, address a
//! device, query it, and show that an unpopulated address yields "no
//! reply".

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use dali_bridge::config::Config;
use dali_bridge::dali::protocol::{ALL_OFF, ALL_ON};
use dali_bridge::engine::TransferOutcome;
use dali_bridge::sim::{SimBus, SimSlave};

/// Short address of the simulated slave device
const SLAVE_ADDRESS: u8 = 0x07;

/// Device type the simulated slave reports (LED module)
const SLAVE_DEVICE_TYPE: u8 = 0x06;

/// A short address no device is programmed with
const EMPTY_ADDRESS: u8 = 0x15;

fn describe(outcome: &TransferOutcome) -> String {
    match outcome.answer {
        Some(answer) => format!("answer {answer:#04X}"),
        None => "no reply".to_string(),
    }
}

/// Main entry point for the DALI Bridge demo
///
/// Initializes logging, wires the driver to the simulated bus, runs the
/// smoke sequence and exits (Ctrl-C aborts early).
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging through a non-blocking writer
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(writer)
        .init();

    info!("DALI Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    // Timing calibration: defaults, or a TOML file given as first argument
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // One slave at SLAVE_ADDRESS answers the two query commands
    let slave = SimSlave::new(|frame| {
        let query_type = ((SLAVE_ADDRESS as u16) << 9) | 0x0199;
        if frame == query_type {
            Some(SLAVE_DEVICE_TYPE)
        } else if frame == 0xBB00 {
            Some(SLAVE_ADDRESS)
        } else {
            None
        }
    });

    let bus = SimBus::new(config.timing.clone(), slave);
    let master = bus.master();

    // The simulation thread plays the role of the hardware: it raises the
    // timer events the dispatcher runs on
    let shutdown = Arc::new(AtomicBool::new(false));
    let pump_shutdown = Arc::clone(&shutdown);
    let pump = std::thread::spawn(move || bus.pump(pump_shutdown));

    info!("bus up, slave at short address {SLAVE_ADDRESS:#04X}");

    let smoke = async {
        let outcome = master.broadcast(ALL_ON)?.outcome().await;
        info!("broadcast ALL_ON: {}", describe(&outcome));

        let outcome = master.turn_on(SLAVE_ADDRESS)?.outcome().await;
        info!("turn_on({SLAVE_ADDRESS:#04X}): {}", describe(&outcome));

        let outcome = master.query_device_type(SLAVE_ADDRESS)?.outcome().await;
        info!("query_device_type({SLAVE_ADDRESS:#04X}): {}", describe(&outcome));

        let outcome = master.query_device_type(EMPTY_ADDRESS)?.outcome().await;
        info!("query_device_type({EMPTY_ADDRESS:#04X}): {}", describe(&outcome));

        let outcome = master.query_short_address()?.outcome().await;
        info!("query_short_address: {}", describe(&outcome));

        let outcome = master.broadcast(ALL_OFF)?.outcome().await;
        info!("broadcast ALL_OFF: {}", describe(&outcome));

        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        result = smoke => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    pump.join().expect("simulation thread panicked");

    info!("done");
    Ok(())
}
