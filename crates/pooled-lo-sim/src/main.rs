#![doc = include_str!("../README.md")]

mod config;
mod sequence;
mod simulation;
mod telemetry;

use clap::Parser;
use config::{CliArgs, SimConfig};
use telemetry::init_telemetry;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = SimConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let report = simulation::run(&config)?;
    report.log();
    Ok(())
}

fn log_startup_info(config: &SimConfig) {
    tracing::info!(
        threads = config.threads,
        ids_per_thread = config.ids_per_thread,
        tenants = config.tenants,
        start_value = config.start_value,
        latency_us = config.latency.as_micros() as u64,
        optimizer = ?config.optimizer,
        "starting simulation"
    );
}
