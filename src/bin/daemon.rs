// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! argonone-fand: system service that drives the Argon ONE case fan from
//! processor and disk temperatures.

use anyhow::Context;
use argonone_fan::bus::{self, FanBus};
use argonone_fan::config;
use argonone_fan::control::{ControlLoop, Source};
use argonone_fan::fan::Fan;
use argonone_fan::sensors::Lsblk;
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

/// How long the control loop gets to turn the fan off after a stop request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "argonone-fand", about = "Argon ONE fan control daemon")]
struct Cli {
    /// Path to the configuration file [default: /etc/default/argonone.toml].
    #[arg(short, long, env = config::CONFIG_PATH_ENV)]
    config: Option<String>,

    /// I2C bus number of the fan controller [default: the board's header
    /// bus, then 1, then 0].
    #[arg(long)]
    i2c_bus: Option<u8>,

    /// Run without opening the I2C bus; fan commands become no-ops.
    #[arg(long, conflicts_with = "i2c_bus")]
    no_bus: bool,

    /// Print the effective threshold tables as JSON and exit.
    #[arg(long)]
    check_config: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(cli.config.as_deref());
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Cannot read config file {}", config_path.display()))?;

    if cli.check_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    // Install handlers before any hardware is touched so an early signal
    // still leads to an orderly shutdown.
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let bus: Option<Box<dyn FanBus>> = if cli.no_bus {
        log::info!("Running without I2C bus");
        None
    } else {
        bus::open_bus(cli.i2c_bus).map(|b| Box::new(b) as Box<dyn FanBus>)
    };

    let stop = CancellationToken::new();
    let worker = tokio::spawn(control_fan(bus, cfg, stop.clone()));

    tokio::select! {
        _ = sigint.recv() => log::info!("Received SIGINT"),
        _ = sigterm.recv() => log::info!("Received SIGTERM"),
    }
    stop.cancel();

    match time::timeout(SHUTDOWN_GRACE, worker).await {
        Ok(Ok(())) => log::info!("Daemon shutting down"),
        Ok(Err(e)) => log::error!("Fan control task failed: {e}"),
        Err(_) => {
            log::warn!(
                "Fan control did not stop within {}s, exiting anyway",
                SHUTDOWN_GRACE.as_secs()
            );
            // A worker stuck in a bus call would block runtime teardown.
            std::process::exit(0);
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Control worker
// ---------------------------------------------------------------------------

async fn control_fan(bus: Option<Box<dyn FanBus>>, cfg: config::Config, stop: CancellationToken) {
    let fan = Fan::detect(bus, &stop).await;
    let cpu = Source::cpu(&cfg.cpu_temp);
    let storage = Source::storage(&cfg.hdd_temp, &Lsblk::default()).await;

    ControlLoop::new(fan, cpu, storage).run(stop).await;
}
