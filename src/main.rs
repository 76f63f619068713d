//! jc2drv - Joy-Con 2 BLE input driver
//!
//! Minimal front end over the core driver: takes a MAC address, an
//! optional verbosity flag, and runs the session to completion. Scanning,
//! the button-mapping wizard, and the Bluetooth-daemon helper are external
//! collaborators outside the core's scope (spec.md §1) and are not
//! implemented here.

use std::process::ExitCode;

use anyhow::Result;
use jc2drv::{Config, JoyCon2Driver, UinputSink};

struct Args {
    mac: String,
    verbose: bool,
    status_hz: Option<f64>,
}

fn parse_args() -> Result<Args, String> {
    let mut mac = None;
    let mut verbose = false;
    let mut status_hz = None;

    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => {
                return Err(usage());
            }
            "-s" | "--status" => {
                let hz = argv
                    .next()
                    .ok_or_else(|| format!("--status requires a refresh rate in Hz\n\n{}", usage()))?;
                status_hz = Some(
                    hz.parse::<f64>()
                        .map_err(|_| format!("invalid --status rate: {hz}"))?,
                );
            }
            other => {
                if mac.is_some() {
                    return Err(format!("unexpected argument: {other}\n\n{}", usage()));
                }
                mac = Some(other.to_string());
            }
        }
    }

    mac.map(|mac| Args {
        mac,
        verbose,
        status_hz,
    })
    .ok_or_else(|| format!("missing MAC address\n\n{}", usage()))
}

fn usage() -> String {
    "usage: jc2drv [-v|--verbose] [-s|--status <hz>] <MAC ADDRESS>".to_string()
}

fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("jc2drv: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    log::info!("connecting to {}", args.mac);

    if let Some(hz) = args.status_hz {
        // TODO: periodic status reporting (mode, last-notification age,
        // calibration state) at the requested rate is not implemented yet.
        log::warn!("--status {hz}Hz requested but status reporting is not implemented");
    }

    let sink = UinputSink::new(&args.mac)?;
    let config = Config::default();
    let mut driver = JoyCon2Driver::connect(&args.mac, sink, config).await?;

    log::info!("bring-up complete, running");
    driver.run().await?;
    Ok(())
}

// TODO: device scanning/listing (enumerate nearby Joy-Con 2s over BlueZ
// before a MAC is known) is an external collaborator, not implemented here.

// TODO: the interactive button-mapping wizard is an external collaborator,
// not implemented here; button tables are fixed (see `buttons.rs`).

// TODO: the Bluetooth-daemon-switch helper (toggling BlueZ input-plugin
// policy so the kernel doesn't also claim the Joy-Con as an HID gamepad)
// is an external collaborator, not implemented here.

// TODO: the privilege check (verifying /dev/uinput access and BlueZ
// D-Bus policy before attempting to connect) is an external collaborator,
// not implemented here.
