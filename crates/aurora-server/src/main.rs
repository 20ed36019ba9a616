//! Aurora server entry point.
//!
//! Loads `config.ron`, applies CLI overrides, and drives every configured
//! region at a fixed tick rate. Admin commands are read from stdin, one per
//! line, e.g. `aurora start overworld 6000` or `aurora status frostlands`.
//!
//! Run with: `cargo run -p aurora-server -- --ticks 24000 --seed 7`

mod server;
mod tick_loop;

use std::io::BufRead;
use std::process::ExitCode;

use aurora_config::{AuroraConfig, CliArgs, default_config_dir};
use clap::Parser;
use crossbeam_channel::Receiver;
use tracing::{error, info, warn};

use crate::server::Server;
use crate::tick_loop::TickLoop;

/// Pending admin lines buffered between ticks.
const ADMIN_QUEUE_DEPTH: usize = 32;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| ".".into());
    let mut config = match AuroraConfig::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config from {}: {err}", config_dir.display());
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args);
    if let Err(err) = config.validate() {
        eprintln!("Invalid configuration: {err}");
        return ExitCode::FAILURE;
    }

    let log_dir = config_dir.join("logs");
    aurora_log::init_logging(
        config.debug.log_to_file.then_some(log_dir.as_path()),
        cfg!(debug_assertions),
        Some(&config),
    );

    info!("Aurora server");
    info!(
        "Tick rate: {} Hz | Regions: {} | Observers per region: {}",
        config.server.tick_rate,
        config.server.regions.join(", "),
        config.server.observers_per_region,
    );
    info!(
        "Night: [{}, {}) of {} | Base chance: {:.2}",
        config.cycle.night_start,
        config.cycle.dawn,
        config.cycle.cycle_length,
        config.event.base_chance,
    );

    let admin = spawn_admin_reader();
    let mut server = Server::new(config.clone());
    let mut tick_loop = TickLoop::new(config.server.tick_rate);

    loop {
        for line in admin.try_iter() {
            let reply = server.handle_admin(&line);
            println!("{reply}");
        }

        tick_loop.run_frame(|_| server.step());

        if let Some(limit) = args.ticks
            && tick_loop.tick_count() >= limit
        {
            info!("Reached tick limit ({limit})");
            break;
        }
        std::thread::sleep(tick_loop.time_until_next_tick());
    }

    server.log_summary();
    ExitCode::SUCCESS
}

/// Reads admin commands from stdin on a background thread.
fn spawn_admin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::bounded(ADMIN_QUEUE_DEPTH);
    let spawned = std::thread::Builder::new()
        .name("admin-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("Stopped reading admin commands: {err}");
                        break;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        error!("Admin console unavailable: {err}");
    }
    rx
}
