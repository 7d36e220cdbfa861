//! CLIMS command-line client.
//!
//! Signs in against the CLIMS backend and browses assets, lookups,
//! maintenance records and reports from the terminal. The session is kept
//! between runs, and expired access tokens are refreshed transparently.

mod commands;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clims_core::config::Config;
use clims_core::ApiError;

use commands::{Cli, Command};

const LOG_FILE: &str = "clims.log";

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). Logs also go to a file in
/// the cache directory when it can be created; keep the guard alive to flush it.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file = Config::cache_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok())
        .map(|dir| tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE)));

    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Before the config, so rejected environment overrides are reported
    let _guard = init_tracing();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(base_url = config.base_url(), "CLIMS client starting");

    if let Err(e) = run(cli.command, config).await {
        report(&e);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let ctx = commands::Context::open(config).await?;
    ctx.execute(command).await
}

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<ApiError>() {
        Some(ApiError::SessionExpired) => {
            eprintln!("Your session has expired. Run `clims login` to sign in again.");
        }
        Some(ApiError::Forbidden(_)) => {
            eprintln!("You do not have permission to do that.");
        }
        _ => eprintln!("Error: {:#}", error),
    }
}
