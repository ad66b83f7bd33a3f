//! TransferX command-line entry point.
//!
//! Parses arguments and dispatches into either server or client mode. All
//! protocol work lives in `transferx-channel`.

mod app;
mod config;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Mode};

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mode = match cli.mode() {
        Ok(mode) => mode,
        Err(message) => {
            println!("{message}");
            return Ok(());
        }
    };

    // Single-threaded: one cooperative task per connection.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match mode {
        Mode::Server { output_dir } => rt.block_on(app::run_server(&cli, output_dir))?,
        Mode::Client { file_path } => rt.block_on(app::run_client(&cli, &file_path)),
        Mode::Help => Cli::command().print_help()?,
    }

    Ok(())
}
