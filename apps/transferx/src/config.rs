//! Command-line configuration.

use std::path::PathBuf;

use clap::Parser;
use transferx_channel::{ChannelConfig, DEFAULT_HOST, DEFAULT_PORT};

/// TransferX command-line tool for reliable and efficient file transfer.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Start the server.
    #[arg(short, long, conflicts_with = "client")]
    pub server: bool,

    /// Start the client and send a file.
    #[arg(short, long)]
    pub client: bool,

    /// Host IP address.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port number.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Path of the file to send to the server.
    #[arg(long)]
    pub file_path: Option<PathBuf>,

    /// Directory received files are written to (server mode).
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

/// What the process should do, after validating the arguments.
#[derive(Debug, PartialEq, Eq)]
pub enum Mode {
    Server { output_dir: PathBuf },
    Client { file_path: PathBuf },
    Help,
}

impl Cli {
    /// Resolves the run mode.
    ///
    /// Returns the message to print when client mode is requested without
    /// an existing regular file to send.
    pub fn mode(&self) -> Result<Mode, String> {
        if self.server {
            return Ok(Mode::Server {
                output_dir: self.output_dir.clone(),
            });
        }
        if !self.client {
            return Ok(Mode::Help);
        }

        match &self.file_path {
            None => Err("Usage: transferx --client --file-path <FILE_PATH> \
                         [--host <HOST>] [--port <PORT>]"
                .to_string()),
            Some(path) if path.is_file() => Ok(Mode::Client {
                file_path: path.clone(),
            }),
            Some(path) => Err(format!("File '{}' does not exist.", path.display())),
        }
    }

    /// Protocol settings. Only the defaults are exposed on the command line.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default()
    }
}
