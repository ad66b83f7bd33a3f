//! Single-file TCP transfer channel.
//!
//! A sender opens one connection, writes a two-line text header followed
//! by the raw file bytes, and waits for a one-shot status reply. The
//! receiver accepts connections concurrently and runs the inverse
//! protocol on each of them.
//!
//! # Wire format
//!
//! See [`wire`] module for the header and reply encoding.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod server;
pub mod timed;
pub mod validation;
pub mod wire;

pub use client::{FileSender, SendReport};
pub use config::ChannelConfig;
pub use error::{FailureKind, TransferError};
pub use events::{NoopObserver, Phase, TracingObserver, TransferEvent, TransferObserver};
pub use server::FileReceiver;
pub use wire::{FileHeader, StatusReply};

use std::time::Duration;

/// TCP read/write buffer size (64 KiB).
pub const TCP_BUFFER_SIZE: usize = 64 * 1024;

/// Timeout for a single read on an established connection.
pub const TCP_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the TCP connection attempt.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between consecutive writes on the sender side.
pub const SEND_PACING: Duration = Duration::from_millis(100);

/// Default listen host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default listen / connect port.
pub const DEFAULT_PORT: u16 = 12345;
