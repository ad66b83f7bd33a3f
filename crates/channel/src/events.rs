//! Structured transfer events.
//!
//! The protocol code never logs directly. It reports what happens on each
//! connection to a [`TransferObserver`], and the embedding application
//! decides how to format or route it.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::FailureKind;
use crate::wire::StatusReply;

/// Protocol phase that just finished on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Name,
    Size,
    Body,
    Reply,
}

/// An event emitted by the sender or the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// The receiver bound its listener.
    Listening { addr: SocketAddr },
    /// A connection was established (accepted or connected).
    ConnectionOpened { peer: SocketAddr },
    /// A protocol phase completed.
    PhaseCompleted { peer: SocketAddr, phase: Phase },
    /// The header was exchanged.
    Header {
        peer: SocketAddr,
        name: String,
        size: u64,
    },
    /// Body bytes moved so far.
    Progress {
        peer: SocketAddr,
        transferred: u64,
        total: u64,
    },
    /// The receiver stored a complete file.
    FileStored { peer: SocketAddr, path: PathBuf },
    /// A status reply was sent (receiver) or received (sender).
    ///
    /// `None` on the sender side means no confirmation arrived.
    Reply {
        peer: SocketAddr,
        status: Option<StatusReply>,
    },
    /// The transfer failed. `peer` is `None` if no connection was made.
    Failed {
        peer: Option<SocketAddr>,
        kind: FailureKind,
        message: String,
    },
    /// The connection was closed.
    ConnectionClosed { peer: SocketAddr },
    /// An accept call on the listener failed.
    AcceptFailed { message: String },
}

/// Sink for [`TransferEvent`]s.
pub trait TransferObserver: Send + Sync + 'static {
    fn on_event(&self, event: TransferEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn on_event(&self, _event: TransferEvent) {}
}

/// Forwards events over a channel. Send errors (receiver gone) are ignored.
impl TransferObserver for mpsc::UnboundedSender<TransferEvent> {
    fn on_event(&self, event: TransferEvent) {
        let _ = self.send(event);
    }
}

/// Renders events as `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn on_event(&self, event: TransferEvent) {
        match event {
            TransferEvent::Listening { addr } => {
                tracing::info!(%addr, "serving");
            }
            TransferEvent::ConnectionOpened { peer } => {
                tracing::info!(%peer, "connection opened");
            }
            TransferEvent::PhaseCompleted { peer, phase } => {
                tracing::debug!(%peer, ?phase, "phase completed");
            }
            TransferEvent::Header { peer, name, size } => {
                tracing::info!(%peer, %name, size, "file header");
            }
            TransferEvent::Progress {
                peer,
                transferred,
                total,
            } => {
                tracing::trace!(%peer, transferred, total, "progress");
            }
            TransferEvent::FileStored { peer, path } => {
                tracing::info!(%peer, path = %path.display(), "file received successfully");
            }
            TransferEvent::Reply { peer, status } => match status {
                Some(StatusReply::Success) => {
                    tracing::info!(%peer, "file transfer confirmed");
                }
                Some(status) => {
                    tracing::error!(%peer, %status, "file transfer rejected");
                }
                None => {
                    tracing::warn!(%peer, "no confirmation received");
                }
            },
            TransferEvent::Failed {
                peer,
                kind,
                message,
            } => match peer {
                Some(peer) => tracing::error!(%peer, ?kind, "{message}"),
                None => tracing::error!(?kind, "{message}"),
            },
            TransferEvent::ConnectionClosed { peer } => {
                tracing::debug!(%peer, "connection closed");
            }
            TransferEvent::AcceptFailed { message } => {
                tracing::error!("accept error: {message}");
            }
        }
    }
}
