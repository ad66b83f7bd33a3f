//! Error types for the transfer channel.

use std::path::PathBuf;

/// Errors produced by a single transfer, on either side.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("connection timed out")]
    ConnectTimeout,

    #[error("read timed out")]
    Timeout,

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("incomplete transfer: expected {expected} bytes, received {received}")]
    IncompleteBody { expected: u64, received: u64 },

    #[error("cannot open destination {}: {source}", path.display())]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid file path: {0}")]
    InvalidPath(String),

    #[error("file size mismatch: expected {expected}, got {received}")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`TransferError`], carried by events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Connect,
    Timeout,
    PeerClosed,
    MalformedHeader,
    IncompleteBody,
    DestinationUnavailable,
    SizeMismatch,
    UnexpectedReply,
    Io,
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connect(_) | Self::ConnectTimeout => FailureKind::Connect,
            Self::Timeout => FailureKind::Timeout,
            Self::PeerClosed => FailureKind::PeerClosed,
            Self::MalformedHeader(_) => FailureKind::MalformedHeader,
            Self::IncompleteBody { .. } => FailureKind::IncompleteBody,
            Self::DestinationUnavailable { .. } | Self::InvalidPath(_) => {
                FailureKind::DestinationUnavailable
            }
            Self::SizeMismatch { .. } => FailureKind::SizeMismatch,
            Self::UnexpectedReply(_) => FailureKind::UnexpectedReply,
            Self::Io(_) => FailureKind::Io,
        }
    }
}
