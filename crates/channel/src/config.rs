//! Tunables shared by the sender and the receiver.

use std::time::Duration;

use crate::{SEND_PACING, TCP_BUFFER_SIZE, TCP_CONNECT_TIMEOUT, TCP_READ_TIMEOUT};

/// Channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum wait for any single read.
    pub read_timeout: Duration,
    /// Maximum wait for the TCP connect (sender only).
    pub connect_timeout: Duration,
    /// Delay after each header line and body chunk (sender only).
    ///
    /// Peers that read the header with fixed-capacity reads rely on it to
    /// see one line per read. Zero disables pacing.
    pub pacing: Duration,
    /// Chunk size for body reads and writes.
    pub buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_timeout: TCP_READ_TIMEOUT,
            connect_timeout: TCP_CONNECT_TIMEOUT,
            pacing: SEND_PACING,
            buffer_size: TCP_BUFFER_SIZE,
        }
    }
}

impl ChannelConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Sets the chunk size. Zero is clamped to one byte.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }
}
