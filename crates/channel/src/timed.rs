//! Timeout-bounded reads.
//!
//! Every wait for incoming data on either side goes through this module.
//! Nothing here retries: a timeout is reported once and the caller is
//! expected to abandon the connection.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TransferError;

/// Runs an I/O future, failing with [`TransferError::Timeout`] if it does
/// not complete within `timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, TransferError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TransferError::Timeout),
    }
}

/// Reads up to `buf.len()` bytes, waiting at most `timeout`.
///
/// `Ok(0)` means the peer closed its side (or `buf` is empty).
pub async fn read_timed<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, TransferError> {
    with_timeout(timeout, reader.read(buf)).await
}
