//! TCP wire format for a single-file transfer.
//!
//! # Wire format
//!
//! ```text
//! HEADER (Sender -> Receiver):
//!   <file name, UTF-8>\n
//!   <file size, base-10 ASCII>\n
//!
//! BODY (Sender -> Receiver):
//!   <file size bytes: raw file data>
//!
//! REPLY (Receiver -> Sender), no delimiter, connection closed after:
//!   "Success" | "Error" | "File not found"
//! ```
//!
//! Header lines are read through a buffered reader and only returned once
//! the delimiter has arrived, so the receiver does not depend on how the
//! sender's writes were segmented.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransferError;
use crate::timed::with_timeout;

/// Header line delimiter.
pub const LINE_DELIMITER: u8 = b'\n';

/// Longest accepted header line, delimiter excluded.
pub const MAX_HEADER_LINE: usize = 4096;

/// Longest accepted status reply.
pub const MAX_REPLY_LEN: usize = 64;

/// The two header fields preceding the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// File name as sent by the peer (the sender's basename).
    pub name: String,
    /// Exact body length in bytes.
    pub size: u64,
}

impl FileHeader {
    /// Encodes the name line, delimiter included.
    pub fn name_line(&self) -> Result<Vec<u8>, TransferError> {
        if self.name.is_empty() {
            return Err(TransferError::InvalidPath("empty file name".into()));
        }
        if self.name.as_bytes().contains(&LINE_DELIMITER) {
            return Err(TransferError::InvalidPath(format!(
                "file name contains a newline: {:?}",
                self.name
            )));
        }
        if self.name.len() > MAX_HEADER_LINE {
            return Err(TransferError::InvalidPath(format!(
                "file name too long: {} bytes (max {MAX_HEADER_LINE})",
                self.name.len()
            )));
        }

        let mut line = Vec::with_capacity(self.name.len() + 1);
        line.extend_from_slice(self.name.as_bytes());
        line.push(LINE_DELIMITER);
        Ok(line)
    }

    /// Encodes the size line, delimiter included.
    pub fn size_line(&self) -> Vec<u8> {
        format!("{}\n", self.size).into_bytes()
    }
}

/// Reads one delimited header line, without the delimiter.
///
/// Fails with [`TransferError::PeerClosed`] if the stream ends before the
/// delimiter, and with [`TransferError::MalformedHeader`] if the line is
/// longer than [`MAX_HEADER_LINE`].
pub async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Vec<u8>, TransferError> {
    let mut line = Vec::new();
    let mut limited = (&mut *reader).take(MAX_HEADER_LINE as u64 + 1);
    let n = with_timeout(timeout, limited.read_until(LINE_DELIMITER, &mut line)).await?;

    if n == 0 {
        return Err(TransferError::PeerClosed);
    }
    if line.last() != Some(&LINE_DELIMITER) {
        if line.len() > MAX_HEADER_LINE {
            return Err(TransferError::MalformedHeader(format!(
                "header line exceeds {MAX_HEADER_LINE} bytes"
            )));
        }
        return Err(TransferError::PeerClosed);
    }

    line.pop();
    Ok(line)
}

/// Reads and decodes the name line.
pub async fn read_name<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<String, TransferError> {
    let line = read_line(reader, timeout).await?;
    let name = String::from_utf8(line)
        .map_err(|e| TransferError::MalformedHeader(format!("invalid UTF-8 name: {e}")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(TransferError::MalformedHeader("empty file name".into()));
    }
    Ok(name.to_string())
}

/// Reads and parses the size line.
pub async fn read_size<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<u64, TransferError> {
    let line = read_line(reader, timeout).await?;
    let text = String::from_utf8_lossy(&line);
    text.trim()
        .parse::<u64>()
        .map_err(|_| TransferError::MalformedHeader(format!("invalid file size: {:?}", text)))
}

/// Status reply sent by the receiver once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReply {
    Success,
    Error,
    FileNotFound,
}

impl StatusReply {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Error => "Error",
            Self::FileNotFound => "File not found",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for StatusReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusReply {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::Success),
            "Error" => Ok(Self::Error),
            "File not found" => Ok(Self::FileNotFound),
            other => Err(TransferError::UnexpectedReply(other.to_string())),
        }
    }
}

/// Writes the status reply and flushes.
pub async fn write_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: StatusReply,
) -> Result<(), TransferError> {
    writer.write_all(status.as_str().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the status reply.
///
/// The whole read is bounded by a single `timeout`, and stops as soon as
/// the bytes received so far form a complete reply. Returns `None` if
/// nothing arrives in time or the receiver closes without answering.
pub async fn read_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Option<StatusReply>, TransferError> {
    let mut buf = [0u8; MAX_REPLY_LEN];
    let mut len = 0;

    let fill = async {
        while len < buf.len() {
            let n = reader.read(&mut buf[len..]).await?;
            if n == 0 {
                break;
            }
            len += n;
            if decode_reply(&buf[..len]).is_some() {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    };

    match with_timeout(timeout, fill).await {
        Ok(()) | Err(TransferError::Timeout) => {}
        Err(e) => return Err(e),
    }

    if len == 0 {
        return Ok(None);
    }

    let text = String::from_utf8_lossy(&buf[..len]);
    text.trim().parse().map(Some)
}

fn decode_reply(bytes: &[u8]) -> Option<StatusReply> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}
