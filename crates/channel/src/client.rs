//! TCP file sender (client side).
//!
//! Connects to a receiver, writes the header and the file body, and waits
//! for the receiver's status reply.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::config::ChannelConfig;
use crate::error::TransferError;
use crate::events::{Phase, TransferEvent, TransferObserver};
use crate::validation::wire_name;
use crate::wire::{FileHeader, StatusReply, read_reply};

/// Outcome of a transfer that reached the reply phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Name sent in the header.
    pub name: String,
    /// Body bytes written.
    pub bytes_sent: u64,
    /// Receiver's answer; `None` if it never came.
    pub reply: Option<StatusReply>,
}

impl SendReport {
    /// Returns `true` if the receiver confirmed the transfer.
    pub fn confirmed(&self) -> bool {
        self.reply.is_some_and(|r| r.is_success())
    }
}

/// TCP file sender.
pub struct FileSender {
    config: ChannelConfig,
    observer: Arc<dyn TransferObserver>,
}

impl FileSender {
    pub fn new(config: ChannelConfig, observer: Arc<dyn TransferObserver>) -> Self {
        Self { config, observer }
    }

    /// Sends one file over a fresh connection to `addr`.
    ///
    /// The connection is closed before this returns, whatever the outcome.
    pub async fn send_file(
        &self,
        addr: impl ToSocketAddrs,
        path: &Path,
    ) -> Result<SendReport, TransferError> {
        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(addr),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.fail(None, TransferError::Connect(e))),
            Err(_) => return Err(self.fail(None, TransferError::ConnectTimeout)),
        };

        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => return Err(self.fail(None, TransferError::Connect(e))),
        };
        self.observer
            .on_event(TransferEvent::ConnectionOpened { peer });

        let (mut reader, writer) = stream.into_split();
        let mut writer = BufWriter::with_capacity(self.config.buffer_size, writer);

        let result = self.exchange(&mut reader, &mut writer, path, peer).await;

        let _ = writer.shutdown().await;
        drop(writer);
        drop(reader);

        let result = result.map_err(|e| self.fail(Some(peer), e));
        self.observer
            .on_event(TransferEvent::ConnectionClosed { peer });
        result
    }

    async fn exchange<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        path: &Path,
        peer: SocketAddr,
    ) -> Result<SendReport, TransferError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let name = wire_name(path)?;
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let header = FileHeader { name, size };

        self.write_paced(writer, &header.name_line()?).await?;
        self.observer.on_event(TransferEvent::PhaseCompleted {
            peer,
            phase: Phase::Name,
        });

        self.write_paced(writer, &header.size_line()).await?;
        self.observer.on_event(TransferEvent::PhaseCompleted {
            peer,
            phase: Phase::Size,
        });
        self.observer.on_event(TransferEvent::Header {
            peer,
            name: header.name.clone(),
            size,
        });

        let mut buf = vec![0u8; self.config.buffer_size];
        let mut sent: u64 = 0;

        while sent < size {
            let to_read = (size - sent).min(buf.len() as u64) as usize;
            let n = file.read(&mut buf[..to_read]).await?;
            if n == 0 {
                return Err(TransferError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("{} shrank during transfer", path.display()),
                )));
            }

            self.write_paced(writer, &buf[..n]).await?;
            sent += n as u64;

            self.observer.on_event(TransferEvent::Progress {
                peer,
                transferred: sent,
                total: size,
            });
        }

        self.observer.on_event(TransferEvent::PhaseCompleted {
            peer,
            phase: Phase::Body,
        });

        let reply = read_reply(reader, self.config.read_timeout).await?;
        self.observer.on_event(TransferEvent::PhaseCompleted {
            peer,
            phase: Phase::Reply,
        });
        self.observer
            .on_event(TransferEvent::Reply { peer, status: reply });

        Ok(SendReport {
            name: header.name,
            bytes_sent: sent,
            reply,
        })
    }

    /// Writes and flushes `bytes`, then waits the pacing delay.
    async fn write_paced<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        bytes: &[u8],
    ) -> Result<(), TransferError> {
        writer.write_all(bytes).await?;
        writer.flush().await?;
        if !self.config.pacing.is_zero() {
            tokio::time::sleep(self.config.pacing).await;
        }
        Ok(())
    }

    fn fail(&self, peer: Option<SocketAddr>, error: TransferError) -> TransferError {
        self.observer.on_event(TransferEvent::Failed {
            peer,
            kind: error.kind(),
            message: error.to_string(),
        });
        error
    }
}
