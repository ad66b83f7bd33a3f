//! TCP file receiver (server side).
//!
//! Accepts connections concurrently and, on each of them, reads the
//! header, stores the body under the output directory, and answers with a
//! single status reply.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::sync::CancellationToken;

use crate::config::ChannelConfig;
use crate::error::TransferError;
use crate::events::{Phase, TransferEvent, TransferObserver};
use crate::timed::read_timed;
use crate::validation::resolve_destination;
use crate::wire::{StatusReply, read_name, read_size, write_reply};

/// A failed exchange, with the reply (if any) owed to the peer.
struct Abort {
    error: TransferError,
    reply: Option<StatusReply>,
}

impl Abort {
    fn answered(error: TransferError, reply: StatusReply) -> Self {
        Self {
            error,
            reply: Some(reply),
        }
    }
}

impl From<TransferError> for Abort {
    fn from(error: TransferError) -> Self {
        Self { error, reply: None }
    }
}

/// TCP file receiver.
pub struct FileReceiver {
    output_dir: PathBuf,
    config: ChannelConfig,
    observer: Arc<dyn TransferObserver>,
}

impl FileReceiver {
    pub fn new(
        output_dir: PathBuf,
        config: ChannelConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            output_dir,
            config,
            observer,
        })
    }

    /// Binds the listener without starting to accept.
    pub async fn bind(&self, addr: impl ToSocketAddrs) -> Result<TcpListener, TransferError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        self.observer
            .on_event(TransferEvent::Listening { addr: local_addr });
        Ok(listener)
    }

    /// Binds `addr` and serves until `cancel` fires.
    pub async fn run(
        self: &Arc<Self>,
        addr: impl ToSocketAddrs,
        cancel: CancellationToken,
    ) -> Result<(), TransferError> {
        let listener = self.bind(addr).await?;
        self.serve(listener, cancel).await;
        Ok(())
    }

    /// Accepts connections until `cancel` fires, one task per connection.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let receiver = Arc::clone(self);
                            tokio::spawn(async move {
                                let _ = receiver.handle_connection(stream, peer).await;
                            });
                        }
                        Err(e) => {
                            self.observer.on_event(TransferEvent::AcceptFailed {
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Runs the receive protocol on one connection and closes it.
    ///
    /// Returns the reply sent on success. On failure the peer has been
    /// sent whatever reply the failure calls for, possibly none.
    pub async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<StatusReply, TransferError> {
        self.observer
            .on_event(TransferEvent::ConnectionOpened { peer });

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::with_capacity(self.config.buffer_size, reader);

        let (result, reply) = match self.exchange(&mut reader, peer).await {
            Ok(status) => (Ok(status), Some(status)),
            Err(Abort { error, reply }) => (Err(error), reply),
        };

        let result = match reply {
            Some(status) => match write_reply(&mut writer, status).await {
                Ok(()) => {
                    self.observer.on_event(TransferEvent::PhaseCompleted {
                        peer,
                        phase: Phase::Reply,
                    });
                    self.observer.on_event(TransferEvent::Reply {
                        peer,
                        status: Some(status),
                    });
                    result
                }
                Err(e) => result.and(Err(e)),
            },
            None => result,
        };

        if let Err(e) = &result {
            self.observer.on_event(TransferEvent::Failed {
                peer: Some(peer),
                kind: e.kind(),
                message: e.to_string(),
            });
        }

        let _ = writer.shutdown().await;
        drop(writer);
        drop(reader);
        self.observer
            .on_event(TransferEvent::ConnectionClosed { peer });

        result
    }

    async fn exchange<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
        peer: SocketAddr,
    ) -> Result<StatusReply, Abort> {
        let timeout = self.config.read_timeout;

        let name = read_name(reader, timeout).await?;
        self.observer.on_event(TransferEvent::PhaseCompleted {
            peer,
            phase: Phase::Name,
        });

        let size = read_size(reader, timeout).await?;
        self.observer.on_event(TransferEvent::PhaseCompleted {
            peer,
            phase: Phase::Size,
        });
        self.observer.on_event(TransferEvent::Header {
            peer,
            name: name.clone(),
            size,
        });

        let path = match resolve_destination(&self.output_dir, &name) {
            Ok(path) => path,
            Err(e) => return Err(self.refuse(reader, e, size).await),
        };

        let file = match tokio::fs::File::create(&path).await {
            Ok(file) => file,
            Err(source) => {
                let e = TransferError::DestinationUnavailable { path, source };
                return Err(self.refuse(reader, e, size).await);
            }
        };

        let received = self
            .receive_body(reader, file, size, peer)
            .await
            .map_err(|e| match e {
                e @ TransferError::IncompleteBody { .. } => Abort::from(e),
                other => Abort::answered(other, StatusReply::Error),
            })?;

        if received != size {
            return Err(Abort::answered(
                TransferError::SizeMismatch {
                    expected: size,
                    received,
                },
                StatusReply::Error,
            ));
        }

        self.observer.on_event(TransferEvent::PhaseCompleted {
            peer,
            phase: Phase::Body,
        });
        self.observer
            .on_event(TransferEvent::FileStored { peer, path });

        Ok(StatusReply::Success)
    }

    /// Copies exactly `size` bytes from the connection into `file`.
    async fn receive_body<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
        mut file: tokio::fs::File,
        size: u64,
        peer: SocketAddr,
    ) -> Result<u64, TransferError> {
        let mut buf = vec![0u8; self.config.buffer_size];
        let mut total: u64 = 0;

        while total < size {
            let to_read = (size - total).min(buf.len() as u64) as usize;
            let n = read_timed(reader, &mut buf[..to_read], self.config.read_timeout).await?;
            if n == 0 {
                return Err(TransferError::IncompleteBody {
                    expected: size,
                    received: total,
                });
            }

            file.write_all(&buf[..n]).await?;
            total += n as u64;

            self.observer.on_event(TransferEvent::Progress {
                peer,
                transferred: total,
                total: size,
            });
        }

        file.flush().await?;
        Ok(total)
    }

    /// Discards the body of a transfer that has nowhere to go, then
    /// answers `File not found` unless the peer went away meanwhile.
    async fn refuse<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
        error: TransferError,
        size: u64,
    ) -> Abort {
        let mut buf = vec![0u8; self.config.buffer_size];
        let mut remaining = size;

        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            match read_timed(reader, &mut buf[..to_read], self.config.read_timeout).await {
                Ok(0) => return Abort::from(error),
                Ok(n) => remaining -= n as u64,
                Err(_) => break,
            }
        }

        Abort::answered(error, StatusReply::FileNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    use crate::events::NoopObserver;

    fn test_config() -> ChannelConfig {
        ChannelConfig::default()
            .with_read_timeout(Duration::from_millis(300))
            .with_pacing(Duration::ZERO)
    }

    /// Binds a listener and returns a task that handles exactly one
    /// connection with `receiver`.
    async fn accept_one(
        receiver: Arc<FileReceiver>,
    ) -> (
        SocketAddr,
        tokio::task::JoinHandle<Result<StatusReply, TransferError>>,
    ) {
        let listener = receiver.bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            receiver.handle_connection(stream, peer).await
        });
        (addr, handle)
    }

    async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        reply
    }

    fn noop_receiver(dir: &Path) -> Arc<FileReceiver> {
        FileReceiver::new(dir.to_path_buf(), test_config(), Arc::new(NoopObserver))
    }

    #[tokio::test]
    async fn stores_file_and_replies_success() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"hello.txt\n5\nhello").await.unwrap();

        assert_eq!(read_all(&mut stream).await, b"Success");
        assert_eq!(handle.await.unwrap().unwrap(), StatusReply::Success);
        assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn empty_body_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"empty.bin\n0\n").await.unwrap();

        assert_eq!(read_all(&mut stream).await, b"Success");
        handle.await.unwrap().unwrap();
        assert!(std::fs::read(dir.path().join("empty.bin")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn bytes_past_declared_size_are_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"short.txt\n3\nabcdef").await.unwrap();

        assert_eq!(handle.await.unwrap().unwrap(), StatusReply::Success);
        assert_eq!(std::fs::read(dir.path().join("short.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn severed_mid_body_sends_no_reply() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"cut.bin\n100\n0123456789").await.unwrap();
        stream.shutdown().await.unwrap();

        assert!(read_all(&mut stream).await.is_empty());
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(TransferError::IncompleteBody {
                expected: 100,
                received: 10
            })
        ));
    }

    #[tokio::test]
    async fn non_numeric_size_aborts_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"a.txt\nabc\n").await.unwrap();
        stream.shutdown().await.unwrap();

        assert!(read_all(&mut stream).await.is_empty());
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransferError::MalformedHeader(_))));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn stalled_peer_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransferError::Timeout)));
        assert!(read_all(&mut stream).await.is_empty());
    }

    #[tokio::test]
    async fn stall_mid_body_replies_error() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"slow.bin\n10\n01234").await.unwrap();

        assert_eq!(read_all(&mut stream).await, b"Error");
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransferError::Timeout)));
    }

    #[tokio::test]
    async fn missing_output_dir_replies_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = noop_receiver(&dir.path().join("does-not-exist"));
        let (addr, handle) = accept_one(receiver).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"a.txt\n4\ndata").await.unwrap();

        assert_eq!(read_all(&mut stream).await, b"File not found");
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(TransferError::DestinationUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn traversal_name_replies_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let (addr, handle) = accept_one(noop_receiver(&out)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"../escape.txt\n2\nhi").await.unwrap();

        assert_eq!(read_all(&mut stream).await, b"File not found");
        assert!(matches!(
            handle.await.unwrap(),
            Err(TransferError::InvalidPath(_))
        ));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn missing_parent_dir_replies_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"sub/a.txt\n2\nhi").await.unwrap();

        assert_eq!(read_all(&mut stream).await, b"File not found");
        assert!(matches!(
            handle.await.unwrap(),
            Err(TransferError::DestinationUnavailable { .. })
        ));
        assert!(!dir.path().join("sub").exists());
    }

    #[tokio::test]
    async fn negative_size_aborts_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = accept_one(noop_receiver(dir.path())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"n.txt\n-5\n").await.unwrap();
        stream.shutdown().await.unwrap();

        assert!(read_all(&mut stream).await.is_empty());
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransferError::MalformedHeader(_))));
        assert!(!dir.path().join("n.txt").exists());
    }

    #[tokio::test]
    async fn emits_lifecycle_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let receiver = FileReceiver::new(dir.path().to_path_buf(), test_config(), Arc::new(tx));
        let (addr, handle) = accept_one(receiver).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"e.txt\n2\nok").await.unwrap();
        read_all(&mut stream).await;
        handle.await.unwrap().unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let phases: Vec<Phase> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::PhaseCompleted { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(phases, [Phase::Name, Phase::Size, Phase::Body, Phase::Reply]);

        assert!(matches!(events[0], TransferEvent::Listening { .. }));
        assert!(matches!(events[1], TransferEvent::ConnectionOpened { .. }));
        assert!(matches!(
            events.last(),
            Some(TransferEvent::ConnectionClosed { .. })
        ));
        assert!(!events
            .iter()
            .any(|e| matches!(e, TransferEvent::Failed { .. })));
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = noop_receiver(dir.path());
        let listener = receiver.bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();

        let serve = {
            let receiver = Arc::clone(&receiver);
            let cancel = cancel.clone();
            tokio::spawn(async move { receiver.serve(listener, cancel).await })
        };

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), serve)
            .await
            .unwrap()
            .unwrap();
    }
}
