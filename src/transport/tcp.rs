//! TCP stream transport.
//!
//! Records are newline-terminated. Reads accumulate into a buffer owned by
//! the transport, so a read cancelled by its deadline leaves any partial
//! record in place and the next read resumes it.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::debug;

use super::error::{TransportError, TransportResult};
use super::kind::ProtocolKind;
use super::Transport;
use crate::core::constants::{MAX_RECORD_SIZE, RECORD_DELIMITER};

/// Newline-framed TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Bytes of the record currently being read.
    record: Vec<u8>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    closed: bool,
}

impl TcpTransport {
    /// Connect to `addr`, bounding the handshake by `connect_timeout`.
    pub async fn connect(addr: &str, connect_timeout: Duration) -> TransportResult<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(TransportError::Connect {
                    addr: addr.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                });
            }
        };

        let transport = Self::from_stream(stream)?;
        debug!(
            "TCP connected {} -> {}",
            transport.local_addr, transport.peer_addr
        );
        Ok(transport)
    }

    /// Wrap an accepted or already-connected stream.
    pub fn from_stream(stream: TcpStream) -> TransportResult<Self> {
        let local_addr = stream.local_addr()?;
        let peer_addr = stream.peer_addr()?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            record: Vec::new(),
            local_addr,
            peer_addr,
            closed: false,
        })
    }

    async fn read_record(&mut self) -> TransportResult<Vec<u8>> {
        loop {
            let remaining = MAX_RECORD_SIZE.saturating_sub(self.record.len());
            if remaining == 0 {
                self.record.clear();
                return Err(TransportError::RecordTooLarge {
                    limit: MAX_RECORD_SIZE,
                });
            }

            let mut limited = (&mut self.reader).take(remaining as u64);
            let read = limited.read_until(RECORD_DELIMITER, &mut self.record).await?;

            if self.record.last() == Some(&RECORD_DELIMITER) {
                return Ok(std::mem::take(&mut self.record));
            }

            if read == 0 {
                // EOF; a dangling partial record is discarded.
                self.record.clear();
                return Err(TransportError::Closed);
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Tcp
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.local_addr)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn send(&mut self, payload: &[u8]) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writer.write_all(payload).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self, deadline: Option<Instant>) -> TransportResult<Vec<u8>> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match deadline {
            Some(deadline) => timeout_at(deadline, self.read_record())
                .await
                .map_err(|_| TransportError::ReadTimeout)?,
            None => self.read_record().await,
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.record.clear();
        match self.writer.shutdown().await {
            Ok(()) => Ok(()),
            // Peer already gone.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpTransport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (client, accepted) = tokio::join!(
            TcpTransport::connect(&addr, Duration::from_secs(5)),
            listener.accept()
        );
        (client.unwrap(), accepted.unwrap().0)
    }

    fn soon(ms: u64) -> Option<Instant> {
        Some(Instant::now() + Duration::from_millis(ms))
    }

    #[tokio::test]
    async fn test_reads_one_record_at_a_time() {
        let (mut client, mut server) = pair().await;
        server.write_all(b"first\nsecond\n").await.unwrap();

        assert_eq!(client.recv(soon(1000)).await.unwrap(), b"first\n");
        assert_eq!(client.recv(soon(1000)).await.unwrap(), b"second\n");
    }

    #[tokio::test]
    async fn test_partial_record_survives_timeout() {
        let (mut client, mut server) = pair().await;
        server.write_all(b"hal").await.unwrap();

        let err = client.recv(soon(100)).await.unwrap_err();
        assert!(err.is_timeout());

        server.write_all(b"f\n").await.unwrap();
        assert_eq!(client.recv(soon(1000)).await.unwrap(), b"half\n");
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (mut client, server) = pair().await;
        drop(server);

        let err = client.recv(soon(1000)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let (mut client, mut server) = pair().await;
        let blob = vec![b'x'; MAX_RECORD_SIZE + 10];
        tokio::spawn(async move {
            let _ = server.write_all(&blob).await;
            // Keep the socket open until the client gives up.
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let err = client.recv(soon(1500)).await.unwrap_err();
        assert!(matches!(err, TransportError::RecordTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut client, _server) = pair().await;
        client.close().await.unwrap();
        assert!(client.is_closed());
        assert!(matches!(
            client.send(b"late\n").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port with no listener.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let err = TcpTransport::connect(&addr, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
