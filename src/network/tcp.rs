//! TCP transport to a broker.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::net::TcpStream;
use tracing::instrument;

use crate::{
    error::{Error, Result},
    network::{BrokerAddress, BrokerConnection},
};

/// Reference counted TCP connection to a broker.
///
/// Clones share the socket; readiness-based reads and writes let a
/// reader and a writer operate on their own clones concurrently.
/// Typically this is driven by the correlated pipeline in
/// [`connection`](crate::connection) rather than used directly.
#[derive(Clone, Debug)]
pub struct TcpConnection {
    stream: Arc<TcpStream>,
    closed: Arc<AtomicBool>,
}

impl TcpConnection {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    #[instrument(name = "network-read", level = "trace")]
    async fn read_exact(&self, size: usize) -> Result<BytesMut> {
        let mut buf = BytesMut::zeroed(size);
        let mut filled = 0;

        while filled < size {
            self.check_open()?;

            // Wait for the socket to be readable
            self.stream
                .readable()
                .await
                .map_err(|e| Error::IoError(e.kind()))?;

            // This may still fail with `WouldBlock` if the readiness
            // event is a false positive.
            match self.stream.try_read(&mut buf[filled..]) {
                Ok(0) => {
                    tracing::debug!("Broker closed the connection");
                    return Err(Error::ConnectionClosed);
                }
                Ok(n) => {
                    tracing::trace!("Read {} bytes", n);
                    filled += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    tracing::error!("ERROR: Reading on socket {:?}", e);
                    return Err(Error::IoError(e.kind()));
                }
            }
        }

        Ok(buf)
    }

    #[instrument(name = "network-write", level = "trace")]
    async fn write_all(&self, buf: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < buf.len() {
            self.check_open()?;

            // Wait for the socket to be writable
            self.stream
                .writable()
                .await
                .map_err(|e| Error::IoError(e.kind()))?;

            match self.stream.try_write(&buf[written..]) {
                Ok(n) => {
                    tracing::trace!("Wrote {} bytes", n);
                    written += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    tracing::error!("ERROR: Writing to socket {:?}", e);
                    return Err(Error::IoError(e.kind()));
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for TcpConnection {
    async fn connect(addr: &BrokerAddress) -> Result<Self> {
        tracing::debug!("Connecting to {}", addr);
        let stream = TcpStream::connect((addr.host.as_str(), addr.port))
            .await
            .map_err(|e| Error::IoError(e.kind()))?;
        Ok(Self {
            stream: Arc::new(stream),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn send_frame(&self, payload: Bytes) -> Result<()> {
        let mut frame = Vec::with_capacity(payload.len() + 4);
        frame.extend_from_slice(&(payload.len() as i32).to_be_bytes());
        frame.extend_from_slice(&payload);

        tracing::trace!("Sending frame of {} bytes", payload.len());
        self.write_all(&frame).await
    }

    async fn receive_frame(&self) -> Result<BytesMut> {
        let mut size = self.read_exact(4).await?;
        let length = size.get_u32();
        tracing::trace!("Reading frame of {} bytes", length);
        self.read_exact(length as usize).await
    }

    async fn close(&self) {
        // Flag first so concurrent loops bail out; the socket itself
        // closes when the last clone drops.
        self.closed.store(true, Ordering::Release);
    }
}
