//! Transports for speaking to a broker.
//!
//! Kafka uses a binary protocol over TCP. All messages are size
//! delimited: each frame on the wire is a 4-byte big-endian length
//! followed by the payload, in both directions. The client initiates a
//! socket connection and then writes a sequence of request messages and
//! reads back the corresponding response messages; no handshake is
//! required on connection or disconnection.
//!
//! The server guarantees that on a single connection requests are
//! processed, and responses returned, in the order they are sent.
//! Clients should use non-blocking IO to pipeline requests and amortize
//! the cost of the connection; the correlated pipeline in
//! [`connection`](crate::connection) builds on that guarantee.
//!
//! The transport is a trait so the request pipeline can run over
//! anything that can move frames; [`tcp::TcpConnection`] is the real
//! one.

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::error::Result;

pub mod tcp;

/// Location of a broker's transport endpoint.
///
/// Identity of a broker is its node id from metadata; the address only
/// says where to dial.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Parse a `host:port` pair, defaulting to the Kafka port when the
    /// port is missing.
    pub fn parse(addr: &str) -> Result<Self> {
        const DEFAULT_PORT: u16 = 9092;

        match addr.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| crate::error::Error::IoError(std::io::ErrorKind::InvalidInput))?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            None => Ok(Self {
                host: addr.to_string(),
                port: DEFAULT_PORT,
            }),
        }
    }
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A frame-oriented pipe to one broker.
///
/// Implementations own the length-prefix framing; callers hand over and
/// receive bare payloads. Clones share the underlying socket, which is
/// what lets a writer task and a reader task drive the same connection
/// concurrently.
#[async_trait]
pub trait BrokerConnection: Clone + Debug + Send + Sync + 'static {
    /// Dial the endpoint.
    async fn connect(addr: &BrokerAddress) -> Result<Self>;

    /// Write one length-prefixed frame.
    async fn send_frame(&self, payload: Bytes) -> Result<()>;

    /// Read one length-prefixed frame, returning the payload.
    async fn receive_frame(&self) -> Result<BytesMut>;

    /// Tear the socket down. Further sends and receives fail.
    async fn close(&self);
}
