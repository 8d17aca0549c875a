//! Process-wide connection registry.
//!
//! One live [`KafkaConnection`] per `(host, port)` is the invariant:
//! every producer, consumer and coordinator in the process shares the
//! same pipeline to a given broker. Losers of a connect race close
//! their connection and take the winner's.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use crate::{
    connection::KafkaConnection,
    error::Result,
    network::{tcp::TcpConnection, BrokerAddress, BrokerConnection},
};

/// Registry of connections keyed by endpoint.
#[derive(Clone, Debug)]
pub struct ConnectionPool<T: BrokerConnection> {
    endpoints: Arc<Mutex<HashMap<BrokerAddress, KafkaConnection<T>>>>,
}

impl<T: BrokerConnection> Default for ConnectionPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BrokerConnection> ConnectionPool<T> {
    pub fn new() -> Self {
        Self {
            endpoints: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the connection for an endpoint, registering a new one if
    /// none is held yet.
    ///
    /// Dialing is lazy inside [`KafkaConnection`], so registration
    /// itself never blocks on the network; a racing registration is
    /// resolved by closing the loser.
    pub async fn checkout(&self, addr: &BrokerAddress) -> KafkaConnection<T> {
        let mut endpoints = self.endpoints.lock().await;

        if let Some(conn) = endpoints.get(addr) {
            return conn.clone();
        }

        let conn = KafkaConnection::new(addr.clone());
        endpoints.insert(addr.clone(), conn.clone());
        conn
    }

    /// Drop an endpoint, closing its pipeline. The next checkout
    /// registers a fresh connection.
    pub async fn evict(&self, addr: &BrokerAddress) {
        let conn = self.endpoints.lock().await.remove(addr);
        if let Some(conn) = conn {
            tracing::debug!("Evicting connection to {}", addr);
            conn.close().await;
        }
    }

    /// Close every connection in the registry.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut endpoints = self.endpoints.lock().await;
            endpoints.drain().collect()
        };
        for (_, conn) in drained {
            conn.close().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.endpoints.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.endpoints.lock().await.is_empty()
    }
}

static GLOBAL_POOL: OnceLock<ConnectionPool<TcpConnection>> = OnceLock::new();

/// The process-wide TCP connection registry.
///
/// Initialized once on first use; every component that needs a broker
/// connection goes through here so the one-connection-per-endpoint
/// invariant holds across the whole process.
pub fn global_pool() -> &'static ConnectionPool<TcpConnection> {
    GLOBAL_POOL.get_or_init(ConnectionPool::new)
}

/// Connect to the first reachable address out of a bootstrap list.
///
/// Walks the list in order and returns the first endpoint's connection
/// whose dial succeeds, carrying the last error if none do.
pub async fn bootstrap<T: BrokerConnection>(
    pool: &ConnectionPool<T>,
    bootstrap_addrs: &[BrokerAddress],
) -> Result<KafkaConnection<T>> {
    use crate::error::Error;
    use crate::protocol::MetadataRequest;

    let mut last_err = Error::IoError(std::io::ErrorKind::NotFound);
    for addr in bootstrap_addrs {
        let conn = pool.checkout(addr).await;
        // probe the endpoint; dialing is lazy so an unreachable broker
        // only surfaces here
        let topics: Vec<&str> = vec![];
        match conn.request(MetadataRequest::new(0, "bootstrap", &topics)).await {
            Ok(_) => return Ok(conn),
            Err(err) => {
                tracing::warn!("Bootstrap broker {} unreachable: {:?}", addr, err);
                pool.evict(addr).await;
                last_err = err;
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn checkout_returns_the_same_connection() {
        let pool: ConnectionPool<TcpConnection> = ConnectionPool::new();
        let addr = BrokerAddress {
            host: "localhost".into(),
            port: 9092,
        };

        let first = pool.checkout(&addr).await;
        let second = pool.checkout(&addr).await;
        assert_eq!(first.addr(), second.addr());
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn evict_forgets_the_endpoint() {
        let pool: ConnectionPool<TcpConnection> = ConnectionPool::new();
        let addr = BrokerAddress {
            host: "localhost".into(),
            port: 9092,
        };

        pool.checkout(&addr).await;
        pool.evict(&addr).await;
        assert!(pool.is_empty().await);
    }
}
