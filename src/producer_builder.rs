//! Configure a [`Producer`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::{
    error::Result,
    metadata::ClusterMetadata,
    network::{tcp::TcpConnection, BrokerAddress},
    partitioner::{Murmur2Partitioner, Partitioner},
    pool::ConnectionPool,
    producer::{Dispatcher, Producer, ProducerConfig},
    protocol::messages::Compression,
    DEFAULT_CLIENT_ID,
};

const DEFAULT_REQUIRED_ACKS: i16 = 1;
const DEFAULT_TIMEOUT_MS: i32 = 1000;
const DEFAULT_LINGER_MS: u64 = 100;
const DEFAULT_LINGER_BYTES: usize = 64 * 1024;
const DEFAULT_LINGER_COUNT: usize = 100;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const COMMAND_QUEUE_DEPTH: usize = 1024;

/// Configure and start a topic-scoped [`Producer`].
///
/// ### Example
/// ```no_run
/// # async fn example() -> franz::prelude::Result<()> {
/// use franz::prelude::*;
///
/// let producer = ProducerBuilder::new(vec!["localhost:9092".to_string()], "bar".to_string())
///     .await?
///     .required_acks(1)
///     .linger_ms(5)
///     .build();
///
/// let (partition, offset) = producer
///     .produce(ProduceMessage {
///         key: Some(bytes::Bytes::from_static(b"id-1")),
///         value: Some(bytes::Bytes::from_static(b"hello")),
///         partition: None,
///     })
///     .await?;
/// # let _ = (partition, offset);
/// # Ok(())
/// # }
/// ```
pub struct ProducerBuilder {
    topic: String,
    metadata: ClusterMetadata<TcpConnection>,
    config: ProducerConfig,
    partitioner: Arc<dyn Partitioner>,
}

impl ProducerBuilder {
    /// Start a producer builder against a bootstrap list. To complete,
    /// use the [`build`](Self::build) method.
    ///
    /// Fails synchronously when no bootstrap broker is reachable.
    pub async fn new(bootstrap_addrs: Vec<String>, topic: String) -> Result<Self> {
        let addrs = bootstrap_addrs
            .iter()
            .map(|addr| BrokerAddress::parse(addr))
            .collect::<Result<Vec<_>>>()?;

        let metadata = ClusterMetadata::new(
            ConnectionPool::new(),
            addrs,
            DEFAULT_CLIENT_ID.to_owned(),
            vec![topic.clone()],
        )
        .await?;

        Ok(Self {
            topic,
            metadata,
            config: ProducerConfig {
                client_id: DEFAULT_CLIENT_ID.to_owned(),
                required_acks: DEFAULT_REQUIRED_ACKS,
                timeout_ms: DEFAULT_TIMEOUT_MS,
                linger_ms: DEFAULT_LINGER_MS,
                linger_bytes: DEFAULT_LINGER_BYTES,
                linger_count: DEFAULT_LINGER_COUNT,
                max_retries: DEFAULT_MAX_RETRIES,
                compression: Compression::None,
                shutdown_flush_timeout: DEFAULT_SHUTDOWN_FLUSH_TIMEOUT,
            },
            partitioner: Arc::new(Murmur2Partitioner),
        })
    }

    pub fn client_id(mut self, client_id: String) -> Self {
        self.config.client_id = client_id;
        self
    }

    /// The number of acknowledgments the leader must collect before
    /// answering: 0 for none, 1 for the leader alone, -1 for the full
    /// ISR.
    pub fn required_acks(mut self, required_acks: i16) -> Self {
        self.config.required_acks = required_acks;
        self
    }

    /// How long the broker may wait for replica acknowledgement.
    pub fn timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.config.timeout_ms = timeout_ms;
        self
    }

    /// The longest a message may sit in an unfilled batch.
    pub fn linger_ms(mut self, linger_ms: u64) -> Self {
        self.config.linger_ms = linger_ms;
        self
    }

    /// Flush once the batch holds this many payload bytes.
    pub fn linger_bytes(mut self, linger_bytes: usize) -> Self {
        self.config.linger_bytes = linger_bytes;
        self
    }

    /// Flush once the batch holds this many messages.
    pub fn linger_count(mut self, linger_count: usize) -> Self {
        self.config.linger_count = linger_count;
        self
    }

    /// How many times a message is retried around leader changes and
    /// broker timeouts before its error surfaces.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Swap the keyed-partitioning hash.
    pub fn partitioner(mut self, partitioner: Arc<dyn Partitioner>) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn shutdown_flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_flush_timeout = timeout;
        self
    }

    /// Spawn the dispatcher and hand back the producing handle.
    pub fn build(self) -> Producer {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let dispatcher = Dispatcher::new(self.topic, self.metadata, self.config, self.partitioner);
        tokio::spawn(dispatcher.run(commands_rx));

        Producer {
            commands: commands_tx,
        }
    }
}
