//! Configure a [`ConsumerGroup`] member.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use crate::{
    consumer::{FetchConfig, MessageHandler, OffsetResetPolicy},
    consumer_group::{
        ConsumerGroup, GroupConfig, GroupDriver, DEFAULT_AUTO_COMMIT_INTERVAL_MS,
        DEFAULT_SESSION_TTL, DEFAULT_STORE_PREFIX,
    },
    coordination::CoordinationStore,
    error::Result,
    metadata::ClusterMetadata,
    network::{tcp::TcpConnection, BrokerAddress},
    pool::ConnectionPool,
    DEFAULT_CLIENT_ID,
};

/// Configure and start one member of a consumer group.
///
/// ### Example
/// ```no_run
/// # async fn example() -> franz::prelude::Result<()> {
/// use std::sync::Arc;
/// use franz::prelude::*;
///
/// let store = Arc::new(MemoryStore::new());
/// let member = ConsumerGroupBuilder::new(
///     vec!["localhost:9092".to_string()],
///     "the-data-folks".to_string(),
///     "bar".to_string(),
///     store,
///     Arc::new(|message: &ConsumeMessage| {
///         println!("{:?}", message);
///         HandlerDecision::Ack
///     }),
/// )
/// .await?
/// .offset_reset(OffsetResetPolicy::Earliest)
/// .build();
///
/// // ... later
/// member.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct ConsumerGroupBuilder<S: CoordinationStore> {
    config: GroupConfig,
    store: Arc<S>,
    metadata: ClusterMetadata<TcpConnection>,
    handler: Arc<dyn MessageHandler>,
}

impl<S: CoordinationStore> ConsumerGroupBuilder<S> {
    /// Start a group-member builder. To complete, use the
    /// [`build`](Self::build) method.
    ///
    /// Fails synchronously when no bootstrap broker is reachable.
    pub async fn new(
        bootstrap_addrs: Vec<String>,
        group_id: String,
        topic: String,
        store: Arc<S>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self> {
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
            config: GroupConfig {
                group_id,
                topic,
                client_id: DEFAULT_CLIENT_ID.to_owned(),
                store_prefix: DEFAULT_STORE_PREFIX.to_owned(),
                session_ttl: DEFAULT_SESSION_TTL,
                auto_commit_interval_ms: DEFAULT_AUTO_COMMIT_INTERVAL_MS,
                commit_annotation: String::new(),
                fetch: FetchConfig::default(),
            },
            store,
            metadata,
            handler,
        })
    }

    pub fn client_id(mut self, client_id: String) -> Self {
        self.config.client_id = client_id;
        self.config.fetch.client_id = self.config.client_id.clone();
        self
    }

    /// Root of this client's keys in the coordination store.
    pub fn store_prefix(mut self, prefix: String) -> Self {
        self.config.store_prefix = prefix;
        self
    }

    /// Coordination-store session TTL; renewal runs at half this.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    pub fn auto_commit_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.auto_commit_interval_ms = interval_ms;
        self
    }

    /// Annotation string stored alongside every committed offset.
    pub fn commit_annotation(mut self, annotation: String) -> Self {
        self.config.commit_annotation = annotation;
        self
    }

    /// Where to restart when an offset has fallen off the log.
    pub fn offset_reset(mut self, policy: OffsetResetPolicy) -> Self {
        self.config.fetch.reset_policy = policy;
        self
    }

    /// Server-side long-poll bound for each fetch.
    pub fn max_wait_ms(mut self, max_wait_ms: i32) -> Self {
        self.config.fetch.max_wait_ms = max_wait_ms;
        self
    }

    /// The minimum bytes to accumulate before a fetch returns.
    pub fn min_bytes(mut self, min_bytes: i32) -> Self {
        self.config.fetch.min_bytes = min_bytes;
        self
    }

    /// The maximum bytes fetched per partition per round.
    pub fn max_partition_bytes(mut self, max_partition_bytes: i32) -> Self {
        self.config.fetch.max_partition_bytes = max_partition_bytes;
        self
    }

    /// Backoff before redelivering after a handler pause.
    pub fn pause_ms(mut self, pause_ms: u64) -> Self {
        self.config.fetch.pause_ms = pause_ms;
        self
    }

    /// Push a commit position after this many delivered messages.
    pub fn commit_every_n(mut self, n: usize) -> Self {
        self.config.fetch.commit_every_n = n;
        self
    }

    /// Push a commit position at least this often while delivering.
    pub fn commit_every_ms(mut self, ms: u64) -> Self {
        self.config.fetch.commit_every_ms = ms;
        self
    }

    /// Spawn the group driver and hand back the member handle.
    pub fn build(self) -> ConsumerGroup {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = GroupDriver::new(
            self.config,
            self.store,
            Arc::new(Mutex::new(self.metadata)),
            self.handler,
            shutdown_rx,
        );
        let driver = tokio::spawn(driver.run());

        ConsumerGroup {
            shutdown_tx,
            driver,
        }
    }
}
