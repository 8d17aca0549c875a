//! Client that consumes records from a cluster.
//!
//! The unit of consumption is the partition worker: one task per owned
//! `(topic, partition)` that long-polls the partition's leader, hands
//! each message to the caller's handler in offset order, and reports
//! delivered offsets for committing. The worker does not advance past a
//! message until the handler acknowledges it, which is the backpressure
//! contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::instrument;

use crate::{
    connection::KafkaConnection,
    error::{Error, KafkaCode, Result},
    metadata::{ClusterMetadata, TopicPartitions},
    network::BrokerConnection,
    protocol::{self, OffsetTime},
};

// long-poll bound; kept under the connection's request timeout so a
// quiet partition never reads as a timed-out request
pub const DEFAULT_MAX_WAIT_MS: i32 = 2000;
pub const DEFAULT_MIN_BYTES: i32 = 1;
pub const DEFAULT_MAX_PARTITION_BYTES: i32 = 1024 * 1024;
const DEFAULT_PAUSE_MS: u64 = 1000;
const DEFAULT_COMMIT_EVERY_N: usize = 100;
const DEFAULT_COMMIT_EVERY_MS: u64 = 5000;

/// Common consumed message format.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeMessage {
    pub topic: Arc<str>,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

/// What the handler wants done after seeing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerDecision {
    /// Done with it; advance.
    Ack,
    /// Not ready; back off and redeliver the same message.
    Pause,
    /// Unwind the worker and release the partition.
    Stop,
}

/// Caller-supplied message processor.
///
/// Invoked with one message at a time per partition; the next message
/// is not delivered until this one returns [`HandlerDecision::Ack`].
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &ConsumeMessage) -> HandlerDecision;
}

/// Plain functions are handlers.
#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(&ConsumeMessage) -> HandlerDecision + Send + Sync + 'static,
{
    async fn handle(&self, message: &ConsumeMessage) -> HandlerDecision {
        self(message)
    }
}

/// A handler that forwards every message into a channel, for callers
/// that prefer pulling from a stream over being called back.
#[derive(Debug)]
pub struct ChannelHandler {
    tx: mpsc::Sender<ConsumeMessage>,
}

impl ChannelHandler {
    /// The handler and the stream it feeds. Dropping the stream stops
    /// the workers delivering into it.
    pub fn new(depth: usize) -> (Arc<Self>, impl tokio_stream::Stream<Item = ConsumeMessage>) {
        let (tx, mut rx) = mpsc::channel(depth);
        let stream = async_stream::stream! {
            while let Some(message) = rx.recv().await {
                yield message;
            }
        };
        (Arc::new(Self { tx }), stream)
    }
}

#[async_trait]
impl MessageHandler for ChannelHandler {
    async fn handle(&self, message: &ConsumeMessage) -> HandlerDecision {
        match self.tx.send(message.clone()).await {
            Ok(()) => HandlerDecision::Ack,
            Err(_) => HandlerDecision::Stop,
        }
    }
}

/// Where to restart when the requested offset has fallen off the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OffsetResetPolicy {
    #[default]
    Earliest,
    Latest,
}

impl OffsetResetPolicy {
    fn as_offset_time(self) -> OffsetTime {
        match self {
            OffsetResetPolicy::Earliest => OffsetTime::Earliest,
            OffsetResetPolicy::Latest => OffsetTime::Latest,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FetchConfig {
    pub client_id: String,
    pub max_wait_ms: i32,
    pub min_bytes: i32,
    pub max_partition_bytes: i32,
    pub pause_ms: u64,
    pub commit_every_n: usize,
    pub commit_every_ms: u64,
    pub reset_policy: OffsetResetPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            client_id: crate::DEFAULT_CLIENT_ID.to_owned(),
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            min_bytes: DEFAULT_MIN_BYTES,
            max_partition_bytes: DEFAULT_MAX_PARTITION_BYTES,
            pause_ms: DEFAULT_PAUSE_MS,
            commit_every_n: DEFAULT_COMMIT_EVERY_N,
            commit_every_ms: DEFAULT_COMMIT_EVERY_MS,
            reset_policy: OffsetResetPolicy::default(),
        }
    }
}

/// Long-poll fetch loop for a single owned `(topic, partition)`.
pub(crate) struct PartitionWorker<T: BrokerConnection> {
    pub topic: Arc<str>,
    pub partition: i32,
    pub metadata: Arc<Mutex<ClusterMetadata<T>>>,
    pub config: FetchConfig,
    pub handler: Arc<dyn MessageHandler>,
    /// Starting offset; advanced as messages are acknowledged.
    pub next_offset: i64,
    /// Delivered-offset reports to the committing coordinator, as
    /// `(partition, next offset to commit)`.
    pub commits: mpsc::UnboundedSender<(i32, i64)>,
    pub shutdown: watch::Receiver<bool>,
}

impl<T: BrokerConnection> PartitionWorker<T> {
    #[instrument(skip(self), fields(topic = %self.topic, partition = self.partition))]
    pub async fn run(mut self) -> Result<()> {
        let mut delivered_since_push = 0usize;
        let mut last_push = Instant::now();

        loop {
            if *self.shutdown.borrow() {
                self.push_commit();
                return Err(Error::Shutdown);
            }

            let conn = match self.leader_connection().await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!("No leader connection: {:?}", err);
                    self.recover_leader().await?;
                    continue;
                }
            };

            // a negative start means "no committed offset yet": resolve
            // it against the log per the reset policy
            if self.next_offset < 0 {
                self.reset_offset(&conn).await?;
                tracing::debug!("Starting partition {} at {}", self.partition, self.next_offset);
            }

            let mut shutdown = self.shutdown.clone();
            let partition = tokio::select! {
                fetched = self.fetch_once(&conn) => fetched?,
                _ = shutdown.changed() => continue,
            };

            let Some(partition) = partition else {
                continue;
            };

            match partition.error_code {
                KafkaCode::None => {}
                KafkaCode::OffsetOutOfRange => {
                    let requested = self.next_offset;
                    self.reset_offset(&conn).await?;
                    tracing::warn!(
                        "Offset {} out of range, reset to {}",
                        requested,
                        self.next_offset
                    );
                    continue;
                }
                code if code.is_leader_error() => {
                    tracing::warn!("Leader error {:?}, refreshing metadata", code);
                    self.recover_leader().await?;
                    continue;
                }
                code => return Err(Error::KafkaError(code)),
            }

            for message in partition.messages {
                // compressed sets can replay from before the requested
                // offset; skip what we have already delivered
                if message.offset < self.next_offset {
                    continue;
                }

                let consume_message = ConsumeMessage {
                    topic: self.topic.clone(),
                    partition: self.partition,
                    offset: message.offset,
                    key: message.key,
                    value: message.value,
                };

                loop {
                    if *self.shutdown.borrow() {
                        self.push_commit();
                        return Err(Error::Shutdown);
                    }
                    match self.handler.handle(&consume_message).await {
                        HandlerDecision::Ack => break,
                        HandlerDecision::Pause => {
                            tracing::trace!("Handler paused, backing off");
                            tokio::time::sleep(Duration::from_millis(self.config.pause_ms)).await;
                        }
                        HandlerDecision::Stop => {
                            tracing::debug!("Handler stopped the worker");
                            self.push_commit();
                            return Ok(());
                        }
                    }
                }

                self.next_offset = consume_message.offset + 1;
                delivered_since_push += 1;

                if delivered_since_push >= self.config.commit_every_n
                    || last_push.elapsed() >= Duration::from_millis(self.config.commit_every_ms)
                {
                    self.push_commit();
                    delivered_since_push = 0;
                    last_push = Instant::now();
                }
            }
        }
    }

    fn push_commit(&self) {
        if self.commits.send((self.partition, self.next_offset)).is_err() {
            tracing::debug!("Commit channel closed");
        }
    }

    async fn leader_connection(&self) -> Result<KafkaConnection<T>> {
        self.metadata
            .lock()
            .await
            .connection_for_leader(&self.topic, self.partition)
    }

    async fn recover_leader(&self) -> Result<()> {
        self.metadata.lock().await.refresh().await
    }

    /// One long poll. `None` when the response had nothing for us.
    async fn fetch_once(
        &self,
        conn: &KafkaConnection<T>,
    ) -> Result<Option<protocol::fetch::response::Partition>> {
        let mut request = protocol::FetchRequest::new(
            0,
            &self.config.client_id,
            self.config.max_wait_ms,
            self.config.min_bytes,
        );
        request.add(
            &self.topic,
            self.partition,
            self.next_offset,
            self.config.max_partition_bytes,
        );

        let frame = conn
            .request(request)
            .await?
            .ok_or(Error::Internal("fetch always has a response"))?;
        let response = protocol::FetchResponse::try_from(frame)?;

        Ok(response
            .topics
            .into_iter()
            .find(|topic| topic.name == *self.topic.as_bytes())
            .and_then(|topic| {
                topic
                    .partitions
                    .into_iter()
                    .find(|partition| partition.partition_index == self.partition)
            }))
    }

    /// Apply the reset policy after falling off the log.
    async fn reset_offset(&mut self, conn: &KafkaConnection<T>) -> Result<()> {
        let mut request = protocol::OffsetRequest::new(0, &self.config.client_id);
        request.add(
            &self.topic,
            self.partition,
            self.config.reset_policy.as_offset_time(),
            1,
        );

        let frame = conn
            .request(request)
            .await?
            .ok_or(Error::Internal("offset request always has a response"))?;
        let response = protocol::OffsetResponse::try_from(frame)?;

        let partition = response
            .into_flat_iter()
            .find(|(topic, partition)| {
                *topic == *self.topic.as_bytes() && partition.partition_index == self.partition
            })
            .map(|(_, partition)| partition)
            .ok_or(Error::OffsetOutOfRange {
                partition: self.partition,
                requested: self.next_offset,
            })?;
        if partition.error_code != KafkaCode::None {
            return Err(Error::KafkaError(partition.error_code));
        }

        self.next_offset = partition.newest().ok_or(Error::OffsetOutOfRange {
            partition: self.partition,
            requested: self.next_offset,
        })?;
        Ok(())
    }
}

/// Fetch messages from a broker.
///
/// Protocol-level building block; the partition worker is the managed
/// way to consume.
#[instrument(level = "debug", skip(conn, offsets))]
pub async fn fetch<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    max_wait_ms: i32,
    min_bytes: i32,
    max_partition_bytes: i32,
    topic_partitions: &TopicPartitions,
    offsets: &PartitionOffsets,
) -> Result<protocol::FetchResponse> {
    let mut request = protocol::FetchRequest::new(0, client_id, max_wait_ms, min_bytes);

    for (topic_name, partitions) in topic_partitions.iter() {
        for partition_index in partitions.iter() {
            let offset = offsets
                .get(&(topic_name.to_owned(), *partition_index))
                .copied()
                .unwrap_or(0);
            request.add(topic_name, *partition_index, offset, max_partition_bytes);
        }
    }

    let frame = conn
        .request(request)
        .await?
        .ok_or(Error::Internal("fetch always has a response"))?;
    protocol::FetchResponse::try_from(frame)
}

/// Offsets keyed by `(topic, partition)`.
pub type PartitionOffsets = HashMap<(String, i32), i64>;

/// Find offsets by time for a set of topic partitions.
#[instrument(level = "debug", skip(conn))]
pub async fn list_offsets<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    topic_partitions: &TopicPartitions,
    time: OffsetTime,
) -> Result<protocol::OffsetResponse> {
    let mut request = protocol::OffsetRequest::new(0, client_id);
    for (topic_name, partitions) in topic_partitions.iter() {
        for partition_index in partitions.iter() {
            request.add(topic_name, *partition_index, time, 1);
        }
    }

    let frame = conn
        .request(request)
        .await?
        .ok_or(Error::Internal("offset request always has a response"))?;
    protocol::OffsetResponse::try_from(frame)
}

/// Read a group's committed offsets from its coordinator.
#[instrument(level = "debug", skip(conn))]
pub async fn fetch_offset<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    group_id: &str,
    topic_partitions: &TopicPartitions,
) -> Result<protocol::OffsetFetchResponse> {
    let mut request = protocol::OffsetFetchRequest::new(0, client_id, group_id);
    for (topic_name, partitions) in topic_partitions.iter() {
        for partition_index in partitions.iter() {
            request.add(topic_name, *partition_index);
        }
    }

    let frame = conn
        .request(request)
        .await?
        .ok_or(Error::Internal("offset fetch always has a response"))?;
    protocol::OffsetFetchResponse::try_from(frame)
}

/// Commit a set of offsets for a group on its coordinator.
#[instrument(level = "debug", skip(conn, offsets))]
pub async fn commit_offset<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    group_id: &str,
    offsets: &PartitionOffsets,
    annotation: &str,
) -> Result<protocol::OffsetCommitResponse> {
    tracing::debug!("Committing offsets {:?} for group {}", offsets, group_id);

    let mut request = protocol::OffsetCommitRequest::new(0, client_id, group_id);
    for ((topic_name, partition_index), offset) in offsets.iter() {
        request.add(topic_name, *partition_index, *offset, Some(annotation));
    }

    let frame = conn
        .request(request)
        .await?
        .ok_or(Error::Internal("offset commit always has a response"))?;
    let response = protocol::OffsetCommitResponse::try_from(frame)?;
    response.is_error()?;
    Ok(response)
}
