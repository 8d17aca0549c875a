//! A standalone consumer over an explicit partition assignment.
//!
//! Unlike the group member, this consumer coordinates with nobody: the
//! caller names the topic partitions, seeks the start positions, and
//! pulls batches (or a stream) at its own pace. Useful for tooling,
//! replays, and tests.

use std::collections::HashMap;
use std::sync::Arc;

use nom::AsBytes;
use tokio_stream::Stream;

use crate::{
    connection::KafkaConnection,
    consumer::{fetch, fetch_offset, list_offsets, ConsumeMessage, PartitionOffsets},
    error::{Error, KafkaCode, Result},
    metadata::{ClusterMetadata, TopicPartitions},
    network::{tcp::TcpConnection, BrokerAddress, BrokerConnection},
    pool::ConnectionPool,
    protocol::OffsetTime,
    DEFAULT_CLIENT_ID,
};

/// A pull-based consumer over a fixed assignment.
///
/// Tracks one read position per assigned topic partition; every
/// [`next_batch`](Self::next_batch) advances them past what it
/// returned. Leader errors heal internally: the batch that saw them
/// refreshes metadata and the next call retries.
pub struct Consumer<T: BrokerConnection> {
    pub(crate) metadata: ClusterMetadata<T>,
    pub(crate) client_id: String,
    pub(crate) max_wait_ms: i32,
    pub(crate) min_bytes: i32,
    pub(crate) max_partition_bytes: i32,
    pub(crate) assignment: TopicPartitions,
    pub(crate) offsets: PartitionOffsets,
}

impl<T: BrokerConnection> Consumer<T> {
    /// The current read position per topic partition. Useful for
    /// committing manually.
    pub fn offsets(&self) -> &PartitionOffsets {
        &self.offsets
    }

    /// Fetch once from every partition leader and return whatever
    /// arrived, in offset order within each partition.
    pub async fn next_batch(&mut self) -> Result<Vec<ConsumeMessage>> {
        self.metadata.refresh_if_stale().await?;

        let leaders = match self.metadata.get_leaders_for_topic_partitions(&self.assignment) {
            Ok(leaders) => leaders,
            Err(err) => {
                self.metadata.refresh().await?;
                return Err(err);
            }
        };

        let mut messages = vec![];
        let mut stale_leader = false;

        for (leader, topic_partitions) in leaders {
            let conn = self.metadata.connection_for_broker(leader)?;
            let response = fetch(
                &conn,
                &self.client_id,
                self.max_wait_ms,
                self.min_bytes,
                self.max_partition_bytes,
                &topic_partitions,
                &self.offsets,
            )
            .await?;

            for topic in response.topics {
                let topic_name = std::str::from_utf8(topic.name.as_bytes())
                    .map_err(|_| Error::DecodingUtf8Error)?;
                // borrow the name we already own rather than the frame's copy
                let Some(topic_name) = self
                    .assignment
                    .keys()
                    .find(|name| *name == topic_name)
                    .cloned()
                else {
                    continue;
                };
                let shared_name: Arc<str> = topic_name.as_str().into();

                for partition in topic.partitions {
                    match partition.error_code {
                        KafkaCode::None => {}
                        code if code.is_leader_error() => {
                            tracing::warn!(
                                "Leader error {:?} on {} partition {}",
                                code,
                                topic_name,
                                partition.partition_index
                            );
                            stale_leader = true;
                            continue;
                        }
                        code => return Err(Error::KafkaError(code)),
                    }

                    let position = self
                        .offsets
                        .entry((topic_name.clone(), partition.partition_index))
                        .or_insert(0);

                    for message in partition.messages {
                        if message.offset < *position {
                            continue;
                        }
                        *position = message.offset + 1;
                        messages.push(ConsumeMessage {
                            topic: shared_name.clone(),
                            partition: partition.partition_index,
                            offset: message.offset,
                            key: message.key,
                            value: message.value,
                        });
                    }
                }
            }
        }

        if stale_leader {
            self.metadata.refresh().await?;
        }

        tracing::debug!("Read {} messages, positions {:?}", messages.len(), self.offsets);
        Ok(messages)
    }

    /// Convert the consumer into an asynchronous iterator of batches.
    #[must_use = "streams do nothing unless polled"]
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Vec<ConsumeMessage>>> {
        async_stream::stream! {
            loop {
                yield self.next_batch().await;
            }
        }
    }
}

/// Configure a [`Consumer`].
///
/// ### Example
/// ```no_run
/// # async fn example() -> franz::prelude::Result<()> {
/// use std::collections::HashMap;
/// use franz::prelude::*;
///
/// let assignment: TopicPartitions = HashMap::from([("bar".to_string(), vec![0, 1])]);
/// let consumer = ConsumerBuilder::new(vec!["localhost:9092".to_string()], assignment)
///     .await?
///     .seek_to_timestamp(OffsetTime::Earliest)
///     .await?
///     .build();
/// # let _ = consumer;
/// # Ok(())
/// # }
/// ```
pub struct ConsumerBuilder {
    consumer: Consumer<TcpConnection>,
}

impl ConsumerBuilder {
    /// Start a consumer builder. To complete, use the
    /// [`build`](Self::build) method.
    pub async fn new(bootstrap_addrs: Vec<String>, assignment: TopicPartitions) -> Result<Self> {
        let addrs = bootstrap_addrs
            .iter()
            .map(|addr| BrokerAddress::parse(addr))
            .collect::<Result<Vec<_>>>()?;
        let topics = assignment.keys().cloned().collect();

        let metadata = ClusterMetadata::new(
            ConnectionPool::new(),
            addrs,
            DEFAULT_CLIENT_ID.to_owned(),
            topics,
        )
        .await?;

        Ok(Self {
            consumer: Consumer {
                metadata,
                client_id: DEFAULT_CLIENT_ID.to_owned(),
                max_wait_ms: crate::consumer::DEFAULT_MAX_WAIT_MS,
                min_bytes: crate::consumer::DEFAULT_MIN_BYTES,
                max_partition_bytes: crate::consumer::DEFAULT_MAX_PARTITION_BYTES,
                assignment,
                offsets: HashMap::new(),
            },
        })
    }

    pub fn client_id(mut self, client_id: String) -> Self {
        self.consumer.client_id = client_id;
        self
    }

    /// The maximum time in milliseconds the broker may hold each fetch.
    pub fn max_wait_ms(mut self, max_wait_ms: i32) -> Self {
        self.consumer.max_wait_ms = max_wait_ms;
        self
    }

    /// The minimum bytes to accumulate before a fetch returns.
    pub fn min_bytes(mut self, min_bytes: i32) -> Self {
        self.consumer.min_bytes = min_bytes;
        self
    }

    /// The maximum bytes fetched per partition per round.
    pub fn max_partition_bytes(mut self, max_partition_bytes: i32) -> Self {
        self.consumer.max_partition_bytes = max_partition_bytes;
        self
    }

    /// Move every assigned partition's position to the log point at a
    /// given time. Overwrites all current positions.
    pub async fn seek_to_timestamp(mut self, time: OffsetTime) -> Result<Self> {
        tracing::debug!("Seeking positions to {:?}", time);
        let leaders = self
            .consumer
            .metadata
            .get_leaders_for_topic_partitions(&self.consumer.assignment)?;
        self.consumer.offsets = HashMap::new();

        for (leader, topic_partitions) in leaders {
            let conn = self.consumer.metadata.connection_for_broker(leader)?;
            let response =
                list_offsets(&conn, &self.consumer.client_id, &topic_partitions, time).await?;

            for (topic_name, partition) in response.into_flat_iter() {
                if partition.error_code != KafkaCode::None {
                    return Err(Error::KafkaError(partition.error_code));
                }
                let topic_name = std::str::from_utf8(topic_name.as_bytes())
                    .map_err(|_| Error::DecodingUtf8Error)?
                    .to_string();
                let offset = partition.newest().unwrap_or(0);
                self.consumer
                    .offsets
                    .insert((topic_name, partition.partition_index), offset);
            }
        }
        tracing::trace!("Positions set to {:?}", self.consumer.offsets);

        Ok(self)
    }

    /// Sync every assigned partition's position with a group's
    /// committed offsets. Partitions the group never committed start
    /// at 0.
    pub async fn seek_to_group(
        mut self,
        coordinator: &KafkaConnection<TcpConnection>,
        group_id: &str,
    ) -> Result<Self> {
        tracing::debug!("Seeking positions to group {}", group_id);
        let response = fetch_offset(
            coordinator,
            &self.consumer.client_id,
            group_id,
            &self.consumer.assignment,
        )
        .await?;

        for (topic_name, partition) in response.into_flat_iter() {
            let topic_name = std::str::from_utf8(topic_name.as_bytes())
                .map_err(|_| Error::DecodingUtf8Error)?
                .to_string();
            let offset = partition.committed().unwrap_or(0);
            self.consumer
                .offsets
                .insert((topic_name, partition.partition_index), offset);
        }
        tracing::trace!("Positions set to {:?}", self.consumer.offsets);

        Ok(self)
    }

    /// Overwrite the positions with explicit values.
    pub fn seek(mut self, offsets: PartitionOffsets) -> Self {
        self.consumer.offsets = offsets;
        self
    }

    pub fn build(self) -> Consumer<TcpConnection> {
        self.consumer
    }
}
