//! Client that sends records to a cluster.
//!
//! A [`Producer`] is topic-scoped: the handle forwards messages to a
//! background dispatcher task that picks partitions, batches per leader
//! broker, and retries around leadership changes. Batches flush when
//! any linger bound trips: message count, byte size, or age.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::instrument;

use crate::{
    connection::KafkaConnection,
    error::{Error, KafkaCode, Result},
    metadata::ClusterMetadata,
    network::BrokerConnection,
    partitioner::Partitioner,
    protocol::{self, messages::Compression, messages::Message},
};

/// One record bound for the producer's topic.
#[derive(Debug, Clone, Default)]
pub struct ProduceMessage {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    /// Pin the partition explicitly instead of letting the partitioner
    /// choose.
    pub partition: Option<i32>,
}

/// Where a message ended up: its partition and assigned offset. The
/// offset is -1 under `required_acks = 0`, where the broker never says.
pub type ProduceAck = (i32, i64);

#[derive(Debug, Clone)]
pub(crate) struct ProducerConfig {
    pub client_id: String,
    pub required_acks: i16,
    pub timeout_ms: i32,
    pub linger_ms: u64,
    pub linger_bytes: usize,
    pub linger_count: usize,
    pub max_retries: u32,
    pub compression: Compression,
    pub shutdown_flush_timeout: Duration,
}

pub(crate) enum Command {
    Produce {
        message: ProduceMessage,
        ack: Option<oneshot::Sender<Result<ProduceAck>>>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to a topic-scoped producing dispatcher.
///
/// Cheap to clone; all clones feed the same dispatcher task.
#[derive(Clone)]
pub struct Producer {
    pub(crate) commands: mpsc::Sender<Command>,
}

impl Producer {
    /// Produce one message and suspend until it is durable (or failed).
    ///
    /// Resolves to the chosen partition and the offset the broker
    /// assigned.
    pub async fn produce(&self, message: ProduceMessage) -> Result<ProduceAck> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Produce {
                message,
                ack: Some(tx),
            })
            .await
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)?
    }

    /// Produce one message, returning as soon as it is enqueued.
    /// Delivery failures after this point are logged, not reported.
    pub async fn async_produce(&self, message: ProduceMessage) -> Result<()> {
        self.commands
            .send(Command::Produce { message, ack: None })
            .await
            .map_err(|_| Error::Shutdown)
    }

    /// Force the current batch out regardless of linger bounds.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush { done: tx })
            .await
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    /// Flush what is pending (bounded by the shutdown flush timeout)
    /// and stop the dispatcher.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { done: tx })
            .await
            .map_err(|_| Error::Shutdown)?;
        rx.await.map_err(|_| Error::Shutdown)
    }
}

struct Queued {
    message: ProduceMessage,
    partition: i32,
    size: usize,
    attempts: u32,
    ack: Option<oneshot::Sender<Result<ProduceAck>>>,
}

impl Queued {
    fn fail(self, err: Error) {
        if let Some(ack) = self.ack {
            let _ = ack.send(Err(err));
        }
    }

    fn settle(self, partition: i32, offset: i64) {
        if let Some(ack) = self.ack {
            let _ = ack.send(Ok((partition, offset)));
        }
    }
}

pub(crate) struct Dispatcher<T: BrokerConnection> {
    topic: Arc<str>,
    metadata: ClusterMetadata<T>,
    config: ProducerConfig,
    partitioner: Arc<dyn Partitioner>,
    round_robin: usize,
    pending: Vec<Queued>,
    pending_bytes: usize,
    oldest: Option<Instant>,
}

impl<T: BrokerConnection> Dispatcher<T> {
    pub(crate) fn new(
        topic: String,
        metadata: ClusterMetadata<T>,
        config: ProducerConfig,
        partitioner: Arc<dyn Partitioner>,
    ) -> Self {
        Self {
            topic: topic.into(),
            metadata,
            config,
            partitioner,
            round_robin: 0,
            pending: Vec::new(),
            pending_bytes: 0,
            oldest: None,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let deadline = self
                .oldest
                .map(|at| at + Duration::from_millis(self.config.linger_ms));

            tokio::select! {
                command = commands.recv() => match command {
                    None => {
                        self.flush_all().await;
                        return;
                    }
                    Some(Command::Produce { message, ack }) => {
                        self.enqueue(message, ack).await;
                        if self.should_flush() {
                            self.flush_all().await;
                        }
                    }
                    Some(Command::Flush { done }) => {
                        self.flush_all().await;
                        let _ = done.send(());
                    }
                    Some(Command::Shutdown { done }) => {
                        let timeout = self.config.shutdown_flush_timeout;
                        if tokio::time::timeout(timeout, self.flush_all()).await.is_err() {
                            tracing::warn!("Shutdown flush timed out, dropping remaining batch");
                            for queued in self.pending.drain(..) {
                                queued.fail(Error::Shutdown);
                            }
                        }
                        let _ = done.send(());
                        return;
                    }
                },
                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    tracing::trace!("Linger deadline hit, flushing {} messages", self.pending.len());
                    self.flush_all().await;
                }
            }
        }
    }

    fn should_flush(&self) -> bool {
        self.pending.len() >= self.config.linger_count
            || self.pending_bytes >= self.config.linger_bytes
    }

    async fn enqueue(
        &mut self,
        message: ProduceMessage,
        ack: Option<oneshot::Sender<Result<ProduceAck>>>,
    ) {
        if let Err(err) = self.metadata.refresh_if_stale().await {
            tracing::warn!("Metadata refresh failed on enqueue: {:?}", err);
        }

        let partitions = self.metadata.partitions_for_topic(&self.topic);
        if partitions.is_empty() {
            let failed = Queued {
                message,
                partition: -1,
                size: 0,
                attempts: 0,
                ack,
            };
            failed.fail(Error::NoLeaderForTopicPartition(self.topic.to_string(), -1));
            return;
        }

        let partition = match (message.partition, &message.key) {
            (Some(partition), _) => partition,
            (None, Some(key)) => {
                partitions[self.partitioner.partition_for_key(key, partitions.len())]
            }
            (None, None) => {
                self.round_robin = self.round_robin.wrapping_add(1);
                partitions[self.round_robin % partitions.len()]
            }
        };

        let size = message.key.as_ref().map(Bytes::len).unwrap_or(0)
            + message.value.as_ref().map(Bytes::len).unwrap_or(0);
        self.pending_bytes += size;
        if self.oldest.is_none() {
            self.oldest = Some(Instant::now());
        }

        self.pending.push(Queued {
            message,
            partition,
            size,
            attempts: 0,
            ack,
        });
    }

    /// Drive the pending batch to completion: dispatch, then retry
    /// what came back requeueable until retries run out.
    async fn flush_all(&mut self) {
        while !self.pending.is_empty() {
            let batch = std::mem::take(&mut self.pending);
            self.pending_bytes = 0;
            self.oldest = None;

            let (requeue, needs_refresh) = self.dispatch(batch).await;
            if requeue.is_empty() {
                break;
            }

            if needs_refresh {
                if let Err(err) = self.metadata.refresh().await {
                    tracing::error!("ERROR: Metadata refresh for retry failed {:?}", err);
                    for queued in requeue {
                        queued.fail(err.clone());
                    }
                    break;
                }
            }

            for queued in requeue {
                self.pending_bytes += queued.size;
                self.pending.push(queued);
            }
        }
    }

    /// One dispatch round: group by leader, fan produce requests out,
    /// settle acks. Returns messages worth another attempt and whether
    /// the retry should refresh metadata first.
    #[instrument(skip(self, batch), fields(topic = %self.topic))]
    async fn dispatch(&mut self, batch: Vec<Queued>) -> (Vec<Queued>, bool) {
        tracing::debug!("Producing {} messages", batch.len());

        let mut requeue = Vec::new();
        let mut needs_refresh = false;

        // group by the partition leader known right now
        let mut by_leader: HashMap<i32, HashMap<i32, Vec<Queued>>> = HashMap::new();
        for queued in batch {
            match self
                .metadata
                .get_leader_for_topic_partition(&self.topic, queued.partition)
            {
                Some(leader) => by_leader
                    .entry(leader)
                    .or_default()
                    .entry(queued.partition)
                    .or_default()
                    .push(queued),
                None => {
                    needs_refresh = true;
                    self.requeue_or_fail(
                        queued,
                        &mut requeue,
                        Error::NoLeaderForTopicPartition(self.topic.to_string(), -1),
                    );
                }
            }
        }

        let mut set: JoinSet<(HashMap<i32, Vec<Queued>>, Result<Option<Bytes>>)> = JoinSet::new();

        for (leader, partitions) in by_leader {
            let conn = match self.metadata.connection_for_broker(leader) {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::warn!("No connection for leader {}: {:?}", leader, err);
                    needs_refresh = true;
                    for (_, queued) in partitions {
                        for q in queued {
                            self.requeue_or_fail(q, &mut requeue, err.clone());
                        }
                    }
                    continue;
                }
            };

            let topic = self.topic.clone();
            let config = self.config.clone();
            set.spawn(async move {
                let response =
                    send_batch(&conn, &topic, &config, &partitions).await;
                (partitions, response)
            });
        }

        while let Some(joined) = set.join_next().await {
            let Ok((partitions, response)) = joined else {
                tracing::error!("ERROR: Produce task panicked");
                continue;
            };

            match response {
                // fire-and-forget: nothing to learn, settle at offset -1
                Ok(None) => {
                    for (partition, queued) in partitions {
                        for q in queued {
                            q.settle(partition, -1);
                        }
                    }
                }
                Ok(Some(frame)) => {
                    let parsed = protocol::ProduceResponse::try_from(frame);
                    match parsed {
                        Err(err) => {
                            for (_, queued) in partitions {
                                for q in queued {
                                    q.fail(err.clone());
                                }
                            }
                        }
                        Ok(response) => {
                            let outcome = self.settle_response(partitions, response);
                            needs_refresh |= outcome.1;
                            requeue.extend(outcome.0);
                        }
                    }
                }
                Err(err) => {
                    // transport failure: surface to callers, the
                    // connection reopens on the next request
                    tracing::error!("ERROR: Produce transport failure {:?}", err);
                    for (_, queued) in partitions {
                        for q in queued {
                            q.fail(err.clone());
                        }
                    }
                }
            }
        }

        (requeue, needs_refresh)
    }

    /// Settle one leader's response against the messages sent to it.
    fn settle_response(
        &self,
        partitions: HashMap<i32, Vec<Queued>>,
        response: protocol::ProduceResponse,
    ) -> (Vec<Queued>, bool) {
        let mut requeue = Vec::new();
        let mut needs_refresh = false;

        for (partition, queued) in partitions {
            let outcome = response.partition(self.topic.as_bytes(), partition).cloned();

            match outcome {
                None => {
                    for q in queued {
                        q.fail(Error::Internal("partition missing from produce response"));
                    }
                }
                Some(outcome) if outcome.error_code == KafkaCode::None => {
                    for (i, q) in queued.into_iter().enumerate() {
                        q.settle(partition, outcome.base_offset + i as i64);
                    }
                }
                Some(outcome) if outcome.error_code.is_leader_error() => {
                    tracing::warn!(
                        "Leader error {:?} on partition {}, will refresh and retry",
                        outcome.error_code,
                        partition
                    );
                    needs_refresh = true;
                    for q in queued {
                        self.requeue_or_fail(
                            q,
                            &mut requeue,
                            Error::KafkaError(outcome.error_code),
                        );
                    }
                }
                Some(outcome) if outcome.error_code == KafkaCode::RequestTimedOut => {
                    // retryable in place, the leader is fine
                    for q in queued {
                        self.requeue_or_fail(
                            q,
                            &mut requeue,
                            Error::KafkaError(outcome.error_code),
                        );
                    }
                }
                Some(outcome) => {
                    for q in queued {
                        q.fail(Error::KafkaError(outcome.error_code));
                    }
                }
            }
        }

        (requeue, needs_refresh)
    }

    fn requeue_or_fail(&self, mut queued: Queued, requeue: &mut Vec<Queued>, err: Error) {
        queued.attempts += 1;
        if queued.attempts > self.config.max_retries {
            tracing::error!(
                "ERROR: Message exhausted {} retries on partition {}",
                self.config.max_retries,
                queued.partition
            );
            queued.fail(err);
        } else {
            requeue.push(queued);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        // guarded out of the select arm, but keep the future well-formed
        None => std::future::pending::<()>().await,
    }
}

async fn send_batch<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    topic: &str,
    config: &ProducerConfig,
    partitions: &HashMap<i32, Vec<Queued>>,
) -> Result<Option<Bytes>> {
    let mut request = protocol::ProduceRequest::new(
        config.required_acks,
        config.timeout_ms,
        0,
        &config.client_id,
        config.compression,
    );

    for (partition, queued) in partitions {
        for q in queued {
            request.add(
                topic,
                *partition,
                Message::new(q.message.key.clone(), q.message.value.clone()),
            );
        }
    }

    conn.request(request).await
}

/// Produce a message set directly over one connection.
///
/// Protocol-level building block for callers that bypass the batching
/// dispatcher. Returns `None` under `required_acks = 0`.
pub async fn produce<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    required_acks: i16,
    timeout_ms: i32,
    topic: &str,
    messages: Vec<(i32, Message)>,
) -> Result<Option<protocol::ProduceResponse>> {
    tracing::debug!("Producing {} messages", messages.len());

    let mut request = protocol::ProduceRequest::new(
        required_acks,
        timeout_ms,
        0,
        client_id,
        Compression::None,
    );
    for (partition, message) in messages {
        request.add(topic, partition, message);
    }

    match conn.request(request).await? {
        Some(frame) => Ok(Some(protocol::ProduceResponse::try_from(frame)?)),
        None => Ok(None),
    }
}
