//! Consumer which cooperates with others to consume a topic.
//!
//! Group membership runs on the coordination store, offsets on the
//! Kafka coordinator broker. One driver task per member walks this
//! state machine:
//!
//! ```text
//! Discover -> Electing -> Rebalancing -> Consuming <-> Rebalancing
//!    ^           |            |              |
//!    +-- error --+-- error ---+--- error ----+
//! ```
//!
//! Discover finds the coordinator broker. Electing opens (or renews)
//! the store session, registers the member ephemerally, and tries the
//! group leader lock; the holder computes assignments during
//! Rebalancing and publishes them for everyone. Consuming runs one
//! partition worker per owned partition and keeps three clocks going:
//! session renewal at TTL/2, periodic offset commits, and the
//! membership watch that sends everyone back to Rebalancing when the
//! group changes shape.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::{
    assignor,
    connection::KafkaConnection,
    consumer::{FetchConfig, MessageHandler, PartitionOffsets, PartitionWorker},
    coordination::{paths, CoordinationStore, LockStatus, SessionId, SessionStatus},
    error::{Error, KafkaCode, Result},
    metadata::ClusterMetadata,
    network::{BrokerAddress, BrokerConnection},
    protocol,
    supervisor::supervise,
    utils,
};

pub(crate) const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_AUTO_COMMIT_INTERVAL_MS: u64 = 5000;
pub(crate) const DEFAULT_STORE_PREFIX: &str = "/franz";
const DISCOVER_RETRY: Duration = Duration::from_millis(500);
const REBALANCE_PUBLISH_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupState {
    Discover,
    Electing,
    Rebalancing,
    Consuming,
}

#[derive(Debug, Clone)]
pub(crate) struct GroupConfig {
    pub group_id: String,
    pub topic: String,
    pub client_id: String,
    pub store_prefix: String,
    pub session_ttl: Duration,
    pub auto_commit_interval_ms: u64,
    pub commit_annotation: String,
    pub fetch: FetchConfig,
}

/// Handle to a running consumer-group member.
///
/// The member consumes until [`stop`](Self::stop); consuming errors are
/// recovered internally by walking back to Discover, never surfaced
/// here.
pub struct ConsumerGroup {
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) driver: JoinHandle<()>,
}

impl ConsumerGroup {
    /// Graceful stop: workers flush their commit positions, the final
    /// offsets are committed synchronously, locks and session released.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if self.driver.await.is_err() {
            tracing::warn!("Group driver ended abnormally");
        }
    }
}

pub(crate) struct GroupDriver<S: CoordinationStore, T: BrokerConnection> {
    pub config: GroupConfig,
    pub store: Arc<S>,
    pub metadata: Arc<Mutex<ClusterMetadata<T>>>,
    pub handler: Arc<dyn MessageHandler>,
    pub member_id: String,
    pub shutdown: watch::Receiver<bool>,

    session: Option<SessionId>,
    coordinator: Option<KafkaConnection<T>>,
    is_leader: bool,
    /// Next-offset-to-read per owned partition, monotonically
    /// non-decreasing; what gets committed.
    progress: Arc<StdMutex<HashMap<i32, i64>>>,
}

impl<S: CoordinationStore, T: BrokerConnection> GroupDriver<S, T> {
    pub(crate) fn new(
        config: GroupConfig,
        store: Arc<S>,
        metadata: Arc<Mutex<ClusterMetadata<T>>>,
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let member_id = format!(
            "{}-{}-{}",
            config.client_id,
            std::process::id(),
            utils::now()
        );
        Self {
            config,
            store,
            metadata,
            handler,
            member_id,
            shutdown,
            session: None,
            coordinator: None,
            is_leader: false,
            progress: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub(crate) async fn run(mut self) {
        let mut state = GroupState::Discover;
        let mut assignment: Vec<i32> = vec![];

        loop {
            if *self.shutdown.borrow() {
                self.leave().await;
                return;
            }

            tracing::debug!(
                "Member {} | group {} entering {:?}",
                self.member_id,
                self.config.group_id,
                state
            );

            let step = match state {
                GroupState::Discover => self.discover().await,
                GroupState::Electing => self.elect().await,
                GroupState::Rebalancing => match self.rebalance().await {
                    Ok(owned) => {
                        assignment = owned;
                        Ok(GroupState::Consuming)
                    }
                    Err(err) => Err(err),
                },
                GroupState::Consuming => self.consume(&assignment).await,
            };

            state = match step {
                Ok(next) => next,
                Err(Error::Shutdown) => {
                    self.leave().await;
                    return;
                }
                Err(err) => {
                    tracing::error!(
                        "ERROR: Member {} | group error in {:?}: {:?}",
                        self.member_id,
                        state,
                        err
                    );
                    tokio::time::sleep(DISCOVER_RETRY).await;
                    GroupState::Discover
                }
            };
        }
    }

    /// Ask any broker who coordinates the group, then connect to it.
    async fn discover(&mut self) -> Result<GroupState> {
        let conn = self.metadata.lock().await.any_connection().await?;

        let request =
            protocol::ConsumerMetadataRequest::new(0, &self.config.client_id, &self.config.group_id);
        let frame = conn
            .request(request)
            .await?
            .ok_or(Error::Internal("consumer metadata always has a response"))?;
        let response = protocol::ConsumerMetadataResponse::try_from(frame)?;

        match response.error_code {
            KafkaCode::None => {}
            KafkaCode::ConsumerCoordinatorNotAvailable | KafkaCode::OffsetsLoadInProgress => {
                tracing::debug!("Coordinator not ready: {:?}", response.error_code);
                tokio::time::sleep(DISCOVER_RETRY).await;
                return Ok(GroupState::Discover);
            }
            code => return Err(Error::KafkaError(code)),
        }

        let host = std::str::from_utf8(&response.host)
            .map_err(|_| Error::DecodingUtf8Error)?
            .to_string();
        let addr = BrokerAddress {
            host,
            port: response.port as u16,
        };
        tracing::debug!(
            "Member {} | coordinator is node {} at {}",
            self.member_id,
            response.coordinator_id,
            addr
        );

        let pool = self.metadata.lock().await.pool().clone();
        self.coordinator = Some(pool.checkout(&addr).await);
        Ok(GroupState::Electing)
    }

    /// Open the session, register membership, try for the leader lock.
    async fn elect(&mut self) -> Result<GroupState> {
        let renewed = match self.session {
            Some(existing) => {
                (self.store.session_renew(existing).await? == SessionStatus::Active)
                    .then_some(existing)
            }
            None => None,
        };
        let session = match renewed {
            Some(session) => session,
            None => {
                let session = self.store.session_create(self.config.session_ttl).await?;
                self.session = Some(session);
                session
            }
        };

        // ephemeral registration: our disappearance is the signal that
        // rebalances the others
        self.store
            .kv_put(
                &paths::member(&self.config.store_prefix, &self.config.group_id, &self.member_id),
                Bytes::from(self.member_id.clone()),
                Some(session),
            )
            .await?;

        let lock = paths::leader(&self.config.store_prefix, &self.config.group_id);
        self.is_leader = match self.store.lock_acquire(&lock, session).await? {
            LockStatus::Acquired => true,
            LockStatus::HeldByOther => false,
        };
        tracing::debug!(
            "Member {} | leader lock {}",
            self.member_id,
            if self.is_leader { "held" } else { "observed" }
        );

        Ok(GroupState::Rebalancing)
    }

    /// Compute (leader) or await (follower) the assignment, then seed
    /// offsets for the partitions we now own.
    async fn rebalance(&mut self) -> Result<Vec<i32>> {
        let session = self.session.ok_or(Error::LockLost)?;
        let members_dir = paths::members(&self.config.store_prefix, &self.config.group_id);

        {
            let mut metadata = self.metadata.lock().await;
            metadata.refresh().await?;
        }

        if self.is_leader {
            let member_keys = self.store.kv_list(&members_dir).await?;
            let members: Vec<String> = member_keys
                .iter()
                .filter_map(|key| paths::member_id_of(&members_dir, key))
                .collect();
            let partitions = self
                .metadata
                .lock()
                .await
                .partitions_for_topic(&self.config.topic);

            tracing::debug!(
                "Member {} | leading rebalance: {} members, {} partitions",
                self.member_id,
                members.len(),
                partitions.len()
            );

            let assignments =
                assignor::assign(assignor::ROUND_ROBIN_STRATEGY, &members, &partitions)?;
            for (member, owned) in assignments {
                let serialized = owned
                    .iter()
                    .map(i32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                self.store
                    .kv_put(
                        &paths::assignment(
                            &self.config.store_prefix,
                            &self.config.group_id,
                            &member,
                        ),
                        Bytes::from(serialized),
                        Some(session),
                    )
                    .await?;
            }
        }

        let owned = self.await_own_assignment().await?;
        tracing::debug!("Member {} | assigned partitions {:?}", self.member_id, owned);

        self.seed_offsets(&owned).await?;
        Ok(owned)
    }

    /// Poll for our published assignment, following the store watch.
    async fn await_own_assignment(&self) -> Result<Vec<i32>> {
        let path = paths::assignment(
            &self.config.store_prefix,
            &self.config.group_id,
            &self.member_id,
        );

        let deadline = tokio::time::Instant::now() + REBALANCE_PUBLISH_WAIT;
        let mut from_index = 0;

        loop {
            if let Some(raw) = self.store.kv_get(&path).await? {
                let raw = std::str::from_utf8(&raw).map_err(|_| Error::DecodingUtf8Error)?;
                let owned = raw
                    .split(',')
                    .filter(|part| !part.is_empty())
                    .map(|part| {
                        part.parse::<i32>().map_err(|_| {
                            Error::CoordinationError(format!("bad assignment entry {:?}", part))
                        })
                    })
                    .collect::<Result<Vec<i32>>>()?;
                return Ok(owned);
            }

            let watch = self.store.watch(&path, from_index);
            let event = tokio::time::timeout_at(deadline, watch)
                .await
                .map_err(|_| {
                    Error::CoordinationError("assignment never published".to_string())
                })??;
            from_index = event.index;
        }
    }

    /// Fetch committed offsets for the partitions we own; partitions
    /// without a commit get the negative sentinel the worker resolves
    /// through its reset policy.
    async fn seed_offsets(&mut self, owned: &[i32]) -> Result<()> {
        let coordinator = self.coordinator.clone().ok_or(Error::NoCoordinatorForGroup(
            self.config.group_id.clone(),
        ))?;

        let topic_partitions =
            HashMap::from([(self.config.topic.clone(), owned.to_vec())]);
        let response = crate::consumer::fetch_offset(
            &coordinator,
            &self.config.client_id,
            &self.config.group_id,
            &topic_partitions,
        )
        .await?;

        let mut progress = self
            .progress
            .lock()
            .map_err(|_| Error::Internal("progress mutex poisoned"))?;
        progress.clear();
        for (topic, partition) in response.into_flat_iter() {
            if topic != *self.config.topic.as_bytes() {
                continue;
            }
            if partition.error_code == KafkaCode::NotCoordinatorForConsumer {
                return Err(Error::KafkaError(partition.error_code));
            }
            progress.insert(
                partition.partition_index,
                partition.committed().unwrap_or(-1),
            );
        }
        // anything the response did not mention starts unresolved
        for partition in owned {
            progress.entry(*partition).or_insert(-1);
        }

        Ok(())
    }

    /// Run the owned partitions until something changes shape.
    async fn consume(&mut self, owned: &[i32]) -> Result<GroupState> {
        let session = self.session.ok_or(Error::LockLost)?;
        let coordinator = self.coordinator.clone().ok_or(Error::NoCoordinatorForGroup(
            self.config.group_id.clone(),
        ))?;

        let members_dir = paths::members(&self.config.store_prefix, &self.config.group_id);
        let leader_lock = paths::leader(&self.config.store_prefix, &self.config.group_id);
        let members_seen = self.store.watch(&members_dir, 0).await?.index;
        let leader_seen = self.store.watch(&leader_lock, 0).await?.index;

        let (commits_tx, mut commits_rx) = mpsc::unbounded_channel();
        let (stop_workers_tx, stop_workers_rx) = watch::channel(false);
        let workers = self.spawn_workers(owned, commits_tx, stop_workers_rx);

        let mut renew = tokio::time::interval(self.config.session_ttl / 2);
        renew.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut commit = tokio::time::interval(Duration::from_millis(
            self.config.auto_commit_interval_ms,
        ));
        commit.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut shutdown = self.shutdown.clone();
        let store = self.store.clone();

        let next = loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("Member {} | shutting down", self.member_id);
                    break Err(Error::Shutdown);
                }
                progress = commits_rx.recv() => {
                    if let Some((partition, offset)) = progress {
                        self.record_progress(partition, offset);
                    }
                }
                _ = renew.tick() => {
                    match store.session_renew(session).await {
                        Ok(SessionStatus::Active) => {}
                        Ok(SessionStatus::Expired) => {
                            tracing::warn!("Member {} | session expired", self.member_id);
                            self.session = None;
                            break Err(Error::LockLost);
                        }
                        Err(err) => break Err(err),
                    }
                }
                _ = commit.tick() => {
                    if let Err(err) = self.commit_progress(&coordinator).await {
                        tracing::warn!("Member {} | commit failed: {:?}", self.member_id, err);
                        if matches!(
                            err,
                            Error::KafkaError(KafkaCode::NotCoordinatorForConsumer)
                        ) {
                            break Ok(GroupState::Discover);
                        }
                    }
                }
                event = store.watch(&members_dir, members_seen) => {
                    if let Err(err) = event {
                        break Err(err);
                    }
                    tracing::debug!("Member {} | membership changed", self.member_id);
                    break Ok(GroupState::Rebalancing);
                }
                event = store.watch(&leader_lock, leader_seen) => {
                    if let Err(err) = event {
                        break Err(err);
                    }
                    tracing::debug!("Member {} | leadership changed", self.member_id);
                    break Ok(GroupState::Electing);
                }
            }
        };

        // stop workers so they flush their positions, then fold those
        // in and commit synchronously
        let _ = stop_workers_tx.send(true);
        for mut worker in workers {
            if tokio::time::timeout(Duration::from_secs(5), &mut worker)
                .await
                .is_err()
            {
                worker.abort();
            }
        }
        while let Ok((partition, offset)) = commits_rx.try_recv() {
            self.record_progress(partition, offset);
        }
        if let Err(err) = self.commit_progress(&coordinator).await {
            tracing::warn!(
                "Member {} | final commit failed: {:?}",
                self.member_id,
                err
            );
        }

        next
    }

    fn spawn_workers(
        &self,
        owned: &[i32],
        commits_tx: mpsc::UnboundedSender<(i32, i64)>,
        stop: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        owned
            .iter()
            .map(|partition| {
                let partition = *partition;
                let topic: Arc<str> = self.config.topic.clone().into();
                let metadata = self.metadata.clone();
                let config = self.config.fetch.clone();
                let handler = self.handler.clone();
                let commits = commits_tx.clone();
                let progress = self.progress.clone();
                let stop = stop.clone();

                supervise("partition-worker", move || {
                    let worker = PartitionWorker {
                        topic: topic.clone(),
                        partition,
                        metadata: metadata.clone(),
                        config: config.clone(),
                        handler: handler.clone(),
                        next_offset: progress
                            .lock()
                            .ok()
                            .and_then(|p| p.get(&partition).copied())
                            .unwrap_or(-1),
                        commits: commits.clone(),
                        shutdown: stop.clone(),
                    };
                    worker.run()
                })
            })
            .collect()
    }

    fn record_progress(&self, partition: i32, offset: i64) {
        if let Ok(mut progress) = self.progress.lock() {
            let slot = progress.entry(partition).or_insert(-1);
            // committed offsets never move backwards
            if offset > *slot {
                *slot = offset;
            }
        }
    }

    async fn commit_progress(&self, coordinator: &KafkaConnection<T>) -> Result<()> {
        let offsets: PartitionOffsets = {
            let progress = self
                .progress
                .lock()
                .map_err(|_| Error::Internal("progress mutex poisoned"))?;
            progress
                .iter()
                .filter(|(_, offset)| **offset >= 0)
                .map(|(partition, offset)| {
                    ((self.config.topic.clone(), *partition), *offset)
                })
                .collect()
        };

        if offsets.is_empty() {
            return Ok(());
        }

        crate::consumer::commit_offset(
            coordinator,
            &self.config.client_id,
            &self.config.group_id,
            &offsets,
            &self.config.commit_annotation,
        )
        .await?;
        Ok(())
    }

    /// Graceful departure: deregister, release the lock, drop the
    /// session so the rest of the group rebalances promptly.
    async fn leave(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let member = paths::member(
            &self.config.store_prefix,
            &self.config.group_id,
            &self.member_id,
        );
        if let Err(err) = self.store.kv_delete(&member).await {
            tracing::warn!("Deregistration failed: {:?}", err);
        }

        if self.is_leader {
            let lock = paths::leader(&self.config.store_prefix, &self.config.group_id);
            if let Err(err) = self.store.lock_release(&lock, session).await {
                tracing::warn!("Lock release failed: {:?}", err);
            }
        }
    }
}

/// Keep a member alive through the broker-native group protocol.
///
/// Protocol-level building block for the native-coordination surface;
/// the managed driver heartbeats through the coordination store
/// instead.
pub async fn heartbeat<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    group_id: &str,
    generation_id: i32,
    member_id: &str,
) -> Result<protocol::HeartbeatResponse> {
    let request = protocol::HeartbeatRequest::new(0, client_id, group_id, generation_id, member_id);
    let frame = conn
        .request(request)
        .await?
        .ok_or(Error::Internal("heartbeat always has a response"))?;
    protocol::HeartbeatResponse::try_from(frame)
}

/// Join a group through the broker-native group protocol.
pub async fn join_group<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    group_id: &str,
    session_timeout_ms: i32,
    member_id: &str,
    protocols: Vec<(&str, Bytes)>,
) -> Result<protocol::JoinGroupResponse> {
    let mut request =
        protocol::JoinGroupRequest::new(0, client_id, group_id, session_timeout_ms, member_id);
    for (name, metadata) in protocols {
        request.add_protocol(name, metadata);
    }
    let frame = conn
        .request(request)
        .await?
        .ok_or(Error::Internal("join group always has a response"))?;
    protocol::JoinGroupResponse::try_from(frame)
}

/// Locate the coordinator broker for a group.
pub async fn find_coordinator<T: BrokerConnection>(
    conn: &KafkaConnection<T>,
    client_id: &str,
    group_id: &str,
) -> Result<protocol::ConsumerMetadataResponse> {
    let request = protocol::ConsumerMetadataRequest::new(0, client_id, group_id);
    let frame = conn
        .request(request)
        .await?
        .ok_or(Error::Internal("consumer metadata always has a response"))?;
    protocol::ConsumerMetadataResponse::try_from(frame)
}
