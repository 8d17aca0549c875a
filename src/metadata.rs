//! Cluster metadata & operations.
//!
//! One [`ClusterMetadata`] holds the per-topic view of the cluster:
//! which partitions exist, which broker leads each of them, and the
//! connection to every broker it knows about. Any component may ask for
//! a refresh; producers and consumers do so whenever a response tells
//! them their view of a leader is stale, and a TTL refresh catches
//! drift on quiet topics.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nom::AsBytes;

use crate::{
    connection::KafkaConnection,
    error::{Error, Result},
    network::{BrokerAddress, BrokerConnection},
    pool::ConnectionPool,
    protocol::{self, metadata::response::*},
};

/// How stale the topic view may get before a refresh is forced.
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(60);

/// A broker absent from this many successive refreshes is dropped.
const EVICTION_STRIKES: u8 = 2;

/// Topic names mapped to partition indexes, the common currency of
/// assignment plumbing.
pub type TopicPartitions = HashMap<String, Vec<i32>>;

#[derive(Debug)]
pub struct ClusterMetadata<T: BrokerConnection> {
    pool: ConnectionPool<T>,
    bootstrap_addrs: Vec<BrokerAddress>,
    pub client_id: String,
    pub topic_names: Vec<String>,
    pub brokers: Vec<Broker>,
    pub topics: Vec<Topic>,
    connections: HashMap<i32, KafkaConnection<T>>,
    absence_strikes: HashMap<i32, u8>,
    last_refresh: Option<Instant>,
    ttl: Duration,
}

impl<T: BrokerConnection> ClusterMetadata<T> {
    /// Connect to the cluster through the bootstrap list and take the
    /// first metadata snapshot.
    pub async fn new(
        pool: ConnectionPool<T>,
        bootstrap_addrs: Vec<BrokerAddress>,
        client_id: String,
        topics: Vec<String>,
    ) -> Result<ClusterMetadata<T>> {
        let mut metadata = ClusterMetadata {
            pool,
            bootstrap_addrs,
            client_id,
            topic_names: topics,
            brokers: vec![],
            topics: vec![],
            connections: HashMap::new(),
            absence_strikes: HashMap::new(),
            last_refresh: None,
            ttl: DEFAULT_METADATA_TTL,
        };
        metadata.refresh().await?;
        Ok(metadata)
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn pool(&self) -> &ConnectionPool<T> {
        &self.pool
    }

    /// Fetch a fresh snapshot and resync broker connections.
    pub async fn refresh(&mut self) -> Result<()> {
        tracing::debug!("Refreshing metadata for {:?}", self.topic_names);
        let conn = self.any_connection().await?;

        let request = protocol::MetadataRequest::new(0, &self.client_id, &self.topic_names);
        let response = conn
            .request(request)
            .await?
            .ok_or(Error::Internal("metadata request always has a response"))?;
        let response = protocol::MetadataResponse::try_from(response)?;

        self.brokers = response.brokers;
        self.topics = response.topics;
        self.last_refresh = Some(Instant::now());
        self.sync_connections().await?;

        Ok(())
    }

    /// Refresh only when the snapshot has outlived its TTL.
    pub async fn refresh_if_stale(&mut self) -> Result<()> {
        let stale = self
            .last_refresh
            .map(|at| at.elapsed() >= self.ttl)
            .unwrap_or(true);
        if stale {
            self.refresh().await?;
        }
        Ok(())
    }

    /// A connection to any broker, for requests that can be addressed
    /// to whoever answers (metadata, coordinator discovery).
    pub async fn any_connection(&self) -> Result<KafkaConnection<T>> {
        // prefer a broker from the last snapshot, fall back to bootstrap
        if let Some(conn) = self.connections.values().next() {
            return Ok(conn.clone());
        }
        let addr = self
            .bootstrap_addrs
            .first()
            .ok_or(Error::IoError(std::io::ErrorKind::NotFound))?;
        Ok(self.pool.checkout(addr).await)
    }

    /// Bring the per-broker connection map in line with the snapshot,
    /// striking out brokers that have gone missing.
    async fn sync_connections(&mut self) -> Result<()> {
        let mut seen: HashMap<i32, ()> = HashMap::new();
        for broker in self.brokers.clone() {
            seen.insert(broker.node_id, ());
            self.absence_strikes.remove(&broker.node_id);
            let addr = broker.addr()?;
            let conn = self.pool.checkout(&addr).await;
            self.connections.insert(broker.node_id, conn);
        }

        let absent: Vec<i32> = self
            .connections
            .keys()
            .filter(|id| !seen.contains_key(id))
            .copied()
            .collect();
        for node_id in absent {
            let strikes = self.absence_strikes.entry(node_id).or_insert(0);
            *strikes += 1;
            if *strikes >= EVICTION_STRIKES {
                tracing::debug!("Broker {} missing twice, dropping connection", node_id);
                if let Some(conn) = self.connections.remove(&node_id) {
                    self.pool.evict(conn.addr()).await;
                }
                self.absence_strikes.remove(&node_id);
            }
        }

        Ok(())
    }

    pub fn get_broker_by_id(&self, id: i32) -> Option<&Broker> {
        self.brokers.iter().find(|b| b.node_id == id)
    }

    pub fn get_topic_partition_by_id(
        &self,
        topic_name: &str,
        partition_index: i32,
    ) -> Option<&Partition> {
        let topic = self.topics.iter().find(|t| t.name == topic_name)?;
        topic
            .partitions
            .iter()
            .find(|p| p.partition_index == partition_index)
    }

    /// All partition indexes of a topic, sorted.
    pub fn partitions_for_topic(&self, topic_name: &str) -> Vec<i32> {
        let mut partitions: Vec<i32> = self
            .topics
            .iter()
            .find(|t| t.name == topic_name)
            .map(|t| t.partitions.iter().map(|p| p.partition_index).collect())
            .unwrap_or_default();
        partitions.sort_unstable();
        partitions
    }

    /// Resolve the leader broker for a topic partition against the
    /// current broker list. `None` while leadership is unresolved.
    pub fn get_leader_for_topic_partition(
        &self,
        topic_name: &str,
        partition_index: i32,
    ) -> Option<i32> {
        let partition = self.get_topic_partition_by_id(topic_name, partition_index)?;
        let leader = self.get_broker_by_id(partition.leader()?)?;
        tracing::debug!(
            "Leader is {:?} for topic {} and partition {}",
            leader,
            topic_name,
            partition_index
        );
        Some(leader.node_id)
    }

    /// The connection to a broker, by node id.
    pub fn connection_for_broker(&self, node_id: i32) -> Result<KafkaConnection<T>> {
        self.connections
            .get(&node_id)
            .cloned()
            .ok_or(Error::NoConnectionForBroker(node_id))
    }

    /// The connection to the leader of a topic partition.
    pub fn connection_for_leader(
        &self,
        topic_name: &str,
        partition_index: i32,
    ) -> Result<KafkaConnection<T>> {
        let leader = self
            .get_leader_for_topic_partition(topic_name, partition_index)
            .ok_or_else(|| {
                Error::NoLeaderForTopicPartition(topic_name.to_string(), partition_index)
            })?;
        self.connection_for_broker(leader)
    }

    /// Group topic partitions by the broker currently leading them.
    ///
    /// Any partition whose leader cannot be resolved makes the whole
    /// call fail with [`Error::MetadataNeedsSync`] so the caller
    /// refreshes and retries.
    pub fn get_leaders_for_topic_partitions(
        &self,
        topic_partitions: &TopicPartitions,
    ) -> Result<HashMap<i32, TopicPartitions>> {
        let mut leaders: HashMap<i32, TopicPartitions> = HashMap::new();

        for (topic_name, partitions) in topic_partitions.iter() {
            for partition_index in partitions.iter() {
                let leader = self
                    .get_leader_for_topic_partition(topic_name, *partition_index)
                    .ok_or(Error::MetadataNeedsSync)?;

                let owned = leaders.entry(leader).or_default();
                let owned_partitions = owned.entry(topic_name.clone()).or_default();
                if !owned_partitions.contains(partition_index) {
                    owned_partitions.push(*partition_index);
                }
            }
        }

        Ok(leaders)
    }
}

impl Broker {
    pub fn addr(&self) -> Result<BrokerAddress> {
        let host = std::str::from_utf8(self.host.as_bytes()).map_err(|err| {
            tracing::error!("Error converting from UTF8 {:?}", err);
            Error::DecodingUtf8Error
        })?;
        Ok(BrokerAddress {
            host: host.to_string(),
            port: self.port as u16,
        })
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::{error::KafkaCode, network::tcp::TcpConnection};

    fn test_metadata() -> ClusterMetadata<TcpConnection> {
        ClusterMetadata {
            pool: ConnectionPool::new(),
            bootstrap_addrs: vec![BrokerAddress {
                host: "localhost".to_string(),
                port: 9092,
            }],
            client_id: String::from("client_id"),
            topic_names: vec![String::from("bar")],
            brokers: vec![
                Broker {
                    node_id: 9092,
                    host: Bytes::from("192.168.0.1"),
                    port: 9092,
                },
                Broker {
                    node_id: 9093,
                    host: Bytes::from("192.168.0.1"),
                    port: 9093,
                },
            ],
            topics: vec![Topic {
                error_code: KafkaCode::None,
                name: Bytes::from("bar"),
                partitions: vec![
                    Partition {
                        error_code: KafkaCode::None,
                        partition_index: 0,
                        leader_id: 9092,
                        replica_nodes: vec![9092],
                        isr_nodes: vec![9092],
                    },
                    Partition {
                        error_code: KafkaCode::None,
                        partition_index: 1,
                        leader_id: 9093,
                        replica_nodes: vec![9093],
                        isr_nodes: vec![9093],
                    },
                    Partition {
                        error_code: KafkaCode::LeaderNotAvailable,
                        partition_index: 2,
                        leader_id: -1,
                        replica_nodes: vec![],
                        isr_nodes: vec![],
                    },
                ],
            }],
            connections: HashMap::new(),
            absence_strikes: HashMap::new(),
            last_refresh: None,
            ttl: DEFAULT_METADATA_TTL,
        }
    }

    #[test]
    fn broker_lookup_by_leader_id() {
        let cluster = test_metadata();

        let leader = cluster.get_leader_for_topic_partition("bar", 0);
        assert_eq!(leader, Some(9092));
        let broker = cluster.get_broker_by_id(9092).unwrap();
        assert_eq!(broker.addr().unwrap().to_string(), "192.168.0.1:9092");
    }

    #[test]
    fn unresolvable_leader_is_none() {
        let cluster = test_metadata();

        // unknown topic
        assert_eq!(cluster.get_leader_for_topic_partition("nope", 0), None);
        // unknown partition
        assert_eq!(cluster.get_leader_for_topic_partition("bar", 9), None);
        // election in progress
        assert_eq!(cluster.get_leader_for_topic_partition("bar", 2), None);
    }

    #[test]
    fn partitions_are_sorted() {
        let cluster = test_metadata();
        assert_eq!(cluster.partitions_for_topic("bar"), vec![0, 1, 2]);
        assert!(cluster.partitions_for_topic("nope").is_empty());
    }

    #[test]
    fn leaders_group_topic_partitions() {
        let cluster = test_metadata();
        let mut topic_partitions = HashMap::new();
        topic_partitions.insert(String::from("bar"), vec![0, 1]);

        let leaders = cluster
            .get_leaders_for_topic_partitions(&topic_partitions)
            .unwrap();

        assert_eq!(leaders.len(), 2);
        assert_eq!(
            leaders.get(&9092).unwrap(),
            &HashMap::from([(String::from("bar"), vec![0])])
        );
        assert_eq!(
            leaders.get(&9093).unwrap(),
            &HashMap::from([(String::from("bar"), vec![1])])
        );
    }

    #[test]
    fn pending_election_fails_grouping() {
        let cluster = test_metadata();
        let mut topic_partitions = HashMap::new();
        topic_partitions.insert(String::from("bar"), vec![0, 2]);

        assert_eq!(
            cluster.get_leaders_for_topic_partitions(&topic_partitions),
            Err(Error::MetadataNeedsSync)
        );
    }
}
