//! Encoding and creation for Fetch requests.
//!
//! ### Protocol Def
//! ```text
//! Fetch Request (Version: 0) => replica_id max_wait_ms min_bytes [topics]
//!   replica_id => INT32
//!   max_wait_ms => INT32
//!   min_bytes => INT32
//!   topics => topic [partitions]
//!     topic => STRING
//!     partitions => partition fetch_offset max_bytes
//!       partition => INT32
//!       fetch_offset => INT64
//!       max_bytes => INT32
//! ```

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{api_keys, HeaderRequest, KafkaRequest},
};

const API_VERSION: i16 = 0;

/// Clients always fetch as a normal consumer, never as a follower.
const CONSUMER_REPLICA_ID: i32 = -1;

/// The base Fetch request object.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The broker ID of the follower, or -1 for a normal consumer.
    pub replica_id: i32,
    /// The maximum time in milliseconds the broker may hold the request.
    pub max_wait_ms: i32,
    /// The minimum bytes to accumulate before answering.
    pub min_bytes: i32,
    /// The topics to fetch.
    pub topics: Vec<Topic<'a>>,
}

/// The topics to fetch.
#[derive(Debug, Clone)]
pub struct Topic<'a> {
    /// The topic name.
    pub name: &'a str,
    /// The partitions to fetch.
    pub partitions: Vec<Partition>,
}

/// The partitions to fetch.
#[derive(Debug, Clone)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The offset to begin the fetch from.
    pub fetch_offset: i64,
    /// The maximum bytes to return for this partition.
    pub max_bytes: i32,
}

impl<'a> FetchRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        max_wait_ms: i32,
        min_bytes: i32,
    ) -> FetchRequest<'a> {
        FetchRequest {
            header: HeaderRequest::new(api_keys::FETCH, API_VERSION, correlation_id, client_id),
            replica_id: CONSUMER_REPLICA_ID,
            max_wait_ms,
            min_bytes,
            topics: vec![],
        }
    }

    pub fn add(&mut self, topic_name: &'a str, partition_index: i32, fetch_offset: i64, max_bytes: i32) {
        match self
            .topics
            .iter_mut()
            .find(|topic| topic.name == topic_name)
        {
            None => self.topics.push(Topic {
                name: topic_name,
                partitions: vec![Partition {
                    partition_index,
                    fetch_offset,
                    max_bytes,
                }],
            }),
            Some(topic) => {
                if !topic
                    .partitions
                    .iter()
                    .any(|partition| partition.partition_index == partition_index)
                {
                    topic.partitions.push(Partition {
                        partition_index,
                        fetch_offset,
                        max_bytes,
                    })
                }
            }
        }
    }
}

impl<'a> ToByte for FetchRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding FetchRequest {:?}", self);
        self.header.encode(buffer)?;
        self.replica_id.encode(buffer)?;
        self.max_wait_ms.encode(buffer)?;
        self.min_bytes.encode(buffer)?;
        self.topics.encode(buffer)?;
        Ok(())
    }
}

impl<'a> ToByte for Topic<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.partitions.encode(buffer)?;
        Ok(())
    }
}

impl ToByte for Partition {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition_index.encode(buffer)?;
        self.fetch_offset.encode(buffer)?;
        self.max_bytes.encode(buffer)?;
        Ok(())
    }
}

impl<'a> KafkaRequest for FetchRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::FETCH
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
