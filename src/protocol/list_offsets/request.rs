//! Encoding and creation for Offset requests.
//!
//! ### Protocol Def
//! ```text
//! Offset Request (Version: 0) => replica_id [topics]
//!   replica_id => INT32
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index time max_number_of_offsets
//!       partition_index => INT32
//!       time => INT64
//!       max_number_of_offsets => INT32
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{api_keys, HeaderRequest, KafkaRequest},
};

const API_VERSION: i16 = 0;
const CONSUMER_REPLICA_ID: i32 = -1;

/// The point in the log an offset request asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetTime {
    /// The offset of the next message to be written.
    Latest,
    /// The first offset still held in the log.
    Earliest,
    /// The offsets of segments written before this time, in
    /// milliseconds since the Unix epoch.
    At(i64),
}

impl OffsetTime {
    pub fn as_millis(self) -> i64 {
        match self {
            OffsetTime::Latest => -1,
            OffsetTime::Earliest => -2,
            OffsetTime::At(ms) => ms,
        }
    }
}

impl From<SystemTime> for OffsetTime {
    fn from(at: SystemTime) -> Self {
        let ms = at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        OffsetTime::At(ms)
    }
}

/// The base Offset request object.
#[derive(Debug)]
pub struct OffsetRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The broker ID of the requester, or -1 for a normal consumer.
    pub replica_id: i32,
    /// Each topic in the request.
    pub topics: Vec<Topic<'a>>,
}

/// Each topic in the request.
#[derive(Debug)]
pub struct Topic<'a> {
    /// The topic name.
    pub name: &'a str,
    /// Each partition in the request.
    pub partitions: Vec<Partition>,
}

/// Each partition in the request.
#[derive(Debug)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The target time.
    pub time: OffsetTime,
    /// How many offsets to return, newest first.
    pub max_number_of_offsets: i32,
}

impl<'a> OffsetRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str) -> Self {
        let header = HeaderRequest::new(api_keys::OFFSET, API_VERSION, correlation_id, client_id);
        Self {
            header,
            replica_id: CONSUMER_REPLICA_ID,
            topics: vec![],
        }
    }

    pub fn add(
        &mut self,
        topic_name: &'a str,
        partition_index: i32,
        time: OffsetTime,
        max_number_of_offsets: i32,
    ) {
        match self
            .topics
            .iter_mut()
            .find(|topic| topic.name == topic_name)
        {
            None => self.topics.push(Topic {
                name: topic_name,
                partitions: vec![Partition {
                    partition_index,
                    time,
                    max_number_of_offsets,
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
                        time,
                        max_number_of_offsets,
                    })
                }
            }
        }
    }
}

impl<'a> ToByte for OffsetRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding OffsetRequest {:?}", self);
        self.header.encode(buffer)?;
        self.replica_id.encode(buffer)?;
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
        self.time.as_millis().encode(buffer)?;
        self.max_number_of_offsets.encode(buffer)?;
        Ok(())
    }
}

impl<'a> KafkaRequest for OffsetRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::OFFSET
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
