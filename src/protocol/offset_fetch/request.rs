//! Encoding and creation for Offset Fetch requests.
//!
//! ### Protocol Def
//! ```text
//! OffsetFetch Request (Version: 0) => group_id [topics]
//!   group_id => STRING
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index
//!       partition_index => INT32
//! ```

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{api_keys, HeaderRequest, KafkaRequest},
};

const API_VERSION: i16 = 0;

/// The base Offset Fetch request object.
#[derive(Debug)]
pub struct OffsetFetchRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The unique group identifier.
    pub group_id: &'a str,
    /// The topics to fetch offsets for.
    pub topics: Vec<Topic<'a>>,
}

/// The topics to fetch offsets for.
#[derive(Debug)]
pub struct Topic<'a> {
    /// The topic name.
    pub name: &'a str,
    /// The partition indexes to fetch offsets for.
    pub partitions: Vec<i32>,
}

impl<'a> OffsetFetchRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str, group_id: &'a str) -> Self {
        let header =
            HeaderRequest::new(api_keys::OFFSET_FETCH, API_VERSION, correlation_id, client_id);
        Self {
            header,
            group_id,
            topics: vec![],
        }
    }

    pub fn add(&mut self, topic_name: &'a str, partition_index: i32) {
        match self
            .topics
            .iter_mut()
            .find(|topic| topic.name == topic_name)
        {
            None => self.topics.push(Topic {
                name: topic_name,
                partitions: vec![partition_index],
            }),
            Some(topic) => {
                if !topic.partitions.contains(&partition_index) {
                    topic.partitions.push(partition_index);
                }
            }
        }
    }
}

impl<'a> ToByte for OffsetFetchRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding OffsetFetchRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
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

impl<'a> KafkaRequest for OffsetFetchRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::OFFSET_FETCH
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
