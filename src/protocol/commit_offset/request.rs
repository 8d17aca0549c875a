//! Encoding and creation for Offset Commit requests.
//!
//! ### Protocol Def
//! ```text
//! OffsetCommit Request (Version: 0) => group_id [topics]
//!   group_id => STRING
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index committed_offset committed_metadata
//!       partition_index => INT32
//!       committed_offset => INT64
//!       committed_metadata => NULLABLE_STRING
//! ```

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{api_keys, HeaderRequest, KafkaRequest},
};

const API_VERSION: i16 = 0;

/// The base Offset Commit request object.
///
/// Stage per-partition offsets with [`add`](Self::add) before sending.
#[derive(Debug)]
pub struct OffsetCommitRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The unique group identifier.
    pub group_id: &'a str,
    /// The topics to commit offsets for.
    pub topics: Vec<Topic<'a>>,
}

/// The topics to commit offsets for.
#[derive(Debug)]
pub struct Topic<'a> {
    /// The topic name.
    pub name: &'a str,
    /// Each partition to commit offsets for.
    pub partitions: Vec<Partition<'a>>,
}

/// Each partition to commit offsets for.
#[derive(Debug)]
pub struct Partition<'a> {
    /// The partition index.
    pub partition_index: i32,
    /// The offset to be committed.
    pub offset: i64,
    /// Any associated metadata the client wants to keep.
    pub metadata: Option<&'a str>,
}

impl<'a> OffsetCommitRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str, group_id: &'a str) -> Self {
        let header =
            HeaderRequest::new(api_keys::OFFSET_COMMIT, API_VERSION, correlation_id, client_id);
        Self {
            header,
            group_id,
            topics: vec![],
        }
    }

    /// Stage an offset for a topic partition. Staging the same
    /// partition twice keeps the later offset.
    pub fn add(
        &mut self,
        topic_name: &'a str,
        partition_index: i32,
        offset: i64,
        metadata: Option<&'a str>,
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
                    offset,
                    metadata,
                }],
            }),
            Some(topic) => {
                match topic
                    .partitions
                    .iter_mut()
                    .find(|partition| partition.partition_index == partition_index)
                {
                    None => topic.partitions.push(Partition {
                        partition_index,
                        offset,
                        metadata,
                    }),
                    Some(partition) => {
                        partition.offset = offset;
                        partition.metadata = metadata;
                    }
                }
            }
        }
    }
}

impl<'a> ToByte for OffsetCommitRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding OffsetCommitRequest {:?}", self);
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

impl<'a> ToByte for Partition<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.partition_index.encode(buffer)?;
        self.offset.encode(buffer)?;
        self.metadata.encode(buffer)?;
        Ok(())
    }
}

impl<'a> KafkaRequest for OffsetCommitRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::OFFSET_COMMIT
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
