//! Parsing and processing for Offset Fetch responses.
//!
//! ### Protocol Def
//! ```text
//! OffsetFetch Response (Version: 0) => [topics]
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index committed_offset metadata error_code
//!       partition_index => INT32
//!       committed_offset => INT64
//!       metadata => NULLABLE_STRING
//!       error_code => INT16
//! ```

use bytes::Bytes;
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{parse_header_response, HeaderResponse},
};

/// The base Offset Fetch response object.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetFetchResponse {
    pub header_response: HeaderResponse,
    /// The responses per topic.
    pub topics: Vec<Topic>,
}

/// The responses per topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: Bytes,
    /// The responses per partition.
    pub partitions: Vec<Partition>,
}

/// The responses per partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The committed offset, or -1 when nothing has been committed.
    pub committed_offset: i64,
    /// The metadata string stored with the commit.
    pub metadata: Option<Bytes>,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
}

impl Partition {
    /// The committed offset, treating the "no commit yet" reply shape
    /// (offset -1, `UnknownTopicOrPartition`) as an absence.
    pub fn committed(&self) -> Option<i64> {
        if self.committed_offset < 0 {
            return None;
        }
        match self.error_code {
            KafkaCode::None => Some(self.committed_offset),
            _ => None,
        }
    }
}

impl OffsetFetchResponse {
    pub fn into_flat_iter(self) -> impl Iterator<Item = (Bytes, Partition)> {
        self.topics.into_iter().flat_map(|topic| {
            topic
                .partitions
                .into_iter()
                .map(move |partition| (topic.name.clone(), partition))
        })
    }
}

impl TryFrom<Bytes> for OffsetFetchResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing OffsetFetchResponse {:?}", s);
        let (_, response) = parse_offset_fetch_response(NomBytes::new(s.clone())).map_err(|err| {
            tracing::error!("ERROR: Failed parsing OffsetFetchResponse {:?}", err);
            Error::ParsingError(s)
        })?;
        Ok(response)
    }
}

pub fn parse_offset_fetch_response(s: NomBytes) -> IResult<NomBytes, OffsetFetchResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        OffsetFetchResponse {
            header_response,
            topics,
        },
    ))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;

    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, partition_index) = be_i32(s)?;
    let (s, committed_offset) = be_i64(s)?;
    let (s, metadata) = parser::parse_nullable_string(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((
        s,
        Partition {
            partition_index,
            committed_offset,
            metadata,
            error_code,
        },
    ))
}
