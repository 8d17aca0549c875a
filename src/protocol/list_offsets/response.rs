//! Parsing and processing for Offset responses.
//!
//! ### Protocol Def
//! ```text
//! Offset Response (Version: 0) => [topics]
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index error_code [offsets]
//!       partition_index => INT32
//!       error_code => INT16
//!       offsets => INT64
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

/// The base Offset response object.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetResponse {
    pub header_response: HeaderResponse,
    /// Each topic in the response.
    pub topics: Vec<Topic>,
}

/// Each topic in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: Bytes,
    /// Each partition in the response.
    pub partitions: Vec<Partition>,
}

/// Each partition in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The found offsets, newest first.
    pub offsets: Vec<i64>,
}

impl Partition {
    /// The newest offset the broker returned, if any.
    pub fn newest(&self) -> Option<i64> {
        self.offsets.first().copied()
    }
}

impl OffsetResponse {
    pub fn into_flat_iter(self) -> impl Iterator<Item = (Bytes, Partition)> {
        self.topics.into_iter().flat_map(|topic| {
            topic
                .partitions
                .into_iter()
                .map(move |partition| (topic.name.clone(), partition))
        })
    }
}

impl TryFrom<Bytes> for OffsetResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing OffsetResponse {:?}", s);
        let (_, response) = parse_offset_response(NomBytes::new(s.clone())).map_err(|err| {
            tracing::error!("ERROR: Failed parsing OffsetResponse {:?}", err);
            Error::ParsingError(s)
        })?;
        Ok(response)
    }
}

pub fn parse_offset_response(s: NomBytes) -> IResult<NomBytes, OffsetResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        OffsetResponse {
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
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, offsets) = parser::parse_array(be_i64)(s)?;

    Ok((
        s,
        Partition {
            partition_index,
            error_code,
            offsets,
        },
    ))
}
