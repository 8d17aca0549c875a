//! Parsing and processing for Produce responses.
//!
//! ### Protocol Def
//! ```text
//! Produce Response (Version: 0) => [responses]
//!   responses => topic [partition_responses]
//!     topic => STRING
//!     partition_responses => partition error_code base_offset
//!       partition => INT32
//!       error_code => INT16
//!       base_offset => INT64
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

/// The base Produce response object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProduceResponse {
    pub header_response: HeaderResponse,
    /// The response topics.
    pub topics: Vec<Topic>,
}

impl ProduceResponse {
    /// Look up the outcome for one topic partition.
    pub fn partition(&self, topic_name: &[u8], partition_index: i32) -> Option<&Partition> {
        self.topics
            .iter()
            .find(|topic| topic.name == topic_name)?
            .partitions
            .iter()
            .find(|partition| partition.partition_index == partition_index)
    }
}

impl TryFrom<Bytes> for ProduceResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing ProduceResponse {:?}", s);
        let (_, response) = parse_produce_response(NomBytes::new(s.clone())).map_err(|err| {
            tracing::error!("ERROR: Failed parsing ProduceResponse {:?}", err);
            Error::ParsingError(s)
        })?;
        Ok(response)
    }
}

/// The response topics.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: Bytes,
    /// The partition outcomes.
    pub partitions: Vec<Partition>,
}

/// The outcome of one partition's message set.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The log offset assigned to the first message in the set.
    pub base_offset: i64,
}

pub fn parse_produce_response(s: NomBytes) -> IResult<NomBytes, ProduceResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        ProduceResponse {
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
    let (s, base_offset) = be_i64(s)?;

    Ok((
        s,
        Partition {
            partition_index,
            error_code,
            base_offset,
        },
    ))
}
