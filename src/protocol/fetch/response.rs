//! Parsing and processing for Fetch responses.
//!
//! ### Protocol Def
//! ```text
//! Fetch Response (Version: 0) => [topics]
//!   topics => topic [partitions]
//!     topic => STRING
//!     partitions => partition error_code highwater_mark_offset message_set_size message_set
//!       partition => INT32
//!       error_code => INT16
//!       highwater_mark_offset => INT64
//!       message_set_size => INT32
//!       message_set => MESSAGE SET
//! ```
//!
//! The message set region is decoded through
//! [`decode_message_set`](crate::protocol::messages::decode_message_set),
//! which drops a partial trailing message and expands compressed
//! envelopes.

use bytes::Bytes;
use nom::{
    bytes::complete::take,
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{
        messages::{decode_message_set, Message},
        parse_header_response, HeaderResponse,
    },
};

/// The base Fetch response object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchResponse {
    pub header_response: HeaderResponse,
    /// The response topics.
    pub topics: Vec<Topic>,
}

impl FetchResponse {
    pub fn message_count(&self) -> usize {
        self.topics
            .iter()
            .flat_map(|topic| topic.partitions.iter())
            .map(|partition| partition.messages.len())
            .sum()
    }
}

impl TryFrom<Bytes> for FetchResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing FetchResponse {:?}", s);
        let (_, fetch_response) = parse_fetch_response(NomBytes::new(s.clone())).map_err(|err| {
            tracing::error!("ERROR: Failed parsing FetchResponse {:?}", err);
            Error::ParsingError(s)
        })?;
        Ok(fetch_response)
    }
}

/// The response topics.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic name.
    pub name: Bytes,
    /// The response partitions.
    pub partitions: Vec<Partition>,
}

/// The response partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The offset one past the last committed message on the leader.
    pub high_watermark: i64,
    /// The decoded messages, in offset order.
    pub messages: Vec<Message>,
}

impl Partition {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }
}

pub fn parse_fetch_response(s: NomBytes) -> IResult<NomBytes, FetchResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        FetchResponse {
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
    let (s, high_watermark) = be_i64(s)?;
    let (s, message_set_size) = be_i32(s)?;
    let (s, message_set) = take(message_set_size as usize)(s)?;

    let messages = decode_message_set(message_set.to_bytes()).map_err(|err| {
        tracing::error!("ERROR: Failed decoding message set {:?}", err);
        nom::Err::Failure(nom::error::Error::new(
            s.clone(),
            nom::error::ErrorKind::Verify,
        ))
    })?;

    Ok((
        s,
        Partition {
            partition_index,
            error_code,
            high_watermark,
            messages,
        },
    ))
}
