//! Parsing and processing for Offset Commit responses.
//!
//! ### Protocol Def
//! ```text
//! OffsetCommit Response (Version: 0) => [topics]
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index error_code
//!       partition_index => INT32
//!       error_code => INT16
//! ```

use bytes::Bytes;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{parse_header_response, HeaderResponse},
};

/// The base Offset Commit response object.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetCommitResponse {
    pub header_response: HeaderResponse,
    /// The responses per topic.
    pub topics: Vec<Topic>,
}

impl OffsetCommitResponse {
    /// Surface the first per-partition error, if any.
    pub fn is_error(&self) -> Result<()> {
        for topic in self.topics.iter() {
            for partition in topic.partitions.iter() {
                if partition.error_code != KafkaCode::None {
                    tracing::error!(
                        "ERROR: Kafka Error {:?} committing {:?} partition {}",
                        partition.error_code,
                        topic.name,
                        partition.partition_index
                    );
                    return Err(Error::KafkaError(partition.error_code));
                }
            }
        }
        Ok(())
    }
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
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
}

impl TryFrom<Bytes> for OffsetCommitResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing OffsetCommitResponse {:?}", s);
        let (_, response) =
            parse_offset_commit_response(NomBytes::new(s.clone())).map_err(|err| {
                tracing::error!("ERROR: Failed parsing OffsetCommitResponse {:?}", err);
                Error::ParsingError(s)
            })?;
        Ok(response)
    }
}

pub fn parse_offset_commit_response(s: NomBytes) -> IResult<NomBytes, OffsetCommitResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        OffsetCommitResponse {
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

    Ok((
        s,
        Partition {
            partition_index,
            error_code,
        },
    ))
}
