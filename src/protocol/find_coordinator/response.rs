//! Parsing and processing for Consumer Metadata responses.
//!
//! ### Protocol Def
//! ```text
//! ConsumerMetadata Response (Version: 0) => error_code coordinator_id coordinator_host coordinator_port
//!   error_code => INT16
//!   coordinator_id => INT32
//!   coordinator_host => STRING
//!   coordinator_port => INT32
//! ```
//!
//! While the coordinator for a freshly created group is still being
//! elected the broker answers `ConsumerCoordinatorNotAvailable`;
//! callers retry until a coordinator appears.

use bytes::Bytes;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{parse_header_response, HeaderResponse},
};

/// The base Consumer Metadata response object.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerMetadataResponse {
    pub header_response: HeaderResponse,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The node id of the coordinator broker.
    pub coordinator_id: i32,
    /// The coordinator hostname.
    pub host: Bytes,
    /// The coordinator port.
    pub port: i32,
}

impl ConsumerMetadataResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }
}

impl TryFrom<Bytes> for ConsumerMetadataResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing ConsumerMetadataResponse {:?}", s);
        let (_, response) =
            parse_consumer_metadata_response(NomBytes::new(s.clone())).map_err(|err| {
                tracing::error!("ERROR: Failed parsing ConsumerMetadataResponse {:?}", err);
                Error::ParsingError(s)
            })?;
        Ok(response)
    }
}

pub fn parse_consumer_metadata_response(
    s: NomBytes,
) -> IResult<NomBytes, ConsumerMetadataResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, coordinator_id) = be_i32(s)?;
    let (s, host) = parser::parse_string(s)?;
    let (s, port) = be_i32(s)?;

    Ok((
        s,
        ConsumerMetadataResponse {
            header_response,
            error_code,
            coordinator_id,
            host,
            port,
        },
    ))
}
