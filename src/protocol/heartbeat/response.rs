//! Parsing and processing for Heartbeat responses.
//!
//! ### Protocol Def
//! ```text
//! Heartbeat Response (Version: 0) => error_code
//!   error_code => INT16
//! ```

use bytes::Bytes;
use nom::IResult;
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{parse_header_response, HeaderResponse},
};

/// The base Heartbeat response object.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatResponse {
    pub header_response: HeaderResponse,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
}

impl HeartbeatResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }
}

impl TryFrom<Bytes> for HeartbeatResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing HeartbeatResponse {:?}", s);
        let (_, response) = parse_heartbeat_response(NomBytes::new(s.clone())).map_err(|err| {
            tracing::error!("ERROR: Failed parsing HeartbeatResponse {:?}", err);
            Error::ParsingError(s)
        })?;
        Ok(response)
    }
}

pub fn parse_heartbeat_response(s: NomBytes) -> IResult<NomBytes, HeartbeatResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;

    Ok((
        s,
        HeartbeatResponse {
            header_response,
            error_code,
        },
    ))
}
