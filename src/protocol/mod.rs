//! Bytecode protocol requests & responses.
//!
//! This module implements the request/response pairs of the Kafka 0.8
//! wire protocol. Each API lives in its own directory with a `request.rs`
//! holding the encoding logic and a `response.rs` holding the parsing
//! logic, mirroring the layout of the protocol documentation.
//!
//! All APIs here use version 0 of their respective message formats.

pub mod commit_offset;
pub mod fetch;
pub mod find_coordinator;
pub mod heartbeat;
pub mod join_group;
pub mod list_offsets;
pub mod messages;
pub mod metadata;
pub mod offset_fetch;
pub mod produce;

use bytes::BufMut;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

// re exporting these for ease
pub use self::{
    commit_offset::{request::OffsetCommitRequest, response::OffsetCommitResponse},
    fetch::{request::FetchRequest, response::FetchResponse},
    find_coordinator::{request::ConsumerMetadataRequest, response::ConsumerMetadataResponse},
    heartbeat::{request::HeartbeatRequest, response::HeartbeatResponse},
    join_group::{request::JoinGroupRequest, response::JoinGroupResponse},
    list_offsets::{request::OffsetRequest, request::OffsetTime, response::OffsetResponse},
    messages::{Compression, Message, MessageSet},
    metadata::{request::MetadataRequest, response::MetadataResponse},
    offset_fetch::{request::OffsetFetchRequest, response::OffsetFetchResponse},
    produce::{request::ProduceRequest, response::ProduceResponse},
};
use crate::{encode::ToByte, error::Result};

pub mod api_keys {
    pub const PRODUCE: i16 = 0;
    pub const FETCH: i16 = 1;
    pub const OFFSET: i16 = 2;
    pub const METADATA: i16 = 3;
    pub const OFFSET_COMMIT: i16 = 8;
    pub const OFFSET_FETCH: i16 = 9;
    pub const CONSUMER_METADATA: i16 = 10;
    pub const JOIN_GROUP: i16 = 11;
    pub const HEARTBEAT: i16 = 12;
}

/// Behavior every request type shares, used by the connection layer to
/// drive the correlated request pipeline without knowing the concrete
/// message shape.
pub trait KafkaRequest: ToByte + Send + std::fmt::Debug {
    /// The numeric API key of this request.
    fn api_key(&self) -> i16;

    /// Whether the broker will emit a response frame for this request.
    /// Only a produce with `required_acks == 0` answers `false`.
    fn has_response(&self) -> bool {
        true
    }

    /// Rebind the correlation id; the connection assigns ids, callers
    /// never pick their own.
    fn correlate(&mut self, correlation_id: i32);
}

#[derive(Debug, Clone)]
pub struct HeaderRequest<'a> {
    /// The API key of this request.
    pub api_key: i16,
    /// The API version of this request.
    pub api_version: i16,
    /// The correlation ID of this request.
    pub correlation_id: i32,
    /// The client ID string.
    pub client_id: &'a str,
}

impl<'a> HeaderRequest<'a> {
    /// Create a new request header.
    ///
    /// This goes at the beginning of every single request.
    pub fn new(
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
        client_id: &'a str,
    ) -> HeaderRequest {
        HeaderRequest {
            api_key,
            api_version,
            correlation_id,
            client_id,
        }
    }
}

impl<'a> ToByte for HeaderRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.api_key.encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderResponse {
    /// The correlation ID of this response.
    pub correlation_id: i32,
}

pub fn parse_header_response(s: NomBytes) -> IResult<NomBytes, HeaderResponse> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((s, HeaderResponse { correlation_id }))
}

/// Peek the correlation id out of a raw response frame without
/// committing to a response shape.
pub fn response_correlation_id(frame: &bytes::Bytes) -> Result<i32> {
    if frame.len() < 4 {
        return Err(crate::error::Error::ParsingError(frame.clone()));
    }
    let mut id = [0u8; 4];
    id.copy_from_slice(&frame[..4]);
    Ok(i32::from_be_bytes(id))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_request_layout() {
        let header = HeaderRequest::new(3, 0, 1, "foo");
        let mut buffer: Vec<u8> = vec![];
        header.encode(&mut buffer).unwrap();
        assert_eq!(buffer, [0, 3, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o']);
    }

    #[test]
    fn correlation_id_peek() {
        let frame = bytes::Bytes::from_static(&[0, 0, 0, 7, 1, 2, 3]);
        assert_eq!(response_correlation_id(&frame).unwrap(), 7);

        let short = bytes::Bytes::from_static(&[0, 0]);
        assert!(response_correlation_id(&short).is_err());
    }
}
