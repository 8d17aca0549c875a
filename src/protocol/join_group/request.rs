//! Encoding and creation for Join Group requests.
//!
//! ### Protocol Def
//! ```text
//! JoinGroup Request (Version: 0) => group_id session_timeout member_id protocol_type [group_protocols]
//!   group_id => STRING
//!   session_timeout => INT32
//!   member_id => STRING
//!   protocol_type => STRING
//!   group_protocols => protocol_name protocol_metadata
//!     protocol_name => STRING
//!     protocol_metadata => BYTES
//! ```
//!
//! The session timeout indicates client liveness: miss every heartbeat
//! within it and the coordinator evicts the member.

use bytes::{BufMut, Bytes};

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{api_keys, HeaderRequest, KafkaRequest},
};

const API_VERSION: i16 = 0;
const PROTOCOL_TYPE_CONSUMER: &str = "consumer";

/// The base Join Group request object.
#[derive(Debug)]
pub struct JoinGroupRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The group identifier.
    pub group_id: &'a str,
    /// Member eviction timeout in milliseconds.
    pub session_timeout_ms: i32,
    /// The member id from the previous generation, or "" on first join.
    pub member_id: &'a str,
    /// The class of protocols the group speaks.
    pub protocol_type: &'a str,
    /// The assignment protocols this member supports, in preference order.
    pub protocols: Vec<Protocol<'a>>,
}

/// One supported assignment protocol.
#[derive(Debug)]
pub struct Protocol<'a> {
    /// The protocol name.
    pub name: &'a str,
    /// Opaque metadata the assignment protocol interprets.
    pub metadata: Bytes,
}

impl<'a> JoinGroupRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        group_id: &'a str,
        session_timeout_ms: i32,
        member_id: &'a str,
    ) -> Self {
        let header =
            HeaderRequest::new(api_keys::JOIN_GROUP, API_VERSION, correlation_id, client_id);
        Self {
            header,
            group_id,
            session_timeout_ms,
            member_id,
            protocol_type: PROTOCOL_TYPE_CONSUMER,
            protocols: vec![],
        }
    }

    pub fn add_protocol(&mut self, name: &'a str, metadata: Bytes) {
        self.protocols.push(Protocol { name, metadata });
    }
}

impl<'a> ToByte for JoinGroupRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding JoinGroupRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.session_timeout_ms.encode(buffer)?;
        self.member_id.encode(buffer)?;
        self.protocol_type.encode(buffer)?;
        self.protocols.encode(buffer)?;
        Ok(())
    }
}

impl<'a> ToByte for Protocol<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.name.encode(buffer)?;
        self.metadata.encode(buffer)?;
        Ok(())
    }
}

impl<'a> KafkaRequest for JoinGroupRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::JOIN_GROUP
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
