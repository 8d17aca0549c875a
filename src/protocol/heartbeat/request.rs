//! Encoding and creation for Heartbeat requests.
//!
//! ### Protocol Def
//! ```text
//! Heartbeat Request (Version: 0) => group_id generation_id member_id
//!   group_id => STRING
//!   generation_id => INT32
//!   member_id => STRING
//! ```

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{api_keys, HeaderRequest, KafkaRequest},
};

const API_VERSION: i16 = 0;

/// The base Heartbeat request object.
#[derive(Debug)]
pub struct HeartbeatRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The group identifier.
    pub group_id: &'a str,
    /// The generation this member belongs to.
    pub generation_id: i32,
    /// The member id the coordinator assigned.
    pub member_id: &'a str,
}

impl<'a> HeartbeatRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        group_id: &'a str,
        generation_id: i32,
        member_id: &'a str,
    ) -> Self {
        let header =
            HeaderRequest::new(api_keys::HEARTBEAT, API_VERSION, correlation_id, client_id);
        Self {
            header,
            group_id,
            generation_id,
            member_id,
        }
    }
}

impl<'a> ToByte for HeartbeatRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding HeartbeatRequest {:?}", self);
        self.header.encode(buffer)?;
        self.group_id.encode(buffer)?;
        self.generation_id.encode(buffer)?;
        self.member_id.encode(buffer)?;
        Ok(())
    }
}

impl<'a> KafkaRequest for HeartbeatRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::HEARTBEAT
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
