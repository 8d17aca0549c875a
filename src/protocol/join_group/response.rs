//! Parsing and processing for Join Group responses.
//!
//! ### Protocol Def
//! ```text
//! JoinGroup Response (Version: 0) => error_code generation_id group_protocol leader_id member_id [members]
//!   error_code => INT16
//!   generation_id => INT32
//!   group_protocol => STRING
//!   leader_id => STRING
//!   member_id => STRING
//!   members => member_id member_metadata
//!     member_id => STRING
//!     member_metadata => BYTES
//! ```
//!
//! The members array is populated only for the elected leader; other
//! members see an empty array.

use bytes::Bytes;
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{parse_header_response, HeaderResponse},
};

/// The base Join Group response object.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinGroupResponse {
    pub header_response: HeaderResponse,
    /// The error code, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The generation of the group after this join.
    pub generation_id: i32,
    /// The assignment protocol the coordinator selected.
    pub group_protocol: Bytes,
    /// The member elected as assignment leader.
    pub leader_id: Bytes,
    /// The id the coordinator assigned to us.
    pub member_id: Bytes,
    /// All members, visible to the leader only.
    pub members: Vec<Member>,
}

/// One member of the joined group.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// The member id.
    pub member_id: Bytes,
    /// The metadata the member attached to the selected protocol.
    pub metadata: Bytes,
}

impl JoinGroupResponse {
    pub fn is_error(&self) -> Result<()> {
        if self.error_code != KafkaCode::None {
            return Err(Error::KafkaError(self.error_code));
        }
        Ok(())
    }

    /// Whether this member was elected assignment leader.
    pub fn is_leader(&self) -> bool {
        self.leader_id == self.member_id
    }
}

impl TryFrom<Bytes> for JoinGroupResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing JoinGroupResponse {:?}", s);
        let (_, response) = parse_join_group_response(NomBytes::new(s.clone())).map_err(|err| {
            tracing::error!("ERROR: Failed parsing JoinGroupResponse {:?}", err);
            Error::ParsingError(s)
        })?;
        Ok(response)
    }
}

pub fn parse_join_group_response(s: NomBytes) -> IResult<NomBytes, JoinGroupResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, generation_id) = be_i32(s)?;
    let (s, group_protocol) = parser::parse_string(s)?;
    let (s, leader_id) = parser::parse_string(s)?;
    let (s, member_id) = parser::parse_string(s)?;
    let (s, members) = parser::parse_array(parse_member)(s)?;

    Ok((
        s,
        JoinGroupResponse {
            header_response,
            error_code,
            generation_id,
            group_protocol,
            leader_id,
            member_id,
            members,
        },
    ))
}

fn parse_member(s: NomBytes) -> IResult<NomBytes, Member> {
    let (s, member_id) = parser::parse_string(s)?;
    let (s, metadata) = parser::parse_bytes(s)?;

    Ok((s, Member { member_id, metadata }))
}
