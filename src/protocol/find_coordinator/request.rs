//! Encoding and creation for Consumer Metadata requests.
//!
//! ### Protocol Def
//! ```text
//! ConsumerMetadata Request (Version: 0) => consumer_group
//!   consumer_group => STRING
//! ```

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{api_keys, HeaderRequest, KafkaRequest},
};

const API_VERSION: i16 = 0;

/// The base Consumer Metadata request object.
#[derive(Debug)]
pub struct ConsumerMetadataRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The group whose coordinator we are looking for.
    pub consumer_group: &'a str,
}

impl<'a> ConsumerMetadataRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str, consumer_group: &'a str) -> Self {
        let header = HeaderRequest::new(
            api_keys::CONSUMER_METADATA,
            API_VERSION,
            correlation_id,
            client_id,
        );
        Self {
            header,
            consumer_group,
        }
    }
}

impl<'a> ToByte for ConsumerMetadataRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding ConsumerMetadataRequest {:?}", self);
        self.header.encode(buffer)?;
        self.consumer_group.encode(buffer)?;
        Ok(())
    }
}

impl<'a> KafkaRequest for ConsumerMetadataRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::CONSUMER_METADATA
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
