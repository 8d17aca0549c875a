//! Encoding and creation for Produce requests.
//!
//! ### Protocol Def
//! ```text
//! Produce Request (Version: 0) => required_acks timeout [topic_data]
//!   required_acks => INT16
//!   timeout => INT32
//!   topic_data => topic [data]
//!     topic => STRING
//!     data => partition message_set_size message_set
//!       partition => INT32
//!       message_set_size => INT32
//!       message_set => MESSAGE SET
//! ```
//!
//! `required_acks` is 0 for fire-and-forget (the broker stays silent),
//! 1 to wait for the leader, -1 to wait for the full ISR.

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{
        api_keys,
        messages::{Compression, Message, MessageSet},
        HeaderRequest, KafkaRequest,
    },
};

const API_VERSION: i16 = 0;

/// The base Produce request object.
///
/// Build one with [`new`](Self::new) and stage messages per topic
/// partition with [`add`](Self::add).
#[derive(Debug)]
pub struct ProduceRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// How many acknowledgements the leader must collect before
    /// answering: 0, 1 or -1.
    pub required_acks: i16,
    /// How long the broker may wait for those acknowledgements, in ms.
    pub timeout_ms: i32,
    /// The codec applied to each staged message set.
    pub compression: Compression,
    /// Each topic to produce to.
    pub topics: Vec<Topic<'a>>,
}

/// Each topic to produce to.
#[derive(Debug)]
pub struct Topic<'a> {
    /// The topic name.
    pub name: &'a str,
    /// Each partition to produce to.
    pub partitions: Vec<Partition>,
}

/// Each partition to produce to.
#[derive(Debug)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The messages staged for this partition.
    pub message_set: MessageSet,
}

impl<'a> ProduceRequest<'a> {
    pub fn new(
        required_acks: i16,
        timeout_ms: i32,
        correlation_id: i32,
        client_id: &'a str,
        compression: Compression,
    ) -> ProduceRequest<'a> {
        ProduceRequest {
            header: HeaderRequest::new(api_keys::PRODUCE, API_VERSION, correlation_id, client_id),
            required_acks,
            timeout_ms,
            compression,
            topics: vec![],
        }
    }

    /// Stage a message for a topic partition, preserving insertion order
    /// within the partition's message set.
    pub fn add(&mut self, topic_name: &'a str, partition_index: i32, message: Message) {
        let at = match self
            .topics
            .iter()
            .position(|topic| topic.name == topic_name)
        {
            Some(at) => at,
            None => {
                self.topics.push(Topic {
                    name: topic_name,
                    partitions: vec![],
                });
                self.topics.len() - 1
            }
        };
        let topic = &mut self.topics[at];

        match topic
            .partitions
            .iter_mut()
            .find(|partition| partition.partition_index == partition_index)
        {
            Some(partition) => partition.message_set.push(message),
            None => {
                let mut message_set = MessageSet::new();
                message_set.push(message);
                topic.partitions.push(Partition {
                    partition_index,
                    message_set,
                });
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    fn encode_partition<W: BufMut>(&self, partition: &Partition, buffer: &mut W) -> Result<()> {
        partition.partition_index.encode(buffer)?;

        let mut set = Vec::with_capacity(256);
        partition.message_set.encode_with(self.compression, &mut set)?;
        // message_set_size then the raw entries, not a counted array
        set.as_slice().encode(buffer)
    }
}

impl<'a> ToByte for ProduceRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding ProduceRequest {:?}", self);
        self.header.encode(buffer)?;
        self.required_acks.encode(buffer)?;
        self.timeout_ms.encode(buffer)?;

        crate::encode::encode_as_array(buffer, &self.topics, |buffer, topic| {
            topic.name.encode(buffer)?;
            crate::encode::encode_as_array(buffer, &topic.partitions, |buffer, partition| {
                self.encode_partition(partition, buffer)
            })
        })
    }
}

impl<'a> KafkaRequest for ProduceRequest<'a> {
    fn api_key(&self) -> i16 {
        api_keys::PRODUCE
    }

    fn has_response(&self) -> bool {
        self.required_acks != 0
    }

    fn correlate(&mut self, correlation_id: i32) {
        self.header.correlation_id = correlation_id;
    }
}
