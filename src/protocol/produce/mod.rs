//! Write message sets to the partition leaders.
//!
//! The produce API is addressed to the broker that currently leads each
//! partition in the request; sending to a non-leader earns a
//! `NotLeaderForPartition` in the response. With `required_acks = 0`
//! the broker sends no response at all, trading the offset (and the
//! error report) for latency.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{
        encode::ToByte,
        error::KafkaCode,
        protocol::{messages::Message, KafkaRequest},
    };

    #[test]
    fn encode_header_and_body_layout() {
        let mut req = request::ProduceRequest::new(1, 1000, 1, "foo", Default::default());
        req.add("bar", 0, Message::new(None, Some(Bytes::from("v"))));

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        // header: api key 0, version 0, correlation 1, client "foo"
        assert_eq!(&buffer[..13], [0, 0, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o']);
        // acks 1, timeout 1000
        assert_eq!(&buffer[13..19], [0, 1, 0, 0, 3, 232]);
        // one topic, name "bar", one partition entry for partition 0
        assert_eq!(&buffer[19..23], [0, 0, 0, 1]);
        assert_eq!(&buffer[23..28], [0, 3, b'b', b'a', b'r']);
        assert_eq!(&buffer[28..32], [0, 0, 0, 1]);
        assert_eq!(&buffer[32..36], [0, 0, 0, 0]);
        // message_set_size = 8 offset + 4 size + 15 body
        assert_eq!(&buffer[36..40], [0, 0, 0, 27]);
        assert_eq!(buffer.len(), 40 + 27);
    }

    #[test]
    fn acks_zero_has_no_response() {
        let req = request::ProduceRequest::new(0, 1000, 1, "foo", Default::default());
        assert!(!req.has_response());

        let req = request::ProduceRequest::new(1, 1000, 1, "foo", Default::default());
        assert!(req.has_response());

        let req = request::ProduceRequest::new(-1, 1000, 1, "foo", Default::default());
        assert!(req.has_response());
    }

    #[test]
    fn parse() {
        let buf = [
            0, 0, 0, 9, // correlation id
            0, 0, 0, 1, // one topic
            0, 3, b'b', b'a', b'r', // name
            0, 0, 0, 1, // one partition
            0, 0, 0, 2, // partition index
            0, 0, // no error
            0, 0, 0, 0, 0, 0, 0, 42, // base offset
        ];

        let (_, parsed) = response::parse_produce_response(NomBytes::from(buf.as_slice())).unwrap();

        assert_eq!(parsed.header_response.correlation_id, 9);
        assert_eq!(parsed.topics.len(), 1);
        assert_eq!(parsed.topics[0].name, Bytes::from("bar"));
        let partition = &parsed.topics[0].partitions[0];
        assert_eq!(partition.partition_index, 2);
        assert_eq!(partition.error_code, KafkaCode::None);
        assert_eq!(partition.base_offset, 42);
    }
}
