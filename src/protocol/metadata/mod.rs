//! Describes the currently available brokers, their host and port
//! information, and gives information about which broker hosts
//! which partitions.
//!
//! This API answers the following questions:
//! - What topics exist?
//! - How many partitions does each topic have?
//! - Which broker is currently the leader for each partition?
//! - What is the host and port for each of these brokers?
//!
//! This is the only request that can be addressed to any broker in the
//! cluster. Since there may be many topics the client can give an
//! optional list of topic names in order to only return metadata for a
//! subset of topics; an empty list asks for everything.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode, protocol};

    #[test]
    fn encode_with_no_topics() {
        let req = request::MetadataRequest::new(1, "foo", &[] as &[&str]);

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [0, 3, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', 0, 0, 0, 0]
        );
    }

    #[test]
    fn encode_with_topics() {
        let topics = vec!["bar", "baz", "food"];
        let req = request::MetadataRequest::new(1, "foo", &topics);

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [
                0, 3, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', 0, 0, 0, 3, 0, 3, b'b', b'a',
                b'r', 0, 3, b'b', b'a', b'z', 0, 4, b'f', b'o', b'o', b'd'
            ]
        );
    }

    #[test]
    fn parse() {
        let buf = [
            0, 0, 0, 1, // correlation id
            0, 0, 0, 2, // two brokers
            0, 0, 0, 1, 0, 9, 108, 111, 99, 97, 108, 104, 111, 115, 116, 0, 0, 35, 132,
            0, 0, 0, 2, 0, 9, 108, 111, 99, 97, 108, 104, 111, 115, 116, 0, 0, 35, 133,
            0, 0, 0, 1, // one topic
            0, 0, // topic error
            0, 3, b'b', b'a', b'r', // name
            0, 0, 0, 2, // two partitions
            0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2,
            0, 0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1,
        ];

        let (_, parsed) =
            response::parse_metadata_response(NomBytes::from(buf.as_slice())).unwrap();

        assert_eq!(parsed.header_response.correlation_id, 1);
        assert_eq!(parsed.brokers.len(), 2);
        assert_eq!(parsed.brokers[0].node_id, 1);
        assert_eq!(parsed.brokers[0].host, Bytes::from("localhost"));
        assert_eq!(parsed.brokers[0].port, 9092);
        assert_eq!(parsed.brokers[1].port, 9093);

        assert_eq!(parsed.topics.len(), 1);
        let topic = &parsed.topics[0];
        assert_eq!(topic.error_code, KafkaCode::None);
        assert_eq!(topic.name, Bytes::from("bar"));
        assert_eq!(topic.partitions.len(), 2);
        assert_eq!(topic.partitions[0].partition_index, 0);
        assert_eq!(topic.partitions[0].leader_id, 2);
        assert_eq!(topic.partitions[1].partition_index, 1);
        assert_eq!(topic.partitions[1].leader_id, 1);
        assert_eq!(topic.partitions[1].replica_nodes, vec![1]);
        assert_eq!(topic.partitions[1].isr_nodes, vec![1]);
    }

    #[test]
    fn correlation_is_rebindable() {
        use crate::protocol::KafkaRequest;

        let topics: Vec<&str> = vec![];
        let mut req = request::MetadataRequest::new(0, "foo", &topics);
        req.correlate(41);
        assert_eq!(req.header.correlation_id, 41);
        assert_eq!(req.api_key(), protocol::api_keys::METADATA);
        assert!(req.has_response());
    }
}
