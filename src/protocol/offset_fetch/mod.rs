//! Read back a group's committed offsets from its coordinator.
//!
//! A partition with no commit yet comes back with offset `-1` and
//! `UnknownTopicOrPartition`; that is a normal "start from your reset
//! policy" signal, not a failure.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode};

    #[test]
    fn encode() {
        let mut req = request::OffsetFetchRequest::new(1, "foo", "we");
        req.add("bar", 0);
        req.add("bar", 1);

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [
                0, 9, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', // header
                0, 2, b'w', b'e', // group
                0, 0, 0, 1, // one topic
                0, 3, b'b', b'a', b'r', // name
                0, 0, 0, 2, // two partitions
                0, 0, 0, 0, 0, 0, 0, 1,
            ]
        );
    }

    #[test]
    fn parse() {
        let buf = [
            0, 0, 0, 1, // correlation id
            0, 0, 0, 1, // one topic
            0, 3, b'b', b'a', b'r', // name
            0, 0, 0, 2, // two partitions
            0, 0, 0, 0, // partition 0
            0, 0, 0, 0, 0, 0, 0, 42, // offset
            0, 0, // empty metadata
            0, 0, // no error
            0, 0, 0, 1, // partition 1, never committed
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // -1
            0xff, 0xff, // nil metadata
            0, 3, // unknown topic or partition
        ];

        let (_, parsed) =
            response::parse_offset_fetch_response(NomBytes::from(buf.as_slice())).unwrap();

        let partitions = &parsed.topics[0].partitions;
        assert_eq!(parsed.topics[0].name, Bytes::from("bar"));
        assert_eq!(partitions[0].committed_offset, 42);
        assert_eq!(partitions[0].metadata, Some(Bytes::new()));
        assert_eq!(partitions[0].error_code, KafkaCode::None);
        assert!(partitions[0].committed().is_some());

        assert_eq!(partitions[1].committed_offset, -1);
        assert_eq!(partitions[1].metadata, None);
        assert_eq!(
            partitions[1].error_code,
            KafkaCode::UnknownTopicOrPartition
        );
        // no commit yet is not an error, just an absence
        assert!(partitions[1].committed().is_none());
    }
}
