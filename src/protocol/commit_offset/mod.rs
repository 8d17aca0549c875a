//! Durably record a group's consumed offsets on its coordinator.
//!
//! Commits are addressed to the group's coordinator broker; any other
//! broker answers `NotCoordinatorForConsumer`. The metadata string is
//! an arbitrary client annotation stored alongside the offset.

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
        let mut req = request::OffsetCommitRequest::new(1, "foo", "we");
        req.add("bar", 0, 42, Some("note"));

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [
                0, 8, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', // header
                0, 2, b'w', b'e', // group
                0, 0, 0, 1, // one topic
                0, 3, b'b', b'a', b'r', // name
                0, 0, 0, 1, // one partition
                0, 0, 0, 0, // partition 0
                0, 0, 0, 0, 0, 0, 0, 42, // offset
                0, 4, b'n', b'o', b't', b'e', // metadata
            ]
        );
    }

    #[test]
    fn re_add_overwrites_offset() {
        let mut req = request::OffsetCommitRequest::new(1, "foo", "we");
        req.add("bar", 0, 42, None);
        req.add("bar", 0, 43, None);

        assert_eq!(req.topics.len(), 1);
        assert_eq!(req.topics[0].partitions.len(), 1);
        assert_eq!(req.topics[0].partitions[0].offset, 43);
    }

    #[test]
    fn parse() {
        let buf = [
            0, 0, 0, 1, // correlation id
            0, 0, 0, 1, // one topic
            0, 3, b'b', b'a', b'r', // name
            0, 0, 0, 2, // two partitions
            0, 0, 0, 0, 0, 0, // partition 0 ok
            0, 0, 0, 1, 0, 16, // partition 1 not coordinator
        ];

        let (_, parsed) =
            response::parse_offset_commit_response(NomBytes::from(buf.as_slice())).unwrap();

        assert_eq!(parsed.topics[0].name, Bytes::from("bar"));
        assert_eq!(parsed.topics[0].partitions[0].error_code, KafkaCode::None);
        assert_eq!(
            parsed.topics[0].partitions[1].error_code,
            KafkaCode::NotCoordinatorForConsumer
        );
        assert!(parsed.is_error().is_err());
    }
}
