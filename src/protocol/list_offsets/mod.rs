//! Find the log offsets surrounding a point in time.
//!
//! Used to ask for all messages before a certain time (ms). There are
//! two special values: -1 asks for the latest offset (the offset of the
//! next message to be written) and -2 for the earliest available
//! offset. Because offsets come back in descending order, asking for
//! the earliest offset always returns a single element.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use std::time::{Duration, UNIX_EPOCH};

    use bytes::Bytes;
    use nombytes::NomBytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode};
    use request::OffsetTime;

    #[test]
    fn time_encoding() {
        assert_eq!(OffsetTime::Latest.as_millis(), -1);
        assert_eq!(OffsetTime::Earliest.as_millis(), -2);
        assert_eq!(OffsetTime::At(1577836800000).as_millis(), 1577836800000);

        // 2020-01-01T00:00:00Z
        let at = UNIX_EPOCH + Duration::from_millis(1577836800000);
        assert_eq!(OffsetTime::from(at), OffsetTime::At(1577836800000));
    }

    #[test]
    fn encode() {
        let mut req = request::OffsetRequest::new(1, "foo");
        req.add("bar", 0, OffsetTime::Latest, 1);

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [
                0, 2, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', // header
                0xff, 0xff, 0xff, 0xff, // replica -1
                0, 0, 0, 1, // one topic
                0, 3, b'b', b'a', b'r', // name
                0, 0, 0, 1, // one partition
                0, 0, 0, 0, // partition 0
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // latest
                0, 0, 0, 1, // max offsets
            ]
        );
    }

    #[test]
    fn parse() {
        let buf = [
            0, 0, 0, 1, // correlation id
            0, 0, 0, 1, // one topic
            0, 3, b'b', b'a', b'r', // name
            0, 0, 0, 1, // one partition
            0, 0, 0, 0, // partition index
            0, 0, // no error
            0, 0, 0, 2, // two offsets
            0, 0, 0, 0, 0, 0, 0, 54, 0, 0, 0, 0, 0, 0, 0, 0,
        ];

        let (_, parsed) = response::parse_offset_response(NomBytes::from(buf.as_slice())).unwrap();

        let partition = &parsed.topics[0].partitions[0];
        assert_eq!(parsed.topics[0].name, Bytes::from("bar"));
        assert_eq!(partition.error_code, KafkaCode::None);
        assert_eq!(partition.offsets, vec![54, 0]);
        assert_eq!(partition.newest(), Some(54));
    }
}
