//! Read message sets from the partition leaders.
//!
//! A fetch is a long poll: the broker holds the request up to
//! `max_wait_ms` or until `min_bytes` of data are available, whichever
//! comes first. The per-partition `max_bytes` bounds how much of the
//! log comes back, and the broker is free to cut the final message in
//! half at that boundary.

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
        protocol::messages::{Compression, Message, MessageSet},
    };

    #[test]
    fn encode() {
        let mut req = request::FetchRequest::new(1, "foo", 100, 1);
        req.add("bar", 0, 7, 4096);

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [
                0, 1, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', // header
                0xff, 0xff, 0xff, 0xff, // replica -1
                0, 0, 0, 100, // max wait
                0, 0, 0, 1, // min bytes
                0, 0, 0, 1, // one topic
                0, 3, b'b', b'a', b'r', // name
                0, 0, 0, 1, // one partition
                0, 0, 0, 0, // partition 0
                0, 0, 0, 0, 0, 0, 0, 7, // fetch offset
                0, 0, 16, 0, // max bytes
            ]
        );
    }

    #[test]
    fn duplicate_partition_is_ignored() {
        let mut req = request::FetchRequest::new(1, "foo", 100, 1);
        req.add("bar", 0, 7, 4096);
        req.add("bar", 0, 9, 4096);
        assert_eq!(req.topics.len(), 1);
        assert_eq!(req.topics[0].partitions.len(), 1);
        assert_eq!(req.topics[0].partitions[0].fetch_offset, 7);
    }

    #[test]
    fn parse() {
        let mut set = MessageSet::new();
        set.push(Message::new(
            Some(Bytes::from("k")),
            Some(Bytes::from("v")),
        ));
        let mut set_bytes = vec![];
        set.encode_with(Compression::None, &mut set_bytes).unwrap();

        let mut buf: Vec<u8> = vec![
            0, 0, 0, 1, // correlation id
            0, 0, 0, 1, // one topic
            0, 3, b'b', b'a', b'r', // name
            0, 0, 0, 1, // one partition
            0, 0, 0, 0, // partition index
            0, 0, // no error
            0, 0, 0, 0, 0, 0, 0, 99, // high watermark
        ];
        buf.extend_from_slice(&(set_bytes.len() as i32).to_be_bytes());
        buf.extend_from_slice(&set_bytes);

        let (_, parsed) = response::parse_fetch_response(NomBytes::new(Bytes::from(buf))).unwrap();

        assert_eq!(parsed.header_response.correlation_id, 1);
        let partition = &parsed.topics[0].partitions[0];
        assert_eq!(partition.error_code, KafkaCode::None);
        assert_eq!(partition.high_watermark, 99);
        assert_eq!(partition.messages.len(), 1);
        assert_eq!(partition.messages[0].key, Some(Bytes::from("k")));
        assert_eq!(partition.messages[0].value, Some(Bytes::from("v")));
    }

    #[test]
    fn parse_truncated_tail() {
        let mut set = MessageSet::new();
        set.push(Message::new(None, Some(Bytes::from("whole"))));
        set.push(Message::new(None, Some(Bytes::from("partial"))));
        let mut set_bytes = vec![];
        set.encode_with(Compression::None, &mut set_bytes).unwrap();
        // chop into the second entry, as a broker at max_bytes would
        set_bytes.truncate(set_bytes.len() - 4);

        let mut buf: Vec<u8> = vec![
            0, 0, 0, 1, // correlation id
            0, 0, 0, 1, // one topic
            0, 3, b'b', b'a', b'r', // name
            0, 0, 0, 1, // one partition
            0, 0, 0, 0, // partition index
            0, 0, // no error
            0, 0, 0, 0, 0, 0, 0, 12, // high watermark
        ];
        buf.extend_from_slice(&(set_bytes.len() as i32).to_be_bytes());
        buf.extend_from_slice(&set_bytes);

        let (_, parsed) = response::parse_fetch_response(NomBytes::new(Bytes::from(buf))).unwrap();
        let partition = &parsed.topics[0].partitions[0];
        assert_eq!(partition.messages.len(), 1);
        assert_eq!(partition.messages[0].value, Some(Bytes::from("whole")));
    }
}
