//! Locate the broker that coordinates a consumer group.
//!
//! The offsets for a given consumer group are maintained by a specific
//! broker called the group coordinator. A consumer must issue its
//! offset commit and fetch requests to this broker, and can discover it
//! by asking any broker in the cluster.

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
        let req = request::ConsumerMetadataRequest::new(1, "foo", "we");

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [0, 10, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', 0, 2, b'w', b'e']
        );
    }

    #[test]
    fn parse() {
        let buf = [
            0, 0, 0, 1, // correlation id
            0, 0, // no error
            0, 0, 0x9c, 0x41, // coordinator id 40001
            0, 14, b'1', b'9', b'2', b'.', b'1', b'6', b'8', b'.', b'5', b'9', b'.', b'1', b'0',
            b'3', // host
            0, 0, 0xc0, 0x06, // port 49158
        ];

        let (_, parsed) =
            response::parse_consumer_metadata_response(NomBytes::from(buf.as_slice())).unwrap();

        assert_eq!(parsed.header_response.correlation_id, 1);
        assert_eq!(parsed.error_code, KafkaCode::None);
        assert_eq!(parsed.coordinator_id, 40001);
        assert_eq!(parsed.host, Bytes::from("192.168.59.103"));
        assert_eq!(parsed.port, 49158);
    }
}
