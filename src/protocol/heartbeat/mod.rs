//! Keep a member alive in a broker-coordinated group.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use nombytes::NomBytes;

    use super::*;
    use crate::{encode::ToByte, error::KafkaCode};

    #[test]
    fn encode() {
        let req = request::HeartbeatRequest::new(1, "foo", "we", 3, "m2");

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(
            buffer,
            [
                0, 12, 0, 0, 0, 0, 0, 1, 0, 3, b'f', b'o', b'o', // header
                0, 2, b'w', b'e', // group
                0, 0, 0, 3, // generation
                0, 2, b'm', b'2', // member
            ]
        );
    }

    #[test]
    fn parse() {
        let buf = [0, 0, 0, 1, 0, 27];
        let (_, parsed) =
            response::parse_heartbeat_response(NomBytes::from(buf.as_slice())).unwrap();
        assert_eq!(parsed.error_code, KafkaCode::RebalanceInProgress);
    }
}
