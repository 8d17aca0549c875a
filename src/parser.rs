//! Deserialize data from the bytecode protocol.
use bytes::Bytes;
use nom::{
    bytes::complete::take,
    combinator::map,
    multi::many_m_n,
    number::complete::{be_i16, be_i32, be_u16, be_u32},
    IResult,
};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::error::KafkaCode;

/// Parse an `i16` error code into a [`KafkaCode`]; values we do not
/// recognize become [`KafkaCode::Unknown`].
pub fn parse_kafka_code(s: NomBytes) -> IResult<NomBytes, KafkaCode> {
    map(be_i16, |n| {
        FromPrimitive::from_i16(n).unwrap_or(KafkaCode::Unknown)
    })(s)
}

pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_u16(s)?;
    let (s, string) = take(length)(s)?;
    Ok((s, string.into_bytes()))
}

pub fn parse_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_u32(s)?;
    let (s, bytes) = take(length)(s)?;
    Ok((s, bytes.into_bytes()))
}

pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i16(s)?;
    if length == -1 {
        return Ok((s, None));
    }

    let (s, string) = take(length as u16)(s)?;
    Ok((s, Some(string.into_bytes())))
}

pub fn parse_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i32(s)?;
    if length == -1 {
        return Ok((s, None));
    }

    let (s, bytes) = take(length as u32)(s)?;
    Ok((s, Some(bytes.into_bytes())))
}

/// Parse a count-prefixed protocol array with `f` for each element.
///
/// A count of `-1` is treated as an empty array, matching broker
/// behavior for nil arrays.
pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: nom::error::ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let (i, length) = be_i32(input)?;
        if length <= 0 {
            return Ok((i, vec![]));
        }
        many_m_n(length as usize, length as usize, f)(i)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strings() {
        let buf = NomBytes::from(b"\x00\x02we\xab" as &[u8]);
        let (rest, s) = parse_string(buf).unwrap();
        assert_eq!(s, Bytes::from("we"));
        assert_eq!(rest.to_bytes(), Bytes::from_static(b"\xab"));
    }

    #[test]
    fn nullable_strings() {
        let nil = NomBytes::from(b"\xff\xff" as &[u8]);
        assert_eq!(parse_nullable_string(nil).unwrap().1, None);

        let present = NomBytes::from(b"\x00\x03foo" as &[u8]);
        assert_eq!(
            parse_nullable_string(present).unwrap().1,
            Some(Bytes::from("foo"))
        );
    }

    #[test]
    fn nullable_bytes() {
        let nil = NomBytes::from(b"\xff\xff\xff\xff" as &[u8]);
        assert_eq!(parse_nullable_bytes(nil).unwrap().1, None);

        let present = NomBytes::from(b"\x00\x00\x00\x01\x2a" as &[u8]);
        assert_eq!(
            parse_nullable_bytes(present).unwrap().1,
            Some(Bytes::from_static(b"\x2a"))
        );
    }

    #[test]
    fn arrays() {
        let buf = NomBytes::from(
            [
                0, 0, 0, 2, // count
                0, 4, 114, 117, 115, 116, // "rust"
                0, 4, 114, 117, 115, 116, // "rust"
                0, 0, 0, // leftover input
            ]
            .as_slice(),
        );

        let (rest, items) = parse_array(parse_string)(buf).unwrap();
        assert_eq!(items, vec![Bytes::from("rust"), Bytes::from("rust")]);
        assert_eq!(rest.to_bytes().len(), 3);
    }

    #[test]
    fn nil_array_is_empty() {
        let buf = NomBytes::from(b"\xff\xff\xff\xff" as &[u8]);
        let (_, items) = parse_array(parse_string)(buf).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn kafka_codes() {
        let buf = NomBytes::from(b"\x00\x06" as &[u8]);
        assert_eq!(
            parse_kafka_code(buf).unwrap().1,
            KafkaCode::NotLeaderForPartition
        );

        // an unmapped code degrades to Unknown rather than failing the parse
        let buf = NomBytes::from(b"\x27\x0f" as &[u8]);
        assert_eq!(parse_kafka_code(buf).unwrap().1, KafkaCode::Unknown);
    }
}
