//! Serialize data into the bytecode protocol.
//!
//! Every integer on the wire is big-endian two's-complement. Strings are
//! an `i16` length followed by the bytes, byte blobs an `i32` length
//! followed by the bytes; `-1` length means nil. Arrays are an `i32`
//! element count followed by the elements.
use bytes::{BufMut, Bytes};

use crate::error::{Error, Result};

// Checked narrowing from usize into a signed wire length. Anything that
// does not fit is an encoding error, not a truncation.
macro_rules! wire_len {
    ($value:expr, $ttype:ident) => {{
        let x: usize = $value;
        if (x as u64) <= ($ttype::MAX as u64) {
            x as $ttype
        } else {
            return Err(Error::EncodingError);
        }
    }};
}

/// Types that can render themselves into the wire format.
pub trait ToByte {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()>;
}

impl<'a, T: ToByte + 'a + ?Sized> ToByte for &'a T {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl ToByte for i8 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self);
        Ok(())
    }
}

impl ToByte for i16 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i16(*self);
        Ok(())
    }
}

impl ToByte for i32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl ToByte for u32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u32(*self);
        Ok(())
    }
}

impl ToByte for i64 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i64(*self);
        Ok(())
    }
}

impl ToByte for str {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i16(wire_len!(self.len(), i16));
        buffer.put(self.as_bytes());
        Ok(())
    }
}

impl ToByte for String {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_str().encode(buffer)
    }
}

impl<'a> ToByte for Option<&'a str> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Some(s) => s.encode(buffer),
            None => (-1i16).encode(buffer),
        }
    }
}

impl ToByte for [u8] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(wire_len!(self.len(), i32));
        buffer.put(self);
        Ok(())
    }
}

impl ToByte for Bytes {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_ref().encode(buffer)
    }
}

impl ToByte for Option<Bytes> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match self {
            Some(b) => b.encode(buffer),
            None => (-1i32).encode(buffer),
        }
    }
}

impl<'a> ToByte for Option<&'a [u8]> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Some(b) => b.encode(buffer),
            None => (-1i32).encode(buffer),
        }
    }
}

impl<V: ToByte> ToByte for [V] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        encode_as_array(buffer, self, |buffer, x| x.encode(buffer))
    }
}

impl<V: ToByte> ToByte for Vec<V> {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_slice().encode(buffer)
    }
}

// Renders a slice of anything string-like as a protocol string array.
pub struct AsStrings<'a, T>(pub &'a [T]);

impl<'a, T: AsRef<str> + 'a> ToByte for AsStrings<'a, T> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_as_array(buffer, self.0, |buffer, x| x.as_ref().encode(buffer))
    }
}

/// Renders the length of `xs` as the start of a protocol array and then
/// invokes `f` on each element to render it.
pub fn encode_as_array<T, F, W>(buffer: &mut W, xs: &[T], mut f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    buffer.put_i32(wire_len!(xs.len(), i32));
    for x in xs {
        f(buffer, x)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn encoded<T: ToByte>(v: T) -> Vec<u8> {
        let mut buf = vec![];
        v.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(encoded(5i8), [5]);
        assert_eq!(encoded(5i16), [0, 5]);
        assert_eq!(encoded(-1i16), [0xff, 0xff]);
        assert_eq!(encoded(5i32), [0, 0, 0, 5]);
        assert_eq!(encoded(5i64), [0, 0, 0, 0, 0, 0, 0, 5]);
        assert_eq!(
            encoded(-2i64),
            [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]
        );
    }

    #[test]
    fn strings_are_length_prefixed() {
        assert_eq!(encoded("we"), [0, 2, b'w', b'e']);
        assert_eq!(encoded(String::from("foo")), [0, 3, b'f', b'o', b'o']);
        assert_eq!(encoded(""), [0, 0]);
    }

    #[test]
    fn nil_string_is_minus_one() {
        let none: Option<&str> = None;
        assert_eq!(encoded(none), [0xff, 0xff]);
        assert_eq!(encoded(Some("ok")), [0, 2, b'o', b'k']);
    }

    #[test]
    fn bytes_are_length_prefixed() {
        assert_eq!(encoded(&[1u8, 2, 3][..]), [0, 0, 0, 3, 1, 2, 3]);
        let none: Option<Bytes> = None;
        assert_eq!(encoded(none), [0xff, 0xff, 0xff, 0xff]);
        assert_eq!(
            encoded(Some(Bytes::from_static(b"hi"))),
            [0, 0, 0, 2, b'h', b'i']
        );
    }

    #[test]
    fn arrays_carry_a_count() {
        assert_eq!(encoded(vec![1i32, 2]), [0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(
            encoded(AsStrings(&["bar", "baz"])),
            [0, 0, 0, 2, 0, 3, b'b', b'a', b'r', 0, 3, b'b', b'a', b'z']
        );
    }

    #[test]
    fn oversized_string_is_an_encoding_error() {
        let s = "a".repeat(i16::MAX as usize + 1);
        let mut buf = Vec::new();
        match s.as_str().encode(&mut buf) {
            Err(Error::EncodingError) => {}
            other => panic!("expected EncodingError, got {:?}", other),
        }
        assert!(buf.is_empty());
    }
}
