//! The message set, Kafka 0.8's on-disk and on-wire record format.
//!
//! A message set is a sequence of `offset | size | message` entries with
//! no count prefix. The message body is `crc | magic | attributes | key
//! | value` where the CRC covers everything from the magic byte onward.
//! A broker may cut a fetch response anywhere, so a partial trailing
//! entry is expected and silently dropped.
//!
//! Compressed sets are recursive: a single wrapper message whose
//! attributes carry the codec and whose value holds the inner message
//! set, compressed.
//!
//! ### Protocol Def
//! ```text
//! MessageSet => [offset message_size message]
//!   offset => INT64
//!   message_size => INT32
//! Message => crc magic_byte attributes key value
//!   crc => INT32
//!   magic_byte => INT8
//!   attributes => INT8
//!   key => BYTES (nullable)
//!   value => BYTES (nullable)
//! ```

use bytes::Bytes;
use nom::{
    bytes::complete::take,
    number::complete::{be_i32, be_i64, be_i8, be_u32},
    InputLength,
};
use nombytes::NomBytes;

use crate::{
    encode::ToByte,
    error::{Error, Result},
    utils::{gzip_compress, gzip_uncompress, snappy_uncompress, to_crc},
};

/// The magic byte (a.k.a version) for 0.8 messages.
const MESSAGE_MAGIC_BYTE: i8 = 0;

/// Bits 0-1 of the message attributes select the codec.
const ATTRIBUTES_CODEC_MASK: i8 = 0x03;

/// Message codec recognized in the attributes byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
}

impl Compression {
    pub fn from_attributes(attributes: i8) -> Self {
        match attributes & ATTRIBUTES_CODEC_MASK {
            1 => Compression::Gzip,
            2 => Compression::Snappy,
            _ => Compression::None,
        }
    }

    pub fn to_attributes(self) -> i8 {
        match self {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Snappy => 2,
        }
    }
}

/// One message in a message set.
///
/// On the produce side the offset is ignored by the broker; on the
/// fetch side it is the log offset the broker assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

impl Message {
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Message {
        Message {
            offset: 0,
            key,
            value,
        }
    }

    // crc | magic | attributes | key | value, with the crc patched in
    // after the covered bytes are rendered.
    fn encode_body(&self, attributes: i8, out: &mut Vec<u8>) -> Result<()> {
        let crc_pos = out.len();
        0u32.encode(out)?;

        let covered_from = out.len();
        MESSAGE_MAGIC_BYTE.encode(out)?;
        attributes.encode(out)?;
        self.key.encode(out)?;
        self.value.encode(out)?;

        let crc = to_crc(&out[covered_from..]);
        crc.encode(&mut &mut out[crc_pos..crc_pos + 4])?;
        Ok(())
    }

    fn encode_entry(&self, attributes: i8, out: &mut Vec<u8>) -> Result<()> {
        self.offset.encode(out)?;

        let mut body = Vec::with_capacity(64);
        self.encode_body(attributes, &mut body)?;
        body.as_slice().encode(out)
    }
}

/// An ordered set of messages bound for (or read from) one partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSet {
    pub messages: Vec<Message>,
}

impl MessageSet {
    pub fn new() -> Self {
        Self { messages: vec![] }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render the set, wrapping it in a single compressed envelope
    /// message when a codec is selected.
    pub fn encode_with(&self, compression: Compression, out: &mut Vec<u8>) -> Result<()> {
        match compression {
            Compression::None => {
                for message in &self.messages {
                    message.encode_entry(0, out)?;
                }
                Ok(())
            }
            Compression::Gzip => {
                let mut inner = Vec::with_capacity(256);
                for message in &self.messages {
                    message.encode_entry(0, &mut inner)?;
                }
                let compressed = gzip_compress(&inner)?;
                let envelope = Message::new(None, Some(Bytes::from(compressed)));
                envelope.encode_entry(Compression::Gzip.to_attributes(), out)
            }
            // snappy is recognized on the fetch path only
            Compression::Snappy => Err(Error::EncodingError),
        }
    }
}

impl ToByte for MessageSet {
    fn encode<T: bytes::BufMut>(&self, buffer: &mut T) -> Result<()> {
        // ToByte targets BufMut but the crc patching needs indexed
        // access, so render to a scratch Vec first.
        let mut out = Vec::with_capacity(256);
        self.encode_with(Compression::None, &mut out)?;
        buffer.put(out.as_slice());
        Ok(())
    }
}

/// Decode the message-set region of a fetch response.
///
/// Consumes entries until the input runs out; an incomplete trailing
/// entry is dropped without error. Compressed envelopes are expanded in
/// place, preserving the inner messages' absolute offsets.
pub fn decode_message_set(data: Bytes) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    let mut s = NomBytes::new(data.clone());

    loop {
        if s.input_len() < 12 {
            break;
        }

        let (rest, offset) = be_i64::<NomBytes, nom::error::Error<NomBytes>>(s.clone())
            .map_err(|_| Error::ParsingError(data.clone()))?;
        let (rest, size) = be_i32::<NomBytes, nom::error::Error<NomBytes>>(rest)
            .map_err(|_| Error::ParsingError(data.clone()))?;

        if size < 0 {
            return Err(Error::ParsingError(data));
        }
        if rest.input_len() < size as usize {
            // partial trailing message, cut by the broker's fetch limit
            tracing::trace!("Dropping partial trailing message of size {}", size);
            break;
        }

        let (rest, body) = take::<usize, NomBytes, nom::error::Error<NomBytes>>(size as usize)(
            rest,
        )
        .map_err(|_| Error::ParsingError(data.clone()))?;

        decode_message_body(offset, body.to_bytes(), &mut messages)?;
        s = rest;
    }

    Ok(messages)
}

fn decode_message_body(offset: i64, body: Bytes, messages: &mut Vec<Message>) -> Result<()> {
    let s = NomBytes::new(body.clone());

    let parsed: std::result::Result<_, nom::Err<nom::error::Error<NomBytes>>> = (|| {
        let (s, crc) = be_u32(s)?;
        let (s, magic) = be_i8(s)?;
        let (s, attributes) = be_i8(s)?;
        let (s, key) = crate::parser::parse_nullable_bytes(s)?;
        let (s, value) = crate::parser::parse_nullable_bytes(s)?;
        Ok((s, crc, magic, attributes, key, value))
    })();

    let (_, crc, _magic, attributes, key, value) =
        parsed.map_err(|_| Error::ParsingError(body.clone()))?;

    // the crc covers everything from the magic byte onward
    if to_crc(&body[4..]) != crc {
        tracing::error!("ERROR: CRC mismatch in message at offset {}", offset);
        return Err(Error::KafkaError(crate::error::KafkaCode::CorruptMessage));
    }

    match Compression::from_attributes(attributes) {
        Compression::None => {
            messages.push(Message { offset, key, value });
            Ok(())
        }
        codec => {
            let compressed = value.ok_or_else(|| Error::ParsingError(body.clone()))?;
            let inner = match codec {
                Compression::Gzip => gzip_uncompress(&compressed)?,
                Compression::Snappy => snappy_uncompress(&compressed)?,
                Compression::None => unreachable!(),
            };
            let inner = decode_message_set(Bytes::from(inner))?;
            messages.extend(inner);
            Ok(())
        }
    }
}
