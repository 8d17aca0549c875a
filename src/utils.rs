use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use crc::Crc;

use crate::error::{Error, Result};

/// Milliseconds since the Unix epoch.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// IEEE CRC-32, the checksum Kafka uses for message integrity.
pub fn to_crc(data: &[u8]) -> u32 {
    Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(data)
}

pub fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::IoError(e.kind()))
}

pub fn gzip_uncompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::IoError(e.kind()))?;
    Ok(out)
}

pub fn snappy_uncompress(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(data)
        .map_err(|e| {
            tracing::error!("ERROR: Snappy decompression failed {:?}", e);
            Error::ParsingError(bytes::Bytes::copy_from_slice(data))
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc_is_ieee() {
        // well-known CRC-32 check value
        assert_eq!(to_crc(b"123456789"), 0xcbf43926);
    }

    #[test]
    fn gzip_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let compressed = gzip_compress(data).unwrap();
        assert_eq!(gzip_uncompress(&compressed).unwrap(), data);
    }
}
