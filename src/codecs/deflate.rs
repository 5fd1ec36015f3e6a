//! Zlib (deflate) kernel. This is the inverse for both the `gzip` compressor
//! id and the `zlib` filter id, and it unpacks QFC payloads compressed with
//! the zlib method. A safe, panic-free wrapper around the `flate2` crate.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::ZarrstreamError;

/// Compresses a byte slice into a zlib stream.
pub fn encode(input_bytes: &[u8], level: u32) -> Result<Vec<u8>, ZarrstreamError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(input_bytes)
        .map_err(|e| ZarrstreamError::Inflate(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| ZarrstreamError::Inflate(e.to_string()))
}

/// Inflates a zlib stream back into the original bytes.
pub fn decode(input_bytes: &[u8]) -> Result<Vec<u8>, ZarrstreamError> {
    let mut decoder = ZlibDecoder::new(input_bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ZarrstreamError::Inflate(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_roundtrip() {
        let original = b"hello world, this is a test of zlib compression. ".repeat(50);
        let compressed = encode(&original, 6).unwrap();
        assert!(compressed.len() < original.len());
        let decompressed = decode(&compressed).unwrap();
        assert_eq!(original, decompressed);
    }

    #[test]
    fn test_zlib_decode_invalid_data() {
        let result = decode(&[1, 2, 3, 4, 5]);
        assert!(result.is_err());
    }
}
