//! Zstandard kernel: the general-purpose block compressor stage. A safe,
//! panic-free wrapper around the `zstd` crate operating on self-describing
//! zstd frames.

use crate::error::ZarrstreamError;

/// Compresses a byte slice into a single zstd frame.
pub fn encode(input_bytes: &[u8], level: i32) -> Result<Vec<u8>, ZarrstreamError> {
    zstd::stream::encode_all(input_bytes, level)
        .map_err(|e| ZarrstreamError::Zstd(e.to_string()))
}

/// Decompresses a zstd frame back into the original bytes.
pub fn decode(input_bytes: &[u8]) -> Result<Vec<u8>, ZarrstreamError> {
    zstd::stream::decode_all(input_bytes).map_err(|e| ZarrstreamError::Zstd(e.to_string()))
}
