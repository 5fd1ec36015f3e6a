//! Variable-length payload sub-filters for object arrays.
//!
//! Both recognized layouts share one walk: a 4-byte stream preamble, then a
//! sequence of items each introduced by a 4-byte little-endian length prefix,
//! read until the buffer is exhausted. `vlen-utf8` decodes each item as text;
//! `vlen-bytes` keeps the raw blob.

use crate::error::ZarrstreamError;

/// Decodes a `vlen-utf8` payload into strings. Invalid UTF-8 sequences are
/// replaced, matching lossy text decoding.
pub fn decode_vlen_utf8(bytes: &[u8]) -> Result<Vec<String>, ZarrstreamError> {
    let blobs = walk_length_prefixed(bytes)?;
    Ok(blobs
        .into_iter()
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .collect())
}

/// Decodes a `vlen-bytes` payload into raw byte blobs.
pub fn decode_vlen_bytes(bytes: &[u8]) -> Result<Vec<Vec<u8>>, ZarrstreamError> {
    walk_length_prefixed(bytes)
}

fn walk_length_prefixed(bytes: &[u8]) -> Result<Vec<Vec<u8>>, ZarrstreamError> {
    let mut items = Vec::new();
    // First 4 bytes are the stream preamble.
    let mut i = 4usize;
    while i < bytes.len() {
        let prefix = bytes.get(i..i + 4).ok_or_else(|| {
            ZarrstreamError::ObjectDecode(format!(
                "truncated length prefix at offset {}",
                i
            ))
        })?;
        let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        i += 4;
        let item = bytes.get(i..i + len).ok_or_else(|| {
            ZarrstreamError::ObjectDecode(format!(
                "truncated item of length {} at offset {}",
                len, i
            ))
        })?;
        items.push(item.to_vec());
        i += len;
    }
    Ok(items)
}
