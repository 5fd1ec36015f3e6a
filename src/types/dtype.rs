//! The canonical, internal representation of a dtype tag in the zarrstream
//! pipeline.
//!
//! This enum replaces fragile string matching at every call site, enabling
//! compile-time checks and eliminating an entire class of runtime errors.
//! Parsing happens exactly once, at the edge where dataset metadata enters
//! the pipeline.

use crate::error::ZarrstreamError;
use crate::types::DecodedChunk;
use std::fmt;

/// One recognized dtype tag. Fixed-width types are little-endian on the wire.
///
/// 64-bit integers are narrowed to 32 bits on materialization for
/// host-language interoperability; values outside the 32-bit range truncate.
/// This is a documented limitation, not silently "fixed".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DtypeTag {
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
    /// Fixed-length unicode records, 4 bytes per code point (`<U<n>`).
    FixedUnicode(usize),
    /// Fixed-length byte-string records, 1 byte per code (`|S<n>`).
    FixedBytes(usize),
    /// Variable-length object marker (`|O`). Elements have no fixed width and
    /// must travel through the self-describing object envelope.
    Object,
}

impl DtypeTag {
    /// Parses a dtype tag string such as `<f4`, `|i1`, `<U8`, or `|O`.
    pub fn parse(tag: &str) -> Result<Self, ZarrstreamError> {
        let parsed = match tag {
            "<f4" => Self::Float32,
            "<f8" => Self::Float64,
            "<i1" | "|i1" => Self::Int8,
            "<i2" => Self::Int16,
            "<i4" => Self::Int32,
            "<i8" => Self::Int64,
            "<u1" | "|u1" => Self::UInt8,
            "<u2" => Self::UInt16,
            "<u4" => Self::UInt32,
            "<u8" => Self::UInt64,
            "|b1" => Self::Bool,
            "|O" => Self::Object,
            _ => {
                if let Some(n) = tag.strip_prefix("<U") {
                    let n: usize = n
                        .parse()
                        .map_err(|_| ZarrstreamError::UnsupportedDtype(tag.to_string()))?;
                    Self::FixedUnicode(n)
                } else if let Some(n) = tag.strip_prefix("|S") {
                    let n: usize = n
                        .parse()
                        .map_err(|_| ZarrstreamError::UnsupportedDtype(tag.to_string()))?;
                    Self::FixedBytes(n)
                } else {
                    return Err(ZarrstreamError::UnsupportedDtype(tag.to_string()));
                }
            }
        };
        Ok(parsed)
    }

    /// The on-wire width of one record in bytes, or `None` for the
    /// variable-length object marker.
    pub fn record_width(&self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 | Self::Bool => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Float32 | Self::Int32 | Self::UInt32 => Some(4),
            Self::Float64 | Self::Int64 | Self::UInt64 => Some(8),
            Self::FixedUnicode(n) => Some(n * 4),
            Self::FixedBytes(n) => Some(*n),
            Self::Object => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object)
    }

    /// Materializes a raw little-endian byte buffer into the concrete value
    /// representation named by this tag.
    ///
    /// The buffer length must be an exact multiple of the record width;
    /// a remainder is a hard error, never silently truncated.
    pub fn materialize(&self, bytes: &[u8]) -> Result<DecodedChunk, ZarrstreamError> {
        let width = self
            .record_width()
            .ok_or(ZarrstreamError::MissingShape("|O"))?;
        if bytes.len() % width != 0 {
            return Err(ZarrstreamError::BufferMismatch(width, bytes.len()));
        }
        let out = match self {
            Self::Float32 => DecodedChunk::Float32(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            Self::Float64 => DecodedChunk::Float64(
                bytes
                    .chunks_exact(8)
                    .map(|b| {
                        f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
                    })
                    .collect(),
            ),
            Self::Int8 => DecodedChunk::Int8(bytes.iter().map(|&b| b as i8).collect()),
            Self::Int16 => DecodedChunk::Int16(
                bytes
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            ),
            Self::Int32 => DecodedChunk::Int32(
                bytes
                    .chunks_exact(4)
                    .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            // Narrowed to i32 (documented limitation).
            Self::Int64 => DecodedChunk::Int32(
                bytes
                    .chunks_exact(8)
                    .map(|b| {
                        i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
                            as i32
                    })
                    .collect(),
            ),
            Self::UInt8 => DecodedChunk::UInt8(bytes.to_vec()),
            Self::UInt16 => DecodedChunk::UInt16(
                bytes
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            ),
            Self::UInt32 => DecodedChunk::UInt32(
                bytes
                    .chunks_exact(4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            // Narrowed to u32 (documented limitation).
            Self::UInt64 => DecodedChunk::UInt32(
                bytes
                    .chunks_exact(8)
                    .map(|b| {
                        u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
                            as u32
                    })
                    .collect(),
            ),
            Self::Bool => DecodedChunk::Bool(bytes.to_vec()),
            Self::FixedUnicode(n) => {
                DecodedChunk::Strings(decode_fixed_unicode(bytes, *n)?)
            }
            Self::FixedBytes(n) => DecodedChunk::Strings(decode_fixed_bytes(bytes, *n)),
            Self::Object => unreachable!("object dtype handled above"),
        };
        Ok(out)
    }
}

/// Decodes `nn = byte_len / (fixed_length * 4)` records of `fixed_length`
/// 4-byte little-endian code points each, trimming trailing NULs.
fn decode_fixed_unicode(
    bytes: &[u8],
    fixed_length: usize,
) -> Result<Vec<String>, ZarrstreamError> {
    let mut out = Vec::with_capacity(bytes.len() / (fixed_length * 4).max(1));
    for record in bytes.chunks_exact(fixed_length * 4) {
        let mut s = String::with_capacity(fixed_length);
        for cp in record.chunks_exact(4) {
            let code = u32::from_le_bytes([cp[0], cp[1], cp[2], cp[3]]);
            let ch =
                char::from_u32(code).ok_or(ZarrstreamError::InvalidCodePoint(code))?;
            s.push(ch);
        }
        while s.ends_with('\0') {
            s.pop();
        }
        out.push(s);
    }
    Ok(out)
}

/// Decodes `nn = byte_len / fixed_length` single-byte-code records, trimming
/// trailing NULs. Invalid UTF-8 is replaced, matching lossy text decoding.
fn decode_fixed_bytes(bytes: &[u8], fixed_length: usize) -> Vec<String> {
    bytes
        .chunks_exact(fixed_length)
        .map(|record| {
            let mut s = String::from_utf8_lossy(record).into_owned();
            while s.ends_with('\0') {
                s.pop();
            }
            s
        })
        .collect()
}

impl fmt::Display for DtypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => write!(f, "<f4"),
            Self::Float64 => write!(f, "<f8"),
            Self::Int8 => write!(f, "<i1"),
            Self::Int16 => write!(f, "<i2"),
            Self::Int32 => write!(f, "<i4"),
            Self::Int64 => write!(f, "<i8"),
            Self::UInt8 => write!(f, "<u1"),
            Self::UInt16 => write!(f, "<u2"),
            Self::UInt32 => write!(f, "<u4"),
            Self::UInt64 => write!(f, "<u8"),
            Self::Bool => write!(f, "|b1"),
            Self::FixedUnicode(n) => write!(f, "<U{}", n),
            Self::FixedBytes(n) => write!(f, "|S{}", n),
            Self::Object => write!(f, "|O"),
        }
    }
}
