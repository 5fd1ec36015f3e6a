//! The result type of a chunk decode: either a homogeneous fixed-width
//! numeric array, a sequence of strings or byte blobs (variable-length
//! object arrays), or a raw byte buffer for the metadata-only path.

use crate::error::ZarrstreamError;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedChunk {
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    /// One byte per element, nonzero meaning true.
    Bool(Vec<u8>),
    Strings(Vec<String>),
    Blobs(Vec<Vec<u8>>),
    /// Undecoded bytes, returned when no dtype was supplied.
    Raw(Vec<u8>),
}

impl DecodedChunk {
    /// Number of logical elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Strings(v) => v.len(),
            Self::Blobs(v) => v.len(),
            Self::Raw(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts a numeric chunk into f64 samples for plotting/assembly.
    /// Booleans map to 0/1. String, blob, and raw chunks are not samples.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>, ZarrstreamError> {
        let out = match self {
            Self::Float32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::Float64(v) => v.clone(),
            Self::Int8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::Int16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::Int32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::UInt8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::UInt16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::UInt32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Self::Bool(v) => v.iter().map(|&x| if x != 0 { 1.0 } else { 0.0 }).collect(),
            Self::Strings(_) | Self::Blobs(_) | Self::Raw(_) => {
                return Err(ZarrstreamError::Internal(
                    "non-numeric chunk cannot be converted to samples".to_string(),
                ))
            }
        };
        Ok(out)
    }
}
