//! Byte-shuffle kernel.
//!
//! The forward shuffle groups together byte-position `b` of every element:
//! with `a` total elements of `elementsize` bytes each, original byte
//! `i = k*elementsize + b` lands at shuffled position `b*a + k`. The inverse
//! gathers each output byte back from that interleaved position. Direction is
//! explicit at the call site; decode always uses [`unshuffle`].

use crate::error::ZarrstreamError;

/// Inverse of the byte shuffle: `dst[i] = src[b*a + c]` where `a` is the
/// element count, `b = i % elementsize`, and `c = i / elementsize`.
pub fn unshuffle(bytes: &[u8], elementsize: usize) -> Result<Vec<u8>, ZarrstreamError> {
    let a = element_count(bytes, elementsize)?;
    let mut out = vec![0u8; bytes.len()];
    for (i, dst) in out.iter_mut().enumerate() {
        let b = i % elementsize;
        let c = i / elementsize;
        *dst = bytes[b * a + c];
    }
    Ok(out)
}

/// Forward byte shuffle: `dst[b*a + c] = src[i]`, the exact inverse of
/// [`unshuffle`].
pub fn shuffle(bytes: &[u8], elementsize: usize) -> Result<Vec<u8>, ZarrstreamError> {
    let a = element_count(bytes, elementsize)?;
    let mut out = vec![0u8; bytes.len()];
    for (i, &src) in bytes.iter().enumerate() {
        let b = i % elementsize;
        let c = i / elementsize;
        out[b * a + c] = src;
    }
    Ok(out)
}

fn element_count(bytes: &[u8], elementsize: usize) -> Result<usize, ZarrstreamError> {
    if elementsize == 0 || bytes.len() % elementsize != 0 {
        return Err(ZarrstreamError::BufferMismatch(elementsize, bytes.len()));
    }
    Ok(bytes.len() / elementsize)
}
