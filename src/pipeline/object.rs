//! The self-describing envelope for variable-length object arrays.
//!
//! A `json2` payload is a single JSON array holding the flattened elements
//! followed by two trailer entries: the dtype tag (always `"|O"`) and the
//! array shape. Both trailers are validated against the dataset metadata
//! before elements are accepted.

use serde_json::Value;

use crate::error::ZarrstreamError;
use crate::types::DecodedChunk;

/// Decodes a `json2` object payload, validating its trailers against the
/// chunk shape from metadata.
///
/// The payload holds `shape[0]` top-level entries; multidimensional arrays
/// nest one list per row and are flattened dimension-major. String elements
/// are returned as-is; non-string JSON elements are kept as their JSON text
/// so heterogeneous arrays survive without a lossy cast.
pub fn decode_json2(bytes: &[u8], shape: &[u64]) -> Result<DecodedChunk, ZarrstreamError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let arr = value
        .as_array()
        .ok_or_else(|| ZarrstreamError::ObjectDecode("json2 payload is not an array".into()))?;
    if arr.len() < 2 {
        return Err(ZarrstreamError::ObjectDecode(format!(
            "json2 payload has {} entries, need elements plus two trailers",
            arr.len()
        )));
    }

    let dtype_trailer = arr[arr.len() - 2].as_str().unwrap_or("");
    if dtype_trailer != "|O" {
        return Err(ZarrstreamError::ObjectDecode(format!(
            "json2 dtype trailer is {:?}, expected \"|O\"",
            arr[arr.len() - 2]
        )));
    }
    let shape_trailer: Vec<u64> = arr[arr.len() - 1]
        .as_array()
        .map(|dims| dims.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    if shape_trailer != shape {
        return Err(ZarrstreamError::ObjectDecode(format!(
            "json2 shape trailer {:?} does not match metadata shape {:?}",
            shape_trailer, shape
        )));
    }

    let elements = &arr[..arr.len() - 2];
    let rows = shape.first().copied().unwrap_or(0);
    if elements.len() as u64 != rows {
        return Err(ZarrstreamError::LengthMismatch {
            expected: rows as usize,
            actual: elements.len(),
        });
    }

    let mut strings = Vec::new();
    flatten_elements(elements, &mut strings)?;
    let expected: u64 = shape.iter().product();
    if strings.len() as u64 != expected {
        return Err(ZarrstreamError::LengthMismatch {
            expected: expected as usize,
            actual: strings.len(),
        });
    }
    Ok(DecodedChunk::Strings(strings))
}

/// Depth-first flatten of nested per-row lists into one linear sequence.
fn flatten_elements(values: &[Value], out: &mut Vec<String>) -> Result<(), ZarrstreamError> {
    for value in values {
        match value {
            Value::Array(inner) => flatten_elements(inner, out)?,
            Value::String(s) => out.push(s.clone()),
            other => out.push(serde_json::to_string(other)?),
        }
    }
    Ok(())
}
