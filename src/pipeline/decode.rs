//! The staged chunk decode driver.
//!
//! Order of operations mirrors the encode side in reverse: the compressor
//! stage is undone first, then the filter chain back to front, then the raw
//! bytes are materialized into the dtype named by metadata. Object arrays
//! take a separate path where the head filter is a self-describing envelope
//! and the remaining filters are byte transforms.
//!
//! The whole filter chain is validated before any stage runs, so a chunk
//! with an unrecognized filter anywhere fails cleanly instead of doing
//! partial work.

use crate::codecs::{deflate, qfc, shuffle, zstd};
use crate::error::ZarrstreamError;
use crate::pipeline::object;
use crate::pipeline::spec::{CompressorSpec, FilterSpec};
use crate::types::{DecodedChunk, DtypeTag};

/// Decodes one stored chunk into its logical value representation.
///
/// With no `dtype`, the bytes are decompressed and filtered but returned raw.
pub fn decode_chunk(
    chunk: &[u8],
    dtype: Option<&str>,
    compressor: Option<&CompressorSpec>,
    filters: Option<&[FilterSpec]>,
    shape: Option<&[u64]>,
) -> Result<DecodedChunk, ZarrstreamError> {
    let filters = filters.unwrap_or(&[]);
    for filter in filters {
        if let FilterSpec::Unknown(id) = filter {
            return Err(ZarrstreamError::FilterNotImplemented(id.clone()));
        }
    }

    let tag = dtype.map(DtypeTag::parse).transpose()?;
    let mut bytes = undo_compressor(chunk, compressor, shape)?;
    if matches!(tag, Some(DtypeTag::Object)) {
        return decode_object_chunk(&bytes, filters, shape);
    }

    for filter in filters.iter().rev() {
        bytes = undo_filter(&bytes, filter)?;
    }

    match tag {
        Some(tag) => tag.materialize(&bytes),
        None => Ok(DecodedChunk::Raw(bytes)),
    }
}

fn undo_compressor(
    chunk: &[u8],
    compressor: Option<&CompressorSpec>,
    shape: Option<&[u64]>,
) -> Result<Vec<u8>, ZarrstreamError> {
    match compressor {
        None => Ok(chunk.to_vec()),
        Some(CompressorSpec::Zstd { .. }) => zstd::decode(chunk),
        Some(CompressorSpec::Gzip { .. }) => deflate::decode(chunk),
        Some(CompressorSpec::Qfc(opts)) => {
            let shape = shape.ok_or(ZarrstreamError::MissingShape("qfc chunk"))?;
            qfc::qfc_decompress(chunk, shape, opts)
        }
        Some(CompressorSpec::Mp4) => {
            Err(ZarrstreamError::UnhandledCompressor("mp4".to_string()))
        }
        Some(CompressorSpec::Unknown(id)) => {
            Err(ZarrstreamError::UnhandledCompressor(id.clone()))
        }
    }
}

/// Undoes one byte-transform filter. Envelope filters are not byte
/// transforms and are rejected here; they are only legal at the head of an
/// object-array chain.
fn undo_filter(bytes: &[u8], filter: &FilterSpec) -> Result<Vec<u8>, ZarrstreamError> {
    match filter {
        FilterSpec::Zlib => deflate::decode(bytes),
        FilterSpec::Zstd => zstd::decode(bytes),
        FilterSpec::Shuffle { elementsize } => shuffle::unshuffle(bytes, *elementsize),
        FilterSpec::VlenUtf8 | FilterSpec::VlenBytes | FilterSpec::Json2 => Err(
            ZarrstreamError::ObjectDecode(format!(
                "envelope filter {} in a byte-transform position",
                filter.id()
            )),
        ),
        FilterSpec::Unknown(id) => Err(ZarrstreamError::FilterNotImplemented(id.clone())),
    }
}

/// Object arrays carry their self-describing envelope as the first filter in
/// application order, so it is the last one undone. The filters after it are
/// plain byte transforms and are undone first. The envelope must be `json2`;
/// any other filter at index 0 is a hard error, never reinterpreted.
fn decode_object_chunk(
    chunk: &[u8],
    filters: &[FilterSpec],
    shape: Option<&[u64]>,
) -> Result<DecodedChunk, ZarrstreamError> {
    let shape = shape.ok_or(ZarrstreamError::MissingShape("object array"))?;
    let (head, rest) = filters.split_first().ok_or_else(|| {
        ZarrstreamError::ObjectDecode("object array with no filters".into())
    })?;

    let mut bytes = chunk.to_vec();
    for filter in rest.iter().rev() {
        bytes = undo_filter(&bytes, filter)?;
    }

    match head {
        FilterSpec::Json2 => object::decode_json2(&bytes, shape),
        other => Err(ZarrstreamError::ObjectDecode(format!(
            "first filter for object arrays must be json2, got {}",
            other.id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        let mut out = Vec::new();
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_gzip_f32_chunk() {
        let values: Vec<f32> = (0..100).map(|i| i as f32 * 0.5).collect();
        let compressed = deflate::encode(&f32_bytes(&values), 6).unwrap();
        let chunk = decode_chunk(
            &compressed,
            Some("<f4"),
            Some(&CompressorSpec::Gzip { level: 6 }),
            None,
            Some(&[100]),
        )
        .unwrap();
        assert_eq!(chunk, DecodedChunk::Float32(values));
    }

    #[test]
    fn test_zstd_with_shuffle_filter() {
        let values: Vec<i32> = (0..64).map(|i| i * 1000 - 32_000).collect();
        let mut raw = Vec::new();
        for v in &values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let shuffled = shuffle::shuffle(&raw, 4).unwrap();
        let compressed = zstd::encode(&shuffled, 3).unwrap();
        let chunk = decode_chunk(
            &compressed,
            Some("<i4"),
            Some(&CompressorSpec::Zstd { level: 3 }),
            Some(&[FilterSpec::Shuffle { elementsize: 4 }]),
            Some(&[64]),
        )
        .unwrap();
        assert_eq!(chunk, DecodedChunk::Int32(values));
    }

    #[test]
    fn test_unknown_filter_fails_before_any_work() {
        let err = decode_chunk(
            &[1, 2, 3],
            Some("<f4"),
            None,
            Some(&[FilterSpec::Unknown("mystery".to_string())]),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Filter not yet implemented: mystery");
    }

    #[test]
    fn test_unknown_compressor_fails() {
        let err = decode_chunk(
            &[0u8; 8],
            Some("<f8"),
            Some(&CompressorSpec::Unknown("lz77".to_string())),
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unhandled compressor: lz77");
    }

    #[test]
    fn test_mp4_compressor_is_recognized_but_not_decodable() {
        let err = decode_chunk(&[0u8; 8], Some("<u1"), Some(&CompressorSpec::Mp4), None, None)
            .unwrap_err();
        assert!(matches!(err, ZarrstreamError::UnhandledCompressor(_)));
    }

    #[test]
    fn test_no_dtype_returns_raw_bytes() {
        let raw = vec![9u8, 8, 7, 6];
        let compressed = deflate::encode(&raw, 6).unwrap();
        let chunk = decode_chunk(
            &compressed,
            None,
            Some(&CompressorSpec::Gzip { level: 6 }),
            None,
            None,
        )
        .unwrap();
        assert_eq!(chunk, DecodedChunk::Raw(raw));
    }

    #[test]
    fn test_object_chunk_json2_behind_zlib() {
        let payload = br#"["x", "y", "|O", [2]]"#.to_vec();
        let compressed = deflate::encode(&payload, 6).unwrap();
        let chunk = decode_chunk(
            &compressed,
            Some("|O"),
            None,
            Some(&[FilterSpec::Json2, FilterSpec::Zlib]),
            Some(&[2]),
        )
        .unwrap();
        assert_eq!(
            chunk,
            DecodedChunk::Strings(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn test_object_chunk_behind_gzip_compressor() {
        let payload = br#"["x", "y", "|O", [2]]"#.to_vec();
        let compressed = deflate::encode(&payload, 6).unwrap();
        let chunk = decode_chunk(
            &compressed,
            Some("|O"),
            Some(&CompressorSpec::Gzip { level: 6 }),
            Some(&[FilterSpec::Json2]),
            Some(&[2]),
        )
        .unwrap();
        assert_eq!(
            chunk,
            DecodedChunk::Strings(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn test_object_chunk_rejects_non_json2_head() {
        let mut payload = 2u32.to_le_bytes().to_vec();
        for item in [b"ab".as_slice(), b"cde".as_slice()] {
            payload.extend_from_slice(&(item.len() as u32).to_le_bytes());
            payload.extend_from_slice(item);
        }
        let err = decode_chunk(
            &payload,
            Some("|O"),
            None,
            Some(&[FilterSpec::VlenUtf8]),
            Some(&[2]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be json2"));
    }

    #[test]
    fn test_object_chunk_without_filters_fails() {
        let err = decode_chunk(&[1, 2, 3], Some("|O"), None, None, Some(&[1])).unwrap_err();
        assert!(err.to_string().contains("no filters"));
    }

    #[test]
    fn test_object_chunk_without_shape_fails() {
        let err = decode_chunk(
            &[1, 2, 3],
            Some("|O"),
            None,
            Some(&[FilterSpec::Json2]),
            None,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "No shape for object array");
    }

    #[test]
    fn test_qfc_chunk_through_pipeline() {
        use crate::codecs::qfc::{
            QfcCompressionMethod, QfcCompressionOpts, QfcDtype,
        };
        let opts = QfcCompressionOpts {
            compression_method: QfcCompressionMethod::Zlib,
            dtype: QfcDtype::Int16,
            quant_scale_factor: 100.0,
            segment_length: 200,
            zlib_level: 6,
            zstd_level: 3,
        };
        let data: Vec<f64> = (0..500)
            .map(|t| ((t as f64 * 0.04).sin() * 8.0).round())
            .collect();
        let payload = qfc::qfc_compress(&data, 1, &opts);
        let chunk = decode_chunk(
            &payload,
            Some("<i2"),
            Some(&CompressorSpec::Qfc(opts)),
            None,
            Some(&[500]),
        )
        .unwrap();
        match chunk {
            DecodedChunk::Int16(values) => {
                assert_eq!(values.len(), 500);
                for (got, want) in values.iter().zip(data.iter()) {
                    assert_eq!(f64::from(*got), *want);
                }
            }
            other => panic!("expected int16, got {:?}", other),
        }
    }
}
