//! QFC: a quantized Fourier codec for multi-channel timeseries chunks.
//!
//! The wire format is a 20-byte header of five little-endian i32 fields
//! (magic, version, num_samples, num_channels, segment_length) followed by a
//! compressed block of packed i16 spectral coefficients. Samples are split
//! into segments along the time axis, each segment transformed per channel
//! with a real FFT, quantized by `quant_scale_factor`, and packed
//! channel-interleaved. Decompression reverses every stage and emits
//! little-endian sample bytes in the dataset's dtype.

use serde::{Deserialize, Serialize};

use crate::codecs::deflate;
use crate::error::ZarrstreamError;

mod fft;

//==================================================================================
// 1. Wire constants and codec options
//==================================================================================

const QFC_MAGIC: i32 = 7364182;
const QFC_VERSION: i32 = 1;
const HEADER_LEN: usize = 20;

/// Entropy stage applied to the packed coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QfcCompressionMethod {
    Zlib,
    Zstd,
}

/// Output dtype of the decompressed samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QfcDtype {
    #[serde(rename = "float32")]
    Float32,
    #[serde(rename = "int16")]
    Int16,
}

impl QfcDtype {
    pub fn width(&self) -> usize {
        match self {
            QfcDtype::Float32 => 4,
            QfcDtype::Int16 => 2,
        }
    }
}

/// Compressor options carried in dataset metadata. Every field is mandatory;
/// a config missing any of them is rejected at parse time rather than
/// guessed at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QfcCompressionOpts {
    pub compression_method: QfcCompressionMethod,
    pub dtype: QfcDtype,
    pub quant_scale_factor: f64,
    pub segment_length: usize,
    pub zlib_level: i32,
    pub zstd_level: i32,
}

//==================================================================================
// 2. Segmentation
//==================================================================================

/// Splits `total` samples into `[start, end)` ranges of `segment_length`.
///
/// A trailing runt shorter than half a segment gets rebalanced with its
/// predecessor: the final range is fixed at `segment_length / 2` samples and
/// the one before it absorbs the rest. This keeps every segment long enough
/// for the spectral transform to be worthwhile.
fn segment_ranges(total: usize, segment_length: usize) -> Vec<(usize, usize)> {
    if segment_length == 0 || segment_length >= total {
        return vec![(0, total)];
    }
    let mut ranges: Vec<(usize, usize)> = (0..total)
        .step_by(segment_length)
        .map(|s| (s, (s + segment_length).min(total)))
        .collect();
    let n = ranges.len();
    if n >= 2 {
        let (_, last_end) = ranges[n - 1];
        let (prev_start, _) = ranges[n - 2];
        if last_end - ranges[n - 1].0 < segment_length / 2 {
            let split = last_end - segment_length / 2;
            ranges[n - 2] = (prev_start, split);
            ranges[n - 1] = (split, last_end);
        }
    }
    ranges
}

//==================================================================================
// 3. Decompression
//==================================================================================

fn check_header_field(
    field: &'static str,
    expected: i64,
    actual: i64,
) -> Result<(), ZarrstreamError> {
    if expected != actual {
        return Err(ZarrstreamError::QfcHeaderMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Decompresses a QFC payload into little-endian sample bytes.
///
/// `shape` is the chunk shape from dataset metadata; the header's sample and
/// channel counts must agree with it. Output is sample-major and
/// channel-interleaved, `num_samples * num_channels` values wide.
pub fn qfc_decompress(
    buf: &[u8],
    shape: &[u64],
    opts: &QfcCompressionOpts,
) -> Result<Vec<u8>, ZarrstreamError> {
    if buf.len() < HEADER_LEN {
        return Err(ZarrstreamError::Qfc(format!(
            "payload too short for header: {} bytes",
            buf.len()
        )));
    }
    let mut header = [0i32; 5];
    for (i, field) in header.iter_mut().enumerate() {
        let raw: [u8; 4] = buf[i * 4..i * 4 + 4]
            .try_into()
            .map_err(|_| ZarrstreamError::Internal("qfc header slice".into()))?;
        *field = i32::from_le_bytes(raw);
    }
    let [magic, version, num_samples, num_channels, segment_length] = header;

    check_header_field("magic", QFC_MAGIC as i64, magic as i64)?;
    check_header_field("version", QFC_VERSION as i64, version as i64)?;
    let expected_samples = shape.first().copied().unwrap_or(0) as i64;
    let expected_channels = shape.get(1).copied().unwrap_or(1) as i64;
    check_header_field("num_samples", expected_samples, num_samples as i64)?;
    check_header_field("num_channels", expected_channels, num_channels as i64)?;
    check_header_field(
        "segment_length",
        opts.segment_length as i64,
        segment_length as i64,
    )?;

    let ns = num_samples as usize;
    let nc = num_channels as usize;
    let seg_len = segment_length as usize;

    let body = match opts.compression_method {
        QfcCompressionMethod::Zlib => deflate::decode(&buf[HEADER_LEN..])?,
        QfcCompressionMethod::Zstd => {
            return Err(ZarrstreamError::Qfc(
                "zstd decompression not implemented".into(),
            ))
        }
    };
    if body.len() % 2 != 0 {
        return Err(ZarrstreamError::BufferMismatch(2, body.len()));
    }
    // Coefficients are little-endian i16; a plain copy-cast is correct on
    // any little-endian host this crate targets.
    let coeffs: Vec<i16> = bytemuck::pod_collect_to_vec(body.as_slice());
    if coeffs.len() != ns * nc {
        return Err(ZarrstreamError::LengthMismatch {
            expected: ns * nc,
            actual: coeffs.len(),
        });
    }

    let qs = opts.quant_scale_factor;
    let width = opts.dtype.width();
    let mut out = vec![0u8; ns * nc * width];

    let mut offset = 0usize;
    for (start, end) in segment_ranges(ns, seg_len) {
        let m = end - start;
        let rows = &coeffs[offset * nc..(offset + m) * nc];
        for j in 0..nc {
            let samples = decode_segment_channel(rows, m, nc, j, qs)?;
            for (t, &v) in samples.iter().enumerate() {
                let idx = (start + t) * nc + j;
                match opts.dtype {
                    QfcDtype::Int16 => {
                        let q = v.round() as i16;
                        out[idx * 2..idx * 2 + 2].copy_from_slice(&q.to_le_bytes());
                    }
                    QfcDtype::Float32 => {
                        out[idx * 4..idx * 4 + 4].copy_from_slice(&(v as f32).to_le_bytes());
                    }
                }
            }
        }
        offset += m;
    }

    if out.len() != ns * nc * width {
        return Err(ZarrstreamError::LengthMismatch {
            expected: ns * nc * width,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Unpacks one channel of one segment and runs the inverse transform.
///
/// Packed rows within a segment of `m` samples: the first `m/2 + 1` rows are
/// real parts, the remaining rows are the imaginary parts of bins `1..`
/// (excluding DC, and excluding Nyquist when `m` is even, both of which are
/// identically zero for a real signal). Each row interleaves `nc` channels.
fn decode_segment_channel(
    rows: &[i16],
    m: usize,
    nc: usize,
    channel: usize,
    quant_scale_factor: f64,
) -> Result<Vec<f64>, ZarrstreamError> {
    let half_len = m / 2 + 1;
    let mut x_re = Vec::with_capacity(half_len);
    let mut x_im = vec![0.0f64; half_len];

    for i in 0..half_len {
        x_re.push(rows[i * nc + channel] as f64 / quant_scale_factor);
    }
    // Imaginary rows resume right after the real block; count depends on
    // whether a zero Nyquist bin was dropped.
    let im_count = if m % 2 == 0 { half_len - 2 } else { half_len - 1 };
    for k in 0..im_count {
        let row = half_len + k;
        x_im[k + 1] = rows[row * nc + channel] as f64 / quant_scale_factor;
    }

    fft::irfft(&x_re, &x_im, m)
}

//==================================================================================
// 4. Test-side encoder
//==================================================================================

/// Forward QFC, used to synthesize payloads for decode tests. `data` is
/// sample-major channel-interleaved, `num_samples * num_channels` long.
#[cfg(test)]
pub(crate) fn qfc_compress(
    data: &[f64],
    num_channels: usize,
    opts: &QfcCompressionOpts,
) -> Vec<u8> {
    let nc = num_channels;
    let ns = data.len() / nc;
    let qs = opts.quant_scale_factor;

    let mut coeffs: Vec<i16> = Vec::with_capacity(ns * nc);
    for (start, end) in segment_ranges(ns, opts.segment_length) {
        let m = end - start;
        let half_len = m / 2 + 1;
        let im_count = if m % 2 == 0 { half_len - 2 } else { half_len - 1 };

        let mut spectra = Vec::with_capacity(nc);
        for j in 0..nc {
            let channel: Vec<f64> = (start..end).map(|t| data[t * nc + j]).collect();
            spectra.push(fft::rfft(&channel));
        }
        for i in 0..half_len {
            for (re, _) in &spectra {
                coeffs.push((re[i] * qs).round() as i16);
            }
        }
        for k in 0..im_count {
            for (_, im) in &spectra {
                coeffs.push((im[k + 1] * qs).round() as i16);
            }
        }
    }

    let body: &[u8] = bytemuck::cast_slice(&coeffs);
    let compressed = match opts.compression_method {
        QfcCompressionMethod::Zlib => {
            deflate::encode(body, opts.zlib_level as u32).expect("zlib encode")
        }
        QfcCompressionMethod::Zstd => {
            crate::codecs::zstd::encode(body, opts.zstd_level).expect("zstd encode")
        }
    };

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    for field in [
        QFC_MAGIC,
        QFC_VERSION,
        ns as i32,
        nc as i32,
        opts.segment_length as i32,
    ] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&compressed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_opts(dtype: QfcDtype) -> QfcCompressionOpts {
        QfcCompressionOpts {
            compression_method: QfcCompressionMethod::Zlib,
            dtype,
            quant_scale_factor: 100.0,
            segment_length: 300,
            zlib_level: 6,
            zstd_level: 3,
        }
    }

    fn test_signal(num_samples: usize, num_channels: usize) -> Vec<f64> {
        let mut data = Vec::with_capacity(num_samples * num_channels);
        for t in 0..num_samples {
            for j in 0..num_channels {
                let phase = t as f64 * (0.05 + 0.02 * j as f64);
                data.push((phase.sin() * 9.0 + (phase * 0.31).cos() * 4.0).round());
            }
        }
        data
    }

    #[test]
    fn test_segment_ranges_rebalances_short_tail() {
        assert_eq!(
            segment_ranges(1000, 300),
            vec![(0, 300), (300, 600), (600, 850), (850, 1000)]
        );
    }

    #[test]
    fn test_segment_ranges_short_input_is_one_segment() {
        assert_eq!(segment_ranges(100, 300), vec![(0, 100)]);
        assert_eq!(segment_ranges(300, 300), vec![(0, 300)]);
    }

    #[test]
    fn test_segment_ranges_even_split_untouched() {
        assert_eq!(segment_ranges(600, 300), vec![(0, 300), (300, 600)]);
    }

    #[test]
    fn test_roundtrip_int16_two_channels() {
        let opts = test_opts(QfcDtype::Int16);
        let data = test_signal(1000, 2);
        let payload = qfc_compress(&data, 2, &opts);

        let bytes = qfc_decompress(&payload, &[1000, 2], &opts).unwrap();
        assert_eq!(bytes.len(), 1000 * 2 * 2);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        for (i, (&got, &want)) in values.iter().zip(data.iter()).enumerate() {
            assert_eq!(got as f64, want, "sample {}", i);
        }
    }

    #[test]
    fn test_roundtrip_float32() {
        let opts = test_opts(QfcDtype::Float32);
        let data = test_signal(650, 1);
        let payload = qfc_compress(&data, 1, &opts);

        let bytes = qfc_decompress(&payload, &[650], &opts).unwrap();
        assert_eq!(bytes.len(), 650 * 4);
        for (i, c) in bytes.chunks_exact(4).enumerate() {
            let got = f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64;
            assert!(
                (got - data[i]).abs() < 0.2,
                "sample {}: {} vs {}",
                i,
                got,
                data[i]
            );
        }
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let opts = test_opts(QfcDtype::Int16);
        let mut payload = qfc_compress(&test_signal(400, 1), 1, &opts);
        payload[0] ^= 0xff;
        let err = qfc_decompress(&payload, &[400], &opts).unwrap_err();
        assert!(matches!(
            err,
            ZarrstreamError::QfcHeaderMismatch { field: "magic", .. }
        ));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let opts = test_opts(QfcDtype::Int16);
        let payload = qfc_compress(&test_signal(400, 2), 2, &opts);
        let err = qfc_decompress(&payload, &[500, 2], &opts).unwrap_err();
        assert!(matches!(
            err,
            ZarrstreamError::QfcHeaderMismatch {
                field: "num_samples",
                ..
            }
        ));
    }

    #[test]
    fn test_segment_length_mismatch_is_rejected() {
        let mut opts = test_opts(QfcDtype::Int16);
        let payload = qfc_compress(&test_signal(400, 1), 1, &opts);
        opts.segment_length = 250;
        let err = qfc_decompress(&payload, &[400], &opts).unwrap_err();
        assert!(matches!(
            err,
            ZarrstreamError::QfcHeaderMismatch {
                field: "segment_length",
                ..
            }
        ));
    }

    #[test]
    fn test_zstd_method_not_implemented() {
        let mut opts = test_opts(QfcDtype::Int16);
        let payload = qfc_compress(&test_signal(400, 1), 1, &opts);
        opts.compression_method = QfcCompressionMethod::Zstd;
        let err = qfc_decompress(&payload, &[400], &opts).unwrap_err();
        assert!(err.to_string().contains("zstd decompression not implemented"));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let opts = test_opts(QfcDtype::Int16);
        let err = qfc_decompress(&[1, 2, 3], &[400], &opts).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }
}
