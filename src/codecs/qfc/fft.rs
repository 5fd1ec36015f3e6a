//! Real FFT primitives for the QFC codec, built on `rustfft`.
//!
//! The codec works in the orthonormal convention: forward coefficients are
//! the DFT divided by `sqrt(m)`, and reconstruction is the normalized inverse
//! DFT scaled back up by `sqrt(m)`. Spectral arithmetic runs in f64 and is
//! cast to the output width by the caller.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::ZarrstreamError;

/// Residual imaginary energy above this bound after the inverse transform is
/// treated as parameter/version mismatch, never suppressed.
const IMAG_TOLERANCE: f64 = 1e-5;

/// Inverse real FFT for one channel.
///
/// `x_re`/`x_im` hold the half spectrum: `floor(m/2)+1` coefficients each,
/// `x_im[0]` zero (and the Nyquist bin zero for even `m`). The full-length
/// spectrum is reconstructed by Hermitian symmetry before the inverse
/// transform runs.
pub(crate) fn irfft(
    x_re: &[f64],
    x_im: &[f64],
    num_samples: usize,
) -> Result<Vec<f64>, ZarrstreamError> {
    let m = num_samples;
    let half_len = m / 2 + 1;
    if x_re.len() != half_len {
        return Err(ZarrstreamError::Qfc(format!(
            "Unexpected x_re length. Expected {}, got {}",
            half_len,
            x_re.len()
        )));
    }
    if x_im.len() != half_len {
        return Err(ZarrstreamError::Qfc(format!(
            "Unexpected x_im length. Expected {}, got {}",
            half_len,
            x_im.len()
        )));
    }

    // Hermitian symmetry: re[m-i] = re[i], im[m-i] = -im[i].
    let mut spectrum = vec![Complex::new(0.0f64, 0.0); m];
    for i in 0..half_len {
        spectrum[i] = Complex::new(x_re[i], x_im[i]);
        if i > 0 {
            spectrum[m - i] = Complex::new(x_re[i], -x_im[i]);
        }
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_inverse(m);
    fft.process(&mut spectrum);

    // rustfft's inverse is unnormalized; folding the 1/m normalization into
    // the orthonormal sqrt(m) factor gives one net scale.
    let scale = (m as f64).sqrt() / m as f64;
    let mut out = Vec::with_capacity(m);
    for (i, c) in spectrum.iter().enumerate() {
        let imag = c.im * scale;
        if imag.abs() > IMAG_TOLERANCE {
            return Err(ZarrstreamError::ResidualImaginary {
                index: i,
                value: imag,
            });
        }
        out.push(c.re * scale);
    }
    Ok(out)
}

/// Forward real FFT in the orthonormal convention: DFT / sqrt(m), truncated
/// to the half spectrum. This is the encode direction used to synthesize QFC
/// payloads; the remote decode path never calls it.
pub(crate) fn rfft(signal: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let m = signal.len();
    let mut buf: Vec<Complex<f64>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(m);
    fft.process(&mut buf);

    let scale = 1.0 / (m as f64).sqrt();
    let half_len = m / 2 + 1;
    let mut x_re = Vec::with_capacity(half_len);
    let mut x_im = Vec::with_capacity(half_len);
    for c in buf.iter().take(half_len) {
        x_re.push(c.re * scale);
        x_im.push(c.im * scale);
    }
    (x_re, x_im)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfft_irfft_roundtrip_even() {
        let signal: Vec<f64> = (0..64)
            .map(|i| (i as f64 * 0.3).sin() * 5.0 + (i as f64 * 0.07).cos() * 2.0)
            .collect();
        let (re, im) = rfft(&signal);
        assert_eq!(re.len(), 33);
        let restored = irfft(&re, &im, 64).unwrap();
        for (a, b) in signal.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_rfft_irfft_roundtrip_odd() {
        let signal: Vec<f64> = (0..65).map(|i| ((i * 37) % 11) as f64 - 5.0).collect();
        let (re, im) = rfft(&signal);
        assert_eq!(re.len(), 33);
        let restored = irfft(&re, &im, 65).unwrap();
        for (a, b) in signal.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_irfft_rejects_wrong_half_spectrum_length() {
        let err = irfft(&[0.0; 10], &[0.0; 10], 64).unwrap_err();
        assert!(err.to_string().contains("Expected 33"));
    }

    #[test]
    fn test_irfft_rejects_asymmetric_spectrum() {
        // A nonzero imaginary part at DC breaks Hermitian symmetry, so the
        // inverse transform cannot produce a real signal.
        let mut im = vec![0.0f64; 33];
        im[0] = 1.0;
        let re = vec![0.0f64; 33];
        let err = irfft(&re, &im, 64).unwrap_err();
        assert!(matches!(err, ZarrstreamError::ResidualImaginary { .. }));
    }
}
