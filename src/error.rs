//! This module defines the single, unified error type for the entire zarrstream
//! library. It uses the `thiserror` crate to provide ergonomic, context-aware
//! error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZarrstreamError {
    // =========================================================================
    // === Protocol errors (fatal, never retried)
    // =========================================================================
    #[error("Unhandled dtype: {0}")]
    UnsupportedDtype(String),

    #[error("Unhandled compressor: {0}")]
    UnhandledCompressor(String),

    #[error("Filter not yet implemented: {0}")]
    FilterNotImplemented(String),

    #[error("No shape for {0}")]
    MissingShape(&'static str),

    #[error("Object array decode failed: {0}")]
    ObjectDecode(String),

    #[error("Unexpected {field} in header. Expected {expected}, got {actual}")]
    QfcHeaderMismatch {
        field: &'static str,
        expected: i64,
        actual: i64,
    },

    #[error("QFC decompression failed: {0}")]
    Qfc(String),

    #[error("Buffer length mismatch: expected a multiple of {0}, got {1}")]
    BufferMismatch(usize, usize),

    #[error("Unexpected decoded length. Expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid unicode code point in fixed-length record: {0}")]
    InvalidCodePoint(u32),

    #[error("Chunking client not implemented for {0} dimensions")]
    UnsupportedShape(usize),

    // =========================================================================
    // === Numeric-consistency errors (fatal; parameter/version mismatch)
    // =========================================================================
    #[error("Unexpected non-zero imaginary part after inverse transform at sample {index}: {value}")]
    ResidualImaginary { index: usize, value: f64 },

    // =========================================================================
    // === Transport / worker-boundary outcomes
    // =========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Worker request failed: {0}")]
    Worker(String),

    /// Cancellation is a first-class outcome, not a decode failure. Callers
    /// are expected to retry with a fresh canceler or abandon the read.
    #[error("canceled")]
    Canceled,

    #[error("timeout")]
    RequestTimeout,

    // =========================================================================
    // === Low-level kernel errors
    // =========================================================================
    #[error("Inflate operation failed: {0}")]
    Inflate(String),

    #[error("Zstd operation failed: {0}")]
    Zstd(String),

    // =========================================================================
    // === External error wrappers
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Internal logic error (this is a bug): {0}")]
    Internal(String),
}
