//! Pure, stateless byte-transform kernels: the compressor and filter stages
//! of the decode pipeline plus the QFC spectral codec.

pub mod deflate;
pub mod qfc;
pub mod shuffle;
pub mod vlen;
pub mod zstd;
