//! The chunk decode pipeline: metadata-driven compressor and filter specs,
//! the staged decode driver, and the object-array envelope.

pub mod decode;
pub mod object;
pub mod spec;

pub use decode::decode_chunk;
pub use spec::{CompressorSpec, FilterSpec};
