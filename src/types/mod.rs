//! Canonical, type-safe representations of dtypes and decoded chunk values
//! used throughout the zarrstream pipeline.

mod decoded;
mod dtype;

pub use decoded::DecodedChunk;
pub use dtype::DtypeTag;
