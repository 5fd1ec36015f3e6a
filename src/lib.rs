//! zarrstream: on-demand remote access to chunked scientific array stores.
//!
//! The crate is organized in layers. `codecs` holds the pure byte-transform
//! kernels (zlib, zstd, byte shuffle, variable-length payloads, and the QFC
//! spectral codec). `pipeline` turns dataset metadata into a staged decode of
//! one stored chunk. `remote` provides the store abstraction, the
//! metadata/chunk cache, and the worker task that owns all store access
//! behind a message protocol with cancellation and timeouts. `client` builds
//! on the worker to assemble timeseries windows progressively.

pub mod client;
pub mod codecs;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod types;

pub use client::{ChunkingOptions, ConcatenatedChunk, DatasetChunkingClient};
pub use config::ZarrstreamConfig;
pub use error::ZarrstreamError;
pub use pipeline::{decode_chunk, CompressorSpec, FilterSpec};
pub use remote::{
    spawn_worker, Canceler, DatasetMetadata, GroupMetadata, MemoryStore, RemoteFile,
    RemoteFileCache, RemoteStore, WorkerClient, WorkerReply, WorkerRequest,
};
pub use types::{DecodedChunk, DtypeTag};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
