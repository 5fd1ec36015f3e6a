//! Remote access to chunked array stores: the store abstraction, the
//! metadata/chunk cache, the worker task that owns it, and cooperative
//! cancellation across the worker boundary.

pub mod cache;
pub mod cancel;
pub mod store;
pub mod worker;

pub use cache::RemoteFileCache;
pub use cancel::Canceler;
pub use store::{
    DatasetMetadata, GroupMetadata, MemoryStore, RawChunk, RemoteFile, RemoteStore,
    SliceRange, SubgroupMetadata,
};
pub use worker::{spawn_worker, WorkerClient, WorkerReply, WorkerRequest};
