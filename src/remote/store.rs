//! The backing-store abstraction: metadata records, the async store/file
//! traits, and an in-memory store used by tests and local tooling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ZarrstreamError;
use crate::pipeline::spec::{CompressorSpec, FilterSpec};
use crate::types::DtypeTag;

/// Half-open `[start, stop)` element range along one dimension.
pub type SliceRange = (u64, u64);

//==================================================================================
// 1. Metadata records
//==================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgroupMetadata {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub attrs: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub path: String,
    #[serde(default)]
    pub subgroups: Vec<SubgroupMetadata>,
    #[serde(default)]
    pub datasets: Vec<DatasetMetadata>,
    #[serde(default)]
    pub attrs: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub name: String,
    pub path: String,
    pub shape: Vec<u64>,
    pub dtype: String,
    #[serde(default)]
    pub compressor: Option<CompressorSpec>,
    #[serde(default)]
    pub filters: Option<Vec<FilterSpec>>,
    #[serde(default)]
    pub attrs: Value,
}

impl DatasetMetadata {
    /// Numeric attribute lookup with a fallback for missing or non-finite
    /// values. Scaling attributes are advisory; garbage never propagates
    /// into sample math.
    pub fn numeric_attr(&self, key: &str, fallback: f64) -> f64 {
        match self.attrs.get(key).and_then(Value::as_f64) {
            Some(v) if v.is_finite() => v,
            _ => fallback,
        }
    }
}

/// Stored bytes for one read, together with the shape of the region they
/// decode into.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub bytes: Vec<u8>,
    pub shape: Vec<u64>,
}

//==================================================================================
// 2. Store traits
//==================================================================================

/// A source of remote files. Opening is potentially expensive (network
/// round-trips for superblock and metadata), so handles are cached per
/// `(url, chunk_size)` by [`crate::remote::RemoteFileCache`].
pub trait RemoteStore: Send + 'static {
    type File: RemoteFile;

    fn open(
        &self,
        url: &str,
        chunk_size: usize,
    ) -> impl Future<Output = Result<Self::File, ZarrstreamError>> + Send;
}

/// One opened remote file. Lookups return `None` for paths that do not
/// exist; transport failures are errors.
pub trait RemoteFile: Send + Sync + 'static {
    fn group(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<GroupMetadata>, ZarrstreamError>> + Send;

    fn dataset(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<DatasetMetadata>, ZarrstreamError>> + Send;

    /// Reads the stored bytes covering `slices` of a dataset. `None` means
    /// the full extent. The returned bytes are still encoded; decoding is
    /// the caller's concern.
    fn read(
        &self,
        path: &str,
        slices: Option<&[SliceRange]>,
    ) -> impl Future<Output = Result<RawChunk, ZarrstreamError>> + Send;
}

//==================================================================================
// 3. In-memory store
//==================================================================================

#[derive(Debug, Clone)]
enum DatasetStorage {
    /// Little-endian row-major sample bytes, sliceable per request.
    Plain(Vec<u8>),
    /// One opaque encoded payload; only full-extent reads are served.
    Encoded(Vec<u8>),
}

#[derive(Debug, Clone)]
struct DatasetEntry {
    meta: DatasetMetadata,
    storage: DatasetStorage,
}

#[derive(Debug, Clone, Default)]
struct FileData {
    groups: HashMap<String, GroupMetadata>,
    datasets: HashMap<String, DatasetEntry>,
}

/// Per-store access counters, visible to tests through
/// [`MemoryStore::open_count`] and [`MemoryStore::read_count`].
#[derive(Debug, Default)]
struct StoreCounters {
    opens: AtomicU64,
    reads: AtomicU64,
}

/// An in-memory [`RemoteStore`]. Cheap to clone; all clones share content
/// and counters, so a test can keep a handle while the worker owns another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    files: Arc<Mutex<HashMap<String, FileData>>>,
    counters: Arc<StoreCounters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(&self, url: &str, group: GroupMetadata) {
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        let file = files.entry(url.to_string()).or_default();
        file.groups.insert(group.path.clone(), group);
    }

    /// Adds a dataset stored as raw row-major little-endian bytes.
    pub fn add_plain_dataset(&self, url: &str, meta: DatasetMetadata, bytes: Vec<u8>) {
        self.add_dataset(url, meta, DatasetStorage::Plain(bytes));
    }

    /// Adds a dataset stored as a single encoded payload (compressed and/or
    /// filtered per its metadata).
    pub fn add_encoded_dataset(&self, url: &str, meta: DatasetMetadata, payload: Vec<u8>) {
        self.add_dataset(url, meta, DatasetStorage::Encoded(payload));
    }

    fn add_dataset(&self, url: &str, meta: DatasetMetadata, storage: DatasetStorage) {
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        let file = files.entry(url.to_string()).or_default();
        file.datasets
            .insert(meta.path.clone(), DatasetEntry { meta, storage });
    }

    pub fn open_count(&self) -> u64 {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }
}

impl RemoteStore for MemoryStore {
    type File = MemoryFile;

    async fn open(&self, url: &str, _chunk_size: usize) -> Result<MemoryFile, ZarrstreamError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        let data = files
            .get(url)
            .cloned()
            .ok_or_else(|| ZarrstreamError::NotFound(url.to_string()))?;
        Ok(MemoryFile {
            data: Arc::new(data),
            counters: self.counters.clone(),
        })
    }
}

pub struct MemoryFile {
    data: Arc<FileData>,
    counters: Arc<StoreCounters>,
}

impl RemoteFile for MemoryFile {
    async fn group(&self, path: &str) -> Result<Option<GroupMetadata>, ZarrstreamError> {
        Ok(self.data.groups.get(path).cloned())
    }

    async fn dataset(&self, path: &str) -> Result<Option<DatasetMetadata>, ZarrstreamError> {
        Ok(self.data.datasets.get(path).map(|e| e.meta.clone()))
    }

    async fn read(
        &self,
        path: &str,
        slices: Option<&[SliceRange]>,
    ) -> Result<RawChunk, ZarrstreamError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let entry = self
            .data
            .datasets
            .get(path)
            .ok_or_else(|| ZarrstreamError::NotFound(path.to_string()))?;

        let shape = &entry.meta.shape;
        let region = resolve_region(shape, slices)?;
        match &entry.storage {
            DatasetStorage::Encoded(payload) => {
                if region != *shape {
                    return Err(ZarrstreamError::Internal(
                        "partial read of an encoded dataset".to_string(),
                    ));
                }
                Ok(RawChunk {
                    bytes: payload.clone(),
                    shape: region,
                })
            }
            DatasetStorage::Plain(bytes) => {
                let width = DtypeTag::parse(&entry.meta.dtype)?
                    .record_width()
                    .ok_or(ZarrstreamError::MissingShape("|O"))?;
                let out = slice_plain(bytes, shape, slices, width)?;
                Ok(RawChunk {
                    bytes: out,
                    shape: region,
                })
            }
        }
    }
}

fn resolve_region(
    shape: &[u64],
    slices: Option<&[SliceRange]>,
) -> Result<Vec<u64>, ZarrstreamError> {
    let Some(slices) = slices else {
        return Ok(shape.to_vec());
    };
    if slices.len() > shape.len() {
        return Err(ZarrstreamError::UnsupportedShape(slices.len()));
    }
    let mut region = Vec::with_capacity(shape.len());
    for (dim, &extent) in shape.iter().enumerate() {
        let (start, stop) = slices.get(dim).copied().unwrap_or((0, extent));
        if start > stop || stop > extent {
            return Err(ZarrstreamError::Internal(format!(
                "slice [{}, {}) out of bounds for extent {}",
                start, stop, extent
            )));
        }
        region.push(stop - start);
    }
    Ok(region)
}

/// Extracts a row-major sub-region of plain bytes. Slicing is implemented
/// for one- and two-dimensional datasets.
fn slice_plain(
    bytes: &[u8],
    shape: &[u64],
    slices: Option<&[SliceRange]>,
    width: usize,
) -> Result<Vec<u8>, ZarrstreamError> {
    let Some(slices) = slices else {
        return Ok(bytes.to_vec());
    };
    match shape.len() {
        1 => {
            let (start, stop) = slices.first().copied().unwrap_or((0, shape[0]));
            Ok(bytes[start as usize * width..stop as usize * width].to_vec())
        }
        2 => {
            let n1 = shape[1] as usize;
            let (r0, r1) = slices.first().copied().unwrap_or((0, shape[0]));
            let (c0, c1) = slices.get(1).copied().unwrap_or((0, shape[1]));
            let row_width = (c1 - c0) as usize * width;
            let mut out = Vec::with_capacity((r1 - r0) as usize * row_width);
            for row in r0 as usize..r1 as usize {
                let base = (row * n1 + c0 as usize) * width;
                out.extend_from_slice(&bytes[base..base + row_width]);
            }
            Ok(out)
        }
        n => Err(ZarrstreamError::UnsupportedShape(n)),
    }
}
