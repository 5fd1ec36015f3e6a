//! The per-worker cache of file handles, metadata, and decode results.
//!
//! Opening a remote file is expensive, so handles are memoized per
//! `(url, chunk_size)`. Group metadata is independent of the byte-range
//! granularity a file was opened with, so groups are keyed by `(url, path)`
//! alone; dataset metadata can vary with the handle that produced it and
//! keeps `chunk_size` in its key. Only successful lookups are cached, so a
//! path that appears after a retry is not masked by a stale miss.

use std::collections::HashMap;
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::config::ZarrstreamConfig;
use crate::error::ZarrstreamError;
use crate::pipeline::decode_chunk;
use crate::remote::store::{
    DatasetMetadata, GroupMetadata, RemoteFile, RemoteStore, SliceRange,
};
use crate::types::DecodedChunk;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FileKey {
    url: String,
    chunk_size: usize,
}

impl FileKey {
    /// Stable short identifier for log lines, so full URLs are not repeated
    /// on every cache event.
    fn short_id(&self) -> String {
        let digest = xxh3_64(format!("{}|{}", self.url, self.chunk_size).as_bytes());
        format!("{:016x}", digest)
    }
}

/// Counters exposed for instrumentation and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AccessStats {
    pub file_opens: u64,
    pub group_fetches: u64,
    pub dataset_fetches: u64,
    pub chunk_reads: u64,
}

pub struct RemoteFileCache<S: RemoteStore> {
    store: S,
    config: Arc<ZarrstreamConfig>,
    files: HashMap<FileKey, Arc<S::File>>,
    groups: HashMap<(String, String), GroupMetadata>,
    datasets: HashMap<(String, String, usize), DatasetMetadata>,
    stats: AccessStats,
}

impl<S: RemoteStore> RemoteFileCache<S> {
    pub fn new(store: S, config: Arc<ZarrstreamConfig>) -> Self {
        Self {
            store,
            config,
            files: HashMap::new(),
            groups: HashMap::new(),
            datasets: HashMap::new(),
            stats: AccessStats::default(),
        }
    }

    pub fn stats(&self) -> AccessStats {
        self.stats
    }

    fn effective_chunk_size(&self, chunk_size: Option<usize>) -> usize {
        chunk_size.unwrap_or(self.config.default_chunk_size)
    }

    async fn file(
        &mut self,
        url: &str,
        chunk_size: Option<usize>,
    ) -> Result<Arc<S::File>, ZarrstreamError> {
        let key = FileKey {
            url: url.to_string(),
            chunk_size: self.effective_chunk_size(chunk_size),
        };
        if let Some(file) = self.files.get(&key) {
            return Ok(file.clone());
        }
        log::debug!(
            "opening remote file {} (chunk_size {})",
            key.short_id(),
            key.chunk_size
        );
        let file = Arc::new(self.store.open(url, key.chunk_size).await?);
        self.stats.file_opens += 1;
        self.files.insert(key, file.clone());
        Ok(file)
    }

    pub async fn get_group(
        &mut self,
        url: &str,
        chunk_size: Option<usize>,
        path: &str,
    ) -> Result<Option<GroupMetadata>, ZarrstreamError> {
        let key = (url.to_string(), path.to_string());
        if let Some(group) = self.groups.get(&key) {
            return Ok(Some(group.clone()));
        }
        let file = self.file(url, chunk_size).await?;
        let group = file.group(path).await?;
        self.stats.group_fetches += 1;
        if let Some(group) = &group {
            self.groups.insert(key, group.clone());
        }
        Ok(group)
    }

    pub async fn get_dataset(
        &mut self,
        url: &str,
        chunk_size: Option<usize>,
        path: &str,
    ) -> Result<Option<DatasetMetadata>, ZarrstreamError> {
        let cs = self.effective_chunk_size(chunk_size);
        let key = (url.to_string(), path.to_string(), cs);
        if let Some(dataset) = self.datasets.get(&key) {
            return Ok(Some(dataset.clone()));
        }
        let file = self.file(url, chunk_size).await?;
        let dataset = file.dataset(path).await?;
        self.stats.dataset_fetches += 1;
        if let Some(dataset) = &dataset {
            self.datasets.insert(key, dataset.clone());
        }
        Ok(dataset)
    }

    /// Reads and decodes a region of a dataset. Returns `None` when the
    /// dataset does not exist. Requests larger than the configured element
    /// cap are rejected up front, before any bytes move.
    pub async fn get_dataset_data(
        &mut self,
        url: &str,
        chunk_size: Option<usize>,
        path: &str,
        slices: Option<&[SliceRange]>,
    ) -> Result<Option<DecodedChunk>, ZarrstreamError> {
        let Some(meta) = self.get_dataset(url, chunk_size, path).await? else {
            return Ok(None);
        };

        let elements = region_elements(&meta.shape, slices);
        if elements > self.config.max_elements {
            return Err(ZarrstreamError::Worker(format!(
                "Too many elements to read: {} (limit {})",
                elements, self.config.max_elements
            )));
        }

        let file = self.file(url, chunk_size).await?;
        let raw = file.read(path, slices).await?;
        self.stats.chunk_reads += 1;
        log::debug!(
            "read {} bytes for {} region {:?}",
            raw.bytes.len(),
            path,
            raw.shape
        );
        let decoded = decode_chunk(
            &raw.bytes,
            Some(&meta.dtype),
            meta.compressor.as_ref(),
            meta.filters.as_deref(),
            Some(&raw.shape),
        )?;
        Ok(Some(decoded))
    }
}

fn region_elements(shape: &[u64], slices: Option<&[SliceRange]>) -> u64 {
    shape
        .iter()
        .enumerate()
        .map(|(dim, &extent)| match slices.and_then(|s| s.get(dim)) {
            Some(&(start, stop)) => stop.saturating_sub(start),
            None => extent,
        })
        .product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::store::MemoryStore;
    use serde_json::Value;

    fn store_with_dataset() -> MemoryStore {
        let store = MemoryStore::new();
        let values: Vec<i16> = (0..10).collect();
        store.add_plain_dataset(
            "mem://f",
            DatasetMetadata {
                name: "x".to_string(),
                path: "/x".to_string(),
                shape: vec![10],
                dtype: "<i2".to_string(),
                compressor: None,
                filters: None,
                attrs: Value::Null,
            },
            values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        );
        store.add_group(
            "mem://f",
            GroupMetadata {
                path: "/".to_string(),
                subgroups: vec![],
                datasets: vec![],
                attrs: Value::Null,
            },
        );
        store
    }

    #[tokio::test]
    async fn test_file_handle_opened_once_per_key() {
        let store = store_with_dataset();
        let mut cache = RemoteFileCache::new(store.clone(), Arc::new(ZarrstreamConfig::default()));
        cache.get_group("mem://f", None, "/").await.unwrap();
        cache.get_dataset("mem://f", None, "/x").await.unwrap();
        cache
            .get_dataset_data("mem://f", None, "/x", Some(&[(0, 4)]))
            .await
            .unwrap();
        assert_eq!(store.open_count(), 1);

        // A different chunk_size is a different handle.
        cache.get_dataset("mem://f", Some(4096), "/x").await.unwrap();
        assert_eq!(store.open_count(), 2);
    }

    #[tokio::test]
    async fn test_group_cache_hit_skips_store() {
        let store = store_with_dataset();
        let mut cache = RemoteFileCache::new(store.clone(), Arc::new(ZarrstreamConfig::default()));
        cache.get_group("mem://f", None, "/").await.unwrap();
        cache.get_group("mem://f", None, "/").await.unwrap();
        assert_eq!(cache.stats().group_fetches, 1);

        // Misses are not cached.
        assert!(cache.get_group("mem://f", None, "/gone").await.unwrap().is_none());
        assert!(cache.get_group("mem://f", None, "/gone").await.unwrap().is_none());
        assert_eq!(cache.stats().group_fetches, 3);
    }

    #[tokio::test]
    async fn test_dataset_data_decodes_and_caps_elements() {
        let store = store_with_dataset();
        let config = ZarrstreamConfig {
            max_elements: 5,
            ..ZarrstreamConfig::default()
        };
        let mut cache = RemoteFileCache::new(store, Arc::new(config));

        let chunk = cache
            .get_dataset_data("mem://f", None, "/x", Some(&[(2, 5)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chunk, DecodedChunk::Int16(vec![2, 3, 4]));

        let err = cache
            .get_dataset_data("mem://f", None, "/x", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Too many elements"));
    }

    #[test]
    fn test_short_id_is_stable() {
        let a = FileKey {
            url: "mem://f".to_string(),
            chunk_size: 100,
        };
        let b = a.clone();
        assert_eq!(a.short_id(), b.short_id());
        assert_eq!(a.short_id().len(), 16);
    }
}
