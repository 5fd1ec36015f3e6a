//! The worker task and its message protocol.
//!
//! All store access runs on one spawned task that owns the
//! [`RemoteFileCache`] and serves requests sequentially, so the cache needs
//! no locking and request ordering is deterministic. Clients hold a cheap
//! clone of [`WorkerClient`]; each request is tagged with a unique id and its
//! reply is routed back through a oneshot, racing against the caller's
//! canceler and the configured timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::config::ZarrstreamConfig;
use crate::error::ZarrstreamError;
use crate::remote::cache::RemoteFileCache;
use crate::remote::cancel::Canceler;
use crate::remote::store::{DatasetMetadata, GroupMetadata, RemoteStore, SliceRange};
use crate::types::DecodedChunk;

//==================================================================================
// 1. Message protocol
//==================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    #[serde(rename_all = "camelCase")]
    GetGroup {
        url: String,
        path: String,
        chunk_size: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    GetDataset {
        url: String,
        path: String,
        chunk_size: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    GetDatasetData {
        url: String,
        path: String,
        chunk_size: Option<usize>,
        slice: Option<Vec<SliceRange>>,
    },
}

#[derive(Debug)]
pub enum WorkerReply {
    Group(GroupMetadata),
    Dataset(DatasetMetadata),
    DatasetData(DecodedChunk),
}

struct Envelope {
    request_id: u64,
    request: WorkerRequest,
}

struct ReplyEnvelope {
    request_id: u64,
    /// Failures cross the boundary as plain text, the way a structured
    /// worker error travels in a message payload.
    response: Result<WorkerReply, String>,
}

//==================================================================================
// 2. Worker task
//==================================================================================

/// Spawns the worker and its reply dispatcher, returning the client handle.
pub fn spawn_worker<S: RemoteStore>(store: S, config: Arc<ZarrstreamConfig>) -> WorkerClient {
    let (request_tx, mut request_rx) = mpsc::channel::<Envelope>(config.queue_depth);
    let (reply_tx, mut reply_rx) = mpsc::channel::<ReplyEnvelope>(config.queue_depth);

    let cache_config = config.clone();
    tokio::spawn(async move {
        let mut cache = RemoteFileCache::new(store, cache_config);
        while let Some(envelope) = request_rx.recv().await {
            log::debug!("worker request {} received", envelope.request_id);
            let response = handle_request(&mut cache, envelope.request)
                .await
                .map_err(|e| e.to_string());
            if response.is_err() {
                log::debug!("worker request {} failed", envelope.request_id);
            }
            if reply_tx
                .send(ReplyEnvelope {
                    request_id: envelope.request_id,
                    response,
                })
                .await
                .is_err()
            {
                break;
            }
        }
        log::debug!("worker loop exited");
    });

    let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<WorkerReply, String>>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let dispatcher_pending = pending.clone();
    tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            let sender = dispatcher_pending
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&reply.request_id);
            if let Some(sender) = sender {
                // A dropped receiver means the caller canceled or timed out.
                let _ = sender.send(reply.response);
            }
        }
    });

    WorkerClient {
        request_tx,
        pending,
        next_id: Arc::new(AtomicU64::new(1)),
        config,
    }
}

async fn handle_request<S: RemoteStore>(
    cache: &mut RemoteFileCache<S>,
    request: WorkerRequest,
) -> Result<WorkerReply, ZarrstreamError> {
    match request {
        WorkerRequest::GetGroup {
            url,
            path,
            chunk_size,
        } => {
            let group = cache
                .get_group(&url, chunk_size, &path)
                .await?
                .ok_or_else(|| ZarrstreamError::NotFound(format!("Group {}", path)))?;
            Ok(WorkerReply::Group(group))
        }
        WorkerRequest::GetDataset {
            url,
            path,
            chunk_size,
        } => {
            let dataset = cache
                .get_dataset(&url, chunk_size, &path)
                .await?
                .ok_or_else(|| ZarrstreamError::NotFound(format!("Dataset {}", path)))?;
            Ok(WorkerReply::Dataset(dataset))
        }
        WorkerRequest::GetDatasetData {
            url,
            path,
            chunk_size,
            slice,
        } => {
            let chunk = cache
                .get_dataset_data(&url, chunk_size, &path, slice.as_deref())
                .await?
                .ok_or_else(|| ZarrstreamError::NotFound(format!("Dataset {}", path)))?;
            Ok(WorkerReply::DatasetData(chunk))
        }
    }
}

//==================================================================================
// 3. Client handle
//==================================================================================

#[derive(Clone)]
pub struct WorkerClient {
    request_tx: mpsc::Sender<Envelope>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<WorkerReply, String>>>>>,
    next_id: Arc<AtomicU64>,
    config: Arc<ZarrstreamConfig>,
}

impl WorkerClient {
    /// Posts one request and waits for its reply, losing the race to the
    /// caller's canceler or the configured timeout if either fires first.
    pub async fn post(
        &self,
        request: WorkerRequest,
        canceler: Option<&Canceler>,
    ) -> Result<WorkerReply, ZarrstreamError> {
        if let Some(c) = canceler {
            if c.is_canceled() {
                return Err(ZarrstreamError::Canceled);
            }
        }

        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(request_id, reply_tx);

        if self
            .request_tx
            .send(Envelope {
                request_id,
                request,
            })
            .await
            .is_err()
        {
            self.forget(request_id);
            return Err(ZarrstreamError::Worker("worker stopped".to_string()));
        }

        let canceled = async {
            match canceler {
                Some(c) => c.canceled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            reply = reply_rx => {
                match reply {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(message)) => Err(ZarrstreamError::Worker(message)),
                    Err(_) => Err(ZarrstreamError::Worker("worker stopped".to_string())),
                }
            }
            _ = canceled => {
                self.forget(request_id);
                Err(ZarrstreamError::Canceled)
            }
            _ = tokio::time::sleep(self.config.request_timeout()) => {
                self.forget(request_id);
                Err(ZarrstreamError::RequestTimeout)
            }
        }
    }

    fn forget(&self, request_id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&request_id);
    }

    pub fn config(&self) -> &Arc<ZarrstreamConfig> {
        &self.config
    }

    pub async fn get_group(
        &self,
        url: &str,
        path: &str,
        chunk_size: Option<usize>,
        canceler: Option<&Canceler>,
    ) -> Result<GroupMetadata, ZarrstreamError> {
        let reply = self
            .post(
                WorkerRequest::GetGroup {
                    url: url.to_string(),
                    path: path.to_string(),
                    chunk_size,
                },
                canceler,
            )
            .await?;
        match reply {
            WorkerReply::Group(group) => Ok(group),
            other => Err(mismatched_reply("group", &other)),
        }
    }

    pub async fn get_dataset(
        &self,
        url: &str,
        path: &str,
        chunk_size: Option<usize>,
        canceler: Option<&Canceler>,
    ) -> Result<DatasetMetadata, ZarrstreamError> {
        let reply = self
            .post(
                WorkerRequest::GetDataset {
                    url: url.to_string(),
                    path: path.to_string(),
                    chunk_size,
                },
                canceler,
            )
            .await?;
        match reply {
            WorkerReply::Dataset(dataset) => Ok(dataset),
            other => Err(mismatched_reply("dataset", &other)),
        }
    }

    pub async fn get_dataset_data(
        &self,
        url: &str,
        path: &str,
        chunk_size: Option<usize>,
        slice: Option<Vec<SliceRange>>,
        canceler: Option<&Canceler>,
    ) -> Result<DecodedChunk, ZarrstreamError> {
        let reply = self
            .post(
                WorkerRequest::GetDatasetData {
                    url: url.to_string(),
                    path: path.to_string(),
                    chunk_size,
                    slice,
                },
                canceler,
            )
            .await?;
        match reply {
            WorkerReply::DatasetData(chunk) => Ok(chunk),
            other => Err(mismatched_reply("dataset data", &other)),
        }
    }
}

fn mismatched_reply(expected: &str, got: &WorkerReply) -> ZarrstreamError {
    ZarrstreamError::Internal(format!(
        "expected a {} reply, got {:?}",
        expected,
        std::mem::discriminant(got)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::store::MemoryStore;
    use serde_json::Value;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn test_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_group(
            "mem://f",
            GroupMetadata {
                path: "/acquisition".to_string(),
                subgroups: vec![],
                datasets: vec![],
                attrs: Value::Null,
            },
        );
        let values: Vec<i16> = (0..20).collect();
        store.add_plain_dataset(
            "mem://f",
            DatasetMetadata {
                name: "data".to_string(),
                path: "/acquisition/data".to_string(),
                shape: vec![20],
                dtype: "<i2".to_string(),
                compressor: None,
                filters: None,
                attrs: Value::Null,
            },
            values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        );
        store
    }

    #[tokio::test]
    async fn test_worker_serves_group_and_data() {
        init_logging();
        let client = spawn_worker(test_store(), Arc::new(ZarrstreamConfig::default()));

        let group = client
            .get_group("mem://f", "/acquisition", None, None)
            .await
            .unwrap();
        assert_eq!(group.path, "/acquisition");

        let chunk = client
            .get_dataset_data("mem://f", "/acquisition/data", None, Some(vec![(5, 8)]), None)
            .await
            .unwrap();
        assert_eq!(chunk, DecodedChunk::Int16(vec![5, 6, 7]));
    }

    #[tokio::test]
    async fn test_missing_group_is_a_structured_error() {
        init_logging();
        let client = spawn_worker(test_store(), Arc::new(ZarrstreamConfig::default()));
        let err = client
            .get_group("mem://f", "/nope", None, None)
            .await
            .unwrap_err();
        match err {
            ZarrstreamError::Worker(message) => {
                assert!(message.contains("/nope"), "{}", message);
            }
            other => panic!("expected a worker error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_post_short_circuits() {
        init_logging();
        let client = spawn_worker(test_store(), Arc::new(ZarrstreamConfig::default()));
        let canceler = Canceler::new();
        canceler.cancel();
        let err = client
            .get_dataset("mem://f", "/acquisition/data", None, Some(&canceler))
            .await
            .unwrap_err();
        assert!(matches!(err, ZarrstreamError::Canceled));
    }

    #[tokio::test]
    async fn test_concurrent_requests_route_by_id() {
        init_logging();
        let client = spawn_worker(test_store(), Arc::new(ZarrstreamConfig::default()));
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let c = client.clone();
            handles.push(tokio::spawn(async move {
                let start = i * 2;
                let chunk = c
                    .get_dataset_data(
                        "mem://f",
                        "/acquisition/data",
                        None,
                        Some(vec![(start, start + 2)]),
                        None,
                    )
                    .await
                    .unwrap();
                assert_eq!(
                    chunk,
                    DecodedChunk::Int16(vec![start as i16, start as i16 + 1])
                );
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let request = WorkerRequest::GetDatasetData {
            url: "mem://f".to_string(),
            path: "/x".to_string(),
            chunk_size: Some(1024),
            slice: Some(vec![(0, 10)]),
        };
        let text = serde_json::to_string(&request).unwrap();
        assert!(text.contains(r#""type":"getDatasetData""#));
        assert!(text.contains(r#""chunkSize":1024"#));
    }
}
