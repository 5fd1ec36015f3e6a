//! The single source of truth for zarrstream runtime configuration.
//!
//! This module defines the unified `ZarrstreamConfig` struct, which is designed
//! to be created once at the application boundary (e.g., from a JSON or YAML
//! document) and then passed down through the system via a shared, read-only
//! `Arc<ZarrstreamConfig>`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime limits and defaults for the remote file cache, the worker, and the
/// chunking client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ZarrstreamConfig {
    /// Byte-range granularity used when opening a backing file and a request
    /// does not specify its own. Small by default so metadata reads stay cheap.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: usize,

    /// Hard cap on the number of elements a single dataset-data request may
    /// materialize. Requests above the cap are rejected with a descriptive
    /// error rather than attempted.
    #[serde(default = "default_max_elements")]
    pub max_elements: u64,

    /// Wall-clock budget for one progressive pass of the chunking client.
    /// When exceeded, the pass returns with `completed = false` and the caller
    /// polls again, keeping the worker responsive to cancellation.
    #[serde(default = "default_work_budget_ms")]
    pub work_budget_ms: u64,

    /// Per-request timeout across the worker boundary.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Depth of the worker's request queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_chunk_size() -> usize {
    1024 * 20
}

fn default_max_elements() -> u64 {
    10_000_000
}

fn default_work_budget_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    60_000 * 3
}

fn default_queue_depth() -> usize {
    64
}

impl Default for ZarrstreamConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: default_chunk_size(),
            max_elements: default_max_elements(),
            work_budget_ms: default_work_budget_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl ZarrstreamConfig {
    pub fn work_budget(&self) -> Duration {
        Duration::from_millis(self.work_budget_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
