//! Progressive, chunk-at-a-time assembly of timeseries windows.
//!
//! A [`DatasetChunkingClient`] wraps one 1-D or 2-D dataset behind the worker
//! and serves contiguous sample windows as per-channel `f64` traces. Chunks
//! are fetched on demand and memoized, so scrolling back over a window
//! already seen costs nothing. Each pass runs under a wall-clock budget and
//! reports `completed = false` when it runs out, letting the caller redraw
//! with partial data and poll again instead of blocking on a long fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ZarrstreamConfig;
use crate::error::ZarrstreamError;
use crate::remote::cancel::Canceler;
use crate::remote::store::{DatasetMetadata, SliceRange};
use crate::remote::worker::WorkerClient;

/// Channels shown by default when the caller does not narrow the range.
/// Wide recordings stay responsive; the caller can always ask for more.
const DEFAULT_VISIBLE_CHANNELS: usize = 15;

#[derive(Debug, Clone, Default)]
pub struct ChunkingOptions {
    /// Samples per fetched chunk along the time axis. Zero means one chunk
    /// covering the whole dataset.
    pub chunk_size: usize,
    /// Channel window `[start, stop)`; defaults to the first
    /// [`DEFAULT_VISIBLE_CHANNELS`] channels.
    pub channel_range: Option<(usize, usize)>,
    /// Serve raw stored values, skipping the dataset's conversion and
    /// offset attributes.
    pub ignore_conversion: bool,
    /// Vertical separation between channel traces, in multiples of the
    /// estimated noise level. Channel `j` is shifted by
    /// `j * separation * noise_level` at assembly time, keeping stacked
    /// traces readable without manual scaling.
    pub auto_channel_separation: Option<f64>,
}

/// One assembled window. `channels[j][t]` is the value of selected channel
/// `j` at sample `t` of the window; samples not yet fetched are NaN.
#[derive(Debug, Clone)]
pub struct ConcatenatedChunk {
    pub channels: Vec<Vec<f64>>,
    pub completed: bool,
}

pub struct DatasetChunkingClient {
    worker: WorkerClient,
    url: String,
    meta: DatasetMetadata,
    chunk_size: usize,
    channel_range: (usize, usize),
    conversion: f64,
    offset: f64,
    auto_channel_separation: Option<f64>,
    /// Estimated once from the first chunk, on first use.
    noise_level: Option<f64>,
    config: Arc<ZarrstreamConfig>,
    /// Memoized decoded chunks, channel-major, keyed by chunk index.
    chunks: HashMap<usize, Vec<Vec<f64>>>,
}

impl DatasetChunkingClient {
    pub fn new(
        worker: WorkerClient,
        url: impl Into<String>,
        meta: DatasetMetadata,
        options: ChunkingOptions,
    ) -> Result<Self, ZarrstreamError> {
        if meta.shape.is_empty() || meta.shape.len() > 2 {
            return Err(ZarrstreamError::UnsupportedShape(meta.shape.len()));
        }
        let num_samples = meta.shape[0] as usize;
        let num_channels = meta.shape.get(1).copied().unwrap_or(1) as usize;

        let channel_range = match options.channel_range {
            Some((start, stop)) => (start.min(num_channels), stop.min(num_channels)),
            None => (0, num_channels.min(DEFAULT_VISIBLE_CHANNELS)),
        };
        let chunk_size = if options.chunk_size == 0 {
            num_samples.max(1)
        } else {
            options.chunk_size
        };

        let (conversion, offset) = if options.ignore_conversion {
            (1.0, 0.0)
        } else {
            (
                meta.numeric_attr("conversion", 1.0),
                meta.numeric_attr("offset", 0.0),
            )
        };

        let config = worker.config().clone();
        Ok(Self {
            worker,
            url: url.into(),
            meta,
            chunk_size,
            channel_range,
            conversion,
            offset,
            auto_channel_separation: options.auto_channel_separation,
            noise_level: None,
            config,
            chunks: HashMap::new(),
        })
    }

    pub fn num_samples(&self) -> usize {
        self.meta.shape[0] as usize
    }

    pub fn num_chunks(&self) -> usize {
        self.num_samples().div_ceil(self.chunk_size)
    }

    pub fn selected_channels(&self) -> usize {
        self.channel_range.1.saturating_sub(self.channel_range.0)
    }

    /// Assembles the window covering chunk indices `[start_chunk, end_chunk)`.
    ///
    /// Already-memoized chunks are filled in for free; missing ones are
    /// fetched until the work budget runs out or the canceler fires, in
    /// which case the window comes back with NaN gaps and
    /// `completed = false`. Decode failures are real errors and propagate.
    pub async fn get_concatenated_chunk(
        &mut self,
        start_chunk: usize,
        end_chunk: usize,
        canceler: &Canceler,
    ) -> Result<ConcatenatedChunk, ZarrstreamError> {
        let num_samples = self.num_samples();
        let window_start = (start_chunk * self.chunk_size).min(num_samples);
        let window_stop = (end_chunk * self.chunk_size).min(num_samples);
        let width = window_stop - window_start;
        let num_selected = self.selected_channels();

        let mut channels = vec![vec![f64::NAN; width]; num_selected];
        let mut completed = true;
        let separation = match self.auto_channel_separation {
            Some(sep) => sep * self.ensure_noise_level().await?,
            None => 0.0,
        };
        let deadline = Instant::now() + self.config.work_budget();

        for idx in start_chunk..end_chunk {
            let chunk_start = idx * self.chunk_size;
            if chunk_start >= num_samples {
                break;
            }
            if !self.chunks.contains_key(&idx) {
                if Instant::now() >= deadline {
                    completed = false;
                    break;
                }
                match self.load_chunk(idx, canceler).await {
                    Ok(chunk) => {
                        self.chunks.insert(idx, chunk);
                    }
                    Err(ZarrstreamError::Canceled) => {
                        completed = false;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            let chunk = &self.chunks[&idx];
            let offset = chunk_start - window_start;
            for (j, trace) in chunk.iter().enumerate() {
                if separation == 0.0 {
                    channels[j][offset..offset + trace.len()].copy_from_slice(trace);
                } else {
                    // Separation is applied at assembly so the memoized
                    // traces stay unshifted.
                    let shift = j as f64 * separation;
                    for (t, &v) in trace.iter().enumerate() {
                        channels[j][offset + t] = v + shift;
                    }
                }
            }
        }

        Ok(ConcatenatedChunk {
            channels,
            completed,
        })
    }

    /// Lazily estimates the noise level used for auto channel separation.
    ///
    /// The estimate comes from the first chunk: each channel is cut into
    /// 100-sample sections (at most 50 of them) and the noise level is three
    /// times the median of their root-mean-square values. The one-off chunk
    /// fetch is not cancelable and runs before the work budget starts.
    async fn ensure_noise_level(&mut self) -> Result<f64, ZarrstreamError> {
        if let Some(level) = self.noise_level {
            return Ok(level);
        }
        if !self.chunks.contains_key(&0) {
            let chunk = self.load_chunk(0, &Canceler::new()).await?;
            self.chunks.insert(0, chunk);
        }
        let step = 100;
        let mut stdevs = Vec::new();
        for trace in &self.chunks[&0] {
            let limit = trace.len().min(step * 50);
            let mut start = 0;
            while start < limit {
                let section = &trace[start..(start + step).min(trace.len())];
                let v = (section.iter().map(|x| x * x).sum::<f64>() / section.len() as f64).sqrt();
                if v.is_finite() {
                    stdevs.push(v);
                }
                start += step;
            }
        }
        let level = median(&mut stdevs) * 3.0;
        self.noise_level = Some(level);
        Ok(level)
    }

    /// Fetches and scales one chunk, returning it channel-major.
    async fn load_chunk(
        &self,
        idx: usize,
        canceler: &Canceler,
    ) -> Result<Vec<Vec<f64>>, ZarrstreamError> {
        let num_samples = self.num_samples();
        let t0 = idx * self.chunk_size;
        let t1 = ((idx + 1) * self.chunk_size).min(num_samples);
        let (c0, c1) = self.channel_range;

        let mut slices: Vec<SliceRange> = vec![(t0 as u64, t1 as u64)];
        if self.meta.shape.len() == 2 {
            slices.push((c0 as u64, c1 as u64));
        }

        let decoded = self
            .worker
            .get_dataset_data(
                &self.url,
                &self.meta.path,
                None,
                Some(slices),
                Some(canceler),
            )
            .await?;
        let flat = decoded.to_f64_vec()?;

        let nt = t1 - t0;
        let nc = self.selected_channels();
        if flat.len() != nt * nc {
            return Err(ZarrstreamError::LengthMismatch {
                expected: nt * nc,
                actual: flat.len(),
            });
        }

        // Row-major [sample][channel] on the wire; split into per-channel
        // traces with scaling applied.
        let mut chunk = vec![Vec::with_capacity(nt); nc];
        for t in 0..nt {
            for (j, trace) in chunk.iter_mut().enumerate() {
                trace.push(flat[t * nc + j] * self.conversion + self.offset);
            }
        }
        Ok(chunk)
    }
}

/// Median of a sample set; empty input yields zero.
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
