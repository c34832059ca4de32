use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::device::{CaptureDevice, MediaChunk};
use super::quality::{select_preset, EffectiveConnectionType, QualityPreset};
use super::retry::{upload_with_retry, RetryPolicy, UploadOutcome};
use super::uploader::{ChunkUploader, RecordingFinalizer};
use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::media::{FinalizeRequest, FinalizeResponse};

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Time box for each emitted chunk (default: 5 seconds)
    pub chunk_interval: Duration,
    /// Recording is force-stopped after this long (default: 30 minutes)
    pub max_duration: Duration,
    /// Per-chunk upload retries
    pub retry: RetryPolicy,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(cfg: &CaptureConfig) -> Self {
        Self {
            chunk_interval: Duration::from_secs(cfg.chunk_interval_secs),
            max_duration: Duration::from_secs(cfg.max_duration_secs),
            retry: RetryPolicy::from(cfg),
        }
    }
}

/// Client-side upload status of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ChunkStatus {
    Pending,
    Uploaded,
    Failed { attempts: u32 },
}

/// Ordered, zero-based chunk indices with their status
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkManifest {
    chunks: BTreeMap<usize, ChunkStatus>,
}

impl ChunkManifest {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn status(&self, index: usize) -> Option<ChunkStatus> {
        self.chunks.get(&index).copied()
    }

    pub fn uploaded_count(&self) -> usize {
        self.chunks
            .values()
            .filter(|s| **s == ChunkStatus::Uploaded)
            .count()
    }

    /// Indices are contiguous from zero
    pub fn is_contiguous(&self) -> bool {
        self.chunks.keys().copied().eq(0..self.chunks.len())
    }

    fn set(&mut self, index: usize, status: ChunkStatus) {
        self.chunks.insert(index, status);
    }
}

/// Why recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    MaxDuration,
    DeviceEnded,
}

/// Result of a completed capture, ready to hand to finalize
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub total_chunks: usize,
    pub duration: Duration,
    pub preset: QualityPreset,
    pub stop_reason: StopReason,
    /// Chunks that only made it during the stop-time drain
    pub recovered: Vec<usize>,
    pub manifest: ChunkManifest,
}

/// The interview item a recording answers
#[derive(Debug, Clone)]
pub struct AnswerTarget {
    pub upload_session_id: String,
    pub study_id: String,
    pub participant_id: String,
    pub item_id: String,
    /// Seconds into the interview when this answer started
    pub answer_start_offset: f64,
}

impl AnswerTarget {
    /// Describe a drained capture to finalize
    pub fn finalize_request(&self, summary: &CaptureSummary) -> FinalizeRequest {
        let duration = summary.duration.as_secs_f64();
        FinalizeRequest {
            session_id: self.upload_session_id.clone(),
            study_id: self.study_id.clone(),
            participant_id: self.participant_id.clone(),
            item_id: self.item_id.clone(),
            total_chunks: summary.total_chunks,
            total_duration: duration,
            answer_start_offset: self.answer_start_offset,
            answer_end_offset: self.answer_start_offset + duration,
            format: None,
            resolution: Some(summary.preset.resolution()),
        }
    }
}

/// A recorded and finalized answer
#[derive(Debug, Clone)]
pub struct RecordedAnswer {
    pub summary: CaptureSummary,
    pub media: FinalizeResponse,
}

/// State shared between the capture loop and its upload tasks
struct Shared {
    manifest: Mutex<ChunkManifest>,
    failed: Mutex<BTreeMap<usize, MediaChunk>>,
    progress: watch::Sender<u8>,
}

impl Shared {
    fn record(&self, index: usize, status: ChunkStatus) {
        let mut manifest = self.manifest.lock().unwrap_or_else(|e| e.into_inner());
        manifest.set(index, status);
        let total = manifest.len();
        let uploaded = manifest.uploaded_count();
        drop(manifest);

        let percent = if total == 0 {
            0
        } else {
            (uploaded * 100 / total) as u8
        };
        // Never report a lower figure than before
        self.progress.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }
}

/// Chunked recorder
///
/// Slices the device's stream into time-boxed chunks and uploads each one as
/// soon as it is emitted. Chunks that exhaust their retries are parked and
/// retried once more after recording stops.
pub struct ChunkedCapture<D: CaptureDevice> {
    device: D,
    uploader: Arc<dyn ChunkUploader>,
    settings: CaptureSettings,
    shared: Arc<Shared>,
}

impl<D: CaptureDevice> ChunkedCapture<D> {
    pub fn new(device: D, uploader: Arc<dyn ChunkUploader>, settings: CaptureSettings) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            device,
            uploader,
            settings,
            shared: Arc::new(Shared {
                manifest: Mutex::new(ChunkManifest::default()),
                failed: Mutex::new(BTreeMap::new()),
                progress,
            }),
        }
    }

    /// Upload progress in percent, monotonically non-decreasing
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.shared.progress.subscribe()
    }

    /// Record until `stop` fires (or its sender is dropped), the device ends,
    /// or the maximum duration passes. The device is released on every path.
    pub async fn run(
        mut self,
        network: Option<EffectiveConnectionType>,
        stop: oneshot::Receiver<()>,
    ) -> Result<CaptureSummary> {
        let preset = select_preset(network);
        info!(
            "Starting chunked capture on {} at {} ({:?})",
            self.device.name(),
            preset.resolution(),
            preset.tier
        );

        let result = match self.device.acquire(&preset).await {
            Ok(()) => self.record(preset, stop).await,
            Err(e) => Err(e),
        };

        self.device.release().await;
        result
    }

    /// Record one answer and finalize it, whatever stopped the recording.
    /// Finalize is skipped only when capture itself failed or produced nothing.
    pub async fn record_answer(
        self,
        network: Option<EffectiveConnectionType>,
        stop: oneshot::Receiver<()>,
        finalizer: &dyn RecordingFinalizer,
        target: &AnswerTarget,
    ) -> Result<RecordedAnswer> {
        let summary = self.run(network, stop).await?;
        if summary.total_chunks == 0 {
            return Err(Error::Validation(format!(
                "recording for item {} produced no chunks",
                target.item_id
            )));
        }

        let media = finalizer.finalize(&target.finalize_request(&summary)).await?;
        info!(
            "Answer for item {} finalized at {} ({:?})",
            target.item_id, media.video_url, summary.stop_reason
        );
        Ok(RecordedAnswer { summary, media })
    }

    async fn record(&mut self, preset: QualityPreset, mut stop: oneshot::Receiver<()>) -> Result<CaptureSummary> {
        self.device.start(self.settings.chunk_interval).await?;
        let started = Instant::now();

        let deadline = tokio::time::sleep(self.settings.max_duration);
        tokio::pin!(deadline);

        let mut uploads = JoinSet::new();
        let mut next_index = 0usize;

        let stop_reason = loop {
            tokio::select! {
                chunk = self.device.next_chunk() => match chunk {
                    Some(chunk) => {
                        self.spawn_upload(&mut uploads, next_index, chunk);
                        next_index += 1;
                    }
                    None => break StopReason::DeviceEnded,
                },
                _ = &mut stop => break StopReason::Requested,
                _ = &mut deadline => {
                    warn!(
                        "Maximum capture duration of {}s reached, stopping",
                        self.settings.max_duration.as_secs()
                    );
                    break StopReason::MaxDuration;
                }
            }
        };

        self.device.stop().await?;
        let duration = started.elapsed();

        // Stopping flushes whatever the encoder still holds
        if stop_reason != StopReason::DeviceEnded {
            while let Some(chunk) = self.device.next_chunk().await {
                self.spawn_upload(&mut uploads, next_index, chunk);
                next_index += 1;
            }
        }

        while let Some(joined) = uploads.join_next().await {
            if let Err(e) = joined {
                error!("Chunk upload task failed: {}", e);
            }
        }

        let recovered = self.drain_failed().await?;

        let manifest = self
            .shared
            .manifest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        self.shared.progress.send_replace(100);

        info!(
            "Chunked capture complete: {} chunks in {:.1}s ({} recovered at stop)",
            next_index,
            duration.as_secs_f64(),
            recovered.len()
        );

        Ok(CaptureSummary {
            total_chunks: next_index,
            duration,
            preset,
            stop_reason,
            recovered,
            manifest,
        })
    }

    fn spawn_upload(&self, uploads: &mut JoinSet<()>, index: usize, chunk: MediaChunk) {
        self.shared.record(index, ChunkStatus::Pending);

        let uploader = Arc::clone(&self.uploader);
        let shared = Arc::clone(&self.shared);
        let policy = self.settings.retry;

        uploads.spawn(async move {
            match upload_with_retry(uploader.as_ref(), index, &chunk, &policy).await {
                UploadOutcome::Uploaded { .. } => shared.record(index, ChunkStatus::Uploaded),
                UploadOutcome::Exhausted { attempts, last_error } => {
                    warn!(
                        "Chunk {} parked after {} attempts: {}",
                        index, attempts, last_error
                    );
                    shared.record(index, ChunkStatus::Failed { attempts });
                    shared
                        .failed
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(index, chunk);
                }
            }
        });
    }

    /// Retry every parked chunk once more. Every chunk gets its second round;
    /// the first one that exhausts it is reported and fails the recording.
    async fn drain_failed(&self) -> Result<Vec<usize>> {
        let failed = std::mem::take(&mut *self.shared.failed.lock().unwrap_or_else(|e| e.into_inner()));
        if failed.is_empty() {
            return Ok(Vec::new());
        }

        info!("Retrying {} failed chunks before finishing", failed.len());

        let mut recovered = Vec::with_capacity(failed.len());
        let mut first_err = None;
        for (index, chunk) in failed {
            let earlier = match self.shared.manifest.lock().unwrap_or_else(|e| e.into_inner()).status(index) {
                Some(ChunkStatus::Failed { attempts }) => attempts,
                _ => 0,
            };

            match upload_with_retry(self.uploader.as_ref(), index, &chunk, &self.settings.retry).await {
                UploadOutcome::Uploaded { .. } => {
                    self.shared.record(index, ChunkStatus::Uploaded);
                    recovered.push(index);
                }
                UploadOutcome::Exhausted { attempts, last_error } => {
                    let attempts = earlier + attempts;
                    error!(
                        "Chunk {} failed for good after {} attempts: {}",
                        index, attempts, last_error
                    );
                    self.shared.record(index, ChunkStatus::Failed { attempts });
                    first_err.get_or_insert(Error::ChunkUpload { index, attempts });
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(recovered),
        }
    }
}
