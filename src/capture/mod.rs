//! Client-resident chunked capture
//!
//! Records a live camera/microphone stream as time-boxed chunks and uploads
//! each chunk independently while recording continues:
//! - [`CaptureDevice`] - `acquire/start/next_chunk/stop/release` over the platform encoder
//! - [`select_preset`] - adaptive quality from the reported connection type
//! - [`upload_with_retry`] - per-chunk retries with exponential backoff
//! - [`ChunkedCapture`] - the driver: immediate uploads, failed-chunk drain,
//!   hard maximum duration, monotone progress
//! - [`ChunkedCapture::record_answer`] - capture then finalize through a [`RecordingFinalizer`]

mod device;
mod quality;
mod recorder;
mod retry;
mod uploader;

pub use device::{CaptureDevice, MediaChunk};
pub use quality::{select_preset, EffectiveConnectionType, QualityPreset, QualityTier};
pub use recorder::{
    AnswerTarget, CaptureSettings, CaptureSummary, ChunkManifest, ChunkStatus, ChunkedCapture, RecordedAnswer,
    StopReason,
};
pub use retry::{upload_with_retry, RetryPolicy, UploadOutcome};
pub use uploader::{ChunkUploader, HttpChunkUploader, RecordingFinalizer, UploadTarget};
