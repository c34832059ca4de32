use async_trait::async_trait;
use std::time::Duration;

use super::quality::QualityPreset;
use crate::error::Result;

/// One encoded slice of a continuous recording
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub data: Vec<u8>,
    /// e.g. "video/webm;codecs=vp9"
    pub mime_type: String,
}

impl MediaChunk {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Camera/microphone encoder behind the chunked capturer
///
/// Platform-specific implementations wrap the browser or OS incremental
/// encoder; tests use fakes that drop and reorder chunks deterministically.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Open the device at the given quality. Fails with `Error::Device`.
    async fn acquire(&mut self, preset: &QualityPreset) -> Result<()>;

    /// Begin incremental encoding, emitting a chunk every `chunk_interval`
    async fn start(&mut self, chunk_interval: Duration) -> Result<()>;

    /// Next emitted chunk, `None` once stopped and flushed.
    ///
    /// Must be cancel-safe: it is polled inside `select!`.
    async fn next_chunk(&mut self) -> Option<MediaChunk>;

    /// Stop encoding. A final chunk may still be delivered by `next_chunk`.
    async fn stop(&mut self) -> Result<()>;

    /// Release the underlying device. Called on every exit path, so it must
    /// tolerate being called after a failed `acquire`.
    async fn release(&mut self);

    /// Backend name for logging
    fn name(&self) -> &str;
}
