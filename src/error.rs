//! Error types for the interview capture service

use thiserror::Error;

use crate::audio::DeviceError;

/// Result type alias for interview capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across sessions, capture, media and audio
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed input, correctable by the caller
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown session, study or upload
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (ownership, closed study)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Transition not allowed from the current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operation conflicts with an earlier one (e.g. upload already finalized)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Pause window exceeded
    #[error("expired: {0}")]
    Expired(String),

    /// Admission layer denied the request
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Request body exceeds the configured ceiling
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Speech or storage provider failure
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Object or row store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Capture device could not be acquired
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// A chunk exhausted its retries, including the stop-time drain
    #[error("chunk {index} failed after {attempts} attempts")]
    ChunkUpload { index: usize, attempts: u32 },

    /// Audio decode/encode failure
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
