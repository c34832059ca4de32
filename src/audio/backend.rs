use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

use super::analyser::LevelTap;
use super::codec::DecodedAudio;
use crate::error::Result;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Fixed set of device failures the UI knows how to explain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorKind {
    PermissionDenied,
    NotFound,
    Other,
}

impl DeviceErrorKind {
    /// Classify a platform error name (DOMException names in browsers)
    pub fn classify(platform_name: &str) -> Self {
        match platform_name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => Self::NotFound,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from a platform error name and message
    pub fn from_platform(name: &str, message: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::classify(name), message)
    }
}

/// Exclusive hold on a capture device.
///
/// Dropping the lease releases the device. Handing a stream to another
/// component means moving its lease along with it, so only the current
/// holder can ever stop the tracks.
pub struct DeviceLease {
    name: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl DeviceLease {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            debug!("Releasing device {}", self.name);
            release();
        }
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLease")
            .field("name", &self.name)
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// A live microphone: frames plus the lease that keeps the device open
pub struct MicrophoneStream {
    pub frames: mpsc::Receiver<AudioFrame>,
    pub lease: DeviceLease,
}

/// Microphone capture backend
///
/// Platform-specific implementations wrap the browser media devices or the
/// OS audio stack; tests use in-memory fakes.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn acquire(&self) -> std::result::Result<MicrophoneStream, DeviceError>;
}

/// Speaker output
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play to completion, feeding the visualization tap as buffers go out.
    /// The tap is output-only and never reaches the capture path.
    async fn play(&self, audio: DecodedAudio, tap: LevelTap) -> Result<()>;

    /// Halt playback immediately. Safe to call when nothing is playing.
    fn stop(&self);
}
