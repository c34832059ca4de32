use std::time::Duration;
use tracing::{debug, warn};

use super::device::MediaChunk;
use super::uploader::ChunkUploader;
use crate::config::CaptureConfig;

/// Per-chunk retry policy: `max_attempts` tries with exponential backoff
/// (`base_delay`, `2 * base_delay`, ...) between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&CaptureConfig> for RetryPolicy {
    fn from(cfg: &CaptureConfig) -> Self {
        Self {
            max_attempts: cfg.upload_attempts.max(1),
            base_delay: Duration::from_millis(cfg.backoff_base_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Uploaded { attempts } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Upload one chunk, retrying with backoff. Never sleeps after the last attempt.
pub async fn upload_with_retry(
    uploader: &dyn ChunkUploader,
    index: usize,
    chunk: &MediaChunk,
    policy: &RetryPolicy,
) -> UploadOutcome {
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match uploader.upload(index, chunk).await {
            Ok(()) => {
                debug!("Chunk {} uploaded on attempt {}", index, attempt);
                return UploadOutcome::Uploaded { attempts: attempt };
            }
            Err(e) => {
                warn!(
                    "Chunk {} upload attempt {}/{} failed: {}",
                    index, attempt, policy.max_attempts, e
                );
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }

    UploadOutcome::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailFirst {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChunkUploader for FailFirst {
        async fn upload(&self, _index: usize, _chunk: &MediaChunk) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(Error::Upstream("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_succeeds_within_attempts() {
        let uploader = FailFirst {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let chunk = MediaChunk::new(vec![1, 2, 3], "video/webm");

        let outcome = upload_with_retry(&uploader, 0, &chunk, &fast()).await;
        assert_eq!(outcome, UploadOutcome::Uploaded { attempts: 3 });
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let uploader = FailFirst {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let chunk = MediaChunk::new(vec![1], "video/webm");

        let outcome = upload_with_retry(&uploader, 4, &chunk, &fast()).await;
        assert!(!outcome.is_uploaded());
        assert_eq!(outcome.attempts(), 3);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 3);
    }
}
