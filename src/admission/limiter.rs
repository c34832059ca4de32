use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::RateRule;
use crate::error::{Error, Result};

/// Counter state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Storage for rate limit counters
///
/// `increment` must be atomic per key: reset the entry to a count of 1 with a
/// fresh window when `now > reset_at` (or the key is new), otherwise add one.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<RateLimitEntry>;

    /// Drop entries whose window has passed, returning how many were removed
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Process-local counters. Each instance enforces its own ceiling.
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<RateLimitEntry> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| Error::Config(format!("rate limit window out of range: {e}")))?;

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if now > entry.reset_at {
                    entry.count = 1;
                    entry.reset_at = now + window;
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
            })
            .or_insert(RateLimitEntry {
                count: 1,
                reset_at: now + window,
            });
        Ok(*entry)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at >= now);
        Ok(before - entries.len())
    }
}

/// Verdict for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Whole seconds until the window resets, set when denied
    pub retry_after_secs: Option<u64>,
}

/// Per-key fixed window limiter
///
/// A key's window starts at its first request and lasts `window`; requests
/// beyond `max_requests` inside it are denied until `now > reset_at`.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn check(&self, key: &str, max_requests: u32, window: Duration) -> Result<RateDecision> {
        let now = self.clock.now();
        let entry = self.store.increment(key, window, now).await?;

        if entry.count > max_requests {
            let millis = (entry.reset_at - now).num_milliseconds().max(0) as u64;
            let retry_after = millis.div_ceil(1000).max(1);
            debug!("Rate limit hit for {} ({} > {})", key, entry.count, max_requests);
            return Ok(RateDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: Some(retry_after),
            });
        }

        Ok(RateDecision {
            allowed: true,
            remaining: max_requests - entry.count,
            retry_after_secs: None,
        })
    }

    /// Check against a rule and turn a denial into [`Error::RateLimited`].
    /// A failing counter store admits the request.
    pub async fn enforce(&self, key: &str, rule: RateRule) -> Result<RateDecision> {
        match self.check(key, rule.max_requests, rule.window()).await {
            Ok(decision) if decision.allowed => Ok(decision),
            Ok(decision) => {
                warn!("Rate limit exceeded for {}", key);
                Err(Error::RateLimited {
                    retry_after_secs: decision.retry_after_secs.unwrap_or(1),
                })
            }
            Err(e) => {
                warn!("Rate limit store unavailable for {}: {}", key, e);
                Ok(RateDecision {
                    allowed: true,
                    remaining: rule.max_requests,
                    retry_after_secs: None,
                })
            }
        }
    }

    /// Remove expired counters from the store
    pub async fn sweep(&self) -> Result<usize> {
        self.store.sweep(self.clock.now()).await
    }
}
