//! Request admission
//!
//! Two gates sit in front of the participant-facing endpoints:
//! - [`RateLimiter`] - per-key fixed window counters over a pluggable [`CounterStore`]
//! - [`SessionValidator`] - anonymous requests must carry a live session id

mod limiter;
mod validator;

pub use limiter::{CounterStore, MemoryCounterStore, RateDecision, RateLimitEntry, RateLimiter};
pub use validator::SessionValidator;
