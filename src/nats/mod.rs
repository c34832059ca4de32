//! Lifecycle event publication
//!
//! Events are side effects: a failed publish is logged by the caller and
//! never fails the session or media operation that produced it.

pub mod client;
pub mod messages;

pub use client::NatsClient;
pub use messages::{MediaFinalizedMessage, SessionEventKind, SessionEventMessage};

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn session_event(&self, msg: &SessionEventMessage) -> Result<()>;

    async fn media_finalized(&self, msg: &MediaFinalizedMessage) -> Result<()>;
}

/// Publisher used when no broker is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn session_event(&self, _msg: &SessionEventMessage) -> Result<()> {
        Ok(())
    }

    async fn media_finalized(&self, _msg: &MediaFinalizedMessage) -> Result<()> {
        Ok(())
    }
}
