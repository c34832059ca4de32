use async_nats::Client;
use async_trait::async_trait;
use tracing::{debug, info};

use super::messages::{MediaFinalizedMessage, SessionEventMessage};
use super::EventPublisher;
use crate::error::{Error, Result};

/// Subject prefix for everything this service publishes
const SUBJECT_PREFIX: &str = "interview";

pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .map_err(|e| Error::Upstream(format!("failed to connect to NATS: {e}")))?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    async fn publish(&self, subject: String, payload: Vec<u8>) -> Result<()> {
        let bytes = payload.len();
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| Error::Upstream(format!("failed to publish to {subject}: {e}")))?;

        debug!("Published {} bytes to {}", bytes, subject);
        Ok(())
    }
}

/// `interview.session.<kind>`
pub fn session_subject(msg: &SessionEventMessage) -> String {
    format!("{}.session.{}", SUBJECT_PREFIX, msg.event.as_str())
}

/// `interview.media.finalized`
pub fn media_subject() -> String {
    format!("{SUBJECT_PREFIX}.media.finalized")
}

#[async_trait]
impl EventPublisher for NatsClient {
    async fn session_event(&self, msg: &SessionEventMessage) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        self.publish(session_subject(msg), payload).await
    }

    async fn media_finalized(&self, msg: &MediaFinalizedMessage) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        self.publish(media_subject(), payload).await
    }
}
