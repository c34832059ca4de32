//! Storage seams
//!
//! The durable row store and object store are external collaborators; this
//! module only fixes their interfaces and ships in-process implementations.
//! - [`InterviewStore`] - studies, sessions, turns, responses, counters
//! - [`ObjectStore`] - media chunks and assembled recordings

mod memory;
mod object;

pub use memory::MemoryStore;
pub use object::{FsObjectStore, MemoryObjectStore, ObjectStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::session::{ConversationTurn, FlowResponse, InterviewSession, Speaker, Study, VideoMetadata};

/// Row store for everything keyed by study or session id
#[async_trait]
pub trait InterviewStore: Send + Sync {
    async fn study(&self, study_id: &str) -> Result<Option<Study>>;

    async fn insert_study(&self, study: Study) -> Result<()>;

    async fn insert_session(&self, session: InterviewSession) -> Result<()>;

    async fn session(&self, session_id: &str) -> Result<Option<InterviewSession>>;

    /// Last write wins
    async fn update_session(&self, session: &InterviewSession) -> Result<()>;

    /// Count the session's turns and insert the next one as a single
    /// serialized step, so two writers never claim the same number.
    async fn append_turn(
        &self,
        session_id: &str,
        speaker: Speaker,
        content: String,
        is_probe: bool,
        started_at: DateTime<Utc>,
    ) -> Result<ConversationTurn>;

    async fn turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>>;

    /// Insert or replace the answer for `(session_id, flow_item_id)`
    async fn upsert_response(&self, response: FlowResponse) -> Result<FlowResponse>;

    async fn responses(&self, session_id: &str) -> Result<Vec<FlowResponse>>;

    /// Attach finalized media to an answer, creating the answer if needed
    async fn attach_video(
        &self,
        session_id: &str,
        flow_item_id: &str,
        video: VideoMetadata,
        at: DateTime<Utc>,
    ) -> Result<FlowResponse>;

    /// Atomically bump a distribution's response counter, returning the new value
    async fn increment_distribution_responses(&self, distribution_id: &str) -> Result<u64>;
}
