use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

use super::InterviewStore;
use crate::error::{Error, Result};
use crate::session::{ConversationTurn, FlowResponse, InterviewSession, Speaker, Study, VideoMetadata};

#[derive(Default)]
struct Tables {
    studies: HashMap<String, Study>,
    sessions: HashMap<String, InterviewSession>,
    /// session_id -> turns in insertion order
    turns: HashMap<String, Vec<ConversationTurn>>,
    /// (session_id, flow_item_id) -> response
    responses: HashMap<(String, String), FlowResponse>,
    distributions: HashMap<String, u64>,
}

/// In-process row store for single-instance deployments and tests
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed studies from a JSON array file
    pub async fn load_studies(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let studies: Vec<Study> = serde_json::from_slice(&raw)?;
        let count = studies.len();

        let mut tables = self.tables.write().await;
        for study in studies {
            tables.studies.insert(study.id.clone(), study);
        }

        info!("Seeded {} studies from {}", count, path.display());
        Ok(count)
    }

    pub async fn distribution_responses(&self, distribution_id: &str) -> u64 {
        let tables = self.tables.read().await;
        tables.distributions.get(distribution_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn study(&self, study_id: &str) -> Result<Option<Study>> {
        let tables = self.tables.read().await;
        Ok(tables.studies.get(study_id).cloned())
    }

    async fn insert_study(&self, study: Study) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.studies.insert(study.id.clone(), study);
        Ok(())
    }

    async fn insert_session(&self, session: InterviewSession) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.id) {
            return Err(Error::Conflict(format!("session {} already exists", session.id)));
        }
        tables.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn session(&self, session_id: &str) -> Result<Option<InterviewSession>> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(session_id).cloned())
    }

    async fn update_session(&self, session: &InterviewSession) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("session {}", session.id))),
        }
    }

    async fn append_turn(
        &self,
        session_id: &str,
        speaker: Speaker,
        content: String,
        is_probe: bool,
        started_at: DateTime<Utc>,
    ) -> Result<ConversationTurn> {
        // Count and insert under the same write guard
        let mut tables = self.tables.write().await;
        let turns = tables.turns.entry(session_id.to_string()).or_default();

        let turn = ConversationTurn {
            session_id: session_id.to_string(),
            turn_number: turns.len() as u32 + 1,
            speaker,
            content,
            is_probe,
            started_at,
        };
        turns.push(turn.clone());
        Ok(turn)
    }

    async fn turns(&self, session_id: &str) -> Result<Vec<ConversationTurn>> {
        let tables = self.tables.read().await;
        Ok(tables.turns.get(session_id).cloned().unwrap_or_default())
    }

    async fn upsert_response(&self, response: FlowResponse) -> Result<FlowResponse> {
        let mut tables = self.tables.write().await;
        let key = (response.session_id.clone(), response.flow_item_id.clone());

        let stored = match tables.responses.remove(&key) {
            // Keep media that already landed for this item
            Some(existing) => FlowResponse {
                created_at: existing.created_at,
                video: response.video.or(existing.video),
                ..response
            },
            None => response,
        };
        tables.responses.insert(key, stored.clone());
        Ok(stored)
    }

    async fn responses(&self, session_id: &str) -> Result<Vec<FlowResponse>> {
        let tables = self.tables.read().await;
        let mut out: Vec<FlowResponse> = tables
            .responses
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn attach_video(
        &self,
        session_id: &str,
        flow_item_id: &str,
        video: VideoMetadata,
        at: DateTime<Utc>,
    ) -> Result<FlowResponse> {
        let mut tables = self.tables.write().await;
        if !tables.sessions.contains_key(session_id) {
            return Err(Error::NotFound(format!("session {session_id}")));
        }

        let key = (session_id.to_string(), flow_item_id.to_string());
        let response = tables.responses.entry(key).or_insert_with(|| FlowResponse {
            session_id: session_id.to_string(),
            flow_item_id: flow_item_id.to_string(),
            response_type: "video".to_string(),
            value: serde_json::Value::Null,
            video: None,
            created_at: at,
            updated_at: at,
        });
        response.video = Some(video);
        response.updated_at = at;
        Ok(response.clone())
    }

    async fn increment_distribution_responses(&self, distribution_id: &str) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let count = tables
            .distributions
            .entry(distribution_id.to_string())
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
