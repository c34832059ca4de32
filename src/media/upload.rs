use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::layout;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// Server-side manifest of one in-progress recording
#[derive(Debug, Clone, Serialize)]
pub struct MediaUploadSession {
    pub id: String,
    pub study_id: String,
    pub participant_id: String,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
    /// Taken from the first chunk's content type
    pub extension: Option<String>,
    /// Indices that reached temporary storage
    pub received: BTreeSet<usize>,
    pub finalized: bool,
}

impl MediaUploadSession {
    pub fn chunk_prefix(&self) -> String {
        layout::chunk_prefix(&self.study_id, &self.participant_id, &self.id)
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(layout::DEFAULT_EXTENSION)
    }

    pub fn chunk_key(&self, index: usize) -> String {
        layout::chunk_key(&self.study_id, &self.participant_id, &self.id, index, self.extension())
    }
}

/// One chunk as received from the client
#[derive(Debug, Clone)]
pub struct IncomingChunk {
    pub upload_session_id: String,
    pub study_id: String,
    pub participant_id: String,
    pub index: usize,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Tracks upload sessions and writes their chunks to temporary storage
pub struct UploadRegistry {
    sessions: RwLock<HashMap<String, MediaUploadSession>>,
    objects: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
}

impl UploadRegistry {
    pub fn new(objects: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            objects,
            clock,
        }
    }

    /// Open an upload session scoped to (study, participant, item)
    pub async fn start(&self, study_id: &str, participant_id: &str, item_id: &str) -> Result<MediaUploadSession> {
        layout::validate_segment("studyId", study_id)?;
        layout::validate_segment("participantId", participant_id)?;
        layout::validate_segment("itemId", item_id)?;

        let session = MediaUploadSession {
            id: uuid::Uuid::new_v4().to_string(),
            study_id: study_id.to_string(),
            participant_id: participant_id.to_string(),
            item_id: item_id.to_string(),
            created_at: self.clock.now(),
            extension: None,
            received: BTreeSet::new(),
            finalized: false,
        };

        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        info!(
            "Upload session {} opened for study {} participant {} item {}",
            session.id, study_id, participant_id, item_id
        );
        Ok(session)
    }

    pub async fn get(&self, upload_session_id: &str) -> Option<MediaUploadSession> {
        self.sessions.read().await.get(upload_session_id).cloned()
    }

    /// Look up an open session that belongs to the given study and participant
    pub async fn open_session(
        &self,
        upload_session_id: &str,
        study_id: &str,
        participant_id: &str,
    ) -> Result<MediaUploadSession> {
        let session = self
            .get(upload_session_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("upload session {upload_session_id}")))?;

        if session.study_id != study_id || session.participant_id != participant_id {
            return Err(Error::Forbidden(format!(
                "upload session {upload_session_id} belongs to a different study or participant"
            )));
        }
        if session.finalized {
            return Err(Error::Conflict(format!(
                "upload session {upload_session_id} is already finalized"
            )));
        }
        Ok(session)
    }

    /// Write a chunk to temporary storage. Re-sending an index overwrites it.
    pub async fn store_chunk(&self, chunk: IncomingChunk) -> Result<usize> {
        let mut session = self
            .open_session(&chunk.upload_session_id, &chunk.study_id, &chunk.participant_id)
            .await?;

        if session.extension.is_none() {
            session.extension = Some(layout::extension_for(&chunk.mime_type).to_string());
        }
        let key = session.chunk_key(chunk.index);
        let bytes = chunk.data.len();
        self.objects.put(&key, chunk.data).await?;

        let mut sessions = self.sessions.write().await;
        if let Some(stored) = sessions.get_mut(&chunk.upload_session_id) {
            stored.extension.get_or_insert_with(|| session.extension().to_string());
            stored.received.insert(chunk.index);
        }

        debug!(
            "Stored chunk {} for upload {} ({} bytes)",
            chunk.index, chunk.upload_session_id, bytes
        );
        Ok(chunk.index)
    }

    /// Forget finalized sessions and reclaim sessions older than `max_age`
    /// that were never finalized, deleting their temporary chunks.
    /// Returns how many sessions were removed.
    pub async fn sweep(&self, max_age: chrono::Duration) -> Result<usize> {
        let cutoff = self.clock.now() - max_age;
        let (finalized, abandoned) = {
            let mut sessions = self.sessions.write().await;
            let expired: Vec<String> = sessions
                .values()
                .filter(|s| s.finalized || s.created_at < cutoff)
                .map(|s| s.id.clone())
                .collect();

            let mut finalized = 0;
            let mut abandoned = Vec::new();
            for id in expired {
                if let Some(session) = sessions.remove(&id) {
                    if session.finalized {
                        finalized += 1;
                    } else {
                        abandoned.push(session);
                    }
                }
            }
            (finalized, abandoned)
        };

        for session in &abandoned {
            let prefix = session.chunk_prefix();
            let keys = match self.objects.list(&prefix).await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!("Failed to list abandoned chunks under {}: {}", prefix, e);
                    continue;
                }
            };
            let mut deleted = 0;
            for key in keys {
                match self.objects.delete(&key).await {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!("Failed to delete abandoned chunk {}: {}", key, e),
                }
            }
            info!(
                "Reclaimed abandoned upload {} from {} ({} chunks)",
                session.id,
                session.created_at.to_rfc3339(),
                deleted
            );
        }

        Ok(finalized + abandoned.len())
    }

    /// Close a session for good; later chunks are rejected with `Conflict`
    pub async fn mark_finalized(&self, upload_session_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(upload_session_id) {
            session.finalized = true;
            session.received.clear();
        }
    }
}
