use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::upload::{MediaUploadSession, UploadRegistry};
use super::layout;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::nats::{EventPublisher, MediaFinalizedMessage};
use crate::session::VideoMetadata;
use crate::store::{InterviewStore, ObjectStore};

/// Body of `POST videos/finalize`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub session_id: String,
    pub study_id: String,
    pub participant_id: String,
    pub item_id: String,
    pub total_chunks: usize,
    /// Seconds
    pub total_duration: f64,
    pub answer_start_offset: f64,
    pub answer_end_offset: f64,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub success: bool,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
}

/// Assembles uploaded chunks into one durable media object
pub struct Finalizer {
    registry: Arc<UploadRegistry>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn InterviewStore>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    public_base_url: String,
}

impl Finalizer {
    pub fn new(
        registry: Arc<UploadRegistry>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn InterviewStore>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            objects,
            store,
            events,
            clock,
            public_base_url: public_base_url.into(),
        }
    }

    /// Check ownership, gather chunks `0..total_chunks` by index, store the
    /// concatenation, record metadata and delete the temporary chunks.
    ///
    /// A missing chunk fails the whole call and leaves the temporary chunks
    /// in place so the client can re-send and try again.
    pub async fn finalize(&self, researcher_id: &str, req: FinalizeRequest) -> Result<FinalizeResponse> {
        if req.total_chunks == 0 {
            return Err(Error::Validation("totalChunks must be at least 1".to_string()));
        }

        let study = self
            .store
            .study(&req.study_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("study {}", req.study_id)))?;
        if study.owner_id != researcher_id {
            return Err(Error::Forbidden(format!("study {} is not yours", req.study_id)));
        }

        let upload = self
            .registry
            .open_session(&req.session_id, &req.study_id, &req.participant_id)
            .await?;
        if upload.item_id != req.item_id {
            return Err(Error::Forbidden(format!(
                "upload session {} was opened for item {}",
                upload.id, upload.item_id
            )));
        }

        let assembled = self.gather(&upload, req.total_chunks).await?;
        let bytes = assembled.len();

        let format = req
            .format
            .clone()
            .unwrap_or_else(|| upload.extension().to_string());
        let now = self.clock.now();
        let key = layout::final_key(
            &req.study_id,
            &req.participant_id,
            &req.item_id,
            now.timestamp_millis(),
            &format,
        );
        self.objects.put(&key, assembled).await?;
        let video_url = format!("{}/{}", self.public_base_url.trim_end_matches('/'), key);

        info!(
            "Assembled {} chunks ({} bytes) for upload {} into {}",
            req.total_chunks, bytes, upload.id, key
        );

        let metadata = VideoMetadata {
            url: video_url.clone(),
            duration_secs: req.total_duration,
            resolution: req.resolution.clone(),
            format,
            answer_start_offset: req.answer_start_offset,
            answer_end_offset: req.answer_end_offset,
        };
        if let Err(e) = self
            .store
            .attach_video(&req.participant_id, &req.item_id, metadata, now)
            .await
        {
            // The media is stored; losing the metadata must not lose the answer
            error!(
                "Failed to record video metadata for {}/{}: {}",
                req.participant_id, req.item_id, e
            );
        }

        self.cleanup(&upload).await;
        self.registry.mark_finalized(&upload.id).await;

        let msg = MediaFinalizedMessage {
            study_id: req.study_id.clone(),
            participant_id: req.participant_id.clone(),
            item_id: req.item_id.clone(),
            upload_session_id: upload.id.clone(),
            video_url: video_url.clone(),
            total_chunks: req.total_chunks,
            bytes,
            timestamp: now.to_rfc3339(),
        };
        if let Err(e) = self.events.media_finalized(&msg).await {
            warn!("Failed to publish media.finalized for {}: {}", upload.id, e);
        }

        Ok(FinalizeResponse {
            success: true,
            video_url,
            thumbnail_url: None,
        })
    }

    /// Download every chunk and concatenate them in index order
    async fn gather(&self, upload: &MediaUploadSession, total_chunks: usize) -> Result<Vec<u8>> {
        let downloads = (0..total_chunks).map(|index| {
            let key = upload.chunk_key(index);
            async move {
                self.objects.get(&key).await?.ok_or_else(|| {
                    Error::Validation(format!(
                        "chunk {index} of {total_chunks} is missing for upload {}",
                        upload.id
                    ))
                })
            }
        });

        // try_join_all keeps input order, whatever order the reads finish in
        let chunks = try_join_all(downloads).await?;
        Ok(chunks.concat())
    }

    async fn cleanup(&self, upload: &MediaUploadSession) {
        let prefix = upload.chunk_prefix();
        let keys = match self.objects.list(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list temporary chunks under {}: {}", prefix, e);
                return;
            }
        };

        let mut deleted = 0;
        for key in keys {
            match self.objects.delete(&key).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Failed to delete temporary chunk {}: {}", key, e),
            }
        }
        info!("Removed {} temporary chunks under {}", deleted, prefix);
    }
}
