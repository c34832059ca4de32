use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use super::device::MediaChunk;
use crate::error::{Error, Result};
use crate::media::layout;
use crate::media::{FinalizeRequest, FinalizeResponse};

/// Sends one chunk to durable temporary storage
#[async_trait]
pub trait ChunkUploader: Send + Sync {
    async fn upload(&self, index: usize, chunk: &MediaChunk) -> Result<()>;
}

/// Assembles a fully uploaded recording into its final media object
#[async_trait]
pub trait RecordingFinalizer: Send + Sync {
    async fn finalize(&self, req: &FinalizeRequest) -> Result<FinalizeResponse>;
}

/// Where a recording's chunks go on the server
#[derive(Debug, Clone)]
pub struct UploadTarget {
    /// Service base URL, e.g. "https://interviews.example.com"
    pub base_url: String,
    pub upload_session_id: String,
    pub study_id: String,
    pub participant_id: String,
}

/// Uploads chunks to `POST videos/upload-chunk` as multipart forms
pub struct HttpChunkUploader {
    client: reqwest::Client,
    target: UploadTarget,
    bearer_token: Option<String>,
}

impl HttpChunkUploader {
    pub fn new(target: UploadTarget) -> Self {
        Self {
            client: reqwest::Client::new(),
            target,
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.target.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl RecordingFinalizer for HttpChunkUploader {
    /// Report the drained recording to `POST videos/finalize`
    async fn finalize(&self, req: &FinalizeRequest) -> Result<FinalizeResponse> {
        let response = self
            .authorize(self.client.post(self.url("videos/finalize")))
            .json(req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("finalize failed ({status}): {body}")));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChunkUploader for HttpChunkUploader {
    async fn upload(&self, index: usize, chunk: &MediaChunk) -> Result<()> {
        let ext = layout::extension_for(&chunk.mime_type);
        let part = Part::bytes(chunk.data.clone())
            .file_name(format!("chunk_{index:06}.{ext}"))
            .mime_str(&chunk.mime_type)?;

        let form = Form::new()
            .part("chunk", part)
            .text("chunkIndex", index.to_string())
            .text("sessionId", self.target.upload_session_id.clone())
            .text("studyId", self.target.study_id.clone())
            .text("participantId", self.target.participant_id.clone());

        let response = self
            .authorize(self.client.post(self.url("videos/upload-chunk")))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("chunk {index} rejected with {status}")));
        }

        debug!("Uploaded chunk {} ({} bytes)", index, chunk.len());
        Ok(())
    }
}
