//! Speech providers
//!
//! `OpenAiSpeech` talks to an OpenAI-compatible API from the server.
//! `InterviewApiClient` is the participant side: it calls this service's own
//! `ai/synthesize` and `ai/transcribe` endpoints, which keep the provider key
//! off the client.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::SpeechConfig;
use crate::error::{Error, Result};

const DEFAULT_VOICE: &str = "alloy";

/// Body of `POST ai/synthesize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Text to encoded audio (mp3)
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, req: &SpeechRequest) -> Result<Vec<u8>>;
}

/// Encoded audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str, session_id: &str) -> Result<String>;
}

#[derive(Deserialize)]
struct TranscriptResponse {
    text: String,
}

fn file_name_for(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or_default().trim() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "audio.wav",
        "audio/mpeg" | "audio/mp3" => "audio.mp3",
        "audio/ogg" => "audio.ogg",
        "audio/mp4" | "audio/m4a" => "audio.m4a",
        _ => "audio.webm",
    }
}

fn upstream(context: &str, e: impl std::fmt::Display) -> Error {
    error!("{} request failed: {}", context, e);
    Error::Upstream(format!("{context} request failed"))
}

async fn check_status(context: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("{} API error {}: {}", context, status, body);
    Err(Error::Upstream(format!("{context} API error {status}")))
}

/// OpenAI-compatible TTS and Whisper transcription
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    tts_model: String,
    stt_model: String,
}

impl OpenAiSpeech {
    pub fn new(cfg: &SpeechConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("speech.api_key is required for speech".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            tts_model: cfg.tts_model.clone(),
            stt_model: cfg.stt_model.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, req: &SpeechRequest) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
        }

        let voice = if req.voice_id.is_empty() {
            DEFAULT_VOICE
        } else {
            req.voice_id.as_str()
        };
        debug!(
            "Synthesizing {} chars for session {} with voice {}",
            req.text.len(),
            req.session_id,
            voice
        );

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&TtsRequest {
                model: &self.tts_model,
                input: &req.text,
                voice,
            })
            .send()
            .await
            .map_err(|e| upstream("TTS", e))?;

        let audio = check_status("TTS", response)
            .await?
            .bytes()
            .await
            .map_err(|e| upstream("TTS", e))?;
        info!("Synthesized {} bytes of speech for session {}", audio.len(), req.session_id);
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Transcriber for OpenAiSpeech {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str, session_id: &str) -> Result<String> {
        debug!("Transcribing {} bytes for session {}", audio.len(), session_id);

        let part = Part::bytes(audio)
            .file_name(file_name_for(mime_type))
            .mime_str(mime_type)
            .map_err(|e| Error::Validation(format!("invalid audio content type: {e}")))?;
        let form = Form::new().part("file", part).text("model", self.stt_model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| upstream("Transcription", e))?;

        let result: TranscriptResponse = check_status("Transcription", response)
            .await?
            .json()
            .await
            .map_err(|e| upstream("Transcription", e))?;
        info!("Transcribed {} chars for session {}", result.text.len(), session_id);
        Ok(result.text)
    }
}

/// Participant-side client for this service's speech endpoints
pub struct InterviewApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl InterviewApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for InterviewApiClient {
    async fn synthesize(&self, req: &SpeechRequest) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/ai/synthesize", self.base_url))
            .json(req)
            .send()
            .await
            .map_err(|e| upstream("Synthesize", e))?;
        let audio = check_status("Synthesize", response)
            .await?
            .bytes()
            .await
            .map_err(|e| upstream("Synthesize", e))?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Transcriber for InterviewApiClient {
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str, session_id: &str) -> Result<String> {
        let part = Part::bytes(audio)
            .file_name(file_name_for(mime_type))
            .mime_str(mime_type)
            .map_err(|e| Error::Validation(format!("invalid audio content type: {e}")))?;
        let form = Form::new()
            .part("audio", part)
            .text("session_id", session_id.to_string());

        let response = self
            .client
            .post(format!("{}/ai/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| upstream("Transcribe", e))?;
        let result: TranscriptResponse = check_status("Transcribe", response)
            .await?
            .json()
            .await
            .map_err(|e| upstream("Transcribe", e))?;
        Ok(result.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_follows_mime_type() {
        assert_eq!(file_name_for("audio/wav"), "audio.wav");
        assert_eq!(file_name_for("audio/webm;codecs=opus"), "audio.webm");
        assert_eq!(file_name_for("audio/mpeg"), "audio.mp3");
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let cfg = SpeechConfig::default();
        assert!(matches!(OpenAiSpeech::new(&cfg), Err(Error::Config(_))));
    }
}
