use axum::{
    extract::{rejection::JsonRejection, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::auth::ClientKey;
use super::state::AppState;
use crate::audio::SpeechRequest;
use crate::config::RateRule;
use crate::error::{Error, Result};
use crate::media::{FinalizeRequest, FinalizeResponse, IncomingChunk};
use crate::session::{
    CursorUpdate, InterviewMode, ParticipantInfo, ResponsePayload, ResumeCheck, ScreenerAnswer,
    ScreenerOutcome, Speaker, StartSession, Submitted,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub study_id: Option<String>,
    pub study_type: Option<String>,
    pub interview_mode: Option<String>,
    pub participant_name: Option<String>,
    pub participant_email: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PauseSessionRequest {
    pub session_id: Option<String>,
    pub current_section_index: Option<u32>,
    pub current_item_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SessionIdRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteSessionRequest {
    pub session_id: Option<String>,
    pub distribution_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnPayload {
    pub speaker: Speaker,
    pub content: String,
    #[serde(default)]
    pub is_probe: bool,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub session_id: Option<String>,
    pub flow_item_id: Option<String>,
    pub response_type: Option<String>,
    pub value: Option<Value>,
    pub conversation_turn: Option<TurnPayload>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitScreenerRequest {
    pub session_id: Option<String>,
    #[serde(default)]
    pub answers: Vec<ScreenerAnswer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadRequest {
    pub study_id: String,
    pub participant_id: String,
    pub item_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResponse {
    pub session_id: String,
    pub session_path: String,
    pub upload_endpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkResponse {
    pub success: bool,
    pub chunk_index: usize,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub text: String,
}

// ============================================================================
// Helpers
// ============================================================================

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("{field} is required")))
}

async fn admit(state: &AppState, scope: &str, rule: RateRule, client: &ClientKey) -> Result<()> {
    state
        .limiter
        .enforce(&format!("{scope}:{}", client.0), rule)
        .await?;
    Ok(())
}

// ============================================================================
// Session Handlers
// ============================================================================

/// POST /start-session
pub async fn start_session(
    State(state): State<AppState>,
    client: ClientKey,
    payload: std::result::Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    admit(&state, "start-session", state.limits.start_session, &client).await?;
    let Json(req) = payload?;

    let study_id = required(req.study_id, "study_id")?;
    let study_type = required(req.study_type, "study_type")?;
    let mode: InterviewMode = required(req.interview_mode, "interview_mode")?.parse()?;

    let session = state
        .sessions
        .start(StartSession {
            study_id,
            study_type,
            mode,
            participant: ParticipantInfo {
                name: req.participant_name,
                email: req.participant_email,
                language: req.language,
            },
        })
        .await?;

    Ok(Json(json!({ "session": session })))
}

/// POST /pause-session
pub async fn pause_session(
    State(state): State<AppState>,
    client: ClientKey,
    payload: std::result::Result<Json<PauseSessionRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    admit(&state, "session-update", state.limits.session_update, &client).await?;
    let Json(req) = payload?;
    let session_id = required(req.session_id, "session_id")?;

    let session = state
        .sessions
        .pause(
            &session_id,
            CursorUpdate {
                section_index: req.current_section_index,
                item_index: req.current_item_index,
            },
        )
        .await?;

    Ok(Json(json!({ "session": session })))
}

/// POST /resume-session
pub async fn resume_session(
    State(state): State<AppState>,
    client: ClientKey,
    payload: std::result::Result<Json<SessionIdRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    admit(&state, "session-update", state.limits.session_update, &client).await?;
    let Json(req) = payload?;
    let session_id = required(req.session_id, "session_id")?;

    let (session, answered_item_ids) = state.sessions.resume(&session_id).await?;
    Ok(Json(json!({
        "session": session,
        "answered_item_ids": answered_item_ids,
    })))
}

/// GET /check-session?session_id=...
pub async fn check_session(
    State(state): State<AppState>,
    client: ClientKey,
    Query(query): Query<SessionIdRequest>,
) -> Result<Json<ResumeCheck>> {
    admit(&state, "session-update", state.limits.session_update, &client).await?;
    let session_id = required(query.session_id, "session_id")?;

    Ok(Json(state.sessions.check_resumable(&session_id).await?))
}

/// POST /complete-session
pub async fn complete_session(
    State(state): State<AppState>,
    client: ClientKey,
    payload: std::result::Result<Json<CompleteSessionRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    admit(&state, "session-update", state.limits.session_update, &client).await?;
    let Json(req) = payload?;
    let session_id = required(req.session_id, "session_id")?;

    state
        .sessions
        .complete(&session_id, req.distribution_id.as_deref())
        .await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /submit-response
pub async fn submit_response(
    State(state): State<AppState>,
    client: ClientKey,
    payload: std::result::Result<Json<SubmitResponseRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    admit(&state, "submit-response", state.limits.submit_response, &client).await?;
    let Json(req) = payload?;
    let session_id = required(req.session_id, "session_id")?;

    let payload = match (req.conversation_turn, req.flow_item_id) {
        (Some(turn), _) => {
            if turn.content.trim().is_empty() {
                return Err(Error::Validation("conversation_turn.content is required".to_string()));
            }
            ResponsePayload::Turn {
                speaker: turn.speaker,
                content: turn.content,
                is_probe: turn.is_probe,
            }
        }
        (None, Some(flow_item_id)) => ResponsePayload::Flow {
            flow_item_id,
            response_type: req.response_type.unwrap_or_else(|| "text".to_string()),
            value: req.value.unwrap_or(Value::Null),
        },
        (None, None) => {
            return Err(Error::Validation(
                "either flow_item_id or conversation_turn is required".to_string(),
            ))
        }
    };

    match state.sessions.submit_response(&session_id, payload).await? {
        Submitted::Response(response) => Ok(Json(json!({ "response": response }))),
        Submitted::Turn(turn) => Ok(Json(json!({ "turn": turn }))),
    }
}

/// POST /submit-screener
pub async fn submit_screener(
    State(state): State<AppState>,
    client: ClientKey,
    payload: std::result::Result<Json<SubmitScreenerRequest>, JsonRejection>,
) -> Result<Json<ScreenerOutcome>> {
    admit(&state, "session-update", state.limits.session_update, &client).await?;
    let Json(req) = payload?;
    let session_id = required(req.session_id, "session_id")?;

    Ok(Json(
        state
            .sessions
            .submit_screener(&session_id, &req.answers)
            .await?,
    ))
}

// ============================================================================
// Media Handlers
// ============================================================================

/// POST /videos/start-session
/// Open an upload session (researcher only)
pub async fn start_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<StartUploadRequest>, JsonRejection>,
) -> Result<Json<StartUploadResponse>> {
    let researcher_id = state.researchers.authenticate(&headers)?;
    let Json(req) = payload?;

    let study = state
        .store
        .study(&req.study_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("study {}", req.study_id)))?;
    if study.owner_id != researcher_id {
        return Err(Error::Forbidden(format!("study {} is not yours", req.study_id)));
    }

    let upload = state
        .uploads
        .start(&req.study_id, &req.participant_id, &req.item_id)
        .await?;

    Ok(Json(StartUploadResponse {
        session_path: upload.chunk_prefix(),
        session_id: upload.id,
        upload_endpoint: "/videos/upload-chunk".to_string(),
    }))
}

/// POST /videos/upload-chunk (multipart)
pub async fn upload_chunk(
    State(state): State<AppState>,
    client: ClientKey,
    mut multipart: Multipart,
) -> Result<Json<UploadChunkResponse>> {
    admit(&state, "upload-chunk", state.limits.upload_chunk, &client).await?;

    let mut chunk = None;
    let mut index = None;
    let mut session_id = None;
    let mut study_id = None;
    let mut participant_id = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chunk" => {
                let mime_type = field.content_type().unwrap_or("video/webm").to_string();
                let data = field.bytes().await?;
                if data.len() > state.limits.chunk_max_bytes {
                    return Err(Error::PayloadTooLarge(format!(
                        "chunk exceeds {} bytes",
                        state.limits.chunk_max_bytes
                    )));
                }
                chunk = Some((data.to_vec(), mime_type));
            }
            "chunkIndex" => index = Some(field.text().await?),
            "sessionId" => session_id = Some(field.text().await?),
            "studyId" => study_id = Some(field.text().await?),
            "participantId" => participant_id = Some(field.text().await?),
            _ => {}
        }
    }

    let (data, mime_type) = chunk.ok_or_else(|| Error::Validation("chunk is required".to_string()))?;
    let index = required(index, "chunkIndex")?
        .parse::<usize>()
        .map_err(|_| Error::Validation("chunkIndex must be a non-negative integer".to_string()))?;

    let stored = state
        .uploads
        .store_chunk(IncomingChunk {
            upload_session_id: required(session_id, "sessionId")?,
            study_id: required(study_id, "studyId")?,
            participant_id: required(participant_id, "participantId")?,
            index,
            mime_type,
            data,
        })
        .await?;

    Ok(Json(UploadChunkResponse {
        success: true,
        chunk_index: stored,
    }))
}

/// POST /videos/finalize
/// Assemble an upload session's chunks (researcher only)
pub async fn finalize_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Json<FinalizeResponse>> {
    let researcher_id = state.researchers.authenticate(&headers)?;
    let Json(req) = payload?;

    info!(
        "Finalizing upload {} ({} chunks) for {}",
        req.session_id, req.total_chunks, researcher_id
    );
    Ok(Json(state.finalizer.finalize(&researcher_id, req).await?))
}

// ============================================================================
// Speech Handlers
// ============================================================================

/// POST /ai/synthesize
/// Returns mp3 audio for the interviewer's line
pub async fn synthesize(
    State(state): State<AppState>,
    client: ClientKey,
    payload: std::result::Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response> {
    admit(&state, "synthesize", state.limits.synthesize, &client).await?;
    let Json(req) = payload?;

    if req.text.trim().is_empty() {
        return Err(Error::Validation("text is required".to_string()));
    }
    state.validator.require(Some(req.session_id.as_str())).await?;

    let synthesizer = state
        .synthesizer
        .as_ref()
        .ok_or_else(|| Error::Config("speech synthesis is not configured".to_string()))?;
    let audio = synthesizer.synthesize(&req).await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

/// POST /ai/transcribe (multipart: audio, session_id)
pub async fn transcribe(
    State(state): State<AppState>,
    client: ClientKey,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>> {
    admit(&state, "transcribe", state.limits.transcribe, &client).await?;

    let mut audio = None;
    let mut session_id = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let mime_type = field.content_type().unwrap_or("audio/webm").to_string();
                let data = field.bytes().await?;
                if data.len() > state.limits.transcribe_max_bytes {
                    return Err(Error::PayloadTooLarge(format!(
                        "audio exceeds {} bytes",
                        state.limits.transcribe_max_bytes
                    )));
                }
                audio = Some((data.to_vec(), mime_type));
            }
            "session_id" => session_id = Some(field.text().await?),
            _ => {}
        }
    }

    let session_id = required(session_id, "session_id")?;
    state.validator.require(Some(session_id.as_str())).await?;
    let (data, mime_type) = audio.ok_or_else(|| Error::Validation("audio is required".to_string()))?;
    if data.is_empty() {
        return Err(Error::Validation("audio is empty".to_string()));
    }

    let transcriber = state
        .transcriber
        .as_ref()
        .ok_or_else(|| Error::Config("transcription is not configured".to_string()))?;
    let text = transcriber.transcribe(data, &mime_type, &session_id).await?;

    Ok(Json(TranscribeResponse { text }))
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
