//! HTTP clients against a live loopback server
//!
//! Serves the real router on an ephemeral port and drives it with the
//! participant-side clients: chunked capture through `HttpChunkUploader`,
//! speech through `InterviewApiClient`, and the assembled media over `/media`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use interview_capture::audio::{InterviewApiClient, SpeechRequest, SpeechSynthesizer, Transcriber};
use interview_capture::capture::{
    AnswerTarget, CaptureDevice, CaptureSettings, ChunkedCapture, HttpChunkUploader, MediaChunk, QualityPreset,
    RetryPolicy, StopReason, UploadTarget,
};
use interview_capture::session::{Study, StudyStatus};
use interview_capture::store::{FsObjectStore, InterviewStore, MemoryStore, ObjectStore};
use interview_capture::{create_router, AppState, Config, ManualClock, MemoryCounterStore, NoopPublisher};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const MIME: &str = "video/webm";

struct FakeSpeech;

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, req: &SpeechRequest) -> interview_capture::Result<Vec<u8>> {
        Ok(format!("mp3:{}", req.text).into_bytes())
    }
}

#[async_trait]
impl Transcriber for FakeSpeech {
    async fn transcribe(&self, audio: Vec<u8>, _mime_type: &str, _session_id: &str) -> interview_capture::Result<String> {
        Ok(format!("heard {} bytes", audio.len()))
    }
}

/// Emits numbered chunks until stopped
struct TickingCamera {
    queued: VecDeque<MediaChunk>,
    next_index: usize,
    endless: bool,
}

impl TickingCamera {
    fn new(queued: usize, endless: bool) -> Self {
        Self {
            queued: (0..queued).map(|i| MediaChunk::new(chunk_bytes(i), MIME)).collect(),
            next_index: queued,
            endless,
        }
    }
}

fn chunk_bytes(index: usize) -> Vec<u8> {
    format!("<frame-{index}>").into_bytes()
}

#[async_trait]
impl CaptureDevice for TickingCamera {
    async fn acquire(&mut self, _preset: &QualityPreset) -> interview_capture::Result<()> {
        Ok(())
    }

    async fn start(&mut self, _chunk_interval: Duration) -> interview_capture::Result<()> {
        Ok(())
    }

    async fn next_chunk(&mut self) -> Option<MediaChunk> {
        if let Some(chunk) = self.queued.pop_front() {
            return Some(chunk);
        }
        if !self.endless {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let chunk = MediaChunk::new(chunk_bytes(self.next_index), MIME);
        self.next_index += 1;
        Some(chunk)
    }

    async fn stop(&mut self) -> interview_capture::Result<()> {
        self.endless = false;
        Ok(())
    }

    async fn release(&mut self) {}

    fn name(&self) -> &str {
        "ticking-camera"
    }
}

struct Server {
    base_url: String,
    objects: Arc<FsObjectStore>,
    _media: tempfile::TempDir,
}

async fn serve(serve_media: bool) -> Result<Server> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let base_url = format!("http://{addr}");

    let mut cfg = Config::default();
    cfg.service.public_base_url = format!("{base_url}/media");
    cfg.auth
        .researcher_tokens
        .insert("token-1".to_string(), "researcher-1".to_string());

    let store = Arc::new(MemoryStore::new());
    store
        .insert_study(Study {
            id: "live".to_string(),
            owner_id: "researcher-1".to_string(),
            status: StudyStatus::Live,
            title: "Onboarding".to_string(),
            screener: None,
        })
        .await?;

    let media = tempfile::tempdir()?;
    let objects = Arc::new(FsObjectStore::new(media.path()).await?);
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()));

    let mut state = AppState::new(
        &cfg,
        store,
        objects.clone(),
        Arc::new(MemoryCounterStore::new()),
        Arc::new(NoopPublisher),
        clock,
    )
    .with_speech(Arc::new(FakeSpeech), Arc::new(FakeSpeech));
    if serve_media {
        state = state.with_media_dir(media.path());
    }

    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(Server {
        base_url,
        objects,
        _media: media,
    })
}

/// Start an interview and open an upload for one of its items
async fn open_upload(server: &Server, item_id: &str) -> Result<(String, String)> {
    let client = reqwest::Client::new();

    let started: Value = client
        .post(format!("{}/start-session", server.base_url))
        .json(&json!({"study_id": "live", "study_type": "structured", "interview_mode": "video"}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let participant_id = started["session"]["id"].as_str().unwrap().to_string();

    let opened: Value = client
        .post(format!("{}/videos/start-session", server.base_url))
        .bearer_auth("token-1")
        .json(&json!({"studyId": "live", "participantId": participant_id, "itemId": item_id}))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let upload_id = opened["sessionId"].as_str().unwrap().to_string();

    Ok((participant_id, upload_id))
}

fn settings(max_duration: Duration) -> CaptureSettings {
    CaptureSettings {
        chunk_interval: Duration::from_millis(10),
        max_duration,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
        },
    }
}

#[tokio::test]
async fn test_recorded_answer_round_trip_over_http() -> Result<()> {
    let server = serve(true).await?;
    let (participant_id, upload_id) = open_upload(&server, "q1").await?;

    let uploader = Arc::new(
        HttpChunkUploader::new(UploadTarget {
            base_url: server.base_url.clone(),
            upload_session_id: upload_id.clone(),
            study_id: "live".to_string(),
            participant_id: participant_id.clone(),
        })
        .with_bearer_token("token-1"),
    );
    let target = AnswerTarget {
        upload_session_id: upload_id.clone(),
        study_id: "live".to_string(),
        participant_id: participant_id.clone(),
        item_id: "q1".to_string(),
        answer_start_offset: 3.0,
    };

    // The maximum duration ends the recording
    let (_stop_tx, stop_rx) = oneshot::channel();
    let answer = ChunkedCapture::new(TickingCamera::new(2, true), uploader.clone(), settings(Duration::from_millis(80)))
        .record_answer(None, stop_rx, uploader.as_ref(), &target)
        .await?;

    assert_eq!(answer.summary.stop_reason, StopReason::MaxDuration);
    assert!(answer.summary.total_chunks >= 2);
    assert!(answer.media.success);

    let prefix = format!("{}/media/", server.base_url);
    let key = answer
        .media
        .video_url
        .strip_prefix(&prefix)
        .expect("video url under the public base");
    assert!(key.starts_with(&format!("live/{participant_id}/q1_")));

    let expected: Vec<u8> = (0..answer.summary.total_chunks).flat_map(chunk_bytes).collect();
    assert_eq!(server.objects.get(key).await?, Some(expected.clone()));

    // The public URL resolves to the same bytes
    let served = reqwest::get(&answer.media.video_url).await?;
    assert_eq!(served.status(), reqwest::StatusCode::OK);
    assert_eq!(served.bytes().await?.to_vec(), expected);

    // Temporary chunks are gone
    let upload_prefix = format!("temp/live/{participant_id}/{upload_id}");
    assert!(server.objects.list(&upload_prefix).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_finalize_rejection_surfaces_as_upstream_error() -> Result<()> {
    let server = serve(true).await?;
    let (participant_id, upload_id) = open_upload(&server, "q2").await?;

    let uploader = Arc::new(
        HttpChunkUploader::new(UploadTarget {
            base_url: server.base_url.clone(),
            upload_session_id: upload_id.clone(),
            study_id: "live".to_string(),
            participant_id: participant_id.clone(),
        })
        .with_bearer_token("token-1"),
    );
    // Opened for q2, finalized as q3
    let target = AnswerTarget {
        upload_session_id: upload_id,
        study_id: "live".to_string(),
        participant_id,
        item_id: "q3".to_string(),
        answer_start_offset: 0.0,
    };

    let (_stop_tx, stop_rx) = oneshot::channel();
    let err = ChunkedCapture::new(TickingCamera::new(2, false), uploader.clone(), settings(Duration::from_secs(30)))
        .record_answer(None, stop_rx, uploader.as_ref(), &target)
        .await
        .unwrap_err();

    match err {
        interview_capture::Error::Upstream(msg) => assert!(msg.contains("403"), "{msg}"),
        other => panic!("expected upstream error, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_speech_client_round_trip() -> Result<()> {
    let server = serve(false).await?;
    let (participant_id, _) = open_upload(&server, "q1").await?;
    let client = InterviewApiClient::new(server.base_url.clone());

    let audio = client
        .synthesize(&SpeechRequest {
            text: "What brought you here today?".to_string(),
            voice_id: "alloy".to_string(),
            session_id: participant_id.clone(),
            language: None,
        })
        .await?;
    assert_eq!(audio, b"mp3:What brought you here today?".to_vec());

    let text = client
        .transcribe(vec![1u8; 300], "audio/webm", &participant_id)
        .await?;
    assert_eq!(text, "heard 300 bytes");

    // Unknown sessions are refused by the server
    let refused = client
        .synthesize(&SpeechRequest {
            text: "Hello".to_string(),
            voice_id: "alloy".to_string(),
            session_id: "no-such-session".to_string(),
            language: None,
        })
        .await;
    assert!(refused.is_err());
    Ok(())
}

#[tokio::test]
async fn test_media_not_served_unless_enabled() -> Result<()> {
    let server = serve(false).await?;
    server.objects.put("live/p/q1_1.webm", b"video".to_vec()).await?;

    let response = reqwest::get(format!("{}/media/live/p/q1_1.webm", server.base_url)).await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    Ok(())
}
