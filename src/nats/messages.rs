use serde::{Deserialize, Serialize};

/// Session lifecycle transition being announced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Started,
    Paused,
    AutoPaused,
    Resumed,
    Completed,
    Expired,
}

impl SessionEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Paused => "paused",
            Self::AutoPaused => "auto_paused",
            Self::Resumed => "resumed",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

/// Session lifecycle message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionEventMessage {
    pub session_id: String,
    pub study_id: String,
    pub event: SessionEventKind,
    pub timestamp: String, // RFC3339 timestamp
    pub pause_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_id: Option<String>,
}

/// Published once a recording has been assembled and stored
#[derive(Debug, Serialize, Deserialize)]
pub struct MediaFinalizedMessage {
    pub study_id: String,
    pub participant_id: String,
    pub item_id: String,
    pub upload_session_id: String,
    pub video_url: String,
    pub total_chunks: usize,
    pub bytes: usize,
    pub timestamp: String,
}
