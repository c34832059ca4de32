use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ============================================================================
// Studies
// ============================================================================

/// Publication status of a study, owned by the authoring side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyStatus {
    Draft,
    ReadyForTest,
    Tested,
    Live,
    Paused,
    Closed,
    Archived,
}

impl StudyStatus {
    /// Whether new sessions may be started against a study in this status
    pub fn accepts_new_sessions(self) -> bool {
        matches!(
            self,
            Self::Live | Self::ReadyForTest | Self::Tested | Self::Draft | Self::Paused
        )
    }

    /// Only live studies let paused sessions come back
    pub fn accepts_resumes(self) -> bool {
        self == Self::Live
    }
}

/// A screener question and the answer values that qualify a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerQuestion {
    pub id: String,
    pub qualifying: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Screener {
    pub questions: Vec<ScreenerQuestion>,
    /// Where disqualified participants are sent
    pub disqualify_redirect_url: Option<String>,
}

/// The parts of a study this subsystem reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub id: String,
    /// Researcher that owns the study
    pub owner_id: String,
    pub status: StudyStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub screener: Option<Screener>,
}

// ============================================================================
// Sessions
// ============================================================================

/// Stored session status. `expired` is never stored, see [`Classification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// How the participant answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewMode {
    Text,
    Voice,
    Video,
}

impl FromStr for InterviewMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "video" => Ok(Self::Video),
            other => Err(Error::Validation(format!("unknown interview_mode: {other}"))),
        }
    }
}

/// Optional participant details collected at start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub language: Option<String>,
}

/// Position within a structured study
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCursor {
    pub section_index: u32,
    pub item_index: u32,
}

/// One participant attempt at a study
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: String,
    pub study_id: String,
    pub study_type: String,
    pub mode: InterviewMode,
    pub participant: ParticipantInfo,
    pub status: SessionStatus,
    pub cursor: ProgressCursor,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Last time anything touched the session
    pub updated_at: DateTime<Utc>,
    /// Cumulative paused time in seconds, only ever grows
    pub total_paused_secs: i64,
    pub pause_count: u32,
    pub screener_passed: Option<bool>,
}

/// Read-time classification of a session, including the derived `expired`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Active,
    Paused,
    Completed,
    Expired,
}

/// Why a session cannot be resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotResumableReason {
    NotFound,
    Completed,
    StudyClosed,
    Expired,
}

/// Compact view returned when a session can be resumed
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub study_id: String,
    pub status: SessionStatus,
    pub mode: InterviewMode,
    pub current_section_index: u32,
    pub current_item_index: u32,
    pub pause_count: u32,
    pub total_paused_secs: i64,
    pub answered_count: usize,
}

/// Outcome of `check_resumable`
#[derive(Debug, Clone, Serialize)]
pub struct ResumeCheck {
    pub resumable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NotResumableReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_summary: Option<SessionSummary>,
}

impl ResumeCheck {
    pub fn denied(reason: NotResumableReason) -> Self {
        Self {
            resumable: false,
            reason: Some(reason),
            session_summary: None,
        }
    }

    pub fn allowed(summary: SessionSummary) -> Self {
        Self {
            resumable: true,
            reason: None,
            session_summary: Some(summary),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Ai,
    Participant,
}

/// One utterance in a free-form voice interview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_id: String,
    /// Strictly increasing per session, starting at 1
    pub turn_number: u32,
    pub speaker: Speaker,
    pub content: String,
    pub is_probe: bool,
    pub started_at: DateTime<Utc>,
}

/// Media attached to a structured answer once finalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub url: String,
    pub duration_secs: f64,
    pub resolution: Option<String>,
    pub format: String,
    /// Offsets relative to the question start, in seconds
    pub answer_start_offset: f64,
    pub answer_end_offset: f64,
}

/// One answered item in a structured study
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResponse {
    pub session_id: String,
    pub flow_item_id: String,
    pub response_type: String,
    /// Text, selection, rating or ranking payload
    pub value: serde_json::Value,
    pub video: Option<VideoMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
