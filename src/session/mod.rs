//! Interview session continuity
//!
//! This module owns the `InterviewSession` lifecycle:
//! - Data model for studies, sessions, turns and answers
//! - Pure transition functions (start/pause/resume/complete/check)
//! - Staleness auto-pause and the resumability window
//! - `SessionService`, which binds transitions to storage and events

pub mod machine;
mod model;
pub mod screener;
mod service;

pub use machine::SessionPolicy;
pub use model::{
    Classification, ConversationTurn, FlowResponse, InterviewMode, InterviewSession,
    NotResumableReason, ParticipantInfo, ProgressCursor, ResumeCheck, Screener,
    ScreenerQuestion, SessionStatus, SessionSummary, Speaker, Study, StudyStatus, VideoMetadata,
};
pub use screener::{AnswerValue, ScreenerAnswer, ScreenerOutcome};
pub use service::{CursorUpdate, ResponsePayload, SessionService, StartSession, Submitted};
