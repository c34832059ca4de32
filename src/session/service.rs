use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::machine::{self, SessionPolicy};
use super::model::{
    Classification, ConversationTurn, FlowResponse, InterviewMode, InterviewSession,
    NotResumableReason, ParticipantInfo, ProgressCursor, ResumeCheck, SessionStatus,
    SessionSummary, Speaker,
};
use super::screener::{self, ScreenerAnswer, ScreenerOutcome};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::nats::{EventPublisher, SessionEventKind, SessionEventMessage};
use crate::store::InterviewStore;

/// Parameters for starting a session
#[derive(Debug, Clone)]
pub struct StartSession {
    pub study_id: String,
    pub study_type: String,
    pub mode: InterviewMode,
    pub participant: ParticipantInfo,
}

/// Partial cursor update sent with a pause
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorUpdate {
    pub section_index: Option<u32>,
    pub item_index: Option<u32>,
}

impl CursorUpdate {
    fn apply(self, current: ProgressCursor) -> Option<ProgressCursor> {
        if self.section_index.is_none() && self.item_index.is_none() {
            return None;
        }
        Some(ProgressCursor {
            section_index: self.section_index.unwrap_or(current.section_index),
            item_index: self.item_index.unwrap_or(current.item_index),
        })
    }
}

/// What a participant submits for one unit of output
#[derive(Debug, Clone)]
pub enum ResponsePayload {
    Flow {
        flow_item_id: String,
        response_type: String,
        value: serde_json::Value,
    },
    Turn {
        speaker: Speaker,
        content: String,
        is_probe: bool,
    },
}

#[derive(Debug, Clone)]
pub enum Submitted {
    Response(FlowResponse),
    Turn(ConversationTurn),
}

/// Binds the lifecycle machine to storage, time and events
pub struct SessionService {
    store: Arc<dyn InterviewStore>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Load a session or fail with `NotFound`
    pub async fn session(&self, session_id: &str) -> Result<InterviewSession> {
        self.store
            .session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
    }

    /// Create an `active` session for a study that accepts responses
    pub async fn start(&self, req: StartSession) -> Result<InterviewSession> {
        let study = self
            .store
            .study(&req.study_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("study {}", req.study_id)))?;

        if !study.status.accepts_new_sessions() {
            return Err(Error::Forbidden(
                "study is not accepting responses".to_string(),
            ));
        }

        let now = self.clock.now();
        let session = InterviewSession {
            id: uuid::Uuid::new_v4().to_string(),
            study_id: study.id,
            study_type: req.study_type,
            mode: req.mode,
            participant: req.participant,
            status: SessionStatus::Active,
            cursor: ProgressCursor::default(),
            started_at: now,
            paused_at: None,
            resumed_at: None,
            completed_at: None,
            updated_at: now,
            total_paused_secs: 0,
            pause_count: 0,
            screener_passed: None,
        };

        self.store.insert_session(session.clone()).await?;
        info!("Started session {} for study {}", session.id, session.study_id);
        self.announce(&session, SessionEventKind::Started, None, now).await;

        Ok(session)
    }

    /// Record a checkpoint. Pausing a paused session refreshes `paused_at`.
    pub async fn pause(&self, session_id: &str, cursor: CursorUpdate) -> Result<InterviewSession> {
        let mut session = self.session(session_id).await?;
        let now = self.clock.now();

        let cursor = cursor.apply(session.cursor);
        if let Err(e) = machine::pause(&mut session, cursor, now, &self.policy) {
            self.announce_if_expired(&session, &e, now).await;
            return Err(e);
        }

        self.store.update_session(&session).await?;
        info!(
            "Paused session {} (pause #{}, section {}, item {})",
            session.id, session.pause_count, session.cursor.section_index, session.cursor.item_index
        );
        self.announce(&session, SessionEventKind::Paused, None, now).await;

        Ok(session)
    }

    /// Reactivate a paused session, returning it with the ids of items
    /// already answered so the client can skip them.
    pub async fn resume(&self, session_id: &str) -> Result<(InterviewSession, Vec<String>)> {
        let mut session = self.session(session_id).await?;
        let now = self.clock.now();

        let study_status = self
            .store
            .study(&session.study_id)
            .await?
            .map(|s| s.status)
            .ok_or_else(|| Error::Forbidden("study no longer accepting responses".to_string()))?;

        if let Err(e) = machine::resume(&mut session, study_status, now, &self.policy) {
            self.announce_if_expired(&session, &e, now).await;
            return Err(e);
        }

        self.store.update_session(&session).await?;
        info!(
            "Resumed session {} (total paused {}s)",
            session.id, session.total_paused_secs
        );
        self.announce(&session, SessionEventKind::Resumed, None, now).await;

        let answered = self
            .store
            .responses(&session.id)
            .await?
            .into_iter()
            .map(|r| r.flow_item_id)
            .collect();

        Ok((session, answered))
    }

    /// Read-only classification, except that a stale `active` session is
    /// auto-paused before answering.
    pub async fn check_resumable(&self, session_id: &str) -> Result<ResumeCheck> {
        let Some(mut session) = self.store.session(session_id).await? else {
            return Ok(ResumeCheck::denied(NotResumableReason::NotFound));
        };
        let now = self.clock.now();

        if session.completed_at.is_some() {
            return Ok(ResumeCheck::denied(NotResumableReason::Completed));
        }

        if machine::auto_pause_if_stale(&mut session, now, &self.policy) {
            self.store.update_session(&session).await?;
            info!(
                "Auto-paused stale session {} (last activity {})",
                session.id,
                session.paused_at.map(|t| t.to_rfc3339()).unwrap_or_default()
            );
            self.announce(&session, SessionEventKind::AutoPaused, None, now).await;
        }

        let study_live = self
            .store
            .study(&session.study_id)
            .await?
            .is_some_and(|s| s.status.accepts_resumes());
        if !study_live {
            return Ok(ResumeCheck::denied(NotResumableReason::StudyClosed));
        }

        match machine::classify(&session, now, &self.policy) {
            Classification::Expired => Ok(ResumeCheck::denied(NotResumableReason::Expired)),
            Classification::Completed => Ok(ResumeCheck::denied(NotResumableReason::Completed)),
            Classification::Active | Classification::Paused => {
                let answered_count = self.store.responses(&session.id).await?.len();
                Ok(ResumeCheck::allowed(SessionSummary {
                    session_id: session.id,
                    study_id: session.study_id,
                    status: session.status,
                    mode: session.mode,
                    current_section_index: session.cursor.section_index,
                    current_item_index: session.cursor.item_index,
                    pause_count: session.pause_count,
                    total_paused_secs: session.total_paused_secs,
                    answered_count,
                }))
            }
        }
    }

    /// Mark a session completed. The distribution counter is best effort.
    pub async fn complete(&self, session_id: &str, distribution_id: Option<&str>) -> Result<InterviewSession> {
        let mut session = self.session(session_id).await?;
        let now = self.clock.now();

        machine::complete(&mut session, now, &self.policy)?;
        self.store.update_session(&session).await?;
        info!("Completed session {}", session.id);

        if let Some(distribution_id) = distribution_id {
            match self.store.increment_distribution_responses(distribution_id).await {
                Ok(count) => info!("Distribution {} now has {} responses", distribution_id, count),
                Err(e) => warn!(
                    "Failed to increment responses for distribution {}: {}",
                    distribution_id, e
                ),
            }
        }

        self.announce(&session, SessionEventKind::Completed, distribution_id, now)
            .await;
        Ok(session)
    }

    /// Persist one unit of participant (or interviewer) output
    pub async fn submit_response(&self, session_id: &str, payload: ResponsePayload) -> Result<Submitted> {
        let mut session = self.session(session_id).await?;
        let now = self.clock.now();

        machine::touch(&mut session, now, &self.policy)?;
        self.store.update_session(&session).await?;

        match payload {
            ResponsePayload::Flow {
                flow_item_id,
                response_type,
                value,
            } => {
                let response = self
                    .store
                    .upsert_response(FlowResponse {
                        session_id: session.id,
                        flow_item_id,
                        response_type,
                        value,
                        video: None,
                        created_at: now,
                        updated_at: now,
                    })
                    .await?;
                Ok(Submitted::Response(response))
            }
            ResponsePayload::Turn {
                speaker,
                content,
                is_probe,
            } => {
                let turn = self
                    .store
                    .append_turn(&session.id, speaker, content, is_probe, now)
                    .await?;
                Ok(Submitted::Turn(turn))
            }
        }
    }

    /// Evaluate screener answers against the owning study and store the verdict
    pub async fn submit_screener(&self, session_id: &str, answers: &[ScreenerAnswer]) -> Result<ScreenerOutcome> {
        let mut session = self.session(session_id).await?;
        let now = self.clock.now();

        let study = self.store.study(&session.study_id).await?;
        let outcome = screener::evaluate(study.as_ref().and_then(|s| s.screener.as_ref()), answers);

        machine::touch(&mut session, now, &self.policy)?;
        session.screener_passed = Some(outcome.passed);
        self.store.update_session(&session).await?;

        info!(
            "Screener for session {}: {}",
            session.id,
            if outcome.passed { "passed" } else { "disqualified" }
        );
        Ok(outcome)
    }

    async fn announce_if_expired(&self, session: &InterviewSession, err: &Error, now: DateTime<Utc>) {
        if matches!(err, Error::Expired(_)) {
            info!("Session {} expired", session.id);
            self.announce(session, SessionEventKind::Expired, None, now).await;
        }
    }

    async fn announce(
        &self,
        session: &InterviewSession,
        event: SessionEventKind,
        distribution_id: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let msg = SessionEventMessage {
            session_id: session.id.clone(),
            study_id: session.study_id.clone(),
            event,
            timestamp: now.to_rfc3339(),
            pause_count: session.pause_count,
            distribution_id: distribution_id.map(str::to_owned),
        };
        if let Err(e) = self.events.session_event(&msg).await {
            warn!("Failed to publish {} event for {}: {}", event.as_str(), session.id, e);
        }
    }
}
