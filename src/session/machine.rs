//! Session lifecycle transitions
//!
//! Pure functions over [`InterviewSession`]: every transition takes the
//! current time explicitly and either mutates the record or returns the
//! reason it refused. Storage, clocks and events live in [`super::service`].

use chrono::{DateTime, Duration, Utc};

use super::model::{Classification, InterviewSession, ProgressCursor, SessionStatus, StudyStatus};
use crate::config::SessionPolicyConfig;
use crate::error::{Error, Result};

/// Thresholds the machine is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub staleness: Duration,
    pub max_pause: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from(&SessionPolicyConfig::default())
    }
}

impl From<&SessionPolicyConfig> for SessionPolicy {
    fn from(cfg: &SessionPolicyConfig) -> Self {
        Self {
            staleness: cfg.staleness(),
            max_pause: cfg.max_pause(),
        }
    }
}

/// Classify a stored session at `now`. `Expired` is derived, never stored.
pub fn classify(session: &InterviewSession, now: DateTime<Utc>, policy: &SessionPolicy) -> Classification {
    if session.completed_at.is_some() || session.status == SessionStatus::Completed {
        return Classification::Completed;
    }
    match session.status {
        SessionStatus::Active => Classification::Active,
        SessionStatus::Paused => {
            if pause_window_exceeded(session, now, policy) {
                Classification::Expired
            } else {
                Classification::Paused
            }
        }
        SessionStatus::Completed => Classification::Completed,
    }
}

fn pause_window_exceeded(session: &InterviewSession, now: DateTime<Utc>, policy: &SessionPolicy) -> bool {
    session
        .paused_at
        .is_some_and(|paused_at| now - paused_at > policy.max_pause)
}

/// Reject transitions on terminal sessions
fn ensure_open(session: &InterviewSession, now: DateTime<Utc>, policy: &SessionPolicy) -> Result<()> {
    match classify(session, now, policy) {
        Classification::Completed => Err(Error::InvalidState(format!(
            "session {} is already completed",
            session.id
        ))),
        Classification::Expired => Err(Error::Expired(format!(
            "session {} can no longer be resumed",
            session.id
        ))),
        Classification::Active | Classification::Paused => Ok(()),
    }
}

/// Pause, or refresh `paused_at` on an already paused session.
pub fn pause(
    session: &mut InterviewSession,
    cursor: Option<ProgressCursor>,
    now: DateTime<Utc>,
    policy: &SessionPolicy,
) -> Result<()> {
    ensure_open(session, now, policy)?;

    session.status = SessionStatus::Paused;
    session.paused_at = Some(now);
    session.pause_count += 1;
    if let Some(cursor) = cursor {
        session.cursor = cursor;
    }
    session.updated_at = now;
    Ok(())
}

/// Whether an active session has gone quiet for longer than the staleness threshold
pub fn is_stale(session: &InterviewSession, now: DateTime<Utc>, policy: &SessionPolicy) -> bool {
    session.status == SessionStatus::Active
        && session.completed_at.is_none()
        && now - session.updated_at > policy.staleness
}

/// Treat silence as an implicit pause. The pause is dated from the last
/// activity so the resume window measures from abandonment.
///
/// Returns true when the session was transitioned.
pub fn auto_pause_if_stale(session: &mut InterviewSession, now: DateTime<Utc>, policy: &SessionPolicy) -> bool {
    if !is_stale(session, now, policy) {
        return false;
    }
    session.status = SessionStatus::Paused;
    session.paused_at = Some(session.updated_at);
    session.pause_count += 1;
    session.updated_at = now;
    true
}

/// Resume a paused session. Guards run in order: paused, study live, window.
pub fn resume(
    session: &mut InterviewSession,
    study_status: StudyStatus,
    now: DateTime<Utc>,
    policy: &SessionPolicy,
) -> Result<()> {
    if session.status != SessionStatus::Paused || session.completed_at.is_some() {
        return Err(Error::InvalidState(format!(
            "session {} is not paused (status: {})",
            session.id, session.status
        )));
    }

    if !study_status.accepts_resumes() {
        return Err(Error::Forbidden(
            "study no longer accepting responses".to_string(),
        ));
    }

    let paused_at = session.paused_at.unwrap_or(session.updated_at);
    let elapsed = now - paused_at;
    if elapsed > policy.max_pause {
        return Err(Error::Expired(format!(
            "session {} was paused {} days ago",
            session.id,
            elapsed.num_days()
        )));
    }

    session.total_paused_secs += elapsed.num_seconds().max(0);
    session.resumed_at = Some(now);
    session.status = SessionStatus::Active;
    session.updated_at = now;
    Ok(())
}

/// Mark the session completed. `completed_at` is never overwritten.
pub fn complete(session: &mut InterviewSession, now: DateTime<Utc>, policy: &SessionPolicy) -> Result<()> {
    ensure_open(session, now, policy)?;

    if session.status == SessionStatus::Paused {
        if let Some(paused_at) = session.paused_at {
            session.total_paused_secs += (now - paused_at).num_seconds().max(0);
        }
    }
    session.status = SessionStatus::Completed;
    session.completed_at = Some(now);
    session.updated_at = now;
    Ok(())
}

/// Record activity against a session that is still open.
pub fn touch(session: &mut InterviewSession, now: DateTime<Utc>, policy: &SessionPolicy) -> Result<()> {
    ensure_open(session, now, policy)?;
    session.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{InterviewMode, ParticipantInfo};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn active() -> InterviewSession {
        InterviewSession {
            id: "s-1".to_string(),
            study_id: "study-1".to_string(),
            study_type: "structured".to_string(),
            mode: InterviewMode::Video,
            participant: ParticipantInfo::default(),
            status: SessionStatus::Active,
            cursor: ProgressCursor::default(),
            started_at: t0(),
            paused_at: None,
            resumed_at: None,
            completed_at: None,
            updated_at: t0(),
            total_paused_secs: 0,
            pause_count: 0,
            screener_passed: None,
        }
    }

    #[test]
    fn test_pause_twice_refreshes_paused_at() {
        let policy = SessionPolicy::default();
        let mut s = active();

        pause(&mut s, None, t0(), &policy).unwrap();
        let later = t0() + Duration::minutes(5);
        pause(&mut s, Some(ProgressCursor { section_index: 1, item_index: 2 }), later, &policy).unwrap();

        assert_eq!(s.status, SessionStatus::Paused);
        assert_eq!(s.paused_at, Some(later));
        assert_eq!(s.pause_count, 2);
        assert_eq!(s.cursor.item_index, 2);
    }

    #[test]
    fn test_resume_accumulates_paused_duration() {
        let policy = SessionPolicy::default();
        let mut s = active();
        pause(&mut s, None, t0(), &policy).unwrap();

        let now = t0() + Duration::hours(2);
        resume(&mut s, StudyStatus::Live, now, &policy).unwrap();

        assert_eq!(s.status, SessionStatus::Active);
        assert_eq!(s.resumed_at, Some(now));
        assert_eq!(s.total_paused_secs, 7200);
    }

    #[test]
    fn test_resume_guards_in_order() {
        let policy = SessionPolicy::default();

        let mut s = active();
        let err = resume(&mut s, StudyStatus::Closed, t0(), &policy).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        pause(&mut s, None, t0(), &policy).unwrap();
        let err = resume(&mut s, StudyStatus::Closed, t0() + Duration::days(9), &policy).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)), "study check precedes expiry");

        let err = resume(&mut s, StudyStatus::Live, t0() + Duration::days(8), &policy).unwrap_err();
        assert!(matches!(err, Error::Expired(_)));
        assert_eq!(s.status, SessionStatus::Paused);
    }

    #[test]
    fn test_resume_exactly_at_window_is_allowed() {
        let policy = SessionPolicy::default();
        let mut s = active();
        pause(&mut s, None, t0(), &policy).unwrap();

        resume(&mut s, StudyStatus::Live, t0() + Duration::days(7), &policy).unwrap();
        assert_eq!(s.status, SessionStatus::Active);
    }

    #[test]
    fn test_auto_pause_dates_from_last_activity() {
        let policy = SessionPolicy::default();
        let mut s = active();

        assert!(!auto_pause_if_stale(&mut s, t0() + Duration::minutes(30), &policy));

        let now = t0() + Duration::minutes(45);
        assert!(auto_pause_if_stale(&mut s, now, &policy));
        assert_eq!(s.status, SessionStatus::Paused);
        assert_eq!(s.paused_at, Some(t0()));
        assert_eq!(s.pause_count, 1);
    }

    #[test]
    fn test_completed_is_terminal() {
        let policy = SessionPolicy::default();
        let mut s = active();
        complete(&mut s, t0(), &policy).unwrap();

        let first = s.completed_at;
        assert!(complete(&mut s, t0() + Duration::hours(1), &policy).is_err());
        assert!(pause(&mut s, None, t0() + Duration::hours(1), &policy).is_err());
        assert_eq!(s.completed_at, first);
        assert_eq!(classify(&s, t0(), &policy), Classification::Completed);
    }

    #[test]
    fn test_expired_is_derived_from_pause_age() {
        let policy = SessionPolicy::default();
        let mut s = active();
        pause(&mut s, None, t0(), &policy).unwrap();

        assert_eq!(classify(&s, t0() + Duration::days(6), &policy), Classification::Paused);
        assert_eq!(classify(&s, t0() + Duration::days(8), &policy), Classification::Expired);
        assert_eq!(s.status, SessionStatus::Paused);
    }
}
