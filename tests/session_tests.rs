// Integration tests for session continuity
//
// Drives SessionService over the in-memory store with a manual clock so
// staleness and the pause window can be crossed deterministically.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use interview_capture::nats::{MediaFinalizedMessage, SessionEventKind, SessionEventMessage};
use interview_capture::session::{
    AnswerValue, CursorUpdate, InterviewMode, NotResumableReason, ParticipantInfo, ResponsePayload,
    Screener, ScreenerAnswer, ScreenerQuestion, SessionPolicy, SessionStatus, Speaker, StartSession,
    Study, StudyStatus, Submitted,
};
use interview_capture::store::{InterviewStore, MemoryStore};
use interview_capture::{Clock, Error, EventPublisher, ManualClock, SessionService};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<SessionEventKind>>,
}

impl RecordingPublisher {
    fn kinds(&self) -> Vec<SessionEventKind> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn session_event(&self, msg: &SessionEventMessage) -> interview_capture::Result<()> {
        self.events.lock().unwrap().push(msg.event);
        Ok(())
    }

    async fn media_finalized(&self, _msg: &MediaFinalizedMessage) -> interview_capture::Result<()> {
        Ok(())
    }
}

struct Fixture {
    service: SessionService,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    events: Arc<RecordingPublisher>,
}

fn study(id: &str, status: StudyStatus) -> Study {
    Study {
        id: id.to_string(),
        owner_id: "researcher-1".to_string(),
        status,
        title: format!("Study {id}"),
        screener: None,
    }
}

async fn fixture() -> Result<Fixture> {
    let store = Arc::new(MemoryStore::new());
    store.insert_study(study("live", StudyStatus::Live)).await?;
    store.insert_study(study("closed", StudyStatus::Closed)).await?;

    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap()));
    let events = Arc::new(RecordingPublisher::default());
    let service = SessionService::new(store.clone(), events.clone(), clock.clone(), SessionPolicy::default());

    Ok(Fixture {
        service,
        store,
        clock,
        events,
    })
}

fn start(study_id: &str) -> StartSession {
    StartSession {
        study_id: study_id.to_string(),
        study_type: "structured".to_string(),
        mode: InterviewMode::Voice,
        participant: ParticipantInfo {
            name: Some("Ada".to_string()),
            email: None,
            language: Some("en".to_string()),
        },
    }
}

fn flow(item: &str) -> ResponsePayload {
    ResponsePayload::Flow {
        flow_item_id: item.to_string(),
        response_type: "text".to_string(),
        value: serde_json::json!("an answer"),
    }
}

#[tokio::test]
async fn test_start_session_is_active() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;

    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.pause_count, 0);
    assert_eq!(session.total_paused_secs, 0);
    assert!(f.store.session(&session.id).await?.is_some());
    assert_eq!(f.events.kinds(), vec![SessionEventKind::Started]);
    Ok(())
}

#[tokio::test]
async fn test_start_session_rejects_closed_and_unknown_studies() -> Result<()> {
    let f = fixture().await?;

    assert!(matches!(f.service.start(start("closed")).await, Err(Error::Forbidden(_))));
    assert!(matches!(f.service.start(start("missing")).await, Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_pause_and_resume_round_trip() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;
    f.service.submit_response(&session.id, flow("q1")).await?;
    f.service.submit_response(&session.id, flow("q2")).await?;

    let paused = f
        .service
        .pause(
            &session.id,
            CursorUpdate {
                section_index: Some(1),
                item_index: Some(3),
            },
        )
        .await?;
    assert_eq!(paused.status, SessionStatus::Paused);
    assert_eq!(paused.cursor.section_index, 1);
    assert_eq!(paused.cursor.item_index, 3);

    f.clock.advance(Duration::hours(2));
    let (resumed, mut answered) = f.service.resume(&session.id).await?;
    answered.sort();

    assert_eq!(resumed.status, SessionStatus::Active);
    assert_eq!(resumed.total_paused_secs, 2 * 3600);
    assert_eq!(resumed.resumed_at, Some(f.clock.now()));
    assert_eq!(answered, vec!["q1".to_string(), "q2".to_string()]);
    assert_eq!(
        f.events.kinds(),
        vec![SessionEventKind::Started, SessionEventKind::Paused, SessionEventKind::Resumed]
    );
    Ok(())
}

#[tokio::test]
async fn test_pause_twice_counts_twice() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;

    let first = f.service.pause(&session.id, CursorUpdate::default()).await?;
    f.clock.advance(Duration::minutes(5));
    let second = f.service.pause(&session.id, CursorUpdate::default()).await?;

    assert_eq!(second.status, SessionStatus::Paused);
    assert_eq!(second.pause_count, 2);
    assert!(second.paused_at > first.paused_at);
    Ok(())
}

#[tokio::test]
async fn test_resume_guards() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;

    // Not paused
    assert!(matches!(f.service.resume(&session.id).await, Err(Error::InvalidState(_))));
    assert!(matches!(f.service.resume("nope").await, Err(Error::NotFound(_))));

    f.service.pause(&session.id, CursorUpdate::default()).await?;
    f.clock.advance(Duration::days(8));
    assert!(matches!(f.service.resume(&session.id).await, Err(Error::Expired(_))));
    assert_eq!(f.events.kinds().last(), Some(&SessionEventKind::Expired));

    // Stored status is untouched by expiry
    let stored = f.store.session(&session.id).await?.unwrap();
    assert_eq!(stored.status, SessionStatus::Paused);
    Ok(())
}

#[tokio::test]
async fn test_resume_refused_once_study_closes() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;
    f.service.pause(&session.id, CursorUpdate::default()).await?;

    f.store.insert_study(study("live", StudyStatus::Closed)).await?;
    assert!(matches!(f.service.resume(&session.id).await, Err(Error::Forbidden(_))));

    let check = f.service.check_resumable(&session.id).await?;
    assert!(!check.resumable);
    assert_eq!(check.reason, Some(NotResumableReason::StudyClosed));
    Ok(())
}

#[tokio::test]
async fn test_check_auto_pauses_stale_session() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;
    let last_activity = session.updated_at;

    f.clock.advance(Duration::minutes(45));
    let check = f.service.check_resumable(&session.id).await?;

    assert!(check.resumable);
    let summary = check.session_summary.expect("summary for resumable session");
    assert_eq!(summary.status, SessionStatus::Paused);

    let stored = f.store.session(&session.id).await?.unwrap();
    assert_eq!(stored.status, SessionStatus::Paused);
    assert_eq!(stored.paused_at, Some(last_activity));
    assert!(f.events.kinds().contains(&SessionEventKind::AutoPaused));

    // Paused time counts from the last activity
    let (resumed, _) = f.service.resume(&session.id).await?;
    assert_eq!(resumed.total_paused_secs, 45 * 60);
    Ok(())
}

#[tokio::test]
async fn test_check_fresh_session_is_left_active() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;

    f.clock.advance(Duration::minutes(10));
    let check = f.service.check_resumable(&session.id).await?;

    assert!(check.resumable);
    let stored = f.store.session(&session.id).await?.unwrap();
    assert_eq!(stored.status, SessionStatus::Active);
    Ok(())
}

#[tokio::test]
async fn test_check_reports_reasons() -> Result<()> {
    let f = fixture().await?;

    let missing = f.service.check_resumable("missing").await?;
    assert_eq!(missing.reason, Some(NotResumableReason::NotFound));

    let done = f.service.start(start("live")).await?;
    f.service.complete(&done.id, None).await?;
    let check = f.service.check_resumable(&done.id).await?;
    assert_eq!(check.reason, Some(NotResumableReason::Completed));

    let stale = f.service.start(start("live")).await?;
    f.service.pause(&stale.id, CursorUpdate::default()).await?;
    f.clock.advance(Duration::days(7) + Duration::seconds(1));
    let check = f.service.check_resumable(&stale.id).await?;
    assert!(!check.resumable);
    assert_eq!(check.reason, Some(NotResumableReason::Expired));
    Ok(())
}

#[tokio::test]
async fn test_complete_bumps_distribution_counter() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;

    let completed = f.service.complete(&session.id, Some("dist-1")).await?;
    assert_eq!(completed.status, SessionStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert_eq!(f.store.distribution_responses("dist-1").await, 1);

    // Terminal
    assert!(matches!(
        f.service.complete(&session.id, Some("dist-1")).await,
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        f.service.submit_response(&session.id, flow("q1")).await,
        Err(Error::InvalidState(_))
    ));
    assert_eq!(f.store.distribution_responses("dist-1").await, 1);
    Ok(())
}

#[tokio::test]
async fn test_turn_numbers_increase_without_gaps() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;

    let mut numbers = Vec::new();
    for (i, speaker) in [Speaker::Ai, Speaker::Participant, Speaker::Ai, Speaker::Participant]
        .into_iter()
        .enumerate()
    {
        let submitted = f
            .service
            .submit_response(
                &session.id,
                ResponsePayload::Turn {
                    speaker,
                    content: format!("turn {i}"),
                    is_probe: i == 2,
                },
            )
            .await?;
        match submitted {
            Submitted::Turn(turn) => numbers.push(turn.turn_number),
            Submitted::Response(_) => panic!("expected a turn"),
        }
    }

    assert_eq!(numbers, vec![1, 2, 3, 4]);
    let turns = f.store.turns(&session.id).await?;
    assert_eq!(turns.len(), 4);
    assert!(turns[2].is_probe);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_turns_never_share_a_number() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;
    let service = Arc::new(f.service);

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = service.clone();
        let id = session.id.clone();
        handles.push(tokio::spawn(async move {
            service
                .submit_response(
                    &id,
                    ResponsePayload::Turn {
                        speaker: Speaker::Participant,
                        content: format!("turn {i}"),
                        is_probe: false,
                    },
                )
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let mut numbers: Vec<u32> = f
        .store
        .turns(&session.id)
        .await?
        .into_iter()
        .map(|t| t.turn_number)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_resubmitting_an_item_replaces_the_answer() -> Result<()> {
    let f = fixture().await?;
    let session = f.service.start(start("live")).await?;

    f.service.submit_response(&session.id, flow("q1")).await?;
    f.clock.advance(Duration::minutes(1));
    f.service
        .submit_response(
            &session.id,
            ResponsePayload::Flow {
                flow_item_id: "q1".to_string(),
                response_type: "rating".to_string(),
                value: serde_json::json!(4),
            },
        )
        .await?;

    let responses = f.store.responses(&session.id).await?;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].value, serde_json::json!(4));
    assert!(responses[0].updated_at > responses[0].created_at);
    Ok(())
}

#[tokio::test]
async fn test_screener_verdict_is_stored() -> Result<()> {
    let f = fixture().await?;
    let mut screened = study("screened", StudyStatus::Live);
    screened.screener = Some(Screener {
        questions: vec![ScreenerQuestion {
            id: "role".to_string(),
            qualifying: vec!["designer".to_string()],
        }],
        disqualify_redirect_url: Some("https://example.com/bye".to_string()),
    });
    f.store.insert_study(screened).await?;

    let session = f.service.start(start("screened")).await?;
    let outcome = f
        .service
        .submit_screener(
            &session.id,
            &[ScreenerAnswer {
                question_id: "role".to_string(),
                value: AnswerValue::One("engineer".to_string()),
            }],
        )
        .await?;

    assert!(!outcome.passed);
    assert_eq!(outcome.redirect_url.as_deref(), Some("https://example.com/bye"));
    let stored = f.store.session(&session.id).await?.unwrap();
    assert_eq!(stored.screener_passed, Some(false));
    Ok(())
}
