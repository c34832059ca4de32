use interview_capture::nats::client::{media_subject, session_subject};
use interview_capture::nats::messages::{MediaFinalizedMessage, SessionEventKind, SessionEventMessage};

#[test]
fn test_session_event_serialization() {
    let msg = SessionEventMessage {
        session_id: "sess-1".to_string(),
        study_id: "study-1".to_string(),
        event: SessionEventKind::AutoPaused,
        timestamp: "2026-01-05T12:00:00+00:00".to_string(),
        pause_count: 2,
        distribution_id: None,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"event\":\"auto_paused\""));
    assert!(json.contains("\"pause_count\":2"));
    assert!(!json.contains("distribution_id"));

    let deserialized: SessionEventMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.session_id, "sess-1");
    assert_eq!(deserialized.event, SessionEventKind::AutoPaused);
    assert_eq!(deserialized.distribution_id, None);
}

#[test]
fn test_completed_event_carries_distribution() {
    let json = r#"{
        "session_id": "sess-1",
        "study_id": "study-1",
        "event": "completed",
        "timestamp": "2026-01-05T12:00:00+00:00",
        "pause_count": 0,
        "distribution_id": "dist-9"
    }"#;

    let msg: SessionEventMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.event, SessionEventKind::Completed);
    assert_eq!(msg.distribution_id.as_deref(), Some("dist-9"));
}

#[test]
fn test_session_subjects() {
    for (kind, subject) in [
        (SessionEventKind::Started, "interview.session.started"),
        (SessionEventKind::Paused, "interview.session.paused"),
        (SessionEventKind::AutoPaused, "interview.session.auto_paused"),
        (SessionEventKind::Resumed, "interview.session.resumed"),
        (SessionEventKind::Completed, "interview.session.completed"),
        (SessionEventKind::Expired, "interview.session.expired"),
    ] {
        let msg = SessionEventMessage {
            session_id: "s".to_string(),
            study_id: "t".to_string(),
            event: kind,
            timestamp: String::new(),
            pause_count: 0,
            distribution_id: None,
        };
        assert_eq!(session_subject(&msg), subject);
    }
}

#[test]
fn test_media_finalized_message() {
    let msg = MediaFinalizedMessage {
        study_id: "study-1".to_string(),
        participant_id: "sess-1".to_string(),
        item_id: "q1".to_string(),
        upload_session_id: "up-1".to_string(),
        video_url: "http://localhost/media/study-1/sess-1/q1_1.webm".to_string(),
        total_chunks: 5,
        bytes: 1024,
        timestamp: "2026-01-05T12:00:00+00:00".to_string(),
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"total_chunks\":5"));
    assert_eq!(media_subject(), "interview.media.finalized");

    let deserialized: MediaFinalizedMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.upload_session_id, "up-1");
    assert_eq!(deserialized.bytes, 1024);
}
