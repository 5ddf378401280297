use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::model::FeedbackKind;
use crate::role::Role;

/// Server→client event envelope: `{"event": <name>, ...fields}`.
///
/// A closed set: handlers dispatch on the variant, not on a string field,
/// so a new event is a compile-visible addition.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Initial snapshot sent to a connection right after attach.
    Connected {
        session_id: SessionId,
        role: Role,
        teacher_online: bool,
    },

    /// Reply to an application-level ping frame.
    Pong,

    /// Student feedback pulse, teacher group only.
    Feedback {
        feedback_kind: FeedbackKind,
        created_at: String,
    },

    /// A student started a question, teacher group only.
    QuestionIntent {
        question_id: i64,
        created_at: String,
    },

    /// A question was forwarded to the instructor; both groups.
    NewQuestion {
        question_id: i64,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ai_answer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        capture_url: Option<String>,
        created_at: String,
    },

    /// Instructor registered a slide capture for a question; student group.
    QuestionCapture {
        question_id: i64,
        capture_url: String,
    },

    /// Like count changed; both groups.
    QuestionLikeUpdate {
        question_id: i64,
        like_count: i64,
    },

    /// Instructor marked the current slide important; student group.
    Important {
        note: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        capture_url: Option<String>,
    },

    /// Hard-feedback threshold capture; both groups.
    HardAlert {
        capture_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hard_ratio: Option<f64>,
    },

    /// Teacher presence changed; student group.
    TeacherPresence {
        teacher_online: bool,
    },

    /// Session closed by the instructor; both groups, then the server
    /// closes every connection of the session.
    SessionEnded,
}

/// Client→server frames. Anything that fails to parse into this enum is
/// ignored, not an error.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_names_match_wire_contract() {
        let cases: Vec<(SessionEvent, &str)> = vec![
            (
                SessionEvent::Connected {
                    session_id: SessionId::from_raw("sess_1"),
                    role: Role::Student,
                    teacher_online: true,
                },
                "connected",
            ),
            (SessionEvent::Pong, "pong"),
            (
                SessionEvent::Feedback {
                    feedback_kind: FeedbackKind::Hard,
                    created_at: "2026-03-01T10:00:00Z".into(),
                },
                "feedback",
            ),
            (
                SessionEvent::QuestionIntent {
                    question_id: 7,
                    created_at: "2026-03-01T10:00:00Z".into(),
                },
                "question_intent",
            ),
            (
                SessionEvent::QuestionLikeUpdate {
                    question_id: 7,
                    like_count: 3,
                },
                "question_like_update",
            ),
            (
                SessionEvent::TeacherPresence {
                    teacher_online: false,
                },
                "teacher_presence",
            ),
            (SessionEvent::SessionEnded, "session_ended"),
        ];
        for (event, tag) in cases {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], tag, "wrong tag for {event:?}");
        }
    }

    #[test]
    fn new_question_omits_absent_fields() {
        let event = SessionEvent::NewQuestion {
            question_id: 3,
            text: "what is a stack?".into(),
            ai_answer: None,
            capture_url: None,
            created_at: "2026-03-01T10:00:00Z".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("ai_answer"));
        assert!(!json.contains("capture_url"));
    }

    #[test]
    fn ping_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Ping));
    }

    #[test]
    fn unknown_frame_is_a_parse_error() {
        let result = serde_json::from_str::<ClientFrame>(r#"{"type":"shout","volume":11}"#);
        assert!(result.is_err());
    }

    #[test]
    fn feedback_event_roundtrip() {
        let event = SessionEvent::Feedback {
            feedback_kind: FeedbackKind::Ok,
            created_at: "2026-03-01T10:00:00Z".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: SessionEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed,
            SessionEvent::Feedback {
                feedback_kind: FeedbackKind::Ok,
                ..
            }
        ));
    }
}
