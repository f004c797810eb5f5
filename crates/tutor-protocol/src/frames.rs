use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client → Server frame. One JSON object per WS text message.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub upload_ids: Vec<Uuid>,
}

/// Server → Client event. Many per turn; `#[serde(tag = "type")]` gives the
/// wire shape `{"type": "token", "content": "..."}` etc.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Session {
        session_id: Uuid,
    },
    Token {
        content: String,
    },
    Canned {
        content: String,
        filter: FilterKind,
    },
    Done {
        hint_level: u8,
        programming_difficulty: u8,
        maths_difficulty: u8,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Greeting,
    OffTopic,
}

impl ServerEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","message":"internal serialization error"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_parses_minimal() {
        let f: ClientFrame = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(f.content, "hi");
        assert!(f.session_id.is_none());
        assert!(f.upload_ids.is_empty());
    }

    #[test]
    fn server_event_session_shape() {
        let id = Uuid::nil();
        let ev = ServerEvent::Session { session_id: id };
        assert_eq!(
            ev.to_json(),
            format!(r#"{{"type":"session","session_id":"{id}"}}"#)
        );
    }

    #[test]
    fn server_event_canned_shape() {
        let ev = ServerEvent::Canned {
            content: "Hi there, Ada!".to_string(),
            filter: FilterKind::Greeting,
        };
        assert_eq!(
            ev.to_json(),
            r#"{"type":"canned","content":"Hi there, Ada!","filter":"greeting"}"#
        );
    }

    #[test]
    fn server_event_done_shape() {
        let ev = ServerEvent::Done {
            hint_level: 2,
            programming_difficulty: 3,
            maths_difficulty: 1,
        };
        assert_eq!(
            ev.to_json(),
            r#"{"type":"done","hint_level":2,"programming_difficulty":3,"maths_difficulty":1}"#
        );
    }
}
