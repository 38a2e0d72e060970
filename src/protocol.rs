//! Control-message vocabulary for the call backend.
//!
//! The backend confirms lifecycle transitions (`call_started`,
//! `call_ended`) and pushes transcript segments; none of it feeds back
//! into the audio pipeline, it is logged for visibility only.

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub call_id: Option<String>,
    pub text: Option<String>,
    pub speaker: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Serialize)]
struct ControlMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'a str,
    call_id: &'a str,
}

/// `start_call` announcement, sent once after the channel opens.
pub fn start_call_message(call_id: &str) -> String {
    serde_json::to_string(&ControlMessage {
        msg_type: "start_call",
        call_id,
    })
    .expect("control message serialization cannot fail")
}

/// `end_call` notice, sent best-effort just before closing the channel.
pub fn end_call_message(call_id: &str) -> String {
    serde_json::to_string(&ControlMessage {
        msg_type: "end_call",
        call_id,
    })
    .expect("control message serialization cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_carry_type_and_call_id() {
        let msg: serde_json::Value =
            serde_json::from_str(&start_call_message("abc123")).unwrap();
        assert_eq!(msg["type"], "start_call");
        assert_eq!(msg["call_id"], "abc123");

        let msg: serde_json::Value = serde_json::from_str(&end_call_message("abc123")).unwrap();
        assert_eq!(msg["type"], "end_call");
    }

    #[test]
    fn parses_backend_transcript_message() {
        let raw = r#"{"type":"transcript","speaker":"customer","text":"hello","timestamp":"2026-01-01T00:00:00"}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.msg_type, "transcript");
        assert_eq!(msg.speaker.as_deref(), Some("customer"));
        assert_eq!(msg.text.as_deref(), Some("hello"));
        assert!(msg.call_id.is_none());
    }
}
