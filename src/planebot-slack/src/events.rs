//! Socket Mode envelopes and Events API payloads.
//!
//! Every frame Slack pushes over the Socket Mode WebSocket is an envelope.
//! Envelopes carrying an `envelope_id` must be acknowledged; the payload
//! shape depends on the envelope type.

use serde::{Deserialize, Serialize};

/// Envelope type for slash command invocations.
pub const ENVELOPE_SLASH_COMMANDS: &str = "slash_commands";
/// Envelope type for Events API callbacks.
pub const ENVELOPE_EVENTS_API: &str = "events_api";
/// Envelope type for interactive components.
pub const ENVELOPE_INTERACTIVE: &str = "interactive";
/// Sent once after the connection is established.
pub const ENVELOPE_HELLO: &str = "hello";
/// Slack asks the client to reconnect.
pub const ENVELOPE_DISCONNECT: &str = "disconnect";

/// Socket Mode envelope wrapping a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeEnvelope {
    /// Envelope ID for acknowledgment (absent on `hello`/`disconnect`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    /// Type of payload.
    #[serde(rename = "type")]
    pub envelope_type: String,
    /// Raw payload; decoded according to `envelope_type`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Whether Slack accepts a payload in the ack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts_response_payload: Option<bool>,
    /// Reason given on `disconnect` envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SocketModeEnvelope {
    /// Whether Slack expects this envelope to be acknowledged.
    pub fn needs_ack(&self) -> bool {
        self.envelope_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Events API callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Team ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// The inner event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<serde_json::Value>,
    /// Event ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl EventPayload {
    /// The inner event's `type`, or `"unknown"`.
    pub fn event_type(&self) -> &str {
        self.event
            .as_ref()
            .and_then(|e| e.get("type"))
            .and_then(|t| t.as_str())
            .unwrap_or("unknown")
    }

    /// The user who triggered the inner event, when present.
    pub fn user(&self) -> Option<&str> {
        self.event
            .as_ref()
            .and_then(|e| e.get("user"))
            .and_then(|u| u.as_str())
    }
}

/// Socket Mode acknowledgment frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeAck {
    /// Envelope ID being acknowledged.
    pub envelope_id: String,
    /// Optional response payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl SocketModeAck {
    /// Create a simple acknowledgment.
    pub fn new(envelope_id: impl Into<String>) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_command_envelope() {
        let raw = r#"{
            "envelope_id": "env-1",
            "type": "slash_commands",
            "accepts_response_payload": true,
            "payload": {"command": "/register", "text": "add u1"}
        }"#;
        let envelope: SocketModeEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.envelope_type, ENVELOPE_SLASH_COMMANDS);
        assert!(envelope.needs_ack());
        assert_eq!(envelope.payload.unwrap()["command"], "/register");
    }

    #[test]
    fn test_hello_needs_no_ack() {
        let raw = r#"{"type": "hello", "num_connections": 1}"#;
        let envelope: SocketModeEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.envelope_type, ENVELOPE_HELLO);
        assert!(!envelope.needs_ack());
    }

    #[test]
    fn test_disconnect_reason() {
        let raw = r#"{"type": "disconnect", "reason": "refresh_requested"}"#;
        let envelope: SocketModeEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.reason.as_deref(), Some("refresh_requested"));
    }

    #[test]
    fn test_event_payload_accessors() {
        let payload: EventPayload = serde_json::from_value(serde_json::json!({
            "team_id": "T1",
            "event": {"type": "app_mention", "user": "U1", "text": "hi"}
        }))
        .unwrap();
        assert_eq!(payload.event_type(), "app_mention");
        assert_eq!(payload.user(), Some("U1"));

        let empty: EventPayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(empty.event_type(), "unknown");
        assert!(empty.user().is_none());
    }

    #[test]
    fn test_ack_serialization() {
        let ack = SocketModeAck::new("env-123");
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json, serde_json::json!({"envelope_id": "env-123"}));
    }
}
