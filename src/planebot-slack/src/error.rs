//! Error types for the Slack transport.
//!
//! Web API answers with `ok: false` are classified by their error code so
//! callers can tell a bad token from a missing channel or user.

use thiserror::Error;

/// Errors raised by the Slack transport.
#[derive(Error, Debug)]
pub enum SlackError {
    /// Tokens or API root are missing or malformed.
    #[error("Invalid Slack configuration: {0}")]
    Config(String),

    /// Slack rejected a token. The listener does not reconnect after this.
    #[error("Slack authentication failed: {0}")]
    Auth(String),

    /// Any other Web API or `response_url` failure.
    #[error("Slack request failed: {0}")]
    Api(String),

    /// HTTP 429 or a `ratelimited` error code.
    #[error("Rate limited by Slack, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds Slack asked us to wait.
        retry_after_secs: u64,
    },

    #[error("Could not reach Slack: {0}")]
    Network(String),

    /// Socket Mode connection dropped or failed to open.
    #[error("Socket Mode connection error: {0}")]
    WebSocket(String),

    /// A request or response body could not be encoded or decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Target channel missing, archived, or the bot is not a member.
    #[error("Channel unavailable: {0}")]
    Channel(String),

    /// Target user missing or not reachable by direct message.
    #[error("User unreachable: {0}")]
    User(String),

    /// Failure inside the client itself (HTTP client construction).
    #[error("Slack client error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::Timeout(err.to_string())
        } else if err.is_decode() {
            SlackError::Decode(err.to_string())
        } else if err.is_connect() {
            SlackError::Network(format!("connect: {}", err))
        } else {
            SlackError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Decode(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SlackError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SlackError::WebSocket(err.to_string())
    }
}

pub type SlackResult<T> = std::result::Result<T, SlackError>;

/// An `ok: false` answer from the Web API.
#[derive(Debug, Clone)]
pub struct SlackApiError {
    /// Web API method, e.g. `conversations.open`.
    pub method: String,
    /// The `error` field of the answer.
    pub code: String,
}

impl SlackApiError {
    pub fn new(method: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            code: code.into(),
        }
    }

    /// Build from a Web API response body that has `ok: false`.
    pub fn from_response(method: &str, response: &serde_json::Value) -> Self {
        let code = response
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown");
        Self::new(method, code)
    }
}

impl From<SlackApiError> for SlackError {
    fn from(err: SlackApiError) -> Self {
        let detail = format!("{} failed: {}", err.method, err.code);
        match err.code.as_str() {
            "ratelimited" | "rate_limited" => SlackError::RateLimited {
                retry_after_secs: 30,
            },
            "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" => {
                SlackError::Auth(detail)
            }
            "channel_not_found" | "not_in_channel" | "is_archived" => SlackError::Channel(detail),
            "user_not_found" | "user_disabled" | "cannot_dm_bot" => SlackError::User(detail),
            _ => SlackError::Api(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SlackError::Config("SLACK_TOKEN not set".to_string());
        assert_eq!(err.to_string(), "Invalid Slack configuration: SLACK_TOKEN not set");

        let err: SlackError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, SlackError::Decode(_)));

        let err = SlackError::RateLimited { retry_after_secs: 60 };
        assert_eq!(err.to_string(), "Rate limited by Slack, retry in 60s");
    }

    #[test]
    fn test_api_error_conversion() {
        let slack_err: SlackError = SlackApiError::new("auth.test", "invalid_auth").into();
        assert!(matches!(slack_err, SlackError::Auth(_)));

        let slack_err: SlackError =
            SlackApiError::new("chat.postMessage", "channel_not_found").into();
        assert!(matches!(slack_err, SlackError::Channel(_)));

        let slack_err: SlackError = SlackApiError::new("conversations.open", "user_not_found").into();
        assert!(matches!(slack_err, SlackError::User(_)));

        let slack_err: SlackError = SlackApiError::new("chat.postMessage", "msg_too_long").into();
        assert_eq!(
            slack_err.to_string(),
            "Slack request failed: chat.postMessage failed: msg_too_long"
        );
    }

    #[test]
    fn test_from_response_defaults_unknown() {
        let err = SlackApiError::from_response("auth.test", &serde_json::json!({"ok": false}));
        assert_eq!(err.code, "unknown");
        assert_eq!(err.method, "auth.test");
    }
}
