//! Slash command payloads and replies.
//!
//! In Socket Mode a slash command arrives as the payload of a
//! `slash_commands` envelope. The reply is sent afterwards through the
//! command's `response_url`, scoped ephemeral so only the invoker sees it.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{SlackError, SlackResult};

/// Fields of a slash command invocation that planebot reads.
///
/// Unknown fields are ignored; everything except the command, the invoker
/// and the channel may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlashCommandPayload {
    /// e.g. `/register`
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub channel_id: String,
    #[serde(default)]
    pub team_id: String,
    /// Where to POST the reply. Empty when Slack did not provide one.
    #[serde(default)]
    pub response_url: String,
    #[serde(default)]
    pub trigger_id: String,
}

/// Who sees a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// The invoker only.
    #[default]
    Ephemeral,
}

/// Body POSTed to a command's `response_url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DelayedResponse {
    /// Plain text only the invoker sees.
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: Some(ResponseType::Ephemeral),
            text: Some(text.into()),
        }
    }
}

/// POST `response` to a command's `response_url`.
///
/// The URL is pre-authorized by Slack, so no token is sent.
pub async fn send_delayed_response(
    client: &reqwest::Client,
    response_url: &str,
    response: &DelayedResponse,
) -> SlackResult<()> {
    debug!(url = %response_url, "Posting slash command reply");

    let reply = client.post(response_url).json(response).send().await?;
    let status = reply.status();
    if status.is_success() {
        return Ok(());
    }

    let body = reply.text().await.unwrap_or_default();
    error!(%status, "response_url rejected the reply: {}", body);
    Err(SlackError::Api(format!(
        "response_url returned {}: {}",
        status, body
    )))
}

/// Handles slash commands received by the listener.
///
/// The returned text is posted back to the invoker as an ephemeral reply.
#[async_trait::async_trait]
pub trait SlashCommandHandler: Send + Sync {
    /// Process one command and produce the reply text.
    async fn handle_command(&self, command: &SlashCommandPayload) -> String;
}
