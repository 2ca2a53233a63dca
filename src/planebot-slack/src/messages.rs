//! Outgoing message content and mrkdwn helpers.

use serde::{Deserialize, Serialize};

/// Escape the three characters Slack treats as control sequences in mrkdwn.
///
/// See <https://api.slack.com/reference/surfaces/formatting#escaping>.
pub fn escape_mrkdwn(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build a mrkdwn link `<url|label>`, escaping the label.
///
/// `|` in the label would end it early, so it is replaced with a
/// full-width bar.
pub fn mrkdwn_link(url: &str, label: &str) -> String {
    let label = escape_mrkdwn(label).replace('|', "\u{ff5c}");
    if label.is_empty() {
        format!("<{}>", url)
    } else {
        format!("<{}|{}>", url, label)
    }
}

/// Content of a `chat.postMessage` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlackMessageContent {
    /// Message text (mrkdwn).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Whether Slack should unfurl links in the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unfurl_links: Option<bool>,
}

impl SlackMessageContent {
    /// A plain mrkdwn text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Suppress link previews.
    pub fn without_unfurl(mut self) -> Self {
        self.unfurl_links = Some(false);
        self
    }
}
