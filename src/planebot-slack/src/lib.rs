//! Slack transport for planebot.
//!
//! This crate provides the chat side of the bridge:
//! - Socket Mode listener that acknowledges envelopes and routes slash commands
//! - Web API calls for posting messages and opening direct-message channels
//! - Ephemeral replies through a slash command's `response_url`
//!
//! Command semantics live elsewhere; the listener hands every slash command to
//! a [`SlashCommandHandler`] and posts whatever text it returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use planebot_slack::{SlackBot, SlackConfig};
//!
//! let config = SlackConfig::from_env()?;
//! let bot = SlackBot::new(config)?;
//! bot.set_command_handler(my_handler).await;
//! bot.start().await?;
//! ```
//!
//! # Configuration
//!
//! Required environment variables:
//! - `SLACK_TOKEN` - Bot OAuth token (xoxb-...)
//! - `SLACK_SOCK_TOKEN` - App-level token for Socket Mode (xapp-...)

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod messages;

// Re-export main types
pub use bot::{BotOptions, SlackBot};
pub use commands::{DelayedResponse, ResponseType, SlashCommandHandler, SlashCommandPayload};
pub use config::SlackConfig;
pub use error::{SlackError, SlackResult};
pub use events::{SocketModeAck, SocketModeEnvelope};
pub use messages::{SlackMessageContent, escape_mrkdwn, mrkdwn_link};
