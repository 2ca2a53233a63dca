//! Slash commands: `/register` and `/issueupdate`.
//!
//! Every command produces exactly one reply string; the Slack listener
//! posts it back to the invoker as an ephemeral message.

use std::sync::Arc;

use async_trait::async_trait;
use planebot_slack::{SlashCommandHandler, SlashCommandPayload};
use planebot_tracker::TrackerApi;
use tracing::{info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::mapping::{AddOutcome, UserMappingStore};
use crate::states::resolve_state_id;

/// Command that maintains the user mapping.
pub const REGISTER_COMMAND: &str = "/register";
/// Command that moves an issue to another state.
pub const ISSUE_UPDATE_COMMAND: &str = "/issueupdate";

/// A parsed `/register` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterAction {
    Add(String),
    Delete(String),
}

impl RegisterAction {
    /// Parse `add <id>`, `delete <id>` or a bare `<id>` (shorthand for add).
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            ["add", id] => Ok(Self::Add(id.to_string())),
            ["delete", id] => Ok(Self::Delete(id.to_string())),
            ["add"] | ["delete"] => Err(BridgeError::InvalidInput(format!(
                "missing user id, usage: {} {} <plane-user-id>",
                REGISTER_COMMAND, tokens[0]
            ))),
            [id] => Ok(Self::Add(id.to_string())),
            [] => Err(BridgeError::InvalidInput(format!(
                "usage: {} [add|delete] <plane-user-id>",
                REGISTER_COMMAND
            ))),
            ["add" | "delete", ..] => Err(BridgeError::InvalidInput(format!(
                "invalid argument count for {}",
                tokens[0]
            ))),
            [verb, ..] => Err(BridgeError::InvalidInput(format!(
                "{} is not supported",
                verb
            ))),
        }
    }
}

/// A parsed `/issueupdate` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueUpdate {
    pub issue_id: String,
    /// Target state name; may contain spaces.
    pub state_name: String,
}

impl IssueUpdate {
    /// Parse `<issue-id> <state name...>`.
    pub fn parse(text: &str) -> Option<Self> {
        let (issue_id, state_name) = text.trim().split_once(char::is_whitespace)?;
        let state_name = state_name.trim();
        if issue_id.is_empty() || state_name.is_empty() {
            return None;
        }
        Some(Self {
            issue_id: issue_id.to_string(),
            state_name: state_name.to_string(),
        })
    }
}

/// Find the project that contains `issue_id`.
///
/// Slash commands carry no project id, so this lists the issues of every
/// project until it finds a match: O(total issues). Projects whose listing
/// fails are logged and skipped.
pub async fn find_issue_project(tracker: &dyn TrackerApi, issue_id: &str) -> BridgeResult<String> {
    let projects = tracker.list_projects().await?;

    for project in projects {
        match tracker.list_issues(&project.id).await {
            Ok(issues) => {
                if issues.iter().any(|issue| issue.id == issue_id) {
                    return Ok(project.id);
                }
            }
            Err(e) => {
                warn!(project_id = %project.id, error = %e, "Failed to list issues while locating issue");
            }
        }
    }

    Err(BridgeError::NotFound(format!(
        "issue {} not found in any project",
        issue_id
    )))
}

/// Handles the bridge's slash commands.
pub struct CommandHandler {
    tracker: Arc<dyn TrackerApi>,
    mapping: Arc<UserMappingStore>,
}

impl CommandHandler {
    pub fn new(tracker: Arc<dyn TrackerApi>, mapping: Arc<UserMappingStore>) -> Self {
        Self { tracker, mapping }
    }

    async fn register(&self, text: &str, chat_user_id: &str) -> BridgeResult<String> {
        match RegisterAction::parse(text)? {
            RegisterAction::Add(external_id) => {
                match self.mapping.add(&external_id, chat_user_id).await? {
                    AddOutcome::Added => Ok("User mapping added successfully".to_string()),
                    AddOutcome::Replaced => Ok("User mapping updated successfully".to_string()),
                }
            }
            RegisterAction::Delete(external_id) => {
                self.mapping.remove(&external_id).await?;
                Ok("User mapping deleted successfully".to_string())
            }
        }
    }

    async fn update_issue(&self, update: &IssueUpdate) -> BridgeResult<()> {
        let tracker = self.tracker.as_ref();
        let project_id = find_issue_project(tracker, &update.issue_id).await?;
        let state_id = resolve_state_id(tracker, &project_id, &update.state_name).await?;

        tracker
            .update_issue_state(&project_id, &update.issue_id, &state_id)
            .await?;

        info!(
            issue_id = %update.issue_id,
            project_id = %project_id,
            state_id = %state_id,
            "Updated issue state"
        );
        Ok(())
    }
}

#[async_trait]
impl SlashCommandHandler for CommandHandler {
    async fn handle_command(&self, command: &SlashCommandPayload) -> String {
        match command.command.as_str() {
            REGISTER_COMMAND => match self.register(&command.text, &command.user_id).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(user_id = %command.user_id, error = %e, "Register command failed");
                    format!("Error updating user mapping: {}", e)
                }
            },
            ISSUE_UPDATE_COMMAND => {
                let Some(update) = IssueUpdate::parse(&command.text) else {
                    return "Invalid input. Please provide issue ID and state name.".to_string();
                };
                match self.update_issue(&update).await {
                    Ok(()) => format!(
                        "Issue state updated successfully for issue ID: {}",
                        update.issue_id
                    ),
                    Err(e) => {
                        warn!(issue_id = %update.issue_id, error = %e, "Issue update command failed");
                        format!("Error updating issue state: {}", e)
                    }
                }
            }
            _ => format!(
                "You invoked the slash command: {} with text: {}",
                command.command, command.text
            ),
        }
    }
}
