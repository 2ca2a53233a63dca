//! Issue notifications for planebot.
//!
//! This crate holds the bridge logic between the tracker and Slack:
//! - [`UserMappingStore`]: tracker user id to Slack user id, in a CSV file
//! - [`StateIndex`]: per-run lookup of state names by project and state id
//! - [`categorize`]: issues grouped by resolved state name
//! - [`Dispatcher`]: assignee direct messages and the daily digest
//! - [`CommandHandler`]: `/register` and `/issueupdate`
//! - [`NotificationPipeline`] and [`run_schedule`]: the daily runs
//!
//! All collaborators are passed in explicitly. The tracker and chat sides
//! sit behind the [`TrackerApi`](planebot_tracker::TrackerApi) and
//! [`ChatSink`] traits.

pub mod categorize;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod mapping;
pub mod pipeline;
pub mod rich_text;
pub mod scheduler;
pub mod states;

#[cfg(test)]
mod testing;

pub use categorize::{CANONICAL_STATE_ORDER, CategorizedIssues, categorize};
pub use commands::{CommandHandler, IssueUpdate, RegisterAction, find_issue_project};
pub use config::BridgeConfig;
pub use dispatch::{ChatSink, DispatchReport, Dispatcher};
pub use error::{BridgeError, BridgeResult, MappingError};
pub use format::{LinkBuilder, format_assignee_message, format_digest};
pub use mapping::{AddOutcome, MappingTable, UserMapping, UserMappingStore};
pub use pipeline::{NotificationPipeline, Snapshot, fetch_snapshot};
pub use rich_text::html_to_plain_text;
pub use scheduler::{DailySchedule, run_schedule};
pub use states::{StateIndex, build_state_index, resolve_state_id};
