//! Wire models for the Plane REST API.
//!
//! Decoding is best-effort: unknown fields are ignored, `null` collapses to
//! the field default, and malformed dates decode as `None` instead of
//! failing the whole page.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// A tracker project. Only the id is needed for the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Opaque project id.
    pub id: String,
    /// Display name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Short project identifier (e.g. "WEB").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

/// A tracker issue snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Opaque issue id.
    pub id: String,
    /// Issue title.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Priority label ("urgent", "high", "medium", "low", "none").
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: String,
    /// Target date.
    #[serde(
        default,
        rename = "target_date",
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<NaiveDate>,
    /// Start date.
    #[serde(
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<NaiveDate>,
    /// Description as stored by the tracker (HTML).
    #[serde(default, deserialize_with = "null_as_default")]
    pub description_html: String,
    /// Owning project id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub project: String,
    /// State id, scoped to `project`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub state: String,
    /// Assigned tracker user ids.
    #[serde(default, deserialize_with = "null_as_default")]
    pub assignees: Vec<String>,
    /// Label ids.
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    /// Per-project sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u64>,
}

/// A workflow state of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Opaque state id, unique within its project.
    pub id: String,
    /// Display name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Owning project id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub project: String,
    /// State group ("backlog", "unstarted", "started", "completed", "cancelled").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// One page of a list endpoint.
///
/// Plane paginates with an opaque cursor; older deployments return a bare
/// `{count, results}` body, which decodes as a single final page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    /// Total item count, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Cursor for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether another page exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_results: Option<bool>,
}

impl<T> Page<T> {
    /// Cursor to request next, if the tracker says there is more.
    pub fn next(&self) -> Option<&str> {
        if self.next_page_results == Some(true) {
            self.next_cursor.as_deref().filter(|c| !c.is_empty())
        } else {
            None
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| {
            // Accept both "2024-05-01" and "2024-05-01T00:00:00Z".
            let date_part = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
        }))
}
