//! Per-run lookup from (project, state id) to state name.

use std::collections::HashMap;

use planebot_tracker::TrackerApi;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

/// State names keyed by project, then state id.
///
/// State ids are only unique within a project, so lookups always take both.
#[derive(Debug, Clone, Default)]
pub struct StateIndex {
    by_project: HashMap<String, HashMap<String, String>>,
}

impl StateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one state. A repeated (project, state) pair keeps the later name.
    pub fn insert(
        &mut self,
        project_id: impl Into<String>,
        state_id: impl Into<String>,
        name: impl Into<String>,
    ) {
        self.by_project
            .entry(project_id.into())
            .or_default()
            .insert(state_id.into(), name.into());
    }

    /// Name of `state_id` within `project_id`.
    pub fn get(&self, project_id: &str, state_id: &str) -> Option<&str> {
        self.by_project
            .get(project_id)
            .and_then(|states| states.get(state_id))
            .map(String::as_str)
    }

    /// Whether any state of `project_id` is indexed.
    pub fn contains_project(&self, project_id: &str) -> bool {
        self.by_project.contains_key(project_id)
    }

    /// Number of indexed states across all projects.
    pub fn len(&self) -> usize {
        self.by_project.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the index with one state listing per project.
///
/// A project whose listing fails is logged and left out; the other
/// projects are still indexed.
pub async fn build_state_index(tracker: &dyn TrackerApi, project_ids: &[String]) -> StateIndex {
    let mut index = StateIndex::new();

    for project_id in project_ids {
        match tracker.list_states(project_id).await {
            Ok(states) => {
                debug!(project_id = %project_id, count = states.len(), "Indexed states");
                for state in states {
                    index.insert(project_id.as_str(), state.id, state.name);
                }
            }
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Failed to list states, skipping project");
            }
        }
    }

    index
}

/// Find the id of the state called `name` in one project.
///
/// An exact name match wins over a case-insensitive one.
pub async fn resolve_state_id(
    tracker: &dyn TrackerApi,
    project_id: &str,
    name: &str,
) -> BridgeResult<String> {
    let name = name.trim();
    let states = tracker.list_states(project_id).await?;

    if let Some(state) = states.iter().find(|s| s.name == name) {
        return Ok(state.id.clone());
    }

    let lowered = name.to_lowercase();
    states
        .into_iter()
        .find(|s| s.name.to_lowercase() == lowered)
        .map(|s| s.id)
        .ok_or_else(|| {
            BridgeError::NotFound(format!(
                "state '{}' not found in project {}",
                name, project_id
            ))
        })
}
