//! Grouping issues by resolved state name.

use indexmap::IndexMap;
use planebot_tracker::Issue;
use tracing::warn;

use crate::states::StateIndex;

/// Display order of the well-known state names in the digest.
pub const CANONICAL_STATE_ORDER: [&str; 5] = ["Backlog", "Todo", "In Progress", "Done", "Cancelled"];

/// Issues bucketed by state name.
///
/// Buckets keep the order in which their state was first seen, and issues
/// keep their input order within a bucket.
#[derive(Debug, Clone, Default)]
pub struct CategorizedIssues {
    buckets: IndexMap<String, Vec<Issue>>,
    unresolved: Vec<String>,
}

impl CategorizedIssues {
    /// Buckets in first-seen order.
    pub fn buckets(&self) -> &IndexMap<String, Vec<Issue>> {
        &self.buckets
    }

    /// Issues in the bucket called `state_name`.
    pub fn get(&self, state_name: &str) -> Option<&[Issue]> {
        self.buckets.get(state_name).map(Vec::as_slice)
    }

    /// Ids of issues whose state could not be resolved.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Number of categorized issues.
    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets in display order: the canonical names first, then every
    /// other name in first-seen order.
    ///
    /// Canonical names match case-insensitively, so a tracker calling its
    /// state "In progress" still sorts into the third slot.
    pub fn in_display_order(&self) -> Vec<(&str, &[Issue])> {
        let mut ordered: Vec<(usize, usize, &str, &[Issue])> = self
            .buckets
            .iter()
            .enumerate()
            .map(|(seen, (name, issues))| {
                let rank = canonical_rank(name).unwrap_or(CANONICAL_STATE_ORDER.len());
                (rank, seen, name.as_str(), issues.as_slice())
            })
            .collect();

        ordered.sort_by_key(|(rank, seen, _, _)| (*rank, *seen));
        ordered
            .into_iter()
            .map(|(_, _, name, issues)| (name, issues))
            .collect()
    }
}

fn canonical_rank(name: &str) -> Option<usize> {
    CANONICAL_STATE_ORDER
        .iter()
        .position(|canonical| canonical.eq_ignore_ascii_case(name.trim()))
}

/// Bucket `issues` by the name their `(project, state)` pair resolves to.
///
/// An issue whose state is not in `index` is logged once and left out of
/// every bucket.
pub fn categorize<'a, I>(issues: I, index: &StateIndex) -> CategorizedIssues
where
    I: IntoIterator<Item = &'a Issue>,
{
    let mut result = CategorizedIssues::default();

    for issue in issues {
        match index.get(&issue.project, &issue.state) {
            Some(name) => result
                .buckets
                .entry(name.to_string())
                .or_default()
                .push(issue.clone()),
            None => {
                warn!(
                    issue_id = %issue.id,
                    project_id = %issue.project,
                    state_id = %issue.state,
                    "Issue state not found in project states, excluding issue"
                );
                result.unresolved.push(issue.id.clone());
            }
        }
    }

    result
}
