//! Fetch, resolve, categorize and dispatch.
//!
//! One run is strictly sequential: the project listing, then one issue
//! listing per project, then the state index, then delivery. A project whose
//! calls fail is logged and left out; the rest of the run goes on.

use std::sync::Arc;

use chrono::NaiveDate;
use planebot_tracker::{Issue, TrackerApi};
use tracing::{info, warn};

use crate::categorize::{CategorizedIssues, categorize};
use crate::dispatch::{ChatSink, DispatchReport, Dispatcher};
use crate::error::BridgeResult;
use crate::format::LinkBuilder;
use crate::mapping::UserMappingStore;
use crate::states::build_state_index;

/// Issues fetched for one run, in per-project listing order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Projects listed by the tracker.
    pub project_ids: Vec<String>,
    /// Issues of every project whose listing succeeded.
    pub issues: Vec<Issue>,
    /// Projects whose issue listing failed.
    pub failed_projects: Vec<String>,
}

/// List projects, then the issues of each project.
///
/// Only a failed project listing fails the call.
pub async fn fetch_snapshot(tracker: &dyn TrackerApi) -> BridgeResult<Snapshot> {
    let projects = tracker.list_projects().await?;
    if projects.is_empty() {
        info!("Tracker returned no projects");
    }

    let mut snapshot = Snapshot {
        project_ids: projects.into_iter().map(|p| p.id).collect(),
        ..Snapshot::default()
    };

    for project_id in &snapshot.project_ids {
        match tracker.list_issues(project_id).await {
            Ok(issues) => {
                info!(project_id = %project_id, count = issues.len(), "Fetched issues");
                snapshot.issues.extend(issues);
            }
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Failed to fetch issues, skipping project");
                snapshot.failed_projects.push(project_id.clone());
            }
        }
    }

    Ok(snapshot)
}

/// The two notification flows, wired to their collaborators.
pub struct NotificationPipeline {
    tracker: Arc<dyn TrackerApi>,
    chat: Arc<dyn ChatSink>,
    mapping: Arc<UserMappingStore>,
    links: LinkBuilder,
    overview_channel: String,
}

impl NotificationPipeline {
    pub fn new(
        tracker: Arc<dyn TrackerApi>,
        chat: Arc<dyn ChatSink>,
        mapping: Arc<UserMappingStore>,
        links: LinkBuilder,
        overview_channel: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            chat,
            mapping,
            links,
            overview_channel: overview_channel.into(),
        }
    }

    /// Message every mapped assignee of every fetched issue.
    pub async fn run_assignee_notifications(&self) -> BridgeResult<DispatchReport> {
        info!("Starting assignee notification run");

        let snapshot = fetch_snapshot(self.tracker.as_ref()).await?;
        let mapping = self.mapping.load().await?;
        info!(mapped_users = mapping.len(), "Loaded user mapping");

        let dispatcher = Dispatcher::new(self.chat.as_ref(), &self.links);
        Ok(dispatcher.notify_assignees(&snapshot.issues, &mapping).await)
    }

    /// Categorize every fetched issue and post the digest for `date`.
    ///
    /// Projects that failed to load are missing from the digest; it is sent
    /// regardless.
    pub async fn run_daily_digest(&self, date: NaiveDate) -> BridgeResult<CategorizedIssues> {
        info!(%date, "Starting daily digest run");

        let snapshot = fetch_snapshot(self.tracker.as_ref()).await?;
        let index = build_state_index(self.tracker.as_ref(), &snapshot.project_ids).await;
        let categorized = categorize(&snapshot.issues, &index);

        if !categorized.unresolved().is_empty() {
            warn!(
                count = categorized.unresolved().len(),
                "Some issues were left out of the digest"
            );
        }

        let dispatcher = Dispatcher::new(self.chat.as_ref(), &self.links);
        dispatcher
            .send_digest(&categorized, date, &self.overview_channel)
            .await?;

        Ok(categorized)
    }

    /// Both flows, one after the other. Errors are logged.
    pub async fn run_daily(&self, date: NaiveDate) {
        if let Err(e) = self.run_assignee_notifications().await {
            warn!(error = %e, "Assignee notification run failed");
        }
        if let Err(e) = self.run_daily_digest(date).await {
            warn!(error = %e, "Daily digest run failed");
        }
    }
}
