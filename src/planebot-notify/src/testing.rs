//! In-memory fakes shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use planebot_slack::{SlackError, SlackResult};
use planebot_tracker::{Issue, Project, State, TrackerApi, TrackerError, TrackerResult};

use crate::dispatch::ChatSink;

pub fn issue(id: &str, project: &str, state: &str, assignees: &[&str]) -> Issue {
    Issue {
        id: id.to_string(),
        name: format!("Issue {}", id),
        project: project.to_string(),
        state: state.to_string(),
        assignees: assignees.iter().map(|a| a.to_string()).collect(),
        ..Issue::default()
    }
}

#[derive(Default)]
pub struct FakeTracker {
    projects: Vec<Project>,
    issues: HashMap<String, Vec<Issue>>,
    states: HashMap<String, Vec<State>>,
    failing_states: HashSet<String>,
    failing_issues: HashSet<String>,
    fail_projects: bool,
    updates: Mutex<Vec<(String, String, String)>>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, id: &str) -> Self {
        self.projects.push(Project {
            id: id.to_string(),
            name: format!("Project {}", id),
            identifier: None,
        });
        self
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues
            .entry(issue.project.clone())
            .or_default()
            .push(issue);
        self
    }

    pub fn with_state(mut self, project: &str, id: &str, name: &str) -> Self {
        self.states.entry(project.to_string()).or_default().push(State {
            id: id.to_string(),
            name: name.to_string(),
            project: project.to_string(),
            group: None,
        });
        self
    }

    pub fn failing_states(mut self, project: &str) -> Self {
        self.failing_states.insert(project.to_string());
        self
    }

    pub fn failing_issues(mut self, project: &str) -> Self {
        self.failing_issues.insert(project.to_string());
        self
    }

    pub fn failing_projects(mut self) -> Self {
        self.fail_projects = true;
        self
    }

    pub fn updates(&self) -> Vec<(String, String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackerApi for FakeTracker {
    async fn list_projects(&self) -> TrackerResult<Vec<Project>> {
        if self.fail_projects {
            return Err(TrackerError::Network("connection refused".to_string()));
        }
        Ok(self.projects.clone())
    }

    async fn list_issues(&self, project_id: &str) -> TrackerResult<Vec<Issue>> {
        if self.failing_issues.contains(project_id) {
            return Err(TrackerError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(self.issues.get(project_id).cloned().unwrap_or_default())
    }

    async fn list_states(&self, project_id: &str) -> TrackerResult<Vec<State>> {
        if self.failing_states.contains(project_id) {
            return Err(TrackerError::Timeout("states".to_string()));
        }
        Ok(self.states.get(project_id).cloned().unwrap_or_default())
    }

    async fn get_state(&self, project_id: &str, state_id: &str) -> TrackerResult<State> {
        self.states
            .get(project_id)
            .and_then(|states| states.iter().find(|s| s.id == state_id))
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("state {}", state_id)))
    }

    async fn update_issue_state(
        &self,
        project_id: &str,
        issue_id: &str,
        state_id: &str,
    ) -> TrackerResult<()> {
        self.updates.lock().unwrap().push((
            project_id.to_string(),
            issue_id.to_string(),
            state_id.to_string(),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeChat {
    failing_users: HashSet<String>,
    failing_channels: HashSet<String>,
    posts: Mutex<Vec<(String, String)>>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_user(mut self, user: &str) -> Self {
        self.failing_users.insert(user.to_string());
        self
    }

    pub fn failing_channel(mut self, channel: &str) -> Self {
        self.failing_channels.insert(channel.to_string());
        self
    }

    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSink for FakeChat {
    async fn open_direct_channel(&self, user_id: &str) -> SlackResult<String> {
        if self.failing_users.contains(user_id) {
            return Err(SlackError::User(format!("user_not_found: {}", user_id)));
        }
        Ok(format!("D-{}", user_id))
    }

    async fn post_message(&self, channel: &str, text: &str) -> SlackResult<()> {
        if self.failing_channels.contains(channel) {
            return Err(SlackError::Channel(format!("channel_not_found: {}", channel)));
        }
        self.posts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}
