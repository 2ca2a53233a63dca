//! HTTP client for the Plane REST API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::models::{Issue, Page, Project, State};

/// Upper bound on pages fetched for one listing.
const MAX_PAGES: usize = 500;

/// Operations the bridge needs from the issue tracker.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// List every project in the workspace.
    async fn list_projects(&self) -> TrackerResult<Vec<Project>>;

    /// List every issue of a project, in tracker order.
    async fn list_issues(&self, project_id: &str) -> TrackerResult<Vec<Issue>>;

    /// List every state defined by a project.
    async fn list_states(&self, project_id: &str) -> TrackerResult<Vec<State>>;

    /// Fetch a single state.
    async fn get_state(&self, project_id: &str, state_id: &str) -> TrackerResult<State>;

    /// Move an issue to another state.
    async fn update_issue_state(
        &self,
        project_id: &str,
        issue_id: &str,
        state_id: &str,
    ) -> TrackerResult<()>;
}

/// [`TrackerApi`] implementation backed by `reqwest`.
#[derive(Clone)]
pub struct PlaneClient {
    client: reqwest::Client,
    config: TrackerConfig,
}

impl PlaneClient {
    /// Create a client for the given configuration.
    pub fn new(config: TrackerConfig) -> TrackerResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn workspace_url(&self, path: &str) -> String {
        format!(
            "{}/workspaces/{}/{}",
            self.config.api_base_url(),
            self.config.workspace_slug(),
            path.trim_start_matches('/')
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> TrackerResult<T> {
        debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .header("x-api-key", self.config.api_key())
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(TrackerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> TrackerResult<Vec<T>> {
        let url = self.workspace_url(path);
        let per_page = self.config.page_size().to_string();

        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = vec![("per_page", per_page.clone())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let page: Page<T> = self.get_json(&url, &query).await?;
            let next = page.next().map(str::to_string);
            items.extend(page.results);

            match next {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                Some(next) => {
                    warn!(url = %url, cursor = %next, "Tracker repeated a pagination cursor, stopping");
                    return Ok(items);
                }
                None => return Ok(items),
            }
        }

        warn!(url = %url, "Pagination limit of {} pages reached", MAX_PAGES);
        Ok(items)
    }
}

#[async_trait]
impl TrackerApi for PlaneClient {
    async fn list_projects(&self) -> TrackerResult<Vec<Project>> {
        self.get_all("projects/").await
    }

    async fn list_issues(&self, project_id: &str) -> TrackerResult<Vec<Issue>> {
        let mut issues: Vec<Issue> = self
            .get_all(&format!("projects/{}/issues/", project_id))
            .await?;

        for issue in issues.iter_mut().filter(|i| i.project.is_empty()) {
            issue.project = project_id.to_string();
        }

        Ok(issues)
    }

    async fn list_states(&self, project_id: &str) -> TrackerResult<Vec<State>> {
        let mut states: Vec<State> = self
            .get_all(&format!("projects/{}/states/", project_id))
            .await?;

        for state in states.iter_mut().filter(|s| s.project.is_empty()) {
            state.project = project_id.to_string();
        }

        Ok(states)
    }

    async fn get_state(&self, project_id: &str, state_id: &str) -> TrackerResult<State> {
        let url = self.workspace_url(&format!("projects/{}/states/{}/", project_id, state_id));
        let mut state: State = self.get_json(&url, &[]).await?;
        if state.project.is_empty() {
            state.project = project_id.to_string();
        }
        Ok(state)
    }

    async fn update_issue_state(
        &self,
        project_id: &str,
        issue_id: &str,
        state_id: &str,
    ) -> TrackerResult<()> {
        let url = self.workspace_url(&format!("projects/{}/issues/{}/", project_id, issue_id));
        debug!(url = %url, state_id, "PATCH issue state");

        let response = self
            .client
            .patch(&url)
            .header("x-api-key", self.config.api_key())
            .json(&serde_json::json!({ "state": state_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PlaneClient {
        let config = TrackerConfig::new("acme", "test-key").with_api_base_url(server.uri());
        PlaneClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_list_projects_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/acme/projects/"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 2,
                "results": [{"id": "P1", "name": "Web"}, {"id": "P2", "name": "API"}]
            })))
            .mount(&server)
            .await;

        let projects = client_for(&server).list_projects().await.unwrap();
        let ids: Vec<_> = projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2"]);
    }

    #[tokio::test]
    async fn test_list_issues_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/acme/projects/P1/issues/"))
            .and(query_param("cursor", "100:1:0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": "I2", "project": "P1", "state": "S2"}],
                "next_cursor": "100:2:0",
                "next_page_results": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/workspaces/acme/projects/P1/issues/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"id": "I1", "state": "S1"}],
                "next_cursor": "100:1:0",
                "next_page_results": true
            })))
            .mount(&server)
            .await;

        let issues = client_for(&server).list_issues("P1").await.unwrap();
        let ids: Vec<_> = issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["I1", "I2"]);
        // Missing project is filled from the listing.
        assert_eq!(issues[0].project, "P1");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/acme/projects/P9/states/"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_states("P9").await.unwrap_err();
        match err {
            TrackerError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "not found");
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/acme/projects/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).list_projects().await.unwrap_err();
        assert!(matches!(err, TrackerError::Decode(_)));
    }

    #[tokio::test]
    async fn test_get_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/acme/projects/P1/states/S1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "S1", "name": "In Progress", "group": "started"
            })))
            .mount(&server)
            .await;

        let state = client_for(&server).get_state("P1", "S1").await.unwrap();
        assert_eq!(state.name, "In Progress");
        assert_eq!(state.project, "P1");
    }

    #[tokio::test]
    async fn test_update_issue_state_sends_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/workspaces/acme/projects/P1/issues/I1/"))
            .and(header("x-api-key", "test-key"))
            .and(body_json(serde_json::json!({"state": "S2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "I1"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .update_issue_state("P1", "I1", "S2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_issue_state_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid state"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .update_issue_state("P1", "I1", "bogus")
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Status { status: 400, .. }));
    }
}
