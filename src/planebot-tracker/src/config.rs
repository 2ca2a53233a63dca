//! Connection settings for the Plane API.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{TrackerError, TrackerResult};

/// Default Plane REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.plane.so/api/v1";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default page size for cursor-paginated listings.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Configuration for [`crate::PlaneClient`].
#[derive(Clone)]
pub struct TrackerConfig {
    /// Workspace slug used in every API path.
    workspace_slug: String,
    /// API key sent as `x-api-key`.
    api_key: SecretString,
    /// Base URL of the REST API, without trailing slash.
    api_base_url: String,
    /// Timeout applied to each request.
    request_timeout: Duration,
    /// Page size for list calls.
    page_size: u32,
}

impl std::fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("workspace_slug", &self.workspace_slug)
            .field("api_key", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl TrackerConfig {
    /// Create a configuration for the hosted Plane API.
    pub fn new(workspace_slug: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            workspace_slug: workspace_slug.into(),
            api_key: SecretString::new(api_key.into().into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Point the client at a different API root (self-hosted Plane, tests).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the page size for list calls.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Workspace slug.
    pub fn workspace_slug(&self) -> &str {
        &self.workspace_slug
    }

    /// API key.
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// API root.
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Page size for list calls.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Validate the configuration.
    pub fn validate(&self) -> TrackerResult<()> {
        if self.workspace_slug.trim().is_empty() {
            return Err(TrackerError::Config("Workspace slug is empty".to_string()));
        }
        if self.workspace_slug.contains('/') {
            return Err(TrackerError::Config(format!(
                "Workspace slug must not contain '/': {}",
                self.workspace_slug
            )));
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(TrackerError::Config("API key is empty".to_string()));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(TrackerError::Config(format!(
                "API base URL must be http(s): {}",
                self.api_base_url
            )));
        }
        Ok(())
    }
}
