//! Bridge configuration.
//!
//! Everything the bridge needs is collected into one [`BridgeConfig`] value
//! at startup and handed to each component; nothing reads the environment
//! after that.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use cron::Schedule;
use planebot_slack::SlackConfig;
use planebot_tracker::TrackerConfig;

use crate::error::{BridgeError, BridgeResult};

/// Default web app root used for issue deep links.
pub const DEFAULT_APP_URL: &str = "https://app.plane.so";
/// Default user mapping file.
pub const DEFAULT_MAPPING_PATH: &str = "user_mapping.csv";
/// Default schedule: every day at 09:00 (seconds field first).
pub const DEFAULT_SCHEDULE_CRON: &str = "0 0 9 * * *";
/// Default schedule timezone.
pub const DEFAULT_SCHEDULE_TIMEZONE: &str = "Asia/Kolkata";
/// Default webhook log file.
pub const DEFAULT_WEBHOOK_LOG_PATH: &str = "webhook.log";
/// Default per-request timeout, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Complete configuration of the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Tracker connection settings.
    pub tracker: TrackerConfig,
    /// Slack tokens and API root.
    pub slack: SlackConfig,
    /// Channel receiving the daily digest.
    pub overview_channel: String,
    /// Web app root for deep links, without trailing slash.
    pub app_url: String,
    /// User mapping CSV file.
    pub mapping_path: PathBuf,
    /// Whether the mapping file carries a header row.
    pub mapping_header: bool,
    /// Cron expression for the daily run.
    pub schedule_cron: String,
    /// IANA timezone the cron expression is evaluated in.
    pub schedule_timezone: String,
    /// Per-request timeout for outbound HTTP calls.
    pub http_timeout: Duration,
    /// Address of the webhook receiver; `None` disables it.
    pub webhook_addr: Option<SocketAddr>,
    /// File webhook bodies are appended to.
    pub webhook_log_path: PathBuf,
}

impl BridgeConfig {
    /// Load configuration from the process environment.
    ///
    /// Required variables:
    /// - `SLUG`
    /// - `PLANE_TOKEN`
    /// - `SLACK_TOKEN`
    /// - `SLACK_SOCK_TOKEN`
    /// - `SLACK_OVERVIEW_CHANNEL_ID`
    pub fn from_env() -> BridgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> BridgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| BridgeError::Config(format!("{} not set", key)))
        };

        let slug = require("SLUG")?;
        let plane_token = require("PLANE_TOKEN")?;
        let overview_channel = require("SLACK_OVERVIEW_CHANNEL_ID")?;

        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| {
                    BridgeError::Config(format!("HTTP_TIMEOUT_SECS is not a number: {}", raw))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let mut tracker = TrackerConfig::new(slug, plane_token).with_request_timeout(http_timeout);
        if let Some(url) = get("PLANE_API_URL") {
            tracker = tracker.with_api_base_url(url);
        }

        let slack = SlackConfig::from_lookup(|key| get(key))?;

        let mapping_header = match get("USER_MAPPING_HEADER") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                BridgeError::Config(format!("USER_MAPPING_HEADER is not a boolean: {}", raw))
            })?,
            None => false,
        };

        let webhook_addr = match get("WEBHOOK_ADDR") {
            Some(raw) => Some(raw.parse().map_err(|_| {
                BridgeError::Config(format!("WEBHOOK_ADDR is not a socket address: {}", raw))
            })?),
            None => None,
        };

        let config = Self {
            tracker,
            slack,
            overview_channel,
            app_url: get("PLANE_APP_URL")
                .unwrap_or_else(|| DEFAULT_APP_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            mapping_path: get("USER_MAPPING_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_PATH)),
            mapping_header,
            schedule_cron: get("SCHEDULE_CRON").unwrap_or_else(|| DEFAULT_SCHEDULE_CRON.to_string()),
            schedule_timezone: get("SCHEDULE_TIMEZONE")
                .unwrap_or_else(|| DEFAULT_SCHEDULE_TIMEZONE.to_string()),
            http_timeout,
            webhook_addr,
            webhook_log_path: get("WEBHOOK_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WEBHOOK_LOG_PATH)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Override the mapping file location.
    pub fn with_mapping_path(mut self, path: impl AsRef<Path>) -> Self {
        self.mapping_path = path.as_ref().to_path_buf();
        self
    }

    /// Enable the webhook receiver on `addr`.
    pub fn with_webhook_addr(mut self, addr: SocketAddr) -> Self {
        self.webhook_addr = Some(addr);
        self
    }

    /// Parsed cron schedule.
    pub fn schedule(&self) -> BridgeResult<Schedule> {
        Schedule::from_str(&self.schedule_cron).map_err(|e| {
            BridgeError::Config(format!(
                "invalid cron expression '{}': {}",
                self.schedule_cron, e
            ))
        })
    }

    /// Parsed schedule timezone.
    pub fn timezone(&self) -> BridgeResult<Tz> {
        self.schedule_timezone.parse().map_err(|_| {
            BridgeError::Config(format!("invalid timezone '{}'", self.schedule_timezone))
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        self.tracker.validate()?;
        self.slack.validate()?;

        if self.overview_channel.is_empty() {
            return Err(BridgeError::Config(
                "SLACK_OVERVIEW_CHANNEL_ID is empty".to_string(),
            ));
        }
        if !self.app_url.starts_with("http://") && !self.app_url.starts_with("https://") {
            return Err(BridgeError::Config(format!(
                "PLANE_APP_URL must be an http(s) URL: {}",
                self.app_url
            )));
        }

        if self.http_timeout.is_zero() {
            return Err(BridgeError::Config(
                "HTTP_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        self.schedule()?;
        self.timezone()?;
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
