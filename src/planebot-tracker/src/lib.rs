//! Plane issue tracker client for planebot.
//!
//! This crate wraps the subset of the Plane REST API the bridge needs:
//! - Listing projects in a workspace
//! - Listing issues and states per project (cursor paginated)
//! - Fetching a single state
//! - Moving an issue to another state
//!
//! The [`TrackerApi`] trait is the seam the rest of the workspace codes
//! against, so pipelines can be exercised with in-memory fakes.
//!
//! # Example
//!
//! ```rust,ignore
//! use planebot_tracker::{PlaneClient, TrackerApi, TrackerConfig};
//!
//! let config = TrackerConfig::new("my-workspace", "plane-api-key");
//! let client = PlaneClient::new(config)?;
//! for project in client.list_projects().await? {
//!     let issues = client.list_issues(&project.id).await?;
//!     println!("{}: {} issues", project.id, issues.len());
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;

pub use client::{PlaneClient, TrackerApi};
pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use models::{Issue, Page, Project, State};
