//! sprintsync - Jira sprint and issue synchronization
//!
//! Mirrors sprints and their issues from Jira Software (Agile REST API) into a
//! local SQLite store, and produces team-bounded views of recent sprints.
//!
//! # Architecture
//!
//! - **credentials**: Resolve per-user integration settings into request credentials
//! - **board**: Board id extraction from board URLs and id lists
//! - **integrations**: Jira Agile REST client (pagination, base-path probing)
//! - **sync**: Payload normalization and the sync orchestrator
//! - **store**: Storage trait and SQLite implementation
//! - **report**: Per-team capped selection of recent sprints
//! - **config**: YAML configuration, integration settings, validation

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub mod board;
pub mod credentials;
pub mod integrations;
pub mod report;
pub mod store;
pub mod sync;

// Re-exports
pub use error::{ExternalServiceError, Result, ServiceErrorKind, SprintSyncError};
