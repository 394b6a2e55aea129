//! Typed error hierarchy for Loom.
//!
//! One enum per subsystem:
//! - `BdError` - invocations of the external `bd` CLI
//! - `SnapshotError` - reading and parsing the watched `issues.jsonl`
//! - `WatcherError` - filesystem subscription failures
//! - `DependencyError` - read-only queries against the bd SQLite store
//! - `ClientError` - the dashboard client talking to a running server

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the bd CLI adapter.
#[derive(Debug, Error)]
pub enum BdError {
    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` produced unparseable output: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` returned no issue")]
    EmptyResponse { command: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Issue {id} not found")]
    NotFound { id: String },
}

impl BdError {
    /// True when the failure means the requested issue does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            BdError::NotFound { .. } => true,
            BdError::NonZeroExit { stderr, .. } => stderr.to_lowercase().contains("not found"),
            _ => false,
        }
    }
}

/// Errors from loading the watched change-log.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record on line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate issue id '{id}' on line {line}")]
    DuplicateId { line: usize, id: String },
}

/// Errors from the log watcher's filesystem subscription.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to create file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Nothing to watch: neither {path} nor its workspace exists")]
    MissingWorkspace { path: PathBuf },
}

/// Errors from dependency-edge queries against the bd store.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("Failed to list {dir}: {source}")]
    Discover {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {path} read-only: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Dependency query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Dependency query task panicked")]
    TaskPanicked,
}

/// Errors seen by the dashboard client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Push connection to {url} failed: {source}")]
    Push {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}
