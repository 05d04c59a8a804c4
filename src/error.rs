use std::path::PathBuf;

use thiserror::Error;

use crate::alert::template::TemplateError;

/// Problems with the configuration file. Always fatal: nothing is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("failed reading config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed parsing config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("source at index {index} has an empty `{field}`")]
    EmptyField { index: usize, field: &'static str },
    #[error("repeated course name and period: {0}")]
    DuplicateCourse(String),
    #[error("unknown channel name \"{channel}\" for course \"{course}\"")]
    UnknownChannel { channel: String, course: String },
    #[error("course \"{course}\" lists assignment \"{assignment}\" more than once")]
    DuplicateAssignment { course: String, assignment: String },
    #[error("course \"{course}\", assignment \"{assignment}\": start {start} is after end {end}")]
    InvertedWindow {
        course: String,
        assignment: String,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
    #[error("\"{first}\" and \"{second}\" would share the snapshot file {path}")]
    SnapshotCollision {
        first: String,
        second: String,
        path: String,
    },
    #[error("invalid `{name}` message template: {source}")]
    Template {
        name: &'static str,
        source: TemplateError,
    },
}

/// Failure to obtain submissions for one assignment. The assignment is skipped for this pass.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
    #[error("GET {url} returned {status}: {preview}")]
    Status {
        url: String,
        status: u16,
        preview: String,
    },
    #[error("invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed submission data: {0}")]
    Malformed(String),
    #[error("missing API key: environment variable {0} is not set")]
    MissingApiKey(String),
}

/// Failure to deliver one notification. Logged, never propagated past the assignment.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("delivery endpoint returned {status}: {preview}")]
    Status { status: u16, preview: String },
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("missing notifier token: environment variable {0} is not set")]
    MissingToken(String),
    #[error("failed writing notification: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt snapshot {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },
    #[error("failed encoding snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}
