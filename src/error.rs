use std::path::PathBuf;
use thiserror::Error;

use crate::document::PlanStatus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    #[error("Decision '{decision_id}' not found in plan '{plan_id}'")]
    DecisionNotFound {
        plan_id: String,
        decision_id: String,
    },

    #[error("Plan '{plan_id}' is {status}, only ready plans can be submitted")]
    NotReady { plan_id: String, status: PlanStatus },

    #[error("Invalid answer for decision '{decision_id}': {reason}")]
    InvalidAnswer { decision_id: String, reason: String },

    #[error("Plan '{0}' is already completed")]
    PlanCompleted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    /// Logic violations the adapter should report with a specific message
    pub fn is_logic_violation(&self) -> bool {
        matches!(
            self,
            QueueError::DecisionNotFound { .. }
                | QueueError::NotReady { .. }
                | QueueError::InvalidAnswer { .. }
                | QueueError::PlanCompleted(_)
        )
    }

    /// Relocation conflicts leave the plan in place and may be retried
    pub fn is_relocation_conflict(&self) -> bool {
        matches!(self, QueueError::Fs(FsError::RelocateConflict { .. }))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Missing required metadata key '{0}'")]
    MissingField(&'static str),

    #[error("Unknown plan status '{0}'")]
    InvalidStatus(String),

    #[error("Document has no metadata block")]
    NoMetadata,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Decision '{0}' not found in document body")]
    DecisionNotFound(String),

    #[error("Document has no metadata block")]
    NoMetadata,
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot relocate to '{path}': a file with that name already exists")]
    RelocateConflict { path: PathBuf },

    #[error("Failed to move '{from}' to '{to}': {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Path has no file name: '{0}'")]
    NoFileName(PathBuf),
}

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to start filesystem notifications: {0}")]
    Notify(#[from] notify::Error),

    #[error("Failed to scan '{path}': {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
}
