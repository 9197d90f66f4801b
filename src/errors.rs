// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TasktideError {
    /// Bad configuration shape, unknown option or invalid value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A construction surface received an input of an unsupported type.
    #[error("Type error: {0}")]
    Type(String),

    #[error("Task '{0}' already exists")]
    TaskExists(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Could not resolve argument '{name}': {reason}")]
    Resolution { name: String, reason: String },

    #[error("No default session has been set")]
    NoDefaultSession,

    /// The session's scheduler is already serving.
    #[error("Scheduler already running for this session")]
    AlreadyRunning,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TasktideError {
    pub(crate) fn resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        TasktideError::Resolution {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TasktideError>;
