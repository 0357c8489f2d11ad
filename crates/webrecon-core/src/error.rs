use std::path::PathBuf;

use thiserror::Error;

/// A scope range specification could not be expanded into addresses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot expand range '{spec}': {reason}")]
pub struct ExpansionError {
    pub spec: String,
    pub reason: String,
}

impl ExpansionError {
    pub(crate) fn new(spec: &str, reason: impl Into<String>) -> Self {
        Self {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

/// A task batch references something the scheduler has no binding for.
///
/// Raised before any task in the batch is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Task '{task}': callback '{callback}' is not registered")]
    UnknownCallback { task: String, callback: String },

    #[error("Task '{task}': variable '{variable}' is not registered")]
    UnknownVariable { task: String, variable: String },

    #[error("Task '{task}': malformed command template: {reason}")]
    MalformedTemplate { task: String, reason: String },
}

/// Registration into a variable or callback table was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("'{0}' is already registered")]
    Duplicate(String),

    #[error("'{0}' is not a valid identifier (expected [A-Za-z0-9_]+)")]
    InvalidName(String),
}

#[derive(Error, Debug)]
pub enum TargetFileError {
    #[error("Target file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
