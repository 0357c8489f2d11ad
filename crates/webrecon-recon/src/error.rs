//! Error types for the webrecon-recon crate.

use thiserror::Error;
use webrecon_core::{RegistryError, TargetFileError, ValidationError};

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid project: {0}")]
    Project(String),

    #[error("Task validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Target file error: {0}")]
    TargetFile(#[from] TargetFileError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;
