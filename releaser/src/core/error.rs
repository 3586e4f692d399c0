//! Error taxonomy for step execution.
//!
//! None of these escape the pipeline executor: each is converted into a failed
//! [`StepResult`](crate::core::types::StepResult) where it originates.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Template syntax or evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct RenderError {
    /// Diagnostic label of the template.
    pub name: String,
    pub message: String,
}

impl RenderError {
    pub fn new(name: &str, err: &minijinja::Error) -> Self {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            name: name.to_string(),
            message,
        }
    }
}

/// Unrecognized or malformed step configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported config type {found}")]
    UnsupportedType { found: &'static str },
    #[error("config {encoding} unmarshal failed: {message}")]
    Decode {
        encoding: &'static str,
        message: String,
    },
    #[error("config {encoding} decoded to {found}, expected an object")]
    NotAMap {
        encoding: &'static str,
        found: &'static str,
    },
}

impl ConfigError {
    /// Runtime type of the rejected input, for diagnostics.
    pub fn config_type(&self) -> &'static str {
        match self {
            ConfigError::UnsupportedType { found } => found,
            ConfigError::Decode { encoding, .. } | ConfigError::NotAMap { encoding, .. } => {
                encoding
            }
        }
    }
}

/// Missing or invalid input detected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{step} step missing config.{key}")]
    MissingKey {
        step: &'static str,
        key: &'static str,
    },
    #[error("eachEntity is true but entities is empty")]
    EmptyEntities,
    #[error("resolved path is empty/invalid")]
    InvalidPath { path: String },
    #[error("invalid env config: {0}")]
    InvalidEnv(ConfigError),
}

/// Directory creation or file write failure.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Subprocess launch failure or non-zero exit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("shell command failed: {0}")]
    Launch(String),
    #[error("shell command failed: exit status {0}")]
    ExitCode(i32),
    #[error("shell command failed: terminated by signal")]
    Signal,
}
