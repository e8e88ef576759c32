//! Error type definitions for the prober
//!
//! This module defines the application-level error types. Errors that belong
//! to a single probe stage live beside that stage (see `fetch`, `streaming`
//! and `services::probe_cache`). Those never stop a run.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents every error that can stop a batch run before or after
/// probing. Per-candidate failures are not represented here.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration could not be loaded or merged
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    /// Candidate source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The run was stopped before it finished
    #[error("Run interrupted before completion")]
    Interrupted,

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Candidate source specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Input file could not be read
    #[error("Failed to read source {path}: {message}")]
    Read { path: String, message: String },

    /// Input contained no usable entries
    #[error("Source {path} contains no usable entries")]
    Empty { path: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl SourceError {
    /// Create a read error for a path
    pub fn read<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Read {
            path: path.into(),
            message: message.into(),
        }
    }
}
