//! Centralized error handling for the prober
//!
//! Component-level failures (fetch, resolve, sample, cache) have their own
//! error enums next to the component. Those never abort a run: the probe turns
//! them into a [`FailureReason`](crate::models::FailureReason) on the
//! candidate's result. `AppError` covers the conditions that do stop the
//! binary, such as unreadable configuration or input files.
//!
//! # Usage
//!
//! ```rust
//! use m3u_prober::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;
