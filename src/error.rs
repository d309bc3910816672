//! Error handling for SampleFlow-RS
//!
//! Each layer owns a focused error enum (`BufferError`, `FormulaError`,
//! `ModuleError`, `LoadError`). This module ties them together in
//! `SampleFlowError`, which is what the session and configuration APIs
//! return.

use crate::analysis::formula::FormulaError;
use crate::buffer::BufferError;
use crate::pipeline::error::LoadError;
use thiserror::Error;

/// Main error type for SampleFlow-RS operations
#[derive(Error, Debug)]
pub enum SampleFlowError {
    /// Buffer storage or snapshot failures
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Module graph construction failures
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Formula parse failures outside of graph loading
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SampleFlowError>,
    },
}

impl SampleFlowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SampleFlowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for SampleFlowError {
    fn from(err: serde_json::Error) -> Self {
        SampleFlowError::Serialization(err.to_string())
    }
}

/// Result type alias for SampleFlow-RS operations
pub type Result<T> = std::result::Result<T, SampleFlowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<SampleFlowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
