//! Error handling for mediabus
//!
//! This module defines the crate error type and a Result alias used
//! throughout the runtime and the collection cache.

use thiserror::Error;

/// Main error type for mediabus operations
#[derive(Error, Debug)]
pub enum MediaBusError {
    /// Errors from the collection cache store
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Errors from stream I/O
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to configuration loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// No codec registered for a MIME type
    #[error("Codec error: {0}")]
    Codec(String),

    /// Errors raised inside a packet handler
    #[error("Handler error: {0}")]
    Handler(String),

    /// A stream was used in a state that does not permit the operation
    #[error("Stream error: {0}")]
    Stream(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<MediaBusError>,
    },
}

impl MediaBusError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        MediaBusError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for mediabus operations
pub type Result<T> = std::result::Result<T, MediaBusError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
