//! Error types for HMS
//!
//! Engine failures arrive as [`DocumentStoreError`] and are carried unchanged
//! inside [`HmsError::Store`].

use std::io;
use thiserror::Error;

use hms_document::document::DocumentStoreError;

/// Main error type for HMS operations
#[derive(Error, Debug)]
pub enum HmsError {
    /// Configuration parsing or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by the document store
    #[error(transparent)]
    Store(#[from] DocumentStoreError),

    /// No catalog entry with this ID
    #[error("Unknown catalog entry: {0}")]
    UnknownCatalogEntry(String),

    /// A catalog entry does not parse or reads a field the model does not have
    #[error("Invalid catalog entry {id}: {reason}")]
    InvalidCatalogEntry {
        /// Entry ID
        id: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type alias for HMS operations
pub type Result<T> = std::result::Result<T, HmsError>;
