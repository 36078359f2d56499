//! Error types for the store and its operation log.

use thiserror::Error;

/// Main error type for store operations.
///
/// Every variant is raised synchronously, before any side effect of the
/// failing call begins; a rejected call leaves store and log untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("update callback returned no entries to apply")]
    InvalidUpdateResult,

    #[error("API name already taken: {0}")]
    DuplicateApi(String),

    #[error("API not registered: {0}")]
    UnknownApi(String),

    #[error("invalid op id: {0} (must be a positive integer)")]
    InvalidOpId(i64),

    #[error("log is live; pause() or jump_to() before commit()")]
    NotPaused,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
