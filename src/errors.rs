//! Storage error types.
//!
//! Every variant maps to a well-known S3 error code.  The surrounding API
//! layer renders these onto the wire; the core only decides *which* error
//! an operation produces.  All variants are terminal — the engine never
//! retries internally.

use thiserror::Error;

/// Errors surfaced by the storage core.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist")]
    NoSuchBucket { bucket: String },

    /// The specified key does not exist.
    #[error("The specified key does not exist")]
    NoSuchKey { key: String },

    /// An invalid bucket name was provided.
    #[error("The specified bucket is not valid.")]
    InvalidBucketName { name: String },

    /// The payload exceeds the per-object size limit.
    #[error("Your proposed upload exceeds the maximum allowed object size.")]
    EntityTooLarge,

    /// Storing the payload would exceed the configured total capacity.
    #[error("Adding this object would exceed the storage capacity limit.")]
    CapacityExceeded,

    /// Catch-all for unexpected internal errors.
    #[error("We encountered an internal error, please try again.")]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    /// Return the S3 error code string for this error.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NoSuchBucket { .. } => "NoSuchBucket",
            StoreError::NoSuchKey { .. } => "NoSuchKey",
            StoreError::InvalidBucketName { .. } => "InvalidBucketName",
            StoreError::EntityTooLarge => "EntityTooLarge",
            StoreError::CapacityExceeded => "CapacityExceeded",
            StoreError::Internal(_) => "InternalError",
        }
    }

    /// HTTP status hint for the surrounding API layer.
    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::NoSuchBucket { .. } => 404,
            StoreError::NoSuchKey { .. } => 404,
            StoreError::InvalidBucketName { .. } => 400,
            StoreError::EntityTooLarge => 400,
            StoreError::CapacityExceeded => 507,
            StoreError::Internal(_) => 500,
        }
    }
}

/// Convenience result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
