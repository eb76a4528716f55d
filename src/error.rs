//! Error taxonomy for traversal, key derivation, remote calls and listing.
//!
//! Only [`TraversalError`] is fatal to an upload run. Everything else is
//! scoped to the single file (or listing) that produced it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The root directory or one of its cells could not be listed.
#[derive(Error, Debug)]
#[error("failed to enumerate {path}: {source}")]
pub struct TraversalError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A file path that does not live under the declared root.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path} is not under root {root}")]
pub struct InvalidPathError {
    pub root: PathBuf,
    pub path: PathBuf,
}

/// Failures of a single object-store operation.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The backend rejected the call or could not be reached.
    #[error("backend error during {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The key was still present when the absence wait gave up.
    #[error("timed out after {timeout:?} waiting for {bucket}/{key} to be absent")]
    Timeout {
        bucket: String,
        key: String,
        timeout: Duration,
    },

    /// The circuit breaker rejected the call without reaching the backend.
    #[error("circuit open, {operation} rejected")]
    CircuitOpen { operation: &'static str },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    OperationFailed {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        StoreError::Backend {
            operation,
            message: message.into(),
        }
    }

    /// Whether the failure says something about backend health, and so
    /// deserves a retry and a mark against the circuit breaker.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Backend { .. } => true,
            StoreError::NotFound { .. } => false,
            StoreError::Timeout { .. } => false,
            StoreError::CircuitOpen { .. } => false,
            StoreError::OperationFailed { .. } => false,
        }
    }
}

/// Why one file of an upload run did not make it to the bucket.
#[derive(Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a full paginated listing.
#[derive(Error, Debug)]
pub enum ListError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The backend kept reporting truncation without moving the cursor.
    #[error("listing stalled at marker {marker:?} after {pages} pages")]
    Stalled { marker: Option<String>, pages: usize },

    #[error("listing exceeded {pages} pages")]
    TooManyPages { pages: usize },
}
