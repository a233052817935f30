//! Error types for lease stores and leader election

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while talking to a lease store or running an election
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The lease does not exist
    #[error("Lease {namespace}/{name} not found")]
    NotFound {
        /// Namespace of the lease
        namespace: String,
        /// Name of the lease
        name: String,
    },

    /// A lease with the same namespace and name already exists
    #[error("Lease {namespace}/{name} already exists")]
    AlreadyExists {
        /// Namespace of the lease
        namespace: String,
        /// Name of the lease
        name: String,
    },

    /// A write was rejected because the stored lease changed since it was read
    #[error("Lease {namespace}/{name} was modified concurrently: {reason}")]
    Conflict {
        /// Namespace of the lease
        namespace: String,
        /// Name of the lease
        name: String,
        /// Which precondition did not hold
        reason: String,
    },

    /// Namespace or name cannot be used as a lease key
    #[error("Invalid lease key: {0}")]
    InvalidName(String),

    /// Election timing parameters are inconsistent
    #[error("Invalid election config: {0}")]
    InvalidConfig(String),

    /// Failed to read or write the lease store
    #[error("Lease store I/O error at {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A stored lease document could not be decoded or encoded
    #[error("Malformed lease document {}: {source}", path.display())]
    Serialization {
        /// Path of the document
        path: PathBuf,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// A blocking store task panicked or was cancelled
    #[error("Lease store task failed: {0}")]
    Task(String),

    /// A store request did not finish in time
    #[error("Lease store request timed out after {0:?}")]
    Timeout(Duration),
}

impl ElectionError {
    /// Whether the lease was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether a precondition or optimistic-concurrency check rejected the request
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for election operations
pub type Result<T> = std::result::Result<T, ElectionError>;
