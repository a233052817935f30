//! Error types for lock orchestration

use std::fmt;
use std::time::Duration;

use klock_leader_election::ElectionError;

use crate::identity::LockIdentity;

/// Errors returned by [`crate::Locker`]
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Namespace, name or holder id is empty, or labels are malformed
    #[error("Invalid locker: {0}")]
    InvalidConfiguration(String),

    /// Leadership was not acquired within the wait
    #[error("Leader election timed out after {wait:?}")]
    ElectionTimeout {
        /// The wait that elapsed
        wait: Duration,
    },

    /// The caller cancelled while leadership was still being contended
    #[error("Cancelled while waiting for the lock")]
    ExternalCancellation,

    /// Reading or deleting the lease after the run failed
    #[error("Failed to clean up lease: {identity}: {source}")]
    CleanupFailure {
        /// The lock whose lease could not be deleted
        identity: LockIdentity,
        /// Store error
        #[source]
        source: ElectionError,
    },

    /// The election could not be set up
    #[error("Leader election failed: {0}")]
    Election(#[from] ElectionError),

    /// The protected function was entered but did not produce a value
    #[error("Protected function did not complete: {0}")]
    Interrupted(LockIdentity),

    /// Several failures, in the order they happened
    #[error("{}", JoinedDisplay(.0))]
    Joined(Vec<LockError>),
}

struct JoinedDisplay<'a>(&'a [LockError]);

impl fmt::Display for JoinedDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl LockError {
    /// Leaf errors, with [`LockError::Joined`] flattened
    pub fn causes(&self) -> Vec<&LockError> {
        match self {
            Self::Joined(errors) => errors.iter().flat_map(|e| e.causes()).collect(),
            other => vec![other],
        }
    }

    /// Whether the wait elapsed before leadership was acquired
    pub fn is_election_timeout(&self) -> bool {
        self.causes()
            .iter()
            .any(|e| matches!(e, Self::ElectionTimeout { .. }))
    }

    /// Whether the caller cancelled before leadership was acquired
    pub fn is_cancellation(&self) -> bool {
        self.causes()
            .iter()
            .any(|e| matches!(e, Self::ExternalCancellation))
    }
}
