//! Mutual exclusion for arbitrary work, backed by a lease.
//!
//! A [`Locker`] names a lease and a holder identity. [`Locker::lock_and_run`]
//! contends for the lease, runs the given function once leadership is held,
//! and releases the lease when the function returns. Waiting can be bounded,
//! a cleanup hook can run after leadership ends, and the lease itself can be
//! deleted afterwards.
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use klock_lease::{LockOptions, Locker};
//!
//! let locker = Locker::new("default", "nightly-backup", "host-a", client)?;
//! let options = LockOptions::new().with_wait(Duration::from_secs(30));
//! let rows = locker
//!     .lock_and_run(&cancel, options, |token| async move { backup(token).await })
//!     .await?;
//! ```

mod coordinator;
mod error;
mod identity;
mod labels;
mod locker;

pub use coordinator::{LeaseCoordinator, LEASE_CLEANUP_TIMEOUT};
pub use error::LockError;
pub use identity::LockIdentity;
pub use labels::{
    common_labels, format_labels, merge_labels, parse_labels, Labels, MANAGED_BY_LABEL,
    MANAGED_BY_VALUE,
};
pub use locker::{ElectionOutcome, LockOptions, LockState, Locker};
