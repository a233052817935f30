//! Lease-based leader election for multi-process coordination.
//!
//! Contenders share a lease resource in a coordination service. Whoever holds
//! the lease is the leader; it must renew the lease within the lease duration
//! or others may take it over.
//!
//! # Overview
//!
//! - **Pluggable store**: [`LeaseClient`] abstracts the coordination service,
//!   with an in-process [`MemoryLeaseClient`] and a directory-backed
//!   [`FileLeaseClient`] that works across processes
//! - **Optimistic concurrency**: every write is a compare-and-swap on the
//!   lease's resource version
//! - **Local expiry**: a foreign lease expires `lease_duration` after it was
//!   last seen to change, measured on the local monotonic clock
//! - **Release on cancel**: a leader that is cancelled clears the holder so
//!   waiting contenders acquire immediately
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use klock_leader_election::{
//!     ElectionConfig, FileLeaseClient, LeaderCallbacks, LeaderElector, LeaseLock,
//! };
//!
//! let client = Arc::new(FileLeaseClient::new("/run/klock/leases")?);
//! let lock = LeaseLock::new("default", "nightly-backup", "host-a", client);
//! let elector = LeaderElector::new(lock, ElectionConfig::default(), callbacks)?;
//!
//! // Returns once leadership was acquired and then ended, or on cancellation
//! elector.run(cancel).await;
//! ```

mod client;
mod config;
mod elector;
mod error;
mod file;
mod record;

pub use client::{LeaseClient, MemoryLeaseClient};
pub use config::{
    ElectionConfig, DEFAULT_LEASE_DURATION, DEFAULT_RENEW_DEADLINE, DEFAULT_RETRY_PERIOD,
    JITTER_FACTOR,
};
pub use elector::{LeaderCallbacks, LeaderElector, LeaseLock};
pub use error::{ElectionError, Result};
pub use file::FileLeaseClient;
pub use record::{LeaseRecord, LeaseSpec, Preconditions};
