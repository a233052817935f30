//! Where leases live

use std::path::{Path, PathBuf};

use klock_leader_election::{ElectionError, FileLeaseClient};

/// Environment variable naming the lease directory
pub const LEASE_DIR_ENV: &str = "KLOCK_LEASE_DIR";

/// Lease directory: the flag (or `KLOCK_LEASE_DIR`, via clap) if given,
/// otherwise `klock/leases` under the user's runtime directory, otherwise
/// under the system temp directory
///
/// Contenders only exclude each other when they resolve to the same directory.
pub fn resolve_lease_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("klock")
        .join("leases")
}

/// Open the lease store, creating the directory if needed
pub fn open_lease_store(explicit: Option<&Path>) -> Result<FileLeaseClient, ElectionError> {
    let dir = resolve_lease_dir(explicit);
    tracing::debug!(lease_dir = %dir.display(), "Opening lease store");
    FileLeaseClient::new(dir)
}
