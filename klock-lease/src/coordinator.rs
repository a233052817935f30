//! Direct access to the lease behind a lock

use std::sync::Arc;
use std::time::Duration;

use klock_leader_election::{ElectionError, LeaseClient, LeaseRecord, Preconditions};
use tracing::debug;

/// Upper bound on reading and deleting the lease after a run
pub const LEASE_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads and conditionally deletes one lease
#[derive(Clone)]
pub struct LeaseCoordinator {
    client: Arc<dyn LeaseClient>,
    namespace: String,
    name: String,
}

impl LeaseCoordinator {
    pub fn new(
        client: Arc<dyn LeaseClient>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Current lease record
    pub async fn get(&self) -> Result<LeaseRecord, ElectionError> {
        self.client.get(&self.namespace, &self.name).await
    }

    /// Delete the lease only if it is still exactly the resource in `observed`
    ///
    /// Fails with a conflict if the lease was written or re-created since.
    pub async fn delete_if_unchanged(&self, observed: &LeaseRecord) -> Result<(), ElectionError> {
        self.client
            .delete(&self.namespace, &self.name, Preconditions::observed(observed))
            .await
    }

    /// Read the lease and delete it, unless another holder has it
    ///
    /// Returns whether a lease was deleted. A missing lease counts as
    /// nothing to delete. Bounded by [`LEASE_CLEANUP_TIMEOUT`].
    pub async fn delete_current(&self, holder_id: &str) -> Result<bool, ElectionError> {
        tokio::time::timeout(LEASE_CLEANUP_TIMEOUT, self.delete_unless_foreign(holder_id))
            .await
            .map_err(|_| ElectionError::Timeout(LEASE_CLEANUP_TIMEOUT))?
    }

    async fn delete_unless_foreign(&self, holder_id: &str) -> Result<bool, ElectionError> {
        let record = match self.get().await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                debug!(lease = %self.key(), "Lease already deleted");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if let Some(holder) = record.spec.holder() {
            if holder != holder_id {
                debug!(lease = %self.key(), holder, "Lease is held by another holder, keeping it");
                return Ok(false);
            }
        }
        self.delete_if_unchanged(&record).await?;
        debug!(lease = %self.key(), "Deleted lease");
        Ok(true)
    }

    fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klock_leader_election::{LeaseSpec, MemoryLeaseClient};

    fn spec(holder: Option<&str>) -> LeaseSpec {
        LeaseSpec {
            holder_identity: holder.map(str::to_string),
            lease_duration_seconds: Some(15),
            ..Default::default()
        }
    }

    fn coordinator(client: &MemoryLeaseClient) -> LeaseCoordinator {
        LeaseCoordinator::new(Arc::new(client.clone()), "default", "klock")
    }

    #[tokio::test]
    async fn test_delete_current_released_lease() {
        let client = MemoryLeaseClient::new();
        client
            .create(LeaseRecord::new("default", "klock", spec(None)))
            .await
            .unwrap();

        assert!(coordinator(&client).delete_current("a").await.unwrap());
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_delete_current_own_lease() {
        let client = MemoryLeaseClient::new();
        client
            .create(LeaseRecord::new("default", "klock", spec(Some("a"))))
            .await
            .unwrap();

        assert!(coordinator(&client).delete_current("a").await.unwrap());
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_delete_current_keeps_foreign_lease() {
        let client = MemoryLeaseClient::new();
        client
            .create(LeaseRecord::new("default", "klock", spec(Some("b"))))
            .await
            .unwrap();

        assert!(!coordinator(&client).delete_current("a").await.unwrap());
        assert_eq!(client.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_current_missing_lease() {
        let client = MemoryLeaseClient::new();
        assert!(!coordinator(&client).delete_current("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_rejected_after_recreate() {
        let client = MemoryLeaseClient::new();
        let coordinator = coordinator(&client);
        client
            .create(LeaseRecord::new("default", "klock", spec(None)))
            .await
            .unwrap();
        let observed = coordinator.get().await.unwrap();

        client
            .delete("default", "klock", Preconditions::default())
            .await
            .unwrap();
        let recreated = client
            .create(LeaseRecord::new("default", "klock", spec(Some("b"))))
            .await
            .unwrap();

        let err = coordinator.delete_if_unchanged(&observed).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(coordinator.get().await.unwrap(), recreated);
    }
}
