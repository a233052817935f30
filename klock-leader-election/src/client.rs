//! Lease store API and the in-memory store

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ulid::Ulid;

use crate::error::{ElectionError, Result};
use crate::record::{LeaseRecord, Preconditions};

/// Access to lease resources in a shared coordination service
///
/// Implementations must make `create`, `update` and `delete` atomic with
/// respect to each other: two concurrent writers starting from the same
/// observed record must not both succeed.
#[async_trait]
pub trait LeaseClient: Send + Sync {
    /// Read a lease
    async fn get(&self, namespace: &str, name: &str) -> Result<LeaseRecord>;

    /// Store a new lease, assigning its uid and first resource version
    ///
    /// Fails with [`ElectionError::AlreadyExists`] if the lease exists.
    async fn create(&self, lease: LeaseRecord) -> Result<LeaseRecord>;

    /// Replace a lease
    ///
    /// `lease.uid` and `lease.resource_version` must match the stored values,
    /// otherwise the write fails with [`ElectionError::Conflict`].
    async fn update(&self, lease: LeaseRecord) -> Result<LeaseRecord>;

    /// Delete a lease if it satisfies `preconditions`
    async fn delete(&self, namespace: &str, name: &str, preconditions: Preconditions)
        -> Result<()>;
}

pub(crate) fn not_found(namespace: &str, name: &str) -> ElectionError {
    ElectionError::NotFound {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

pub(crate) fn conflict(namespace: &str, name: &str, reason: impl Into<String>) -> ElectionError {
    ElectionError::Conflict {
        namespace: namespace.to_string(),
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Assign store-managed fields to a lease being created
pub(crate) fn prepare_create(mut lease: LeaseRecord) -> LeaseRecord {
    lease.uid = Ulid::new().to_string();
    lease.resource_version = 1;
    lease
}

/// Check an update against the stored lease and bump its version
pub(crate) fn prepare_update(stored: &LeaseRecord, mut lease: LeaseRecord) -> Result<LeaseRecord> {
    if lease.uid != stored.uid {
        return Err(conflict(
            &lease.namespace,
            &lease.name,
            format!("uid is {}, update was based on {}", stored.uid, lease.uid),
        ));
    }
    if lease.resource_version != stored.resource_version {
        return Err(conflict(
            &lease.namespace,
            &lease.name,
            format!(
                "resource version is {}, update was based on {}",
                stored.resource_version, lease.resource_version
            ),
        ));
    }
    lease.resource_version = stored.resource_version + 1;
    Ok(lease)
}

/// Process-local lease store
///
/// Clones share the same underlying leases, so several lockers in one
/// process can contend on it exactly as they would on a remote store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseClient {
    leases: Arc<DashMap<(String, String), LeaseRecord>>,
}

impl MemoryLeaseClient {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored leases
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    /// Whether no lease is stored
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

#[async_trait]
impl LeaseClient for MemoryLeaseClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<LeaseRecord> {
        self.leases
            .get(&key(namespace, name))
            .map(|lease| lease.clone())
            .ok_or_else(|| not_found(namespace, name))
    }

    async fn create(&self, lease: LeaseRecord) -> Result<LeaseRecord> {
        match self.leases.entry(key(&lease.namespace, &lease.name)) {
            Entry::Occupied(_) => Err(ElectionError::AlreadyExists {
                namespace: lease.namespace,
                name: lease.name,
            }),
            Entry::Vacant(slot) => {
                let lease = prepare_create(lease);
                slot.insert(lease.clone());
                Ok(lease)
            }
        }
    }

    async fn update(&self, lease: LeaseRecord) -> Result<LeaseRecord> {
        match self.leases.entry(key(&lease.namespace, &lease.name)) {
            Entry::Vacant(_) => Err(not_found(&lease.namespace, &lease.name)),
            Entry::Occupied(mut slot) => {
                let lease = prepare_update(slot.get(), lease)?;
                slot.insert(lease.clone());
                Ok(lease)
            }
        }
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        preconditions: Preconditions,
    ) -> Result<()> {
        match self.leases.entry(key(namespace, name)) {
            Entry::Vacant(_) => Err(not_found(namespace, name)),
            Entry::Occupied(slot) => {
                if let Some(reason) = preconditions.violation(slot.get()) {
                    return Err(conflict(namespace, name, reason));
                }
                slot.remove();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LeaseSpec;

    fn lease(holder: &str) -> LeaseRecord {
        LeaseRecord::new(
            "default",
            "klock",
            LeaseSpec {
                holder_identity: Some(holder.to_string()),
                lease_duration_seconds: Some(15),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_assigns_uid_and_version() {
        let client = MemoryLeaseClient::new();
        let created = client.create(lease("a")).await.unwrap();
        assert!(!created.uid.is_empty());
        assert_eq!(created.resource_version, 1);

        let fetched = client.get("default", "klock").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let client = MemoryLeaseClient::new();
        client.create(lease("a")).await.unwrap();
        let err = client.create(lease("b")).await.unwrap_err();
        assert!(matches!(err, ElectionError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let client = MemoryLeaseClient::new();
        let err = client.get("default", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_is_compare_and_swap() {
        let client = MemoryLeaseClient::new();
        let created = client.create(lease("a")).await.unwrap();

        let mut first = created.clone();
        first.spec.holder_identity = Some("b".to_string());
        let updated = client.update(first).await.unwrap();
        assert_eq!(updated.resource_version, 2);

        let mut stale = created;
        stale.spec.holder_identity = Some("c".to_string());
        let err = client.update(stale).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = client.get("default", "klock").await.unwrap();
        assert_eq!(stored.spec.holder(), Some("b"));
    }

    #[tokio::test]
    async fn test_delete_with_stale_uid_is_rejected() {
        let client = MemoryLeaseClient::new();
        let observed = client.create(lease("a")).await.unwrap();

        client
            .delete("default", "klock", Preconditions::default())
            .await
            .unwrap();
        let recreated = client.create(lease("b")).await.unwrap();

        let err = client
            .delete("default", "klock", Preconditions::observed(&observed))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(client.get("default", "klock").await.unwrap(), recreated);
    }

    #[tokio::test]
    async fn test_clones_share_leases() {
        let client = MemoryLeaseClient::new();
        let other = client.clone();
        client.create(lease("a")).await.unwrap();
        assert_eq!(other.len(), 1);
        assert!(other.get("default", "klock").await.is_ok());
    }
}
