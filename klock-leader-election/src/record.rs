//! Lease documents as stored by the coordination service

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutable part of a lease, written by whichever contender holds it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSpec {
    /// Identity of the current holder, `None` once released
    pub holder_identity: Option<String>,
    /// How long the holder may go without renewing
    pub lease_duration_seconds: Option<u64>,
    /// When the current holder acquired the lease
    pub acquire_time: Option<DateTime<Utc>>,
    /// When the current holder last renewed the lease
    pub renew_time: Option<DateTime<Utc>>,
    /// Number of times the lease changed hands
    #[serde(default)]
    pub lease_transitions: u32,
}

impl LeaseSpec {
    /// The holder identity, with an empty string treated as "no holder"
    pub fn holder(&self) -> Option<&str> {
        self.holder_identity.as_deref().filter(|id| !id.is_empty())
    }

    /// Lease duration as a `Duration`
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_seconds.unwrap_or(0))
    }
}

/// A lease resource
///
/// `uid` is assigned by the store on creation and never changes afterwards;
/// `resource_version` is bumped by the store on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Namespace of the lease
    pub namespace: String,
    /// Name of the lease
    pub name: String,
    /// Store-assigned identifier, fixed for the lifetime of the resource
    #[serde(default)]
    pub uid: String,
    /// Store-assigned version, changes on every write
    #[serde(default)]
    pub resource_version: u64,
    /// Labels attached to the lease
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Holder information
    #[serde(default)]
    pub spec: LeaseSpec,
}

impl LeaseRecord {
    /// A lease that has not been stored yet
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: LeaseSpec) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: String::new(),
            resource_version: 0,
            labels: BTreeMap::new(),
            spec,
        }
    }

    /// Replace the labels
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Conditions a delete request must satisfy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    /// The stored uid must equal this value
    pub uid: Option<String>,
    /// The stored resource version must equal this value
    pub resource_version: Option<u64>,
}

impl Preconditions {
    /// Require the exact resource that was observed in `record`
    pub fn observed(record: &LeaseRecord) -> Self {
        Self {
            uid: Some(record.uid.clone()),
            resource_version: Some(record.resource_version),
        }
    }

    /// Explain why `stored` does not satisfy the preconditions
    pub fn violation(&self, stored: &LeaseRecord) -> Option<String> {
        if let Some(uid) = &self.uid {
            if *uid != stored.uid {
                return Some(format!(
                    "precondition failed: uid is {}, expected {}",
                    stored.uid, uid
                ));
            }
        }
        if let Some(version) = self.resource_version {
            if version != stored.resource_version {
                return Some(format!(
                    "precondition failed: resource version is {}, expected {}",
                    stored.resource_version, version
                ));
            }
        }
        None
    }
}
