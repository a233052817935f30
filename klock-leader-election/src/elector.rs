//! Lease-based leader election
//!
//! A [`LeaderElector`] repeatedly tries to become the holder of one lease.
//! Once it holds the lease it hands a cancellation token to
//! [`LeaderCallbacks::on_started_leading`] and keeps renewing until that
//! token is cancelled or a renewal misses the renew deadline.
//!
//! Expiry of someone else's lease is judged from the local time at which the
//! lease was last seen to change, never from the timestamps written by other
//! hosts, so clock skew between contenders does not shorten a lease.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::LeaseClient;
use crate::config::{ElectionConfig, JITTER_FACTOR};
use crate::error::{ElectionError, Result};
use crate::record::{LeaseRecord, LeaseSpec};

/// The lease an elector contends for, and who it contends as
#[derive(Clone)]
pub struct LeaseLock {
    /// Namespace of the lease
    pub namespace: String,
    /// Name of the lease
    pub name: String,
    /// Holder identity written into the lease
    pub identity: String,
    /// Labels applied whenever the lease is written
    pub labels: BTreeMap<String, String>,
    client: Arc<dyn LeaseClient>,
}

impl LeaseLock {
    /// Describe a lease lock
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        identity: impl Into<String>,
        client: Arc<dyn LeaseClient>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            identity: identity.into(),
            labels: BTreeMap::new(),
            client,
        }
    }

    /// Labels to write on the lease
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// Hooks invoked by [`LeaderElector::run`]
#[async_trait]
pub trait LeaderCallbacks: Send + Sync + 'static {
    /// Leadership was acquired
    ///
    /// Runs in its own task. `leading` is cancelled when leadership ends,
    /// whether through cancellation of the elector or a failed renewal.
    /// The elector does not release the lease until this returns.
    async fn on_started_leading(&self, leading: CancellationToken);

    /// [`LeaderElector::run`] is about to return
    ///
    /// Always called, including when leadership was never acquired.
    async fn on_stopped_leading(&self);

    /// A different holder was observed on the lease
    fn on_new_leader(&self, _identity: &str) {}
}

#[derive(Debug, Default)]
struct Observed {
    record: Option<LeaseRecord>,
    time: Option<Instant>,
    reported_leader: Option<String>,
}

impl Observed {
    fn set(&mut self, record: LeaseRecord) {
        self.record = Some(record);
        self.time = Some(Instant::now());
    }

    fn holder(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.spec.holder())
    }
}

enum RenewEnd {
    Cancelled,
    Lost,
}

/// Runs the acquire/renew/release protocol for one lease and one identity
pub struct LeaderElector {
    lock: LeaseLock,
    config: ElectionConfig,
    callbacks: Arc<dyn LeaderCallbacks>,
    observed: RwLock<Observed>,
}

impl LeaderElector {
    /// Create an elector, validating the timing parameters
    pub fn new(
        lock: LeaseLock,
        config: ElectionConfig,
        callbacks: Arc<dyn LeaderCallbacks>,
    ) -> Result<Self> {
        config.validate()?;
        if lock.identity.is_empty() {
            return Err(ElectionError::InvalidConfig(
                "lock identity must not be empty".to_string(),
            ));
        }
        Ok(Self {
            lock,
            config,
            callbacks,
            observed: RwLock::new(Observed::default()),
        })
    }

    /// Holder identity of this elector
    pub fn identity(&self) -> &str {
        &self.lock.identity
    }

    /// Timing in use
    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Whether the last observed record names this elector as holder
    pub async fn is_leader(&self) -> bool {
        self.observed.read().await.holder() == Some(self.lock.identity.as_str())
    }

    /// Holder named by the last observed record
    pub async fn observed_leader(&self) -> Option<String> {
        self.observed.read().await.holder().map(str::to_string)
    }

    /// Contend until leadership is acquired and then lost, or until `cancel`
    pub async fn run(&self, cancel: CancellationToken) {
        if self.acquire(&cancel).await {
            self.lead(&cancel).await;
            if self.config.release_on_cancel {
                self.release().await;
            }
        }
        self.callbacks.on_stopped_leading().await;
    }

    async fn acquire(&self, cancel: &CancellationToken) -> bool {
        info!(
            lease = %self.lock.key(),
            identity = %self.lock.identity,
            "Attempting to acquire leader lease"
        );
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            // Not raced against cancellation: an abandoned write could leave
            // the lease held by us without anyone left to release it.
            let acquired = self.try_acquire_or_renew().await;
            self.report_transition().await;
            if acquired {
                info!(lease = %self.lock.key(), "Successfully acquired lease");
                return true;
            }
            let delay = jitter(self.config.retry_period, JITTER_FACTOR);
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn lead(&self, cancel: &CancellationToken) {
        let leading = cancel.child_token();
        let callbacks = Arc::clone(&self.callbacks);
        let token = leading.clone();
        let task = tokio::spawn(async move { callbacks.on_started_leading(token).await });

        match self.renew(&leading).await {
            RenewEnd::Cancelled => debug!(lease = %self.lock.key(), "Leadership cancelled"),
            RenewEnd::Lost => warn!(lease = %self.lock.key(), "Failed to renew lease, leadership lost"),
        }
        leading.cancel();

        if let Err(e) = task.await {
            error!(lease = %self.lock.key(), "Leader task failed: {}", e);
        }
    }

    async fn renew(&self, leading: &CancellationToken) -> RenewEnd {
        loop {
            tokio::select! {
                _ = leading.cancelled() => return RenewEnd::Cancelled,
                _ = tokio::time::sleep(self.config.retry_period) => {}
            }
            let renewed = tokio::time::timeout(
                self.config.renew_deadline,
                self.renew_until_success(leading),
            )
            .await
            .unwrap_or(false);
            self.report_transition().await;

            if leading.is_cancelled() {
                return RenewEnd::Cancelled;
            }
            if !renewed {
                return RenewEnd::Lost;
            }
            debug!(lease = %self.lock.key(), "Successfully renewed lease");
        }
    }

    async fn renew_until_success(&self, leading: &CancellationToken) -> bool {
        loop {
            if self.try_acquire_or_renew().await {
                return true;
            }
            tokio::select! {
                _ = leading.cancelled() => return false,
                _ = tokio::time::sleep(self.config.retry_period) => {}
            }
        }
    }

    /// One attempt to create, take over or renew the lease
    async fn try_acquire_or_renew(&self) -> bool {
        let client = &self.lock.client;
        let now = Utc::now();
        let desired = LeaseSpec {
            holder_identity: Some(self.lock.identity.clone()),
            lease_duration_seconds: Some(self.config.lease_duration_seconds()),
            acquire_time: Some(now),
            renew_time: Some(now),
            lease_transitions: 0,
        };

        let mut observed = self.observed.write().await;
        let existing = match client.get(&self.lock.namespace, &self.lock.name).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                let record = LeaseRecord::new(&self.lock.namespace, &self.lock.name, desired)
                    .with_labels(self.lock.labels.clone());
                return match client.create(record).await {
                    Ok(created) => {
                        observed.set(created);
                        true
                    }
                    Err(e) => {
                        error!(lease = %self.lock.key(), "Error initially creating lease: {}", e);
                        false
                    }
                };
            }
            Err(e) => {
                error!(lease = %self.lock.key(), "Error retrieving lease: {}", e);
                return false;
            }
        };

        let changed = observed
            .record
            .as_ref()
            .map(|r| (r.uid.as_str(), r.resource_version))
            != Some((existing.uid.as_str(), existing.resource_version));
        if changed {
            observed.set(existing.clone());
        }

        let is_leader = existing.spec.holder() == Some(self.lock.identity.as_str());
        if let Some(holder) = existing.spec.holder() {
            let valid_until = observed
                .time
                .map(|seen| seen + existing.spec.lease_duration());
            if !is_leader && valid_until.is_some_and(|until| until > Instant::now()) {
                debug!(
                    lease = %self.lock.key(),
                    holder,
                    "Lease is held by another contender and has not yet expired"
                );
                return false;
            }
        }

        let mut spec = desired;
        if is_leader {
            spec.acquire_time = existing.spec.acquire_time;
            spec.lease_transitions = existing.spec.lease_transitions;
        } else {
            spec.lease_transitions = existing.spec.lease_transitions + 1;
        }
        let mut update = existing;
        update.spec = spec;
        for (key, value) in &self.lock.labels {
            update.labels.insert(key.clone(), value.clone());
        }

        match client.update(update).await {
            Ok(updated) => {
                observed.set(updated);
                true
            }
            Err(e) => {
                error!(lease = %self.lock.key(), "Failed to update lease: {}", e);
                false
            }
        }
    }

    /// Clear the holder so waiting contenders can acquire immediately
    async fn release(&self) -> bool {
        let client = &self.lock.client;
        let mut observed = self.observed.write().await;
        let Some(mut current) = observed.record.clone() else {
            return true;
        };

        for _ in 0..2 {
            if current.spec.holder() != Some(self.lock.identity.as_str()) {
                debug!(lease = %self.lock.key(), "Lease is not held by us, nothing to release");
                return true;
            }
            let now = Utc::now();
            let mut released = current.clone();
            released.spec = LeaseSpec {
                holder_identity: None,
                lease_duration_seconds: Some(1),
                acquire_time: Some(now),
                renew_time: Some(now),
                lease_transitions: current.spec.lease_transitions,
            };
            match client.update(released).await {
                Ok(updated) => {
                    observed.set(updated);
                    info!(lease = %self.lock.key(), "Released lease");
                    return true;
                }
                // Our view may be stale if an abandoned renewal landed
                Err(e) if e.is_conflict() => {
                    match client.get(&self.lock.namespace, &self.lock.name).await {
                        Ok(record) => current = record,
                        Err(e) => {
                            error!(lease = %self.lock.key(), "Failed to release lease: {}", e);
                            return false;
                        }
                    }
                }
                Err(e) => {
                    error!(lease = %self.lock.key(), "Failed to release lease: {}", e);
                    return false;
                }
            }
        }
        error!(lease = %self.lock.key(), "Failed to release lease: repeated conflicts");
        false
    }

    async fn report_transition(&self) {
        let leader = {
            let mut observed = self.observed.write().await;
            let current = observed.holder().map(str::to_string);
            if current == observed.reported_leader {
                return;
            }
            observed.reported_leader = current.clone();
            current
        };
        if let Some(leader) = leader {
            if leader != self.lock.identity {
                info!(lease = %self.lock.key(), leader = %leader, "New leader observed");
            }
            self.callbacks.on_new_leader(&leader);
        }
    }
}

fn jitter(period: Duration, max_factor: f64) -> Duration {
    period + period.mul_f64(rand::random::<f64>() * max_factor)
}
