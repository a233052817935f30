//! Run a function while holding a lease
//!
//! [`Locker::lock_and_run`] races three things: leadership being acquired,
//! the optional wait elapsing, and the caller cancelling. Whichever happens
//! first decides the [`ElectionOutcome`]. The decision is a single atomic
//! transition out of [`LockState::Electing`], so a late acquisition can never
//! start the function after a timeout was reported, and a late timeout can
//! never be reported for a function that already started.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use klock_leader_election::{
    ElectionConfig, LeaderCallbacks, LeaderElector, LeaseClient, LeaseLock,
};
use tokio::sync::{oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::coordinator::LeaseCoordinator;
use crate::error::LockError;
use crate::identity::LockIdentity;
use crate::labels::{merge_labels, Labels};

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Per-call options for [`Locker::lock_and_run`]
#[derive(Default)]
pub struct LockOptions {
    cleanup: Option<Cleanup>,
    wait: Option<Duration>,
}

impl LockOptions {
    /// Wait forever, no cleanup
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up if leadership is not acquired within `wait`
    ///
    /// A zero duration means wait forever.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = (!wait.is_zero()).then_some(wait);
        self
    }

    /// Run `cleanup` once leadership ends, if the function was started
    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub fn wait(&self) -> Option<Duration> {
        self.wait
    }
}

impl fmt::Debug for LockOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockOptions")
            .field("cleanup", &self.cleanup.is_some())
            .field("wait", &self.wait)
            .finish()
    }
}

/// Progress of one [`Locker::lock_and_run`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Contending for leadership
    Electing,
    /// The protected function is running
    Leading,
    /// The function returned, or the election was abandoned
    Done,
}

/// How the race for leadership ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    Succeeded,
    TimedOut,
    Canceled,
}

/// Runs functions under mutual exclusion on one lease
#[derive(Clone)]
pub struct Locker {
    identity: LockIdentity,
    client: Arc<dyn LeaseClient>,
    labels: Labels,
    cleanup_lease: bool,
    election: ElectionConfig,
}

impl Locker {
    /// A locker for lease `namespace/name`, held as `id`
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        id: impl Into<String>,
        client: Arc<dyn LeaseClient>,
    ) -> Result<Self, LockError> {
        Ok(Self {
            identity: LockIdentity::new(namespace, name, id)?,
            client,
            labels: Labels::new(),
            cleanup_lease: false,
            election: ElectionConfig::default(),
        })
    }

    /// Additional labels for the lease
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    /// Delete the lease after each run that held it
    pub fn with_cleanup_lease(mut self, cleanup_lease: bool) -> Self {
        self.cleanup_lease = cleanup_lease;
        self
    }

    /// Override the election timing
    pub fn with_election_config(mut self, config: ElectionConfig) -> Self {
        self.election = config;
        self
    }

    pub fn identity(&self) -> &LockIdentity {
        &self.identity
    }

    /// Labels written on the lease, including the common ones
    pub fn labels(&self) -> Labels {
        merge_labels(&self.labels)
    }

    pub fn cleanup_lease(&self) -> bool {
        self.cleanup_lease
    }

    pub fn election_config(&self) -> &ElectionConfig {
        &self.election
    }

    /// Acquire the lease, run `f`, release the lease
    ///
    /// `f` runs at most once, and only while the lease is held. It receives a
    /// token that is cancelled when `cancel` is, or when leadership is lost;
    /// it should return promptly once that happens.
    ///
    /// Returns `f`'s value, or every error that occurred: the election
    /// outcome, a missing value, and a failed lease deletion.
    pub async fn lock_and_run<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        options: LockOptions,
        f: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match self.lock_and_run_outcome(cancel, options, f).await {
            (Some(value), Ok(())) => Ok(value),
            (_, Err(e)) => Err(e),
            (None, Ok(())) => Err(LockError::Interrupted(self.identity.clone())),
        }
    }

    /// Like [`Locker::lock_and_run`], but `f`'s value is returned even when
    /// the lock also failed, e.g. when the lease could not be deleted after
    /// `f` returned
    pub async fn lock_and_run_outcome<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        options: LockOptions,
        f: F,
    ) -> (Option<T>, Result<(), LockError>)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let LockOptions { cleanup, wait } = options;
        let derived = cancel.child_token();
        let (state, state_rx) = watch::channel(LockState::Electing);
        let state = Arc::new(state);
        let (result_tx, result_rx) = oneshot::channel();

        let callbacks = Arc::new(LockCallbacks {
            identity: self.identity.clone(),
            state: Arc::clone(&state),
            protected: Mutex::new(Some((f, result_tx))),
            cleanup: Mutex::new(cleanup),
            derived: derived.clone(),
        });
        let lock = LeaseLock::new(
            self.identity.namespace(),
            self.identity.name(),
            self.identity.holder_id(),
            Arc::clone(&self.client),
        )
        .with_labels(self.labels());
        let elector = match LeaderElector::new(lock, self.election, callbacks) {
            Ok(elector) => elector,
            Err(e) => return (None, Err(e.into())),
        };

        debug!(lock = %self.identity, wait = ?wait, "Waiting for the leader election");
        let race = race(&self.identity, cancel, &derived, &state, state_rx, wait);
        let ((), outcome) = tokio::join!(elector.run(derived.clone()), race);
        derived.cancel();

        let mut errors = Vec::new();
        let value = match outcome {
            ElectionOutcome::Succeeded => match result_rx.await {
                Ok(value) => Some(value),
                Err(_) => {
                    errors.push(LockError::Interrupted(self.identity.clone()));
                    None
                }
            },
            ElectionOutcome::TimedOut => {
                errors.push(LockError::ElectionTimeout {
                    wait: wait.unwrap_or_default(),
                });
                None
            }
            ElectionOutcome::Canceled => {
                errors.push(LockError::ExternalCancellation);
                None
            }
        };

        // A call that never led must not delete a lease someone else released
        if self.cleanup_lease && outcome == ElectionOutcome::Succeeded {
            debug!(lock = %self.identity, "Cleaning up lease");
            let coordinator = LeaseCoordinator::new(
                Arc::clone(&self.client),
                self.identity.namespace(),
                self.identity.name(),
            );
            if let Err(source) = coordinator.delete_current(self.identity.holder_id()).await {
                errors.push(LockError::CleanupFailure {
                    identity: self.identity.clone(),
                    source,
                });
            }
        }

        let result = match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(LockError::Joined(errors)),
        };
        (value, result)
    }
}

impl fmt::Debug for Locker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("identity", &self.identity)
            .field("labels", &self.labels)
            .field("cleanup_lease", &self.cleanup_lease)
            .field("election", &self.election)
            .finish_non_exhaustive()
    }
}

/// Leave `Electing` for `Done`, unless the function already started
fn abandon(state: &watch::Sender<LockState>) -> bool {
    state.send_if_modified(|current| {
        if *current == LockState::Electing {
            *current = LockState::Done;
            true
        } else {
            false
        }
    })
}

async fn race(
    identity: &LockIdentity,
    cancel: &CancellationToken,
    derived: &CancellationToken,
    state: &watch::Sender<LockState>,
    mut state_rx: watch::Receiver<LockState>,
    wait: Option<Duration>,
) -> ElectionOutcome {
    let timer = async {
        match wait {
            Some(wait) => tokio::time::sleep(wait).await,
            None => std::future::pending::<()>().await,
        }
    };
    let started = async {
        let _ = state_rx.wait_for(|s| *s != LockState::Electing).await;
    };

    tokio::select! {
        _ = started => {
            info!(lock = %identity, "Starting because the leader election succeeded");
            ElectionOutcome::Succeeded
        }
        _ = timer => {
            if abandon(state) {
                info!(lock = %identity, "Aborting because the leader election timed out");
                derived.cancel();
                ElectionOutcome::TimedOut
            } else {
                ElectionOutcome::Succeeded
            }
        }
        _ = cancel.cancelled() => {
            if abandon(state) {
                derived.cancel();
                ElectionOutcome::Canceled
            } else {
                ElectionOutcome::Succeeded
            }
        }
    }
}

struct LockCallbacks<F, T> {
    identity: LockIdentity,
    state: Arc<watch::Sender<LockState>>,
    protected: Mutex<Option<(F, oneshot::Sender<T>)>>,
    cleanup: Mutex<Option<Cleanup>>,
    derived: CancellationToken,
}

/// Marks the run finished even if the protected function panics
struct Finish<'a> {
    state: &'a watch::Sender<LockState>,
    derived: &'a CancellationToken,
}

impl Drop for Finish<'_> {
    fn drop(&mut self) {
        self.state.send_replace(LockState::Done);
        self.derived.cancel();
    }
}

#[async_trait]
impl<F, Fut, T> LeaderCallbacks for LockCallbacks<F, T>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    async fn on_started_leading(&self, leading: CancellationToken) {
        let entered = self.state.send_if_modified(|current| {
            if *current == LockState::Electing {
                *current = LockState::Leading;
                true
            } else {
                false
            }
        });
        if !entered {
            debug!(lock = %self.identity, "Became leader after the election was abandoned");
            return;
        }
        debug!(lock = %self.identity, "Became leader");

        let Some((f, result)) = self.protected.lock().await.take() else {
            return;
        };
        let _finish = Finish {
            state: &self.state,
            derived: &self.derived,
        };
        let value = f(leading).await;
        let _ = result.send(value);
    }

    async fn on_stopped_leading(&self) {
        debug!(lock = %self.identity, "Stopped leading");
        // The function was entered iff it has been taken
        if self.protected.lock().await.is_some() {
            return;
        }
        if let Some(cleanup) = self.cleanup.lock().await.take() {
            debug!(lock = %self.identity, "Running cleanup");
            cleanup();
        }
    }

    fn on_new_leader(&self, identity: &str) {
        if identity != self.identity.holder_id() {
            debug!(lock = %self.identity, leader = identity, "Leader elected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
    use klock_leader_election::{
        ElectionError, LeaseRecord, LeaseSpec, MemoryLeaseClient, Preconditions,
        DEFAULT_RENEW_DEADLINE,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn fast_config() -> ElectionConfig {
        ElectionConfig::default()
            .with_lease_duration(Duration::from_secs(2))
            .with_renew_deadline(Duration::from_millis(1000))
            .with_retry_period(Duration::from_millis(100))
    }

    fn locker(client: &MemoryLeaseClient, id: &str) -> Locker {
        Locker::new("default", "klock", id, Arc::new(client.clone()))
            .unwrap()
            .with_election_config(fast_config())
    }

    async fn hold_by_ghost(client: &MemoryLeaseClient) {
        let spec = LeaseSpec {
            holder_identity: Some("ghost".to_string()),
            lease_duration_seconds: Some(60),
            acquire_time: Some(chrono::Utc::now()),
            renew_time: Some(chrono::Utc::now()),
            lease_transitions: 0,
        };
        client
            .create(LeaseRecord::new("default", "klock", spec))
            .await
            .unwrap();
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_runs_function_and_releases() {
        let client = MemoryLeaseClient::new();
        let value = locker(&client, "a")
            .lock_and_run(&CancellationToken::new(), LockOptions::new(), |_token| async {
                42
            })
            .await
            .unwrap();
        assert_eq!(value, 42);

        let record = client.get("default", "klock").await.unwrap();
        assert_eq!(record.spec.holder(), None);
        assert_eq!(
            record.labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY_VALUE)
        );
    }

    #[tokio::test]
    async fn test_caller_labels_applied() {
        let client = MemoryLeaseClient::new();
        let labels = Labels::from([
            ("team".to_string(), "infra".to_string()),
            (MANAGED_BY_LABEL.to_string(), "other".to_string()),
        ]);
        locker(&client, "a")
            .with_labels(labels)
            .lock_and_run(&CancellationToken::new(), LockOptions::new(), |_| async {})
            .await
            .unwrap();

        let record = client.get("default", "klock").await.unwrap();
        assert_eq!(record.labels.get("team").map(String::as_str), Some("infra"));
        assert_eq!(
            record.labels.get(MANAGED_BY_LABEL).map(String::as_str),
            Some(MANAGED_BY_VALUE)
        );
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let client = MemoryLeaseClient::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();

        let run = |id: &'static str, delay: u64| {
            let locker = locker(&client, id);
            let log = Arc::clone(&log);
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                locker
                    .lock_and_run(&cancel, LockOptions::new(), move |_| async move {
                        log.lock().unwrap().push(format!("{}:start", id));
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        log.lock().unwrap().push(format!("{}:end", id));
                    })
                    .await
            }
        };
        let (a, b) = tokio::join!(run("a", 0), run("b", 50));
        a.unwrap();
        b.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:start", "a:end", "b:start", "b:end"]
        );
    }

    #[tokio::test]
    async fn test_wait_shorter_than_renew_deadline_times_out() {
        let client = MemoryLeaseClient::new();
        let holder = Locker::new("default", "klock", "a", Arc::new(client.clone())).unwrap();
        let waiter = Locker::new("default", "klock", "b", Arc::new(client.clone())).unwrap();
        let wait = Duration::from_secs(1);
        assert!(wait < DEFAULT_RENEW_DEADLINE);

        let ran = Arc::new(AtomicBool::new(false));
        let ran_inner = Arc::clone(&ran);
        let cancel = CancellationToken::new();

        let hold = holder.lock_and_run(&cancel, LockOptions::new(), |_| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
        });
        let contend = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let begin = Instant::now();
            let result = waiter
                .lock_and_run(&cancel, LockOptions::new().with_wait(wait), move |_| async move {
                    ran_inner.store(true, Ordering::SeqCst);
                })
                .await;
            (result, begin.elapsed())
        };
        let (held, (result, elapsed)) = tokio::join!(hold, contend);

        held.unwrap();
        let err = result.unwrap_err();
        assert!(matches!(err, LockError::ElectionTimeout { wait: w } if w == wait));
        assert!(elapsed >= wait);
        assert!(elapsed < Duration::from_secs(2));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timeout_skips_function_and_cleanup() {
        let client = MemoryLeaseClient::new();
        hold_by_ghost(&client).await;
        let (cleanups, cleanup) = counter();

        let options = LockOptions::new()
            .with_wait(Duration::from_millis(300))
            .with_cleanup(cleanup);
        let err = locker(&client, "a")
            .lock_and_run(&CancellationToken::new(), options, |_| async {
                panic!("must not run");
            })
            .await
            .unwrap_err();

        assert!(err.is_election_timeout());
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
        let record = client.get("default", "klock").await.unwrap();
        assert_eq!(record.spec.holder(), Some("ghost"));
    }

    #[tokio::test]
    async fn test_cleanup_runs_once_when_cancelled() {
        let client = MemoryLeaseClient::new();
        let (cleanups, cleanup) = counter();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });
        let value = locker(&client, "a")
            .lock_and_run(&cancel, LockOptions::new().with_cleanup(cleanup), |token| async move {
                token.cancelled().await;
                "interrupted"
            })
            .await
            .unwrap();

        assert_eq!(value, "interrupted");
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_completion() {
        let client = MemoryLeaseClient::new();
        let (cleanups, cleanup) = counter();

        locker(&client, "a")
            .lock_and_run(
                &CancellationToken::new(),
                LockOptions::new().with_cleanup(cleanup),
                |_| async {},
            )
            .await
            .unwrap();

        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_electing() {
        let client = MemoryLeaseClient::new();
        hold_by_ghost(&client).await;
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });
        let err = locker(&client, "a")
            .lock_and_run(&cancel, LockOptions::new(), |_| async {})
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::ExternalCancellation));
        assert!(err.is_cancellation());
        assert!(!err.is_election_timeout());
    }

    #[tokio::test]
    async fn test_cancel_while_electing_skips_cleanup() {
        let client = MemoryLeaseClient::new();
        hold_by_ghost(&client).await;
        let (cleanups, cleanup) = counter();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });
        let err = locker(&client, "a")
            .lock_and_run(&cancel, LockOptions::new().with_cleanup(cleanup), |_| async {
                panic!("must not run");
            })
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);
    }

    /// Overwrite the holder until the write wins against concurrent renewals
    async fn steal(client: &MemoryLeaseClient, thief: &str) {
        loop {
            let mut record = client.get("default", "klock").await.unwrap();
            record.spec.holder_identity = Some(thief.to_string());
            record.spec.lease_duration_seconds = Some(60);
            if client.update(record).await.is_ok() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_cleanup_runs_once_after_lease_lost() {
        let client = MemoryLeaseClient::new();
        let (cleanups, cleanup) = counter();

        let thief_client = client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            steal(&thief_client, "thief").await;
        });
        let value = locker(&client, "a")
            .lock_and_run(
                &CancellationToken::new(),
                LockOptions::new().with_cleanup(cleanup),
                |token| async move {
                    token.cancelled().await;
                    "lost"
                },
            )
            .await
            .unwrap();

        assert_eq!(value, "lost");
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        let record = client.get("default", "klock").await.unwrap();
        assert_eq!(record.spec.holder(), Some("thief"));
    }

    #[tokio::test]
    async fn test_cleanup_lease_skipped_without_leading() {
        let client = MemoryLeaseClient::new();
        client
            .create(LeaseRecord::new("default", "klock", LeaseSpec::default()))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = locker(&client, "a")
            .with_cleanup_lease(true)
            .lock_and_run(&cancel, LockOptions::new(), |_| async {})
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::ExternalCancellation));
        assert_eq!(client.len(), 1);
    }

    #[tokio::test]
    async fn test_value_kept_when_cleanup_fails() {
        let client = MemoryLeaseClient::new();
        let locker = Locker::new(
            "default",
            "klock",
            "a",
            Arc::new(RejectingDelete(client.clone())),
        )
        .unwrap()
        .with_election_config(fast_config())
        .with_cleanup_lease(true);

        let (value, result) = locker
            .lock_and_run_outcome(&CancellationToken::new(), LockOptions::new(), |_| async {
                7
            })
            .await;

        assert_eq!(value, Some(7));
        let err = result.unwrap_err();
        assert!(matches!(err, LockError::CleanupFailure { .. }));
        assert!(err.to_string().contains("rejected"));
    }

    #[tokio::test]
    async fn test_cleanup_lease_deletes_lease() {
        let client = MemoryLeaseClient::new();
        locker(&client, "a")
            .with_cleanup_lease(true)
            .lock_and_run(&CancellationToken::new(), LockOptions::new(), |_| async {})
            .await
            .unwrap();

        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_lease_keeps_foreign_lease() {
        let client = MemoryLeaseClient::new();
        hold_by_ghost(&client).await;

        let err = locker(&client, "a")
            .with_cleanup_lease(true)
            .lock_and_run(
                &CancellationToken::new(),
                LockOptions::new().with_wait(Duration::from_millis(300)),
                |_| async {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::ElectionTimeout { .. }));
        assert_eq!(client.len(), 1);
    }

    struct RejectingDelete(MemoryLeaseClient);

    #[async_trait]
    impl LeaseClient for RejectingDelete {
        async fn get(&self, namespace: &str, name: &str) -> klock_leader_election::Result<LeaseRecord> {
            self.0.get(namespace, name).await
        }

        async fn create(&self, lease: LeaseRecord) -> klock_leader_election::Result<LeaseRecord> {
            self.0.create(lease).await
        }

        async fn update(&self, lease: LeaseRecord) -> klock_leader_election::Result<LeaseRecord> {
            self.0.update(lease).await
        }

        async fn delete(
            &self,
            namespace: &str,
            name: &str,
            _preconditions: Preconditions,
        ) -> klock_leader_election::Result<()> {
            Err(ElectionError::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
                reason: "rejected".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_cleanup_failure_reported() {
        let client = MemoryLeaseClient::new();
        let locker = Locker::new(
            "default",
            "klock",
            "a",
            Arc::new(RejectingDelete(client.clone())),
        )
        .unwrap()
        .with_election_config(fast_config())
        .with_cleanup_lease(true);

        let err = locker
            .lock_and_run(&CancellationToken::new(), LockOptions::new(), |_| async {})
            .await
            .unwrap_err();

        match err {
            LockError::CleanupFailure { identity, source } => {
                assert_eq!(identity.holder_id(), "a");
                assert!(source.is_conflict());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_function_is_interrupted() {
        let client = MemoryLeaseClient::new();
        let err = locker(&client, "a")
            .lock_and_run(&CancellationToken::new(), LockOptions::new(), |_| async {
                if true {
                    panic!("boom");
                }
                0u8
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Interrupted(_)));
        let record = client.get("default", "klock").await.unwrap();
        assert_eq!(record.spec.holder(), None);
    }

    #[test]
    fn test_invalid_configuration() {
        let client: Arc<dyn LeaseClient> = Arc::new(MemoryLeaseClient::new());
        let err = Locker::new("default", "", "a", client).unwrap_err();
        assert!(matches!(err, LockError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_default_protocol_timing() {
        let locker = Locker::new("default", "klock", "a", Arc::new(MemoryLeaseClient::new())).unwrap();
        assert_eq!(locker.election_config(), &ElectionConfig::default());
        assert!(!locker.cleanup_lease());
    }

    #[test]
    fn test_zero_wait_is_unbounded() {
        assert_eq!(LockOptions::new().with_wait(Duration::ZERO).wait(), None);
        assert_eq!(
            LockOptions::new().with_wait(Duration::from_secs(3)).wait(),
            Some(Duration::from_secs(3))
        );
    }
}
