//! Election timing parameters

use std::time::Duration;

use crate::error::{ElectionError, Result};

/// How long a holder may go without renewing before others may take over
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);

/// How long the holder keeps retrying a failed renewal before giving up leadership
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);

/// Interval between acquire or renew attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Acquire attempts wait `retry_period * (1 + rand[0, JITTER_FACTOR))`
pub const JITTER_FACTOR: f64 = 1.2;

/// Timing of the acquire/renew protocol
///
/// The defaults match the core Kubernetes clients. Together they bound how
/// quickly a crashed holder is replaced, see [`ElectionConfig::max_recovery_time`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectionConfig {
    /// Validity of a lease after its last observed change
    pub lease_duration: Duration,
    /// Budget for a renewal before leadership is given up
    pub renew_deadline: Duration,
    /// Interval between attempts
    pub retry_period: Duration,
    /// Clear the holder when leadership ends because of cancellation
    pub release_on_cancel: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            release_on_cancel: true,
        }
    }
}

impl ElectionConfig {
    /// Default timing
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lease duration
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Set the renew deadline
    pub fn with_renew_deadline(mut self, renew_deadline: Duration) -> Self {
        self.renew_deadline = renew_deadline;
        self
    }

    /// Set the retry period
    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period;
        self
    }

    /// Set whether the lease is released on cancellation
    pub fn with_release_on_cancel(mut self, release_on_cancel: bool) -> Self {
        self.release_on_cancel = release_on_cancel;
        self
    }

    /// Reject timings under which two holders could overlap
    pub fn validate(&self) -> Result<()> {
        if self.lease_duration.is_zero() {
            return Err(ElectionError::InvalidConfig(
                "lease duration must be greater than zero".to_string(),
            ));
        }
        if self.renew_deadline.is_zero() {
            return Err(ElectionError::InvalidConfig(
                "renew deadline must be greater than zero".to_string(),
            ));
        }
        if self.retry_period.is_zero() {
            return Err(ElectionError::InvalidConfig(
                "retry period must be greater than zero".to_string(),
            ));
        }
        if self.lease_duration <= self.renew_deadline {
            return Err(ElectionError::InvalidConfig(
                "lease duration must be greater than renew deadline".to_string(),
            ));
        }
        if self.renew_deadline <= self.retry_period.mul_f64(JITTER_FACTOR) {
            return Err(ElectionError::InvalidConfig(format!(
                "renew deadline must be greater than retry period * {}",
                JITTER_FACTOR
            )));
        }
        if self.lease_duration.as_secs() == 0 {
            return Err(ElectionError::InvalidConfig(
                "lease duration must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Lease duration in whole seconds, as stored on the lease
    pub fn lease_duration_seconds(&self) -> u64 {
        self.lease_duration.as_secs()
    }

    /// Worst-case time between a holder's last renewal and a waiting
    /// contender taking over, if the holder crashes without releasing
    ///
    /// The lease stays valid for `lease_duration` after the contender last saw
    /// it change, and the contender only notices expiry on its next jittered
    /// attempt.
    pub fn max_recovery_time(&self) -> Duration {
        self.lease_duration + self.retry_period.mul_f64(1.0 + JITTER_FACTOR)
    }
}
