use std::time::Duration;

use klock_lease::{LockError, LockOptions, Locker};
use nix::sys::signal::Signal;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProcessError;
use crate::supervisor::{ProcessOutcome, ProcessSupervisor};

/// An external command executed under lock control
#[derive(Debug, Clone)]
pub struct Process {
    locker: Locker,
    supervisor: ProcessSupervisor,
}

impl Process {
    pub fn new<I, S>(locker: Locker, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locker,
            supervisor: ProcessSupervisor::new(program, args),
        }
    }

    /// Signal sent when the run is cancelled; `None` kills immediately
    pub fn with_cancel_signal(mut self, signal: Option<Signal>) -> Self {
        self.supervisor = self.supervisor.with_cancel_signal(signal);
        self
    }

    /// Time between the cancellation signal and a forced kill
    pub fn with_grace_period(mut self, grace_period: Option<Duration>) -> Self {
        self.supervisor = self.supervisor.with_grace_period(grace_period);
        self
    }

    pub fn locker(&self) -> &Locker {
        &self.locker
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn validate(&self) -> Result<(), ProcessError> {
        self.supervisor.validate()
    }

    /// Acquire the lock, run the command to completion, release the lock
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        options: LockOptions,
    ) -> Result<ProcessOutcome, ProcessError> {
        self.validate()?;
        let supervisor = self.supervisor.clone();
        let (outcome, locked) = self
            .locker
            .lock_and_run_outcome(cancel, options, move |token| async move {
                supervisor.run(token).await
            })
            .await;

        match (outcome, locked) {
            (Some(outcome), Ok(())) => outcome,
            (outcome, Err(e)) => {
                debug!(lock = %self.locker.identity(), "Failed to run under lock: {}", e);
                match outcome {
                    Some(Err(command)) => Err(ProcessError::Joined {
                        command: Box::new(command),
                        lock: e,
                    }),
                    _ => Err(ProcessError::Lock(e)),
                }
            }
            (None, Ok(())) => Err(ProcessError::Lock(LockError::Interrupted(
                self.locker.identity().clone(),
            ))),
        }
    }
}
