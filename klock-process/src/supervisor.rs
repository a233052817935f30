//! Run an external command until it exits or is cancelled
//!
//! On cancellation the configured signal is sent to the command. If it has
//! not exited once the grace period passes it is killed. Without a
//! configured signal, cancellation kills immediately.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProcessError;

/// How a supervised command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit status reported by the operating system
    pub status: ExitStatus,
    /// Signal sent because of cancellation, if any
    pub signal_sent: Option<Signal>,
    /// Whether the command had to be killed
    pub killed: bool,
}

impl ProcessOutcome {
    fn exited(status: ExitStatus, signal_sent: Option<Signal>) -> Self {
        Self {
            status,
            signal_sent,
            killed: false,
        }
    }

    /// `Ok` if the command exited successfully
    fn into_result(self, command: &str) -> Result<Self, ProcessError> {
        if self.status.success() {
            return Ok(self);
        }
        let command = command.to_string();
        if self.killed {
            return Err(ProcessError::Killed { command });
        }
        match (self.status.code(), self.status.signal()) {
            (Some(code), _) => Err(ProcessError::Exit { command, code }),
            (None, Some(signal)) => Err(ProcessError::Signaled { command, signal }),
            (None, None) => Err(ProcessError::Exit { command, code: 1 }),
        }
    }
}

/// An external command with inherited standard streams
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    args: Vec<String>,
    cancel_signal: Option<Signal>,
    grace_period: Option<Duration>,
}

impl ProcessSupervisor {
    /// Supervise `program args...`, terminating with SIGTERM on cancellation
    /// and waiting for it to exit without a deadline
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![program.into()];
        argv.extend(args.into_iter().map(Into::into));
        Self {
            args: argv,
            cancel_signal: Some(Signal::SIGTERM),
            grace_period: None,
        }
    }

    /// Signal sent on cancellation; `None` kills immediately
    pub fn with_cancel_signal(mut self, signal: Option<Signal>) -> Self {
        self.cancel_signal = signal;
        self
    }

    /// How long to wait after the signal before killing; `None` waits forever
    pub fn with_grace_period(mut self, grace_period: Option<Duration>) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Program followed by its arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn cancel_signal(&self) -> Option<Signal> {
        self.cancel_signal
    }

    pub fn grace_period(&self) -> Option<Duration> {
        self.grace_period
    }

    /// The argv, shell-quoted, for logs and errors
    pub fn command_line(&self) -> String {
        self.args
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn validate(&self) -> Result<(), ProcessError> {
        match self.args.first() {
            None => Err(ProcessError::InvalidProcess("args is empty".to_string())),
            Some(program) if program.is_empty() => {
                Err(ProcessError::InvalidProcess("program is empty".to_string()))
            }
            Some(_) => Ok(()),
        }
    }

    /// Start the command and wait for it, honouring `cancel`
    ///
    /// Returns an error for anything but a successful exit.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ProcessOutcome, ProcessError> {
        self.validate()?;
        let command = self.command_line();
        if cancel.is_cancelled() {
            return Err(ProcessError::NotStarted { command });
        }

        let mut child = Command::new(&self.args[0])
            .args(&self.args[1..])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: command.clone(),
                source,
            })?;
        info!(command = %command, pid = ?child.id(), "Process started");

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        let outcome = match exited {
            Some(status) => {
                let status = status.map_err(|source| ProcessError::Wait {
                    command: command.clone(),
                    source,
                })?;
                ProcessOutcome::exited(status, None)
            }
            None => self.terminate(&mut child, &command).await?,
        };

        info!(command = %command, status = %outcome.status, "Process ended");
        outcome.into_result(&command)
    }

    async fn terminate(
        &self,
        child: &mut Child,
        command: &str,
    ) -> Result<ProcessOutcome, ProcessError> {
        let (Some(signal), Some(pid)) = (self.cancel_signal, child.id()) else {
            info!(command, "Cancelled, killing process");
            return force_kill(child, command, None).await;
        };

        info!(
            command,
            signal = signal.as_str(),
            grace_period = ?self.grace_period,
            "Cancelled, sending signal to process"
        );
        match kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) => {}
            // Exited between the wait and the signal
            Err(Errno::ESRCH) => debug!(pid, "Process already gone"),
            Err(source) => return Err(ProcessError::Signal { signal, pid, source }),
        }

        let status = match self.grace_period {
            Some(grace) => match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(command, ?grace, "Process still running after grace period, killing");
                    return force_kill(child, command, Some(signal)).await;
                }
            },
            None => child.wait().await,
        };
        let status = status.map_err(|source| ProcessError::Wait {
            command: command.to_string(),
            source,
        })?;
        Ok(ProcessOutcome::exited(status, Some(signal)))
    }
}

async fn force_kill(
    child: &mut Child,
    command: &str,
    signal_sent: Option<Signal>,
) -> Result<ProcessOutcome, ProcessError> {
    if let Err(e) = child.start_kill() {
        debug!(command, "Failed to kill process: {}", e);
    }
    let status = child.wait().await.map_err(|source| ProcessError::Wait {
        command: command.to_string(),
        source,
    })?;
    Ok(ProcessOutcome {
        status,
        signal_sent,
        killed: status.signal() == Some(Signal::SIGKILL as i32),
    })
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'"'"'"#))
    }
}
