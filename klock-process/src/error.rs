//! Error types for supervised processes

use std::io;

use klock_lease::LockError;
use nix::errno::Errno;
use nix::sys::signal::Signal;

use crate::signal::describe_signal;

/// Exit code for failures that are not the command's own
pub const EXIT_FAILURE: i32 = 1;

/// Errors from running a command under a lock
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process description is unusable
    #[error("Invalid process: {0}")]
    InvalidProcess(String),

    /// The command was cancelled before it could start
    #[error("Command was not started: {command}")]
    NotStarted {
        /// Command line
        command: String,
    },

    /// The command could not be started
    #[error("Failed to start {command}: {source}")]
    Spawn {
        /// Command line
        command: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Waiting for the command failed
    #[error("Failed to wait for {command}: {source}")]
    Wait {
        /// Command line
        command: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The command exited with a non-zero code
    #[error("Command {command} exited with code {code}")]
    Exit {
        /// Command line
        command: String,
        /// Exit code
        code: i32,
    },

    /// The command was terminated by a signal
    #[error("Command {command} terminated by {}", signal_label(.signal))]
    Signaled {
        /// Command line
        command: String,
        /// Signal number
        signal: i32,
    },

    /// The command outlived its grace period and was killed
    #[error("Command {command} was killed")]
    Killed {
        /// Command line
        command: String,
    },

    /// The cancellation signal could not be delivered
    #[error("Failed to send {} to process {pid}: {source}", .signal.as_str())]
    Signal {
        /// Signal being sent
        signal: Signal,
        /// Target process id
        pid: u32,
        /// Errno from kill(2)
        #[source]
        source: Errno,
    },

    /// Acquiring, holding or cleaning up the lock failed
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The command failed and so did the lock around it
    #[error("{command}; {lock}")]
    Joined {
        /// The command's own failure
        command: Box<ProcessError>,
        /// The lock failure, typically a failed lease deletion
        #[source]
        lock: LockError,
    },
}

fn signal_label(signal: &i32) -> String {
    describe_signal(*signal)
}

impl ProcessError {
    /// Exit status a CLI should use for this error
    ///
    /// The command's own code for a non-zero exit, `128 + N` when it died
    /// from signal N, even when the lock failed as well. [`EXIT_FAILURE`]
    /// for everything else, including
    /// election timeouts which callers usually map separately.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code, .. } => *code,
            Self::Signaled { signal, .. } => 128 + signal,
            Self::Killed { .. } => 128 + Signal::SIGKILL as i32,
            Self::Joined { command, .. } => command.exit_code(),
            _ => EXIT_FAILURE,
        }
    }

    /// Whether the lock could not be acquired within the wait
    pub fn is_election_timeout(&self) -> bool {
        matches!(self, Self::Lock(e) if e.is_election_timeout())
    }
}
