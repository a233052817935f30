//! klock - run a command with mutual exclusion guaranteed by a lease.
//!
//! Usage: `klock [flags] -- command [arguments]`
//!
//! Exit codes:
//! - 0: The command succeeded
//! - the command's own status when it failed, `128 + N` when killed by signal N
//! - `--conflict-exit-code` (default 1): the lock was not acquired within `--wait`
//! - 1: Any other error

pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

pub use cli::Cli;

use klock_process::{ProcessError, ProcessOutcome};

/// Map the result of a run to the process exit status
pub fn exit_code(result: &Result<ProcessOutcome, ProcessError>, conflict_exit_code: u8) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) if e.is_election_timeout() => i32::from(conflict_exit_code),
        Err(e) => e.exit_code(),
    }
}
