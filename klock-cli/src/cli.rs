//! Command-line definition for `klock`

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use klock_lease::{parse_labels, Labels};
use klock_process::{parse_signal, Signal};

use crate::config::LEASE_DIR_ENV;

/// Default exit status for failures, and for election timeouts unless `-E` says otherwise
pub const EXIT_FAILURE: u8 = klock_process::EXIT_FAILURE as u8;

const AFTER_HELP: &str = "\
klock runs the given command with mutual exclusion guaranteed by a lease. It
acquires the lease under a holder identity, creating the lease if it does not
exist, runs the command, and releases the lease when the command exits.

The label app.kubernetes.io/managed-by=klock is always applied to leases
written by klock.

Examples:

  Run some_cmd regularly but never concurrently, each run with its own identity:

    klock -l some_cmd_lease -i \"$(uuidgen)\" -- some_cmd

  Give up with exit status 75 if the lock is not acquired within 30 seconds:

    klock -l backup -w 30s -E 75 -- backup.sh

Exit status:

  0 if the command succeeded. The command's exit status if it failed, or
  128+N if it was terminated by signal N. The --conflict-exit-code if the
  lock could not be acquired within --wait. 1 for any other failure.";

/// klock - run a command under a lease lock
#[derive(Parser, Debug)]
#[command(name = "klock")]
#[command(version)]
#[command(about = "Run a command with mutual exclusion guaranteed by a lease")]
#[command(after_long_help = AFTER_HELP)]
pub struct Cli {
    /// Directory holding the lease documents, shared by all contenders
    #[arg(long, env = LEASE_DIR_ENV, value_name = "DIR")]
    pub lease_dir: Option<PathBuf>,

    /// Namespace of the lease
    #[arg(short, long, env = "KLOCK_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Name of the lease
    #[arg(short, long, default_value = "klock")]
    pub lease: String,

    /// Identity of the lease holder, unique per contender
    #[arg(short, long, default_value = "klock")]
    pub identity: String,

    /// Delete the lease after processing
    #[arg(long)]
    pub cleanup_lease: bool,

    /// Same as --cleanup-lease
    #[arg(short, long)]
    pub unlock: bool,

    /// Fail if the lock cannot be acquired within this duration; 0 waits forever
    #[arg(short, long, value_parser = parse_duration, default_value = "0", value_name = "DURATION")]
    pub wait: Duration,

    /// Same as --wait
    #[arg(long, value_parser = parse_duration, default_value = "0", value_name = "DURATION")]
    pub timeout: Duration,

    /// Exit status used when --wait elapses before the lock is acquired
    #[arg(short = 'E', long, default_value_t = EXIT_FAILURE, value_name = "CODE")]
    pub conflict_exit_code: u8,

    /// Also kill the command if it is still running this long after the signal; 0 never kills
    #[arg(short, long, value_parser = parse_duration, default_value = "0", value_name = "DURATION")]
    pub kill_after: Duration,

    /// Signal sent to the command on cancellation, a name like HUP or a number
    #[arg(short, long, value_parser = parse_signal_arg, default_value = "TERM")]
    pub signal: Signal,

    /// Additional lease labels, as key=value pairs separated by commas
    #[arg(long, value_parser = parse_labels_arg, value_name = "LABELS")]
    pub labels: Option<Labels>,

    /// Enable debug logs
    #[arg(long)]
    pub debug: bool,

    /// Same as --debug
    #[arg(long)]
    pub verbose: bool,

    /// The command to run and its arguments
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// The longer of --wait and --timeout, `None` when both are zero
    pub fn wait_limit(&self) -> Option<Duration> {
        let wait = self.wait.max(self.timeout);
        (!wait.is_zero()).then_some(wait)
    }

    /// Time between the signal and a forced kill, `None` to never kill
    pub fn grace_period(&self) -> Option<Duration> {
        (!self.kill_after.is_zero()).then_some(self.kill_after)
    }

    pub fn cleanup_lease(&self) -> bool {
        self.cleanup_lease || self.unlock
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug || self.verbose
    }

    pub fn labels(&self) -> Labels {
        self.labels.clone().unwrap_or_default()
    }
}

fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(input).map_err(|e| e.to_string())
}

fn parse_signal_arg(input: &str) -> Result<Signal, String> {
    parse_signal(input).ok_or_else(|| format!("unknown signal: {}", input))
}

fn parse_labels_arg(input: &str) -> Result<Labels, String> {
    parse_labels(input).map_err(|e| e.to_string())
}
