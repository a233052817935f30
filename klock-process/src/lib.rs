//! External commands run under a klock lease.
//!
//! [`ProcessSupervisor`] runs a command with inherited standard streams and
//! turns cancellation into a signal followed, after a grace period, by a
//! kill. [`Process`] runs a supervisor as the protected function of a
//! [`klock_lease::Locker`].
//!
//! Unix only.

mod error;
mod process;
mod signal;
mod supervisor;

pub use error::{ProcessError, EXIT_FAILURE};
pub use process::Process;
pub use signal::{describe_signal, parse_signal, signal_name, signal_number};
pub use supervisor::{ProcessOutcome, ProcessSupervisor};

pub use nix::sys::signal::Signal;
