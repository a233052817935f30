use std::sync::Arc;

use clap::Parser;
use klock::{config, exit_code, logging, signals, Cli};
use klock_lease::{LockOptions, Locker};
use klock_process::{Process, EXIT_FAILURE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug_enabled());

    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    let client = match config::open_lease_store(cli.lease_dir.as_deref()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to open lease store: {}", e);
            return EXIT_FAILURE;
        }
    };

    let locker = match Locker::new(&cli.namespace, &cli.lease, &cli.identity, client) {
        Ok(locker) => locker
            .with_labels(cli.labels())
            .with_cleanup_lease(cli.cleanup_lease()),
        Err(e) => {
            error!("Failed to create locker: {}", e);
            return EXIT_FAILURE;
        }
    };

    let Some((program, args)) = cli.command.split_first() else {
        error!("No command given");
        return EXIT_FAILURE;
    };
    let process = Process::new(locker, program.as_str(), args.iter().cloned())
        .with_cancel_signal(Some(cli.signal))
        .with_grace_period(cli.grace_period());

    let cancel = CancellationToken::new();
    if let Err(e) = signals::cancel_on_signals(cancel.clone()) {
        error!("Failed to install signal handlers: {}", e);
        return EXIT_FAILURE;
    }

    let options = LockOptions::new().with_wait(cli.wait_limit().unwrap_or_default());
    debug!(lock = %process.locker().identity(), wait = ?options.wait(), "Running");
    let result = process.run(&cancel, options).await;
    if let Err(e) = &result {
        error!("{}", e);
    }
    exit_code(&result, cli.conflict_exit_code)
}
