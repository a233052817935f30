//! Turn termination signals received by klock into cancellation

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `cancel` on the first SIGINT, SIGTERM or SIGPIPE
///
/// Handlers are installed before this returns, so a signal arriving
/// afterwards is never lost. Later signals are absorbed.
pub fn cancel_on_signals(cancel: CancellationToken) -> io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut pipe = signal(SignalKind::pipe())?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = pipe.recv() => "SIGPIPE",
            _ = cancel.cancelled() => return,
        };
        info!(signal = name, "Received signal, cancelling");
        cancel.cancel();
    }))
}
