//! Log setup for the `klock` binary
//!
//! Logs go to stderr so they never mix with the supervised command's stdout.
//! Every line starts with [`LOG_PREFIX`], which keeps klock's own output
//! apart from the command's when both share a terminal.

use std::fmt::Write as _;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_PREFIX: &str = "[klock] ";

const DEBUG_DIRECTIVES: &str =
    "klock=debug,klock_lease=debug,klock_process=debug,klock_leader_election=debug";

/// Event formatter that writes a fixed prefix before each event
pub struct Prefixed<F> {
    prefix: &'static str,
    inner: F,
}

impl<F> Prefixed<F> {
    pub fn new(prefix: &'static str, inner: F) -> Self {
        Self { prefix, inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for Prefixed<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        writer.write_str(self.prefix)?;
        self.inner.format_event(ctx, writer, event)
    }
}

/// `debug` for klock's crates when requested, else `RUST_LOG`, else `info`
pub fn filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(DEBUG_DIRECTIVES)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber
pub fn init(debug: bool) {
    let event_format = Prefixed::new(LOG_PREFIX, format::format().with_target(false));
    tracing_subscriber::fmt()
        .with_env_filter(filter(debug))
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .event_format(event_format)
        .init();
}
