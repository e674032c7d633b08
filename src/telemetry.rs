//! Tracing setup scoped to this crate's events.

use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Target prefix of every event this crate emits.
pub const TARGET_PREFIX: &str = "node_to_code";

/// Compact fmt layer that renders only `node_to_code` events, so embedding
/// it next to a host application's own layers adds no foreign noise.
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let only_this_crate = filter::filter_fn(|meta| meta.target().starts_with(TARGET_PREFIX));

    fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_line_number(true)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .event_format(fmt::format().compact())
        .with_filter(only_this_crate)
}

/// `node_to_code=<level>`.
pub fn level_directive(level: Level) -> Result<Directive, ParseError> {
    Directive::from_str(&format!("{TARGET_PREFIX}={}", level.as_str().to_lowercase()))
}

/// `RUST_LOG` if set, else `default`, plus `level` for this crate.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    match level_directive(level) {
        Ok(directive) => base.add_directive(directive),
        Err(_) => base,
    }
}

/// Install a global subscriber for binaries and tests that have none.
pub fn init(level: Level) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(layer())
        .with(env_filter_with_level("warn", level))
        .try_init()
}
