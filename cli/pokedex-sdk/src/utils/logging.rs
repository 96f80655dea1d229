use std::sync::OnceLock;

use tracing::{debug, error};
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::{EnvFilter, Registry};

/// How much of the SDK's logging to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Only errors
    Quiet,
    /// Increasing detail, `0` shows warnings
    Verbose(usize),
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

static LOGGER_HANDLE: OnceLock<Handle<EnvFilter, Registry>> = OnceLock::new();

/// The filter directives for a verbosity level.
pub fn log_filter(verbosity: Verbosity) -> &'static str {
    match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,pokedex_sdk=error,pokedex_api=error",
        // Only show warnings
        Verbosity::Verbose(0) => "off,pokedex_sdk=warn,pokedex_api=warn",
        // Show our own info logs
        Verbosity::Verbose(1) => "off,pokedex_sdk=info,pokedex_api=info",
        // Also show debug, e.g. every request and state transition
        Verbosity::Verbose(2) => "off,pokedex_sdk=debug,pokedex_api=debug",
        Verbosity::Verbose(3) => "off,pokedex_sdk=trace,pokedex_api=trace",
        // Also show debug from the HTTP stack
        Verbosity::Verbose(4) => "debug,pokedex_sdk=trace,pokedex_api=trace",
        Verbosity::Verbose(_) => "trace",
    }
}

/// Install the global subscriber, or update its filter if already installed.
///
/// `RUST_LOG` takes precedence over `verbosity`.
pub fn init_logger(verbosity: Verbosity) {
    let filter_handle = LOGGER_HANDLE.get_or_init(|| {
        let (subscriber, reload_handle) = create_registry_and_filter_reload_handle();
        // Embedding applications may have installed their own subscriber.
        if let Err(err) = subscriber.try_init() {
            debug!(%err, "global subscriber already set");
        }
        reload_handle
    });

    update_filters(filter_handle, log_filter(verbosity));
}

pub fn update_filters(filter_handle: &Handle<EnvFilter, Registry>, log_filter: &str) {
    let result = filter_handle.modify(|layer| {
        match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_filter)) {
            Ok(new_filter) => *layer = new_filter,
            Err(err) => {
                error!("Updating logger filter failed: {}", err);
            },
        };
    });
    if let Err(err) = result {
        error!("Updating logger filter failed: {}", err);
    }
}

pub fn create_registry_and_filter_reload_handle() -> (
    impl tracing::Subscriber + Send + Sync + 'static,
    Handle<EnvFilter, Registry>,
) {
    // Start permissive and narrow down with `update_filters`,
    // the first filter set bounds the verbosity of `log` records.
    let filter = EnvFilter::new("trace");
    let (filter, filter_reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(tracing_subscriber::fmt::format())
        .with_filter(filter);
    let registry = tracing_subscriber::registry().with(log_layer);

    (registry, filter_reload_handle)
}
