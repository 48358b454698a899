// External crates
use anyhow::{Context, Result};
use std::panic;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

/// Logging knobs resolved from flags and the config file.
#[derive(Debug, Clone, Default)]
pub struct TracingSettings {
    pub verbose: bool,
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset. Overrides the `verbose` default.
    pub level: Option<String>,
}

/// Filter precedence: `RUST_LOG`, then the configured level, then `debug` or `warn`
/// depending on `--verbose`.
fn build_filter(settings: &TracingSettings) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let fallback = if settings.verbose { "debug" } else { "warn" };
    let mut filter = settings
        .level
        .as_deref()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));

    // HTTP/2 frame logs drown everything else at debug
    if let Ok(h2_directive) = "h2=warn".parse::<Directive>() {
        filter = filter.add_directive(h2_directive);
    }
    filter
}

/// Install the global subscriber. Logs go to stderr so stdout stays reserved for
/// command output. The returned guard flushes the writer when dropped and must be
/// held until the process exits.
pub fn init_tracing(settings: &TracingSettings) -> Result<WorkerGuard> {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let fmt_layer = (!settings.json).then(|| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer.clone())
            .with_file(settings.verbose)
            .with_line_number(settings.verbose)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
    });

    let json_layer = settings.json.then(|| {
        fmt::layer()
            .json()
            .with_writer(non_blocking_writer.clone())
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
    });

    let error_layer = ErrorLayer::default();

    let subscriber = Registry::default()
        .with(build_filter(settings))
        .with(fmt_layer)
        .with(json_layer)
        .with(error_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;
    Ok(guard)
}

pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => (*s).to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => "Unknown panic".to_string(),
            },
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "channelzcli panicked"
        );
        eprintln!("channelzcli panicked at {location}: {msg}");
    }));
}
