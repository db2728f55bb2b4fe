//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate; the core only emits `tracing` events.

use tracing::Level;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE
/// * `json` - stable JSON lines on stderr
/// * `debug_logging` - the `debugLoggingEnabled` setting; raises the core's
///   targets to DEBUG even without `-v`
///
/// Without `-v` or `debug_logging`, the core only reports warnings and
/// errors. User-facing notices are always shown.
pub fn init(verbosity: u8, json: bool, debug_logging: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let core_level = match (verbosity, debug_logging) {
        (0, false) => Level::WARN,
        (0, true) => Level::DEBUG,
        _ => level,
    };

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    for directive in [
        format!("livedoc={core_level}"),
        format!("livedoc_cli={level}"),
        "livedoc::notice=info".to_string(),
    ] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
