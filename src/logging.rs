//! Subscriber setup: rolling file output, plus stdout in text mode.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `log_level` applies to this crate; dependencies stay at `warn` and
/// sqlx statements follow `sql_log_level`.
fn filter_directives(config: &AppConfig) -> String {
    format!(
        "warn,{}={},sqlx::query={}",
        env!("CARGO_CRATE_NAME"),
        config.log_level,
        config.sql_log_level
    )
}

fn ledger_appender(config: &AppConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
///
/// Keep the returned guard alive for the process lifetime or buffered lines
/// are lost on exit.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(ledger_appender(config));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init();
    }

    guard
}
