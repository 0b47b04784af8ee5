use std::fs;
use std::sync::Once;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::SwarmError;

static INIT: Once = Once::new();

/// Installs the global subscriber: a console layer on stderr and, when a
/// directory is configured, a JSON layer on a daily rolling file.
/// `RUST_LOG` takes precedence over the configured level. Only the first
/// call has an effect.
pub fn init(config: &LoggingConfig) -> Result<(), SwarmError> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = install(config);
    });
    result
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn install(config: &LoggingConfig) -> Result<(), SwarmError> {
    let console = if config.json {
        fmt::Layer::new()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(filter(&config.level))
            .boxed()
    } else {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true)
            .with_filter(filter(&config.level))
            .boxed()
    };

    let file = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("swarm")
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| SwarmError::config(format!("Failed to create log appender: {}", e)))?;

            Some(
                fmt::Layer::new()
                    .json()
                    .with_writer(appender)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .with_filter(filter(&config.level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| SwarmError::config(format!("Failed to install tracing subscriber: {}", e)))
}
