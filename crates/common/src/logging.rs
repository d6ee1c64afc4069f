//! Tracing subscriber setup shared by the tokengate binaries

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::Error;
use crate::result::Result;

/// `RUST_LOG` wins over the configured level when it is set
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Install a console subscriber and, when `log_dir` is given, a daily
/// rolling file subscriber writing `<name>.log` files into that directory.
pub fn init_logging(log_dir: Option<&Path>, name: &str, log_level: &str) -> Result<()> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter(log_level));

    let file_layer = log_dir.map(|dir| {
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, format!("{}.log", name));
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(file_appender)
            .with_filter(env_filter(log_level))
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::logging(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Install the console subscriber only
pub fn init_console_logging(log_level: &str) -> Result<()> {
    init_logging(None, "tokengate", log_level)
}
