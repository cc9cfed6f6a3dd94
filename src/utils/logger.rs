//! Logging utilities

use crate::Result;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Initialize logging system
pub fn init<P: AsRef<Path>>(log_level: &str, log_file: P) -> Result<()> {
    // Create log directory if it doesn't exist
    if let Some(parent) = log_file.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create file appender with daily rotation
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        log_file.as_ref().parent().unwrap_or(Path::new(".")),
        log_file
            .as_ref()
            .file_name()
            .unwrap_or(std::ffi::OsStr::new("app.log")),
    );

    // Create console layer
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    // Create file layer
    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(file_appender);

    // Create environment filter
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // Initialize subscriber
    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// Log spread observations with structured fields
#[macro_export]
macro_rules! log_spread {
    ($level:ident, $symbol:expr, $value:expr, $direction:expr, $($field:tt)*) => {
        tracing::$level!(
            symbol = %$symbol,
            spread = %$value,
            direction = %$direction,
            $($field)*
        );
    };
}

/// Log emitted order intents with structured fields
#[macro_export]
macro_rules! log_intent {
    ($level:ident, $kind:expr, $side:expr, $size:expr, $($field:tt)*) => {
        tracing::$level!(
            kind = ?$kind,
            side = ?$side,
            size = %$size,
            $($field)*
        );
    };
}

/// Log position information with structured fields
#[macro_export]
macro_rules! log_position {
    ($level:ident, $symbol:expr, $size:expr, $side:expr, $($field:tt)*) => {
        tracing::$level!(
            symbol = %$symbol,
            size = %$size,
            side = ?$side,
            $($field)*
        );
    };
}

/// Log risk information with structured fields
#[macro_export]
macro_rules! log_risk {
    ($level:ident, $risk_type:expr, $value:expr, $threshold:expr, $($field:tt)*) => {
        tracing::$level!(
            risk_type = %$risk_type,
            value = %$value,
            threshold = %$threshold,
            $($field)*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_logger_init() {
        let temp_dir = tempdir().unwrap();
        let log_file = temp_dir.path().join("test.log");

        let result = init("info", &log_file);
        assert!(result.is_ok());

        // Test that we can log something
        tracing::info!("Test log message");
    }
}
