//! Process-wide logger and free-function wrappers, for call sites that cannot yet take an injected
//! [`Logger`].
//!
//! Prefer passing a [`Logger`] (or a [`RequestContext`][crate::RequestContext]) explicitly.

use std::{fmt, sync::OnceLock};

use serde_json::Value;

use crate::{LogConfig, Logger, LoggerError};

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Installs `logger` as the process-wide logger.
///
/// # Errors
///
/// Returns `logger` back if a process-wide logger was already installed, or if [`logger`] was
/// called before and installed the built-in fallback.
pub fn install(logger: Logger) -> Result<(), Logger> {
    LOGGER.set(logger)
}

/// Builds a root logger from `config` and installs it as the process-wide logger.
///
/// # Errors
///
/// Returns [`LoggerError`] if the logger cannot be built or a process-wide logger is already
/// installed.
pub fn init(config: &LogConfig) -> Result<&'static Logger, LoggerError> {
    install(Logger::from_config(config)?).map_err(|_| {
        LoggerError::Configuration("a process-wide logger is already installed".to_owned())
    })?;
    Ok(logger())
}

/// The process-wide logger.
///
/// If none was installed, a JSON console logger with the built-in configuration is installed and
/// returned, so this never fails.
pub fn logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::builtin)
}

/// Waits until the process-wide logger has written every pending line.
///
/// Call this before returning from `main`: the process-wide logger is never dropped, so lines
/// still queued for its background writers would otherwise be lost. Records logged afterwards
/// through the console and file sinks are dropped.
pub fn shutdown() {
    if let Some(logger) = LOGGER.get() {
        logger.shutdown();
    }
}

macro_rules! severity_functions {
    ($name:literal, $plain:ident, $formatted:ident, $with_fields:ident) => {
        #[doc = concat!("Logs a message at ", $name, " severity through the process-wide logger.")]
        #[track_caller]
        pub fn $plain(message: impl fmt::Display) {
            logger().$plain(message);
        }

        #[doc = concat!(
            "Logs formatted arguments at ", $name, " severity through the process-wide logger."
        )]
        #[track_caller]
        pub fn $formatted(args: fmt::Arguments<'_>) {
            logger().$formatted(args);
        }

        #[doc = concat!(
            "Logs a message with structured fields at ", $name,
            " severity through the process-wide logger."
        )]
        #[track_caller]
        pub fn $with_fields(
            message: impl fmt::Display,
            fields: impl IntoIterator<Item = (&'static str, Value)>,
        ) {
            logger().$with_fields(message, fields);
        }
    };
}

severity_functions!("debug", debug, debug_fmt, debug_with);
severity_functions!("info", info, info_fmt, info_with);
severity_functions!("warn", warn, warn_fmt, warn_with);
severity_functions!("error", error, error_fmt, error_with);

/// Logs a message at fatal severity through the process-wide logger, flushes every sink and
/// terminates the process.
#[track_caller]
pub fn fatal(message: impl fmt::Display) -> ! {
    logger().fatal(message)
}

/// Logs formatted arguments at fatal severity through the process-wide logger, flushes every sink
/// and terminates the process.
#[track_caller]
pub fn fatal_fmt(args: fmt::Arguments<'_>) -> ! {
    logger().fatal_fmt(args)
}

/// Logs a message with structured fields at fatal severity through the process-wide logger,
/// flushes every sink and terminates the process.
#[track_caller]
pub fn fatal_with(
    message: impl fmt::Display,
    fields: impl IntoIterator<Item = (&'static str, Value)>,
) -> ! {
    logger().fatal_with(message, fields)
}
