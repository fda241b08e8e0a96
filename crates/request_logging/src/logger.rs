//! The structured logger: builds records, applies the threshold, and fans out to every sink.

use std::{
    backtrace::Backtrace,
    fmt,
    sync::{Arc, Mutex},
};

use serde_json::Value;
use tracing_appender::non_blocking::WorkerGuard;

use crate::{
    CallerLocation, CorrelationId, Fields, LevelController, LogConfig, LogRecord, LoggerError,
    Severity,
    sink::{self, Encoder, RecordFormat, Sink, SinkSet},
};

/// Exit status of a process terminated by a fatal record.
const FATAL_EXIT_CODE: i32 = 1;

struct Shared {
    sinks: Vec<Sink>,
    level: LevelController,
    stack_trace_level: Severity,
    guards: Mutex<Vec<WorkerGuard>>,
}

/// A structured logger.
///
/// A logger is either a root logger, built once at startup from a [`LogConfig`], or a
/// request-bound logger derived from one with [`Logger::derive_trace_logger`] or
/// [`Logger::with_correlation`]. Both share the same sinks and threshold and expose the same call
/// surface; records emitted through a request-bound logger additionally carry its
/// [`CorrelationId`] as `request_id`.
///
/// Each severity has three call shapes: a plain message (`info`), pre-formatted arguments
/// (`info_fmt(format_args!(..))`) and a message with structured fields (`info_with`). None of
/// them return errors: a sink that fails to write is skipped without affecting the others.
///
/// Cloning is cheap; clones share sinks and threshold.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    correlation_id: Option<CorrelationId>,
}

macro_rules! severity_methods {
    ($severity:expr, $name:literal, $plain:ident, $formatted:ident, $with_fields:ident) => {
        #[doc = concat!("Logs a message at ", $name, " severity.")]
        #[track_caller]
        pub fn $plain(&self, message: impl fmt::Display) {
            self.emit($severity, message, Fields::new(), CallerLocation::caller());
        }

        #[doc = concat!("Logs formatted arguments at ", $name, " severity.")]
        #[track_caller]
        pub fn $formatted(&self, args: fmt::Arguments<'_>) {
            self.emit($severity, args, Fields::new(), CallerLocation::caller());
        }

        #[doc = concat!("Logs a message with structured fields at ", $name, " severity.")]
        #[track_caller]
        pub fn $with_fields(
            &self,
            message: impl fmt::Display,
            fields: impl IntoIterator<Item = (&'static str, Value)>,
        ) {
            self.emit($severity, message, fields, CallerLocation::caller());
        }
    };
}

impl Logger {
    /// Builds a root logger from a (possibly partial) configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError`] if the configuration cannot be resolved or the file sink cannot be
    /// created.
    pub fn from_config(config: &LogConfig) -> Result<Self, LoggerError> {
        let config = config.resolve()?;
        let level = LevelController::new(config.severity());
        let SinkSet { sinks, guards } = sink::compose_sinks(&config, &level)?;
        Ok(Self::from_parts(
            sinks,
            guards,
            level,
            config.stack_trace_severity(),
        ))
    }

    /// Builds a root logger over caller-supplied sinks.
    ///
    /// The sinks should have been created with (clones of) `level`.
    pub fn from_sinks(
        sinks: Vec<Sink>,
        level: LevelController,
        stack_trace_level: Severity,
    ) -> Self {
        Self::from_parts(sinks, Vec::new(), level, stack_trace_level)
    }

    /// A JSON console logger using the built-in configuration. Cannot fail.
    pub(crate) fn builtin() -> Self {
        let config = LogConfig::builtin();
        let level = LevelController::new(config.severity());
        let (sink, guard) = sink::console_sink(Encoder::new(RecordFormat::Json), &level);
        Self::from_parts(vec![sink], vec![guard], level, config.stack_trace_severity())
    }

    fn from_parts(
        sinks: Vec<Sink>,
        guards: Vec<WorkerGuard>,
        level: LevelController,
        stack_trace_level: Severity,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                sinks,
                level,
                stack_trace_level,
                guards: Mutex::new(guards),
            }),
            correlation_id: None,
        }
    }

    /// The root logger sharing this logger's sinks, without any bound correlation identifier.
    pub fn root(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            correlation_id: None,
        }
    }

    /// A logger sharing this logger's sinks whose records carry `correlation_id`.
    pub fn with_correlation(&self, correlation_id: CorrelationId) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            correlation_id: Some(correlation_id),
        }
    }

    /// Mints a fresh [`CorrelationId`] and returns a logger bound to it.
    ///
    /// Intended to be called once per inbound request.
    pub fn derive_trace_logger(&self) -> Self {
        self.with_correlation(CorrelationId::new())
    }

    /// The correlation identifier bound to this logger, if any.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// The threshold shared by every sink of this logger.
    pub fn level_controller(&self) -> &LevelController {
        &self.shared.level
    }

    /// Changes the threshold of every sink, for every logger sharing them.
    pub fn set_level(&self, severity: Severity) {
        self.shared.level.set_level(severity);
    }

    /// Whether records of the specified severity currently pass the threshold.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.shared.level.enabled(severity)
    }

    /// Logs a message with structured fields at the specified severity.
    ///
    /// Logging at [`Severity::Fatal`] through this method does not terminate the process; use
    /// [`Logger::fatal`] for that.
    #[track_caller]
    pub fn log(
        &self,
        severity: Severity,
        message: impl fmt::Display,
        fields: impl IntoIterator<Item = (&'static str, Value)>,
    ) {
        self.emit(severity, message, fields, CallerLocation::caller());
    }

    severity_methods!(Severity::Debug, "debug", debug, debug_fmt, debug_with);
    severity_methods!(Severity::Info, "info", info, info_fmt, info_with);
    severity_methods!(Severity::Warn, "warn", warn, warn_fmt, warn_with);
    severity_methods!(Severity::Error, "error", error, error_fmt, error_with);

    /// Logs a message at fatal severity, flushes every sink and terminates the process.
    #[track_caller]
    pub fn fatal(&self, message: impl fmt::Display) -> ! {
        self.emit(Severity::Fatal, message, Fields::new(), CallerLocation::caller());
        self.terminate()
    }

    /// Logs formatted arguments at fatal severity, flushes every sink and terminates the process.
    #[track_caller]
    pub fn fatal_fmt(&self, args: fmt::Arguments<'_>) -> ! {
        self.emit(Severity::Fatal, args, Fields::new(), CallerLocation::caller());
        self.terminate()
    }

    /// Logs a message with structured fields at fatal severity, flushes every sink and terminates
    /// the process.
    #[track_caller]
    pub fn fatal_with(
        &self,
        message: impl fmt::Display,
        fields: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> ! {
        self.emit(Severity::Fatal, message, fields, CallerLocation::caller());
        self.terminate()
    }

    /// Flushes every sink's writer, ignoring failures.
    ///
    /// The console and file writers built from a [`LogConfig`] are non-blocking: flushing them
    /// only hands pending lines to their background worker. Use [`Logger::shutdown`] to wait
    /// until the lines are written.
    pub fn flush(&self) {
        for sink in &self.shared.sinks {
            let _ = sink.flush();
        }
    }

    /// Flushes every sink and blocks until the background writers have written all pending lines.
    ///
    /// The background writers stop afterwards: records logged later through this logger or any
    /// logger sharing its sinks are dropped by the non-blocking console and file sinks. Call this
    /// once, before the process exits.
    pub fn shutdown(&self) {
        self.flush();
        let guards = match self.shared.guards.lock() {
            Ok(mut guards) => std::mem::take(&mut *guards),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        // Dropping a guard blocks until its writer has drained.
        drop(guards);
    }

    fn emit(
        &self,
        severity: Severity,
        message: impl fmt::Display,
        fields: impl IntoIterator<Item = (&'static str, Value)>,
        caller: CallerLocation,
    ) {
        if !self.enabled(severity) {
            return;
        }

        self.emit_record(
            severity,
            message.to_string(),
            fields.into_iter().collect(),
            caller,
            self.correlation_id,
        );
    }

    /// Builds a record and hands it to every sink. The threshold must already have been checked.
    pub(crate) fn emit_record(
        &self,
        severity: Severity,
        message: String,
        fields: Fields,
        caller: CallerLocation,
        correlation_id: Option<CorrelationId>,
    ) {
        let mut record = LogRecord::new(severity, message, fields, caller, correlation_id);
        if severity >= self.shared.stack_trace_level {
            record = record.with_stacktrace(Backtrace::force_capture().to_string());
        }

        for sink in &self.shared.sinks {
            // A failing sink must not keep the record from the remaining sinks.
            let _ = sink.try_write(&record);
        }
    }

    fn terminate(&self) -> ! {
        self.shutdown();
        std::process::exit(FATAL_EXIT_CODE)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("sinks", &self.shared.sinks)
            .field("level", &self.shared.level)
            .field("stack_trace_level", &self.shared.stack_trace_level)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}
