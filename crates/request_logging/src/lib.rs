//! `request_logging` provides structured logging with per-request correlation.
//!
//! It offers:
//! - [`LogConfig`], resolved against documented defaults by [`LogConfig::resolve`].
//! - A [`Logger`] fanning every record out to independent [`Sink`]s (console, rotating file),
//!   all sharing one runtime-adjustable [`LevelController`] threshold.
//! - Request-bound loggers ([`Logger::derive_trace_logger`]) whose records carry a
//!   [`CorrelationId`] as `request_id`, looked up through a [`RequestContext`].
//! - A [`QueryLogger`] adapting a storage layer's query events to the same records.
//! - A [`TracingBridge`] layer routing `tracing` events into the same sinks.
//! - Process-wide convenience wrappers in [`global`].
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//!
//! use request_logging::{
//!     AccessSummary, LogConfig, Logger, QueryEventLogger, QueryLogger, QueryStats,
//!     RequestContext, Severity,
//! };
//! use serde_json::json;
//!
//! // Composition root: build the logger once and hand it to every component.
//! let root = Logger::from_config(&LogConfig {
//!     level: "debug".to_string(),
//!     ..LogConfig::default()
//! })?;
//! let queries = QueryLogger::new(root.clone());
//!
//! // Per request: every record logged through the context shares one `request_id`.
//! let request = RequestContext::begin(&root);
//! request.logger().info_with("room created", [("room", json!("r-1"))]);
//! queries.trace(
//!     &request,
//!     Instant::now(),
//!     &|| QueryStats {
//!         sql: "INSERT INTO rooms VALUES ('r-1')".to_string(),
//!         rows_affected: 1,
//!     },
//!     None,
//! );
//! request.finish(AccessSummary {
//!     path: "/v1/room/create".to_string(),
//!     method: "POST".to_string(),
//!     status_code: 200,
//!     ..AccessSummary::default()
//! });
//!
//! // Operators may change the threshold at any time.
//! root.set_level(Severity::Warn);
//! # Ok::<(), request_logging::LoggerError>(())
//! ```

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::indexing_slicing,
        clippy::panic
    )
)]

mod bridge;
mod config;
pub mod global;
mod level;
mod logger;
mod query;
mod record;
mod request;
mod sink;

pub use self::{
    bridge::TracingBridge,
    config::{FileConfig, LogConfig},
    level::{LevelController, ParseSeverityError, Severity},
    logger::Logger,
    query::{QueryError, QueryEventLogger, QueryLogger, QueryStats},
    record::{CallerLocation, Fields, LogRecord},
    request::{AccessSummary, CorrelationId, ParseCorrelationIdError, RequestContext, UserSummary},
    sink::{
        CONSOLE_SINK, Encoder, FILE_SINK, RecordFormat, Sink, SinkSet, SinkWriter, compose_sinks,
    },
};

mod keys {
    use std::sync::LazyLock;

    use rustc_hash::FxHashSet;

    pub(crate) const MESSAGE: &str = "message";
    pub(crate) const LEVEL: &str = "level";
    pub(crate) const CALLER: &str = "caller";
    pub(crate) const TIME: &str = "time";
    pub(crate) const HOSTNAME: &str = "hostname";
    pub(crate) const PID: &str = "pid";
    pub(crate) const STACKTRACE: &str = "stacktrace";
    pub(crate) const REQUEST_ID: &str = "request_id";
    pub(crate) const TARGET: &str = "target";

    /// Keys written by the encoder itself, which caller-supplied fields may not use.
    pub(crate) static IMPLICIT_KEYS: LazyLock<FxHashSet<&'static str>> = LazyLock::new(|| {
        [
            MESSAGE, LEVEL, CALLER, TIME, HOSTNAME, PID, STACKTRACE, REQUEST_ID,
        ]
        .iter()
        .copied()
        .collect()
    });
}

/// Errors that can occur while building a logger or writing to a sink.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// Represents an error in configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The file sink's directory could not be resolved to an absolute path.
    #[error("Failed to resolve log directory `{path}`: {source}")]
    PathResolution {
        /// The configured directory.
        path: String,

        /// The underlying error.
        source: std::io::Error,
    },

    /// Represents an error during JSON serialization.
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// Represents an error during initialization of the rolling file appender.
    #[error("Failed to initialize rolling file appender: {0}")]
    FileAppenderInitialization(#[from] tracing_appender::rolling::InitError),

    /// Represents an error writing to or flushing a sink.
    #[error("Failed to write log record: {0}")]
    Io(#[from] std::io::Error),
}
