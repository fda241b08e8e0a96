//! Adapter turning a storage layer's query lifecycle events into log records.

use std::{
    fmt,
    time::{Duration, Instant},
};

use serde_json::Value;

use crate::{Logger, RequestContext, Severity};

const SQL: &str = "sql";
const DURATION: &str = "duration";
const ROWS_AFFECTED: &str = "rowsAffected";
const ERROR: &str = "error";
const SUCCESS_MESSAGE: &str = "success";

/// What a finished query reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// The executed statement, with parameters interpolated.
    pub sql: String,

    /// Number of rows affected, or `-1` when the driver does not report it.
    pub rows_affected: i64,
}

/// Errors reported by the storage layer for a query.
pub trait QueryError: fmt::Display {
    /// Whether this is the storage layer's "record not found" outcome.
    ///
    /// Looking up an optional entity regularly produces this, so it is logged at debug severity
    /// rather than as an error.
    fn is_record_not_found(&self) -> bool;
}

/// The logging interface the storage layer calls into.
///
/// Every method receives the [`RequestContext`] of the request the query runs for, so a
/// long-lived implementation can resolve the request-bound logger on each call.
pub trait QueryEventLogger: Send + Sync {
    /// An informational message from the storage layer.
    fn info(&self, ctx: &RequestContext, args: fmt::Arguments<'_>);

    /// A warning from the storage layer.
    fn warn(&self, ctx: &RequestContext, args: fmt::Arguments<'_>);

    /// An error message from the storage layer.
    fn error(&self, ctx: &RequestContext, args: fmt::Arguments<'_>);

    /// A finished query.
    ///
    /// `query` is only invoked when the resulting record would be emitted.
    fn trace(
        &self,
        ctx: &RequestContext,
        begin: Instant,
        query: &dyn Fn() -> QueryStats,
        err: Option<&dyn QueryError>,
    );
}

/// [`QueryEventLogger`] writing through the request-bound logger, or through `fallback` for
/// queries issued outside a request.
#[derive(Debug, Clone)]
pub struct QueryLogger {
    fallback: Logger,
}

impl QueryLogger {
    /// Creates the adapter. `fallback` is used for queries without a request-bound logger.
    pub fn new(fallback: Logger) -> Self {
        Self { fallback }
    }

    fn logger<'a>(&'a self, ctx: &'a RequestContext) -> &'a Logger {
        ctx.logger_or(&self.fallback)
    }
}

impl QueryEventLogger for QueryLogger {
    fn info(&self, ctx: &RequestContext, args: fmt::Arguments<'_>) {
        self.logger(ctx).info_fmt(args);
    }

    fn warn(&self, ctx: &RequestContext, args: fmt::Arguments<'_>) {
        self.logger(ctx).warn_fmt(args);
    }

    fn error(&self, ctx: &RequestContext, args: fmt::Arguments<'_>) {
        self.logger(ctx).error_fmt(args);
    }

    fn trace(
        &self,
        ctx: &RequestContext,
        begin: Instant,
        query: &dyn Fn() -> QueryStats,
        err: Option<&dyn QueryError>,
    ) {
        let elapsed = begin.elapsed();
        let logger = self.logger(ctx);

        match err {
            Some(err) if !err.is_record_not_found() => {
                if logger.enabled(Severity::Error) {
                    let mut fields = query_fields(query(), elapsed);
                    fields.push((ERROR, Value::from(err.to_string())));
                    logger.error_with(err, fields);
                }
            }
            // Record not found is an expected outcome, logged like a successful query.
            Some(_) | None => {
                if logger.enabled(Severity::Debug) {
                    logger.debug_with(SUCCESS_MESSAGE, query_fields(query(), elapsed));
                }
            }
        }
    }
}

fn query_fields(stats: QueryStats, elapsed: Duration) -> Vec<(&'static str, Value)> {
    vec![
        (SQL, Value::from(stats.sql)),
        (DURATION, Value::from(format!("{elapsed:?}"))),
        (ROWS_AFFECTED, Value::from(stats.rows_affected)),
    ]
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::test_util::capture_logger;

    #[derive(Debug)]
    enum StoreError {
        RecordNotFound,
        DuplicateKey(&'static str),
    }

    impl fmt::Display for StoreError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::RecordNotFound => f.write_str("record not found"),
                Self::DuplicateKey(key) => write!(f, "duplicate entry for key `{key}`"),
            }
        }
    }

    impl QueryError for StoreError {
        fn is_record_not_found(&self) -> bool {
            matches!(self, Self::RecordNotFound)
        }
    }

    fn stats() -> QueryStats {
        QueryStats {
            sql: "SELECT * FROM rooms WHERE uuid = 'r-1'".to_owned(),
            rows_affected: 0,
        }
    }

    #[test]
    fn record_not_found_is_logged_at_debug() {
        let (root, capture) = capture_logger(Severity::Debug);
        let adapter = QueryLogger::new(root.clone());
        let ctx = RequestContext::begin(&root);

        adapter.trace(&ctx, Instant::now(), &stats, Some(&StoreError::RecordNotFound));

        let lines = capture.json_lines();
        assert_eq!(lines.len(), 1);
        let line = lines.first().unwrap();
        assert_eq!(line["level"], "DEBUG");
        assert_eq!(line["message"], "success");
        assert!(line.get("error").is_none());
        assert_eq!(line["sql"], stats().sql);
        assert_eq!(line["rowsAffected"], 0);
        assert!(line["duration"].is_string());
        assert_eq!(line["request_id"], ctx.request_id().unwrap().to_string());
    }

    #[test]
    fn other_errors_are_logged_at_error_with_query_context() {
        let (root, capture) = capture_logger(Severity::Debug);
        let adapter = QueryLogger::new(root.clone());
        let ctx = RequestContext::begin(&root);
        let err = StoreError::DuplicateKey("rooms.uuid");

        adapter.trace(&ctx, Instant::now(), &stats, Some(&err));

        let lines = capture.json_lines();
        let line = lines.first().unwrap();
        assert_eq!(line["level"], "ERROR");
        assert_eq!(line["message"], "duplicate entry for key `rooms.uuid`");
        assert_eq!(line["error"], "duplicate entry for key `rooms.uuid`");
        assert_eq!(line["sql"], stats().sql);
        assert_eq!(line["rowsAffected"], 0);
        assert!(line["duration"].is_string());
    }

    #[test]
    fn successful_queries_are_logged_at_debug() {
        let (root, capture) = capture_logger(Severity::Debug);
        let adapter = QueryLogger::new(root);

        adapter.trace(
            &RequestContext::detached(),
            Instant::now(),
            &|| QueryStats {
                sql: "UPDATE rooms SET title = 'x'".to_owned(),
                rows_affected: 1,
            },
            None,
        );

        let lines = capture.json_lines();
        let line = lines.first().unwrap();
        assert_eq!(line["level"], "DEBUG");
        assert_eq!(line["message"], "success");
        assert_eq!(line["rowsAffected"], 1);
        assert!(line.get("request_id").is_none());
    }

    #[test]
    fn query_is_not_rendered_when_record_would_be_dropped() {
        let (root, capture) = capture_logger(Severity::Info);
        let adapter = QueryLogger::new(root);
        let calls = Cell::new(0);
        let query = || {
            calls.set(calls.get() + 1);
            stats()
        };

        adapter.trace(&RequestContext::detached(), Instant::now(), &query, None);
        adapter.trace(
            &RequestContext::detached(),
            Instant::now(),
            &query,
            Some(&StoreError::RecordNotFound),
        );
        assert_eq!(calls.get(), 0);
        assert!(capture.lines().is_empty());

        adapter.trace(
            &RequestContext::detached(),
            Instant::now(),
            &query,
            Some(&StoreError::DuplicateKey("k")),
        );
        assert_eq!(calls.get(), 1);
        assert_eq!(capture.lines().len(), 1);
    }

    #[test]
    fn adapter_resolves_logger_per_call() {
        let (root, capture) = capture_logger(Severity::Info);
        let adapter = QueryLogger::new(root.clone());
        let first = RequestContext::begin(&root);
        let second = RequestContext::begin(&root);

        adapter.info(&first, format_args!("migrating {}", "rooms"));
        adapter.warn(&second, format_args!("slow pool"));
        adapter.error(&RequestContext::detached(), format_args!("reconnecting"));

        let lines = capture.json_lines();
        let ids: Vec<_> = lines.iter().map(|line| line.get("request_id").cloned()).collect();
        assert_eq!(
            ids,
            [
                Some(Value::from(first.request_id().unwrap().to_string())),
                Some(Value::from(second.request_id().unwrap().to_string())),
                None
            ]
        );
        assert_eq!(lines.first().unwrap()["message"], "migrating rooms");
    }
}
