//! Per-request correlation: identifiers, the request-scoped logger lookup, and the access record
//! emitted when a request completes.

use std::{fmt, str::FromStr, time::Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::Logger;

const ACCESS_MESSAGE: &str = "router info";
const PAYLOAD: &str = "payload";

/// Identifier shared by every record logged while handling one request.
///
/// Rendered as 32 lower-case hexadecimal characters without separators.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

/// Returned when parsing a string that is not 32 lower-case hexadecimal characters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid correlation identifier `{0}`")]
pub struct ParseCorrelationIdError(String);

impl CorrelationId {
    /// Mints a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({self})")
    }
}

impl FromStr for CorrelationId {
    type Err = ParseCorrelationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed =
            s.len() == 32 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(ParseCorrelationIdError(s.to_owned()));
        }

        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ParseCorrelationIdError(s.to_owned()))
    }
}

/// Values scoped to one inbound request that the logging subsystem reads.
///
/// Created once when the request begins (typically by request middleware), threaded through the
/// request's handlers and storage calls, and dropped when the request ends. A detached context
/// (for work outside any request) resolves to the fallback logger instead.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    trace_logger: Option<Logger>,
    started_at: Option<Instant>,
}

impl RequestContext {
    /// Starts a request: mints its correlation identifier and binds a logger to it.
    pub fn begin(root: &Logger) -> Self {
        Self {
            trace_logger: Some(root.derive_trace_logger()),
            started_at: Some(Instant::now()),
        }
    }

    /// A context outside any request.
    pub fn detached() -> Self {
        Self::default()
    }

    /// The logger bound to this request, if any.
    pub fn trace_logger(&self) -> Option<&Logger> {
        self.trace_logger.as_ref()
    }

    /// The request's correlation identifier, if any.
    pub fn request_id(&self) -> Option<&CorrelationId> {
        self.trace_logger.as_ref().and_then(Logger::correlation_id)
    }

    /// The request-bound logger, or `fallback` outside a request.
    pub fn logger_or<'a>(&'a self, fallback: &'a Logger) -> &'a Logger {
        self.trace_logger.as_ref().unwrap_or(fallback)
    }

    /// The request-bound logger, or the process-wide logger outside a request.
    pub fn logger(&self) -> &Logger {
        self.logger_or(crate::global::logger())
    }

    /// A `tracing` span carrying the request's `request_id`.
    ///
    /// Events emitted via `tracing` inside this span are correlated with the request when the
    /// [`TracingBridge`][crate::TracingBridge] layer is installed.
    pub fn span(&self) -> tracing::Span {
        match self.request_id() {
            Some(request_id) => tracing::info_span!("request", request_id = %request_id),
            None => tracing::Span::none(),
        }
    }

    /// Logs the access record for a completed request.
    ///
    /// The record is logged at info severity with message `router info` and a `payload` field of
    /// the form `{"<path>": {"duration_ms": .., "method": .., "status_code": .., "body_size": ..,
    /// "user": {..}}}`.
    #[track_caller]
    pub fn finish(&self, summary: AccessSummary) {
        let duration_ms = self
            .started_at
            .map(|started_at| u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        let route = RoutePayload {
            duration_ms,
            method: &summary.method,
            status_code: summary.status_code,
            body_size: summary.body_size,
            user: summary.user.as_ref(),
        };

        let mut payload = Map::new();
        payload.insert(
            summary.path,
            serde_json::to_value(&route).unwrap_or_default(),
        );

        self.logger()
            .info_with(ACCESS_MESSAGE, [(PAYLOAD, Value::Object(payload))]);
    }
}

/// Outcome of a completed request, as reported by the request middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSummary {
    /// Request path.
    pub path: String,

    /// HTTP method.
    pub method: String,

    /// Response status code.
    pub status_code: u16,

    /// Response body size in bytes.
    pub body_size: u64,

    /// The authenticated user, if any.
    pub user: Option<UserSummary>,
}

/// Authenticated user details attached to an access record. Empty members are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    /// User identifier.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_id: String,

    /// How the user logged in.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub login_source: String,

    /// Token issue time, in seconds since the Unix epoch.
    #[serde(skip_serializing_if = "is_zero")]
    pub iat: i64,

    /// Token expiry time, in seconds since the Unix epoch.
    #[serde(skip_serializing_if = "is_zero")]
    pub exp: i64,
}

#[derive(Serialize)]
struct RoutePayload<'a> {
    duration_ms: u64,
    method: &'a str,
    status_code: u16,
    body_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a UserSummary>,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // Signature required by `skip_serializing_if`
fn is_zero(value: &i64) -> bool {
    *value == 0
}
