//! Provides a [`tracing_subscriber::Layer`] ([`TracingBridge`]) routing `tracing` events into a
//! [`Logger`]'s sinks, so that libraries logging via `tracing` share the same output, threshold and
//! request correlation as application code.

mod storage;

use tracing::{
    Event, Id, Subscriber,
    span::{Attributes, Record},
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

use self::storage::Storage;
use crate::{CallerLocation, CorrelationId, Fields, Logger, Severity, keys};

/// A [`tracing_subscriber::Layer`] turning `tracing` events into log records.
///
/// Span fields are stored in span extensions, inherited by child spans, and attached to every
/// event inside the span, with event fields taking precedence. A `request_id` field holding a
/// well-formed [`CorrelationId`] on the event or an enclosing span (see
/// [`RequestContext::span`][crate::RequestContext::span]) becomes the record's correlation
/// identifier; otherwise the identifier bound to the wrapped logger, if any, is used.
///
/// Events pass through the wrapped logger's threshold. `TRACE` events are treated as debug.
#[derive(Clone, Debug)]
pub struct TracingBridge {
    logger: Logger,
}

impl TracingBridge {
    /// Creates a bridge writing through `logger`.
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for TracingBridge
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        // Inherit storage from parent span if it exists, otherwise create a new one.
        let mut storage = match span.parent() {
            Some(parent) => {
                let extensions = parent.extensions();
                extensions.get::<Storage>().map(Storage::inherit).unwrap_or_default()
            }
            None => Storage::default(),
        };

        attrs.record(&mut storage);
        span.extensions_mut().insert(storage);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut extensions = span.extensions_mut();
        if let Some(storage) = extensions.get_mut::<Storage>() {
            values.record(storage);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let severity = Severity::from(*metadata.level());
        if !self.logger.enabled(severity) {
            return;
        }

        let span_storage = match ctx.event_span(event) {
            Some(span) => {
                let extensions = span.extensions();
                extensions.get::<Storage>().cloned().unwrap_or_default()
            }
            None => Storage::default(),
        };

        let mut event_storage = Storage::default();
        event.record(&mut event_storage);

        // Obtain the value of the `message` field if set, or the `target` from metadata otherwise.
        let message = event_storage
            .take_message()
            .unwrap_or_else(|| metadata.target().to_owned());

        let mut fields = Fields::new();
        fields.insert(keys::TARGET, metadata.target());
        for (key, value) in span_storage.values().iter().chain(event_storage.values().iter()) {
            fields.insert(key, value.clone());
        }

        let correlation_id = event_storage
            .request_id()
            .or_else(|| span_storage.request_id())
            .and_then(|raw| raw.parse::<CorrelationId>().ok())
            .or_else(|| self.logger.correlation_id().copied());

        let caller = CallerLocation::new(
            metadata.file().unwrap_or("?"),
            metadata.line().unwrap_or_default(),
        );

        self.logger
            .emit_record(severity, message, fields, caller, correlation_id);
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::{RequestContext, test_util::capture_logger};

    fn with_bridge(logger: &Logger, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(TracingBridge::new(logger.clone()));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn events_become_records() {
        let (root, capture) = capture_logger(Severity::Info);
        with_bridge(&root, || {
            tracing::debug!("below threshold");
            tracing::warn!(attempt = 2, host = "db-1", "reconnecting to {}", "primary");
        });

        let lines = capture.json_lines();
        assert_eq!(lines.len(), 1);
        let line = lines.first().unwrap();
        assert_eq!(line["message"], "reconnecting to primary");
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["attempt"], 2);
        assert_eq!(line["host"], "db-1");
        assert_eq!(line["target"], module_path!());
        assert!(line["caller"].as_str().unwrap().contains("bridge.rs:"));
    }

    #[test]
    fn events_inside_request_span_carry_request_id() {
        let (root, capture) = capture_logger(Severity::Debug);
        let request = RequestContext::begin(&root);

        with_bridge(&root, || {
            let _request = request.span().entered();
            let inner = tracing::debug_span!("query", table = "rooms");
            let _inner = inner.entered();
            tracing::info!(rows = 3u64, "fetched");
        });
        with_bridge(&root, || tracing::info!("outside"));

        let lines = capture.json_lines();
        assert_eq!(lines.len(), 2);
        let inside = lines.first().unwrap();
        assert_eq!(inside["request_id"], request.request_id().unwrap().to_string());
        assert_eq!(inside["table"], "rooms");
        assert_eq!(inside["rows"], 3);
        assert!(lines.last().unwrap().get("request_id").is_none());
    }

    #[test]
    fn event_fields_override_span_fields() {
        let (root, capture) = capture_logger(Severity::Info);
        with_bridge(&root, || {
            let span = tracing::info_span!("job", stage = "load");
            let _entered = span.entered();
            tracing::info!(stage = "commit", "stage changed");
        });

        let lines = capture.json_lines();
        assert_eq!(lines.first().unwrap()["stage"], "commit");
    }

    #[test]
    fn fields_recorded_after_span_creation_are_attached() {
        let (root, capture) = capture_logger(Severity::Info);
        with_bridge(&root, || {
            let span = tracing::info_span!("handler", status = tracing::field::Empty);
            let _entered = span.enter();
            span.record("status", 404u64);
            tracing::info!("responded");
        });

        let lines = capture.json_lines();
        assert_eq!(lines.first().unwrap()["status"], 404);
    }

    #[test]
    fn bound_logger_correlates_events_without_span() {
        let (root, capture) = capture_logger(Severity::Info);
        let trace = root.derive_trace_logger();
        with_bridge(&trace, || tracing::error!("boom"));

        let lines = capture.json_lines();
        assert_eq!(
            lines.first().unwrap()["request_id"],
            trace.correlation_id().unwrap().to_string()
        );
    }

    #[test]
    fn malformed_request_id_is_ignored() {
        let (root, capture) = capture_logger(Severity::Info);
        with_bridge(&root, || tracing::info!(request_id = "upstream-42", "forwarded"));

        let lines = capture.json_lines();
        let line = lines.first().unwrap();
        assert!(line.get("request_id").is_none());
        assert_eq!(line["message"], "forwarded");
    }
}
