//! Key-value data captured from `tracing` spans and events.

use std::fmt;

use serde_json::Value;
use tracing::field::{Field, Visit};

use crate::{Fields, keys};

/// Holds key-value data recorded for a span or an event.
///
/// Stored in a span's extensions by [`TracingBridge`][super::TracingBridge]. The `request_id`
/// field is kept apart from the other fields since it becomes the record's correlation
/// identifier.
#[derive(Clone, Debug, Default)]
pub(crate) struct Storage {
    /// The collected key-value pairs.
    values: Fields,

    /// The primary message of an event, if captured.
    message: Option<String>,

    /// The raw `request_id` value, if recorded.
    request_id: Option<String>,
}

impl Storage {
    /// Storage for a child span: inherits the fields and request identifier, never the message.
    pub(crate) fn inherit(&self) -> Self {
        Self {
            values: self.values.clone(),
            message: None,
            request_id: self.request_id.clone(),
        }
    }

    pub(crate) fn values(&self) -> &Fields {
        &self.values
    }

    pub(crate) fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    pub(crate) fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Records a non-message field. Fields from the `log` compatibility layer are skipped and raw
    /// identifier prefixes are stripped.
    fn record_value(&mut self, name: &'static str, value: Value) {
        match name {
            keys::REQUEST_ID => self.request_id = Some(into_text(value)),
            name if name.starts_with("log.") => (),
            name => self.values.insert(name.strip_prefix("r#").unwrap_or(name), value),
        }
    }

    /// Records the message from a non-string value, unless `record_str()` already set it.
    fn record_message(&mut self, value: impl FnOnce() -> String) {
        if self.message.is_none() {
            self.message = Some(value());
        }
    }
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

// Implement `Visit` to capture span or event fields into the `Storage` map.
impl Visit for Storage {
    fn record_f64(&mut self, field: &Field, value: f64) {
        if field.name() == keys::MESSAGE {
            self.record_message(|| value.to_string());
        } else {
            self.record_value(field.name(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == keys::MESSAGE {
            self.record_message(|| value.to_string());
        } else {
            self.record_value(field.name(), Value::from(value));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == keys::MESSAGE {
            self.record_message(|| value.to_string());
        } else {
            self.record_value(field.name(), Value::from(value));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == keys::MESSAGE {
            self.record_message(|| value.to_string());
        } else {
            self.record_value(field.name(), Value::from(value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == keys::MESSAGE {
            self.message = Some(value.to_owned()); // `record_str()` is preferred for `message`
        } else {
            self.record_value(field.name(), Value::from(value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == keys::MESSAGE {
            self.record_message(|| format!("{value:?}"));
        } else {
            self.record_value(field.name(), Value::from(format!("{value:?}")));
        }
    }
}
