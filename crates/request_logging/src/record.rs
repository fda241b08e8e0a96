//! The immutable record handed to every sink.

use std::{fmt, panic::Location};

use serde_json::Value;
use time::UtcDateTime;

use crate::{CorrelationId, Severity};

/// Source location a record was logged from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerLocation {
    file: &'static str,
    line: u32,
}

impl CallerLocation {
    /// Creates a location from a file path and line number.
    pub fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The location of the caller of the outermost `#[track_caller]` function on the stack.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::new(location.file(), location.line())
    }

    /// Path of the source file.
    pub fn file(&self) -> &'static str {
        self.file
    }

    /// Line number within the source file.
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl fmt::Display for CallerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Key-value data attached to a record, in insertion order.
///
/// Keys reserved for the implicit record keys (`message`, `level`, `time`, ...) are rejected.
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(&'static str, Value)>,
}

impl Fields {
    /// Creates an empty set of fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, replacing the value of an existing field with the same key.
    ///
    /// If the `key` is one of the implicit record keys, a warning is
    /// logged, and the value is not inserted.
    pub fn insert(&mut self, key: &'static str, value: impl Into<Value>) {
        let value = value.into();
        if crate::keys::IMPLICIT_KEYS.contains(key) {
            tracing::warn!(
                "Attempting to record a reserved key `{key}` (value: {value:?}). Skipping."
            );
            return;
        }

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Returns the value of a field, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, value)| value)
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|(key, value)| (*key, value))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Into<Value>> Extend<(&'static str, V)> for Fields {
    fn extend<I: IntoIterator<Item = (&'static str, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<V: Into<Value>> FromIterator<(&'static str, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (&'static str, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        fields.extend(iter);
        fields
    }
}

impl IntoIterator for Fields {
    type Item = (&'static str, Value);
    type IntoIter = std::vec::IntoIter<(&'static str, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// One log entry. Built once per log call and passed, unmodified, to every sink.
#[derive(Debug, Clone)]
pub struct LogRecord {
    timestamp: UtcDateTime,
    severity: Severity,
    message: String,
    fields: Fields,
    caller: CallerLocation,
    correlation_id: Option<CorrelationId>,
    stacktrace: Option<String>,
}

impl LogRecord {
    pub(crate) fn new(
        severity: Severity,
        message: String,
        fields: Fields,
        caller: CallerLocation,
        correlation_id: Option<CorrelationId>,
    ) -> Self {
        Self {
            timestamp: UtcDateTime::now(),
            severity,
            message,
            fields,
            caller,
            correlation_id,
            stacktrace: None,
        }
    }

    pub(crate) fn with_stacktrace(mut self, stacktrace: String) -> Self {
        self.stacktrace = Some(stacktrace);
        self
    }

    /// When the record was created.
    pub fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    /// Severity of the record.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The formatted message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured fields supplied by the caller.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Where the record was logged from.
    pub fn caller(&self) -> CallerLocation {
        self.caller
    }

    /// The request the record belongs to, if it was logged through a request-bound logger.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Stack trace captured when the record was created, if its severity called for one.
    pub fn stacktrace(&self) -> Option<&str> {
        self.stacktrace.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn fields_keep_insertion_order_and_replace_duplicates() {
        let mut fields: Fields = [("sql", json!("SELECT 1")), ("rows", json!(1))]
            .into_iter()
            .collect();
        fields.insert("duration", "2ms");
        fields.insert("rows", 3);

        let keys: Vec<_> = fields.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["sql", "rows", "duration"]);
        assert_eq!(fields.get("rows"), Some(&json!(3)));
    }

    #[test]
    fn reserved_keys_are_rejected() {
        let mut fields = Fields::new();
        fields.insert("message", "spoofed");
        fields.insert("request_id", "spoofed");
        fields.insert("user", "alice");
        assert_eq!(fields.len(), 1);
        assert!(fields.get("message").is_none());
    }

    #[test]
    fn caller_points_at_call_site() {
        let expected_line = line!() + 1;
        let caller = CallerLocation::caller();
        assert_eq!(caller.line(), expected_line);
        assert!(caller.file().ends_with("record.rs"));
        assert_eq!(caller.to_string(), format!("{}:{expected_line}", caller.file()));
    }
}
