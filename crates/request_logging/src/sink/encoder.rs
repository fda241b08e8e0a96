//! Serializes [`LogRecord`]s into JSON or human-readable text lines.

use std::io::Write;

use serde::ser::{SerializeMap, Serializer};
use time::format_description::well_known::Iso8601;

use crate::{LogRecord, LoggerError, keys};

/// Output format of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Compact, single-line JSON objects.
    Json,

    /// Tab-separated human-readable lines, with structured fields as a trailing JSON object.
    Text,
}

impl RecordFormat {
    /// Chooses the format from the `jsonFormat` configuration flag.
    pub fn from_json_flag(json_format: bool) -> Self {
        if json_format { Self::Json } else { Self::Text }
    }
}

/// Turns records into bytes in one [`RecordFormat`].
///
/// JSON records carry the implicit keys (`message`, `hostname`, `pid`, `level`, `caller`,
/// `time`), followed by `request_id` when the record is request-bound, the caller's fields, and
/// finally `stacktrace` when one was captured.
#[derive(Debug, Clone)]
pub struct Encoder {
    format: RecordFormat,
    pid: u32,
    hostname: String,
}

impl Encoder {
    /// Creates an encoder for the specified format.
    pub fn new(format: RecordFormat) -> Self {
        Self {
            format,
            pid: std::process::id(),
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }

    /// The format this encoder produces.
    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Serializes a record, without a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError`] if serialization of a field value fails.
    pub fn encode(&self, record: &LogRecord) -> Result<Vec<u8>, LoggerError> {
        match self.format {
            RecordFormat::Json => self.encode_json(record),
            RecordFormat::Text => Self::encode_text(record),
        }
    }

    fn encode_json(&self, record: &LogRecord) -> Result<Vec<u8>, LoggerError> {
        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::new(&mut buffer);
        let mut map_serializer = serializer.serialize_map(None)?;

        map_serializer.serialize_entry(keys::MESSAGE, record.message())?;
        map_serializer.serialize_entry(keys::HOSTNAME, &self.hostname)?;
        map_serializer.serialize_entry(keys::PID, &self.pid)?;
        map_serializer.serialize_entry(keys::LEVEL, record.severity().as_upper_str())?;
        map_serializer.serialize_entry(keys::CALLER, &format_args!("{}", record.caller()))?;
        if let Ok(time) = record.timestamp().format(&Iso8601::DEFAULT) {
            map_serializer.serialize_entry(keys::TIME, &time)?;
        }

        serialize_context_fields(&mut map_serializer, record)?;

        if let Some(stacktrace) = record.stacktrace() {
            map_serializer.serialize_entry(keys::STACKTRACE, stacktrace)?;
        }

        map_serializer.end()?;
        Ok(buffer)
    }

    /// Example: `2024-05-01T10:00:00.000000000Z	INFO	src/main.rs:10	started	{"port":8080}`
    fn encode_text(record: &LogRecord) -> Result<Vec<u8>, LoggerError> {
        let mut buffer = Vec::new();
        let time = record
            .timestamp()
            .format(&Iso8601::DEFAULT)
            .unwrap_or_default();

        write!(
            buffer,
            "{time}\t{}\t{}\t",
            record.severity().as_upper_str(),
            record.caller(),
        )?;
        write_escaped(&mut buffer, record.message())?;

        if record.correlation_id().is_some() || !record.fields().is_empty() {
            buffer.write_all(b"\t")?;
            let mut serializer = serde_json::Serializer::new(&mut buffer);
            let mut map_serializer = serializer.serialize_map(None)?;
            serialize_context_fields(&mut map_serializer, record)?;
            map_serializer.end()?;
        }

        if let Some(stacktrace) = record.stacktrace() {
            write!(buffer, "\n{}", stacktrace.trim_end())?;
        }

        Ok(buffer)
    }
}

/// Writes `text` with control characters escaped, so it cannot break the line or its columns.
fn write_escaped(buffer: &mut Vec<u8>, text: &str) -> std::io::Result<()> {
    for c in text.chars() {
        if c.is_control() {
            write!(buffer, "{}", c.escape_default())?;
        } else {
            let mut encoded = [0; 4];
            buffer.write_all(c.encode_utf8(&mut encoded).as_bytes())?;
        }
    }
    Ok(())
}

/// Serializes the correlation identifier and the caller-supplied fields.
fn serialize_context_fields(
    map_serializer: &mut impl SerializeMap<Error = serde_json::Error>,
    record: &LogRecord,
) -> Result<(), LoggerError> {
    if let Some(correlation_id) = record.correlation_id() {
        map_serializer.serialize_entry(keys::REQUEST_ID, &format_args!("{correlation_id}"))?;
    }

    for (key, value) in record.fields().iter() {
        map_serializer.serialize_entry(key, value)?;
    }

    Ok(())
}
