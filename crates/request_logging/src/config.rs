//! Logging configuration and its resolution against the built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{LoggerError, Severity};

const DEFAULT_LEVEL: Severity = Severity::Info;
const DEFAULT_STACKTRACE_LEVEL: Severity = Severity::Error;
const DEFAULT_ROTATION_TIME_HOURS: u32 = 24;
const DEFAULT_ROTATION_COUNT: u32 = 7;
const DEFAULT_FILE_NAME_PREFIX: &str = "app";

/// Logging configuration, either as supplied by the operator (possibly partial) or as resolved by
/// [`LogConfig::resolve`].
///
/// Unset string fields are empty and unset numeric fields are zero. The process configuration
/// layer deserializes this from its own source; this crate never reads configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// Minimum severity emitted by every sink.
    pub level: String,

    /// Severity at or above which a stack trace is attached to records.
    #[serde(alias = "stacktraceLevel")]
    pub stack_trace_level: String,

    /// `true` for structured JSON records, `false` for human-readable text.
    pub json_format: bool,

    /// Whether records are written to standard output.
    pub console_enabled: bool,

    /// Rotating file sink configuration.
    pub file: FileConfig,
}

/// Configuration for the rotating file sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    /// Whether the file sink is enabled. A non-empty [`path`][Self::path] enables it regardless.
    pub enabled: bool,

    /// Directory where log files are written.
    pub path: String,

    /// Prefix of the log file names.
    pub name_prefix: String,

    /// Interval between file rotations, in hours.
    pub rotation_time_hours: u32,

    /// Number of rotated files retained before the oldest are pruned.
    pub rotation_count: u32,
}

impl Default for LogConfig {
    /// The "nothing supplied" configuration. Resolves to [`LogConfig::builtin`].
    fn default() -> Self {
        Self {
            level: String::new(),
            stack_trace_level: String::new(),
            json_format: true,
            console_enabled: true,
            file: FileConfig::default(),
        }
    }
}

impl LogConfig {
    /// The effective configuration used when no logging configuration is supplied.
    pub fn builtin() -> Self {
        Self {
            level: DEFAULT_LEVEL.as_str().to_owned(),
            stack_trace_level: DEFAULT_STACKTRACE_LEVEL.as_str().to_owned(),
            json_format: true,
            console_enabled: true,
            file: FileConfig {
                enabled: false,
                path: String::new(),
                name_prefix: String::new(),
                rotation_time_hours: DEFAULT_ROTATION_TIME_HOURS,
                rotation_count: DEFAULT_ROTATION_COUNT,
            },
        }
    }

    /// Merges this (possibly partial) configuration with the built-in defaults.
    ///
    /// - An empty `level` together with an empty `file.path` means no configuration was supplied,
    ///   and [`LogConfig::builtin`] is returned as is.
    /// - Otherwise every unset field takes its default. Unrecognized level names are not errors:
    ///   they fall back to `info`.
    /// - A non-empty `file.path` enables the file sink, and the path is made absolute.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::PathResolution`] if the file sink's directory cannot be made
    /// absolute.
    pub fn resolve(&self) -> Result<Self, LoggerError> {
        if self.level.is_empty() && self.file.path.is_empty() {
            return Ok(Self::builtin());
        }

        let level = resolve_level(&self.level, DEFAULT_LEVEL);
        let stack_trace_level = resolve_level(&self.stack_trace_level, DEFAULT_STACKTRACE_LEVEL);

        let mut file = FileConfig {
            enabled: self.file.enabled || !self.file.path.is_empty(),
            path: self.file.path.clone(),
            name_prefix: self.file.name_prefix.clone(),
            rotation_time_hours: positive_or(
                self.file.rotation_time_hours,
                DEFAULT_ROTATION_TIME_HOURS,
            ),
            rotation_count: positive_or(self.file.rotation_count, DEFAULT_ROTATION_COUNT),
        };

        if file.enabled {
            let directory = if file.path.is_empty() {
                "."
            } else {
                file.path.as_str()
            };
            file.path = absolute_path(directory)?.to_string_lossy().into_owned();
            if file.name_prefix.is_empty() {
                file.name_prefix = DEFAULT_FILE_NAME_PREFIX.to_owned();
            }
        }

        Ok(Self {
            level,
            stack_trace_level,
            json_format: self.json_format,
            console_enabled: self.console_enabled,
            file,
        })
    }

    /// The configured threshold, with unrecognized names read as `info`.
    pub fn severity(&self) -> Severity {
        Severity::parse_or_default(&self.level)
    }

    /// The configured stack trace threshold, with unrecognized names read as `info`.
    pub fn stack_trace_severity(&self) -> Severity {
        if self.stack_trace_level.is_empty() {
            DEFAULT_STACKTRACE_LEVEL
        } else {
            Severity::parse_or_default(&self.stack_trace_level)
        }
    }
}

fn resolve_level(raw: &str, default: Severity) -> String {
    if raw.is_empty() {
        default.as_str().to_owned()
    } else {
        Severity::parse_or_default(raw).as_str().to_owned()
    }
}

fn positive_or(value: u32, default: u32) -> u32 {
    if value == 0 { default } else { value }
}

fn absolute_path(path: &str) -> Result<PathBuf, LoggerError> {
    std::path::absolute(Path::new(path)).map_err(|source| LoggerError::PathResolution {
        path: path.to_owned(),
        source,
    })
}
