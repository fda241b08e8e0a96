//! Output sinks and their composition from a [`LogConfig`].

mod encoder;

use std::{fmt, io::Write};

use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::fmt::MakeWriter;

pub use self::encoder::{Encoder, RecordFormat};
use crate::{LevelController, LogConfig, LogRecord, LoggerError, Severity};

/// Name of the sink writing to standard output.
pub const CONSOLE_SINK: &str = "console";

/// Name of the sink writing to rotating files.
pub const FILE_SINK: &str = "file";

const LOG_FILE_SUFFIX: &str = "log";

/// Destination for encoded record lines.
///
/// Implemented for every [`MakeWriter`], so standard output, [`RollingFileAppender`],
/// [`tracing_appender::non_blocking::NonBlocking`] and custom writers can all back a sink.
pub trait SinkWriter: Send + Sync {
    /// Writes one complete line.
    ///
    /// Implementations must write the line in a single operation so that lines from concurrent
    /// callers never interleave.
    fn write_line(&self, line: &[u8]) -> std::io::Result<()>;

    /// Flushes buffered output.
    fn flush(&self) -> std::io::Result<()>;
}

impl<W> SinkWriter for W
where
    W: for<'a> MakeWriter<'a> + Send + Sync,
{
    fn write_line(&self, line: &[u8]) -> std::io::Result<()> {
        self.make_writer().write_all(line)
    }

    fn flush(&self) -> std::io::Result<()> {
        Write::flush(&mut self.make_writer())
    }
}

/// An independent output destination: one encoder, one writer, and a handle to the shared
/// severity threshold.
///
/// The threshold is read from the [`LevelController`] on every write rather than copied, so a
/// level change reaches every sink without rebuilding it.
pub struct Sink {
    name: &'static str,
    encoder: Encoder,
    writer: Box<dyn SinkWriter>,
    level: LevelController,
}

impl Sink {
    /// Creates a sink. `level` should be the controller shared by the other sinks of the logger.
    pub fn new(
        name: &'static str,
        encoder: Encoder,
        writer: impl SinkWriter + 'static,
        level: LevelController,
    ) -> Self {
        Self {
            name,
            encoder,
            writer: Box::new(writer),
            level,
        }
    }

    /// Name of the sink.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a record of the specified severity would currently be written.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.level.enabled(severity)
    }

    /// Encodes and writes a record if its severity passes the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError`] if encoding or writing fails. Loggers discard these errors.
    pub fn try_write(&self, record: &LogRecord) -> Result<(), LoggerError> {
        if !self.enabled(record.severity()) {
            return Ok(());
        }

        let mut buffer = self.encoder.encode(record)?;
        buffer.push(b'\n');
        self.writer.write_line(&buffer)?;
        Ok(())
    }

    /// Flushes the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::Io`] if flushing fails.
    pub fn flush(&self) -> Result<(), LoggerError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("name", &self.name)
            .field("format", &self.encoder.format())
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// The sinks built from a configuration, along with the worker guards of their background
/// writers.
///
/// Lines are written as long as the guards are alive; dropping a guard flushes its pending
/// lines.
pub struct SinkSet {
    /// Sinks in fan-out order: console first, then file.
    pub sinks: Vec<Sink>,

    /// Worker guards for the console and file writers.
    pub guards: Vec<WorkerGuard>,
}

impl fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSet")
            .field("sinks", &self.sinks)
            .field("guards", &self.guards.len())
            .finish()
    }
}

/// Builds the sinks described by a resolved configuration.
///
/// A console sink is included when `console_enabled` is set and a rotating file sink when
/// `file.enabled` is set. Every sink shares `level` and encodes in the format selected by
/// `json_format`. Both writers are non-blocking: a saturated writer drops lines instead of
/// stalling the caller.
///
/// # Errors
///
/// Returns [`LoggerError::FileAppenderInitialization`] if the log directory cannot be created or
/// opened.
pub fn compose_sinks(config: &LogConfig, level: &LevelController) -> Result<SinkSet, LoggerError> {
    let encoder = Encoder::new(RecordFormat::from_json_flag(config.json_format));
    let mut sinks = Vec::new();
    let mut guards = Vec::new();

    if config.console_enabled {
        let (sink, guard) = console_sink(encoder.clone(), level);
        sinks.push(sink);
        guards.push(guard);
    }

    if config.file.enabled {
        let file_appender = RollingFileAppender::builder()
            .rotation(rotation(config.file.rotation_time_hours))
            .filename_prefix(config.file.name_prefix.as_str())
            .filename_suffix(LOG_FILE_SUFFIX)
            .max_log_files(usize::try_from(config.file.rotation_count).unwrap_or(usize::MAX))
            .build(&config.file.path)?;
        let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
        guards.push(guard);
        sinks.push(Sink::new(FILE_SINK, encoder, non_blocking_appender, level.clone()));
    }

    Ok(SinkSet { sinks, guards })
}

/// Builds a non-blocking standard output sink.
pub(crate) fn console_sink(encoder: Encoder, level: &LevelController) -> (Sink, WorkerGuard) {
    let (non_blocking_stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    let sink = Sink::new(CONSOLE_SINK, encoder, non_blocking_stdout, level.clone());
    (sink, guard)
}

/// The appender rotates on hour or day boundaries only; intervals of a day or longer rotate daily.
fn rotation(rotation_time_hours: u32) -> Rotation {
    if rotation_time_hours >= 24 {
        Rotation::DAILY
    } else {
        Rotation::HOURLY
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        CallerLocation, Fields, FileConfig,
        test_util::{CaptureWriter, FailingWriter},
    };

    fn record(severity: Severity, message: &str) -> LogRecord {
        LogRecord::new(
            severity,
            message.to_owned(),
            Fields::new(),
            CallerLocation::caller(),
            None,
        )
    }

    #[test]
    fn sink_reads_threshold_on_every_write() {
        let level = LevelController::new(Severity::Warn);
        let capture = CaptureWriter::default();
        let sink = Sink::new(
            "capture",
            Encoder::new(RecordFormat::Json),
            capture.clone(),
            level.clone(),
        );

        sink.try_write(&record(Severity::Info, "dropped")).unwrap();
        level.set_level(Severity::Debug);
        sink.try_write(&record(Severity::Info, "kept")).unwrap();

        let lines = capture.json_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.first().unwrap()["message"], "kept");
    }

    #[test]
    fn failing_writer_reports_error() {
        let sink = Sink::new(
            "broken",
            Encoder::new(RecordFormat::Text),
            FailingWriter,
            LevelController::default(),
        );
        let result = sink.try_write(&record(Severity::Error, "lost"));
        assert!(matches!(result, Err(LoggerError::Io(_))));
    }

    #[test]
    fn composes_console_only_by_default() {
        let level = LevelController::default();
        let set = compose_sinks(&LogConfig::builtin(), &level).unwrap();
        let names: Vec<_> = set.sinks.iter().map(Sink::name).collect();
        assert_eq!(names, [CONSOLE_SINK]);
        assert_eq!(set.guards.len(), 1);
    }

    #[test]
    fn composes_no_sinks_when_everything_is_disabled() {
        let config = LogConfig {
            console_enabled: false,
            ..LogConfig::builtin()
        };
        let set = compose_sinks(&config, &LevelController::default()).unwrap();
        assert!(set.sinks.is_empty());
        assert!(set.guards.is_empty());
    }

    #[test]
    fn file_sink_writes_into_configured_directory() {
        let directory = tempfile::tempdir().unwrap();
        let config = LogConfig {
            console_enabled: false,
            json_format: false,
            file: FileConfig {
                enabled: true,
                path: directory.path().to_string_lossy().into_owned(),
                name_prefix: "server".to_owned(),
                rotation_time_hours: 24,
                rotation_count: 7,
            },
            ..LogConfig::builtin()
        };
        let level = LevelController::default();
        let SinkSet { sinks, guards } = compose_sinks(&config, &level).unwrap();
        let names: Vec<_> = sinks.iter().map(Sink::name).collect();
        assert_eq!(names, [FILE_SINK]);

        for sink in &sinks {
            sink.try_write(&record(Severity::Info, "persisted")).unwrap();
        }
        drop(guards);

        let entries: Vec<_> = fs::read_dir(directory.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let path = entries.first().unwrap();
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("server"));
        assert!(file_name.ends_with(".log"));
        assert!(fs::read_to_string(path).unwrap().contains("\tINFO\t"));
    }

    #[test]
    fn rotation_follows_configured_hours() {
        assert_eq!(rotation(24), Rotation::DAILY);
        assert_eq!(rotation(48), Rotation::DAILY);
        assert_eq!(rotation(1), Rotation::HOURLY);
        assert_eq!(rotation(12), Rotation::HOURLY);
    }
}
