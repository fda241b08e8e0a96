//! Severities and the shared, runtime-adjustable severity threshold.

use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

/// Ordered classification of log records: `Debug < Info < Warn < Error < Fatal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Diagnostic detail, disabled in most deployments.
    Debug,

    /// Normal operational events.
    #[default]
    Info,

    /// Recoverable but suspicious conditions.
    Warn,

    /// Failed operations requiring attention.
    Error,

    /// Unrecoverable conditions; logging at this severity terminates the process.
    Fatal,
}

/// Returned by [`Severity::from_str`] when the input names no known severity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized severity `{0}`")]
pub struct ParseSeverityError(String);

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// Parses a severity name, falling back to [`Severity::Info`] for anything unrecognized.
    ///
    /// Malformed configuration must never stop the process from starting, so this is the parse
    /// used when resolving configuration.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// The lower-case name, as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// The upper-case name, as written in the `level` key of emitted records.
    pub fn as_upper_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    fn to_repr(self) -> u8 {
        match self {
            Self::Debug => 0,
            Self::Info => 1,
            Self::Warn => 2,
            Self::Error => 3,
            Self::Fatal => 4,
        }
    }

    fn from_repr(repr: u8) -> Self {
        match repr {
            0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Warn,
            3 => Self::Error,
            _ => Self::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseSeverityError(s.to_owned()))
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// Holds the single severity threshold shared by every sink of a logger.
///
/// Cloning yields another handle to the same threshold, so a change made through any handle is
/// visible to every sink on its next write. Reads and writes are single atomic operations: no
/// reader can observe a torn value, and the last writer wins.
#[derive(Clone)]
pub struct LevelController {
    threshold: Arc<AtomicU8>,
}

impl LevelController {
    /// Creates a controller with the specified initial threshold.
    pub fn new(initial: Severity) -> Self {
        Self {
            threshold: Arc::new(AtomicU8::new(initial.to_repr())),
        }
    }

    /// Sets the threshold. Takes effect for every subsequent call on every sink.
    pub fn set_level(&self, severity: Severity) {
        self.threshold.store(severity.to_repr(), Ordering::Relaxed);
    }

    /// Returns the current threshold.
    pub fn current_level(&self) -> Severity {
        Severity::from_repr(self.threshold.load(Ordering::Relaxed))
    }

    /// Whether a record of the specified severity passes the current threshold.
    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.current_level()
    }
}

impl Default for LevelController {
    fn default() -> Self {
        Self::new(Severity::default())
    }
}

impl fmt::Debug for LevelController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelController")
            .field("threshold", &self.current_level())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn severities_are_totally_ordered() {
        for window in Severity::ALL.windows(2) {
            if let [lower, higher] = window {
                assert!(lower < higher);
            }
        }
    }

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!("WARN".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!(" fatal ".parse::<Severity>(), Ok(Severity::Fatal));
        assert!("verbose".parse::<Severity>().is_err());
        assert_eq!(Severity::parse_or_default("bogus"), Severity::Info);
        assert_eq!(Severity::parse_or_default(""), Severity::Info);
    }

    #[test]
    fn maps_tracing_levels() {
        assert_eq!(Severity::from(tracing::Level::TRACE), Severity::Debug);
        assert_eq!(Severity::from(tracing::Level::ERROR), Severity::Error);
    }

    #[test]
    fn threshold_admits_only_equal_or_higher_severities() {
        let controller = LevelController::default();
        for threshold in Severity::ALL {
            controller.set_level(threshold);
            for severity in Severity::ALL {
                assert_eq!(controller.enabled(severity), severity >= threshold);
            }
        }
    }

    #[test]
    fn clones_share_one_threshold() {
        let controller = LevelController::new(Severity::Error);
        let handle = controller.clone();
        handle.set_level(Severity::Debug);
        assert_eq!(controller.current_level(), Severity::Debug);
    }

    #[test]
    fn concurrent_reads_never_observe_unknown_values() {
        let controller = LevelController::new(Severity::Debug);
        let writer = {
            let controller = controller.clone();
            thread::spawn(move || {
                for round in 0..1_000 {
                    for severity in Severity::ALL {
                        controller.set_level(severity);
                    }
                    if round % 100 == 0 {
                        thread::yield_now();
                    }
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let controller = controller.clone();
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        assert!(Severity::ALL.contains(&controller.current_level()));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(controller.current_level(), Severity::Fatal);
    }
}
