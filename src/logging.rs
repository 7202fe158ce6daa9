//! Diagnostic logging for the buffer backends.
//!
//! Library code logs through the `log_*!` macros below, which forward to the
//! `log` facade under the `drmbuf` target. The library never installs a
//! logger; binaries call [`log_init`] to get a plain stderr sink.

use std::io::Write;

/// Log levels, ordered from quietest to noisiest.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Nothing = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
    All = 5,
}

impl LogLevel {
    /// Create a LogLevel from an integer (verbosity count)
    pub fn from_i32(level: i32) -> Self {
        match level {
            i32::MIN..=0 => LogLevel::Nothing,
            1 => LogLevel::Error,
            2 => LogLevel::Warning,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::All,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// The `log` crate filter corresponding to this level.
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Nothing => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::All => log::LevelFilter::Trace,
        }
    }
}

/// Target used by every message emitted from this crate.
pub const LOG_TARGET: &str = "drmbuf";

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static STDERR_LOGGER: StderrLogger = StderrLogger;

/// Install the stderr sink and set the maximum level.
///
/// Calling this more than once only updates the level.
pub fn log_init(level: LogLevel) {
    let _ = log::set_logger(&STDERR_LOGGER);
    log::set_max_level(level.to_filter());
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        ::log::error!(target: $crate::logging::LOG_TARGET, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        ::log::warn!(target: $crate::logging::LOG_TARGET, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        ::log::info!(target: $crate::logging::LOG_TARGET, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        ::log::debug!(target: $crate::logging::LOG_TARGET, $($arg)*)
    };
}
