//! Log sinks (C3): timestamped, append-only, directory-aware file sinks.
//!
//! Two flavors selected at init: a raw `.log`/`.bin` sink recording every
//! byte received, and a `.csv` parsed sink recording typed records.
//! Grounded on `original_source/system/src/logger.c` and the filename
//! discipline in `utils.c`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use util::{make_filename, mkdir_p, now_double};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogMode {
    Binary,
    Text,
}

/// An open, append-only log file sharing a per-run directory with every
/// other sink of the same run (see spec §4.3: "same directory is shared
/// across all sinks of a single run").
pub struct LogFile {
    file: File,
    path: PathBuf,
    created: f64,
    mode: LogMode,
}

impl LogFile {
    /// Creates `<dir>/<prefix>-MM.DD.YYYY_HH-MM-SS_<key-hex8>.<ext>`,
    /// recursively creating `dir` if needed.
    pub fn init(dir: &Path, prefix: &str, key: u32, ext: &str, mode: LogMode) -> io::Result<Self> {
        mkdir_p(dir)?;
        let created = now_double();
        let path = make_filename(dir, prefix, created, key, ext);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(LogFile {
            file,
            path,
            created,
            mode,
        })
    }

    /// Wraps an already-open file as a sink outside the normal
    /// directory-discipline path (used by the debug log backend, which
    /// writes to one fixed path rather than a `<dir>/<prefix>...` name).
    pub(crate) fn from_parts(file: File) -> Self {
        LogFile {
            file,
            path: PathBuf::new(),
            created: now_double(),
            mode: LogMode::Text,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created(&self) -> f64 {
        self.created
    }

    pub fn mode(&self) -> LogMode {
        self.mode
    }

    /// Appends raw bytes without an implicit flush — per spec, "line
    /// buffered by the OS unless `flush()` is called explicitly".
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    /// Appends one CSV row, terminated with `\n`.
    pub fn write_csv_row(&mut self, fields: &[String]) -> io::Result<()> {
        let line = fields.join(",");
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_directory_and_file() {
        let dir = std::env::temp_dir().join("mrfusion_log_sink_test");
        let _ = std::fs::remove_dir_all(&dir);
        let mut f = LogFile::init(&dir, "VN200_GPS", 0xdead_beef, "csv", LogMode::Text).unwrap();
        f.write_csv_row(&["1.0".into(), "2.0".into()]).unwrap();
        f.flush().unwrap();
        assert!(f.path().exists());
        let contents = std::fs::read_to_string(f.path()).unwrap();
        assert_eq!(contents, "1.0,2.0\n");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
