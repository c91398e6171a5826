//! Utility layer (C14): timestamping, filename discipline, recursive
//! directory creation, terminal raw-mode toggling.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use libc::{tcgetattr, tcsetattr, termios, ECHO, ICANON, STDIN_FILENO, TCSANOW, VMIN, VTIME};

/// Wall-clock seconds since the UNIX epoch, as the source's `getTimestamp`
/// produces it (`tv_sec + tv_nsec / 1e9`).
pub fn now_double() -> f64 {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    d.as_secs() as f64 + f64::from(d.subsec_nanos()) / 1.0e9
}

/// Builds the canonical log filename:
/// `<dir>/<prefix>-MM.DD.YYYY_HH-MM-SS_<key-hex8>.<ext>`.
///
/// `time` is wall-clock seconds since the epoch (as returned by
/// `now_double`); the calendar fields are derived with `libc::gmtime_r` to
/// avoid pulling in a chrono-style dependency the teacher doesn't carry.
pub fn make_filename(dir: &Path, prefix: &str, time: f64, key: u32, ext: &str) -> PathBuf {
    let secs = time.trunc() as i64;
    let tm = civil_from_unix(secs);
    let name = format!(
        "{}-{:02}.{:02}.{:04}_{:02}-{:02}-{:02}_{:08x}.{}",
        prefix, tm.month, tm.day, tm.year, tm.hour, tm.minute, tm.second, key, ext
    );
    dir.join(name)
}

struct CivilTime {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

/// Converts a UNIX timestamp to UTC calendar fields via the C library's
/// `gmtime_r`, matching the source's use of `gmtime`/`localtime`.
fn civil_from_unix(secs: i64) -> CivilTime {
    unsafe {
        let mut tm: libc::tm = std::mem::zeroed();
        libc::gmtime_r(&secs as *const i64 as *const libc::time_t, &mut tm);
        CivilTime {
            year: tm.tm_year + 1900,
            month: (tm.tm_mon + 1) as u32,
            day: tm.tm_mday as u32,
            hour: tm.tm_hour as u32,
            minute: tm.tm_min as u32,
            second: tm.tm_sec as u32,
        }
    }
}

/// Recursively creates every missing directory in `path`, tolerating
/// `EEXIST` (mirrors the source's `mkdir_p`).
pub fn mkdir_p(path: &Path) -> io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

/// RAII guard that puts stdin into raw (non-canonical, no-echo, `VMIN=0`)
/// mode for interactive arrow-key control and restores the previous
/// `termios` state on drop.
pub struct StdinRawGuard {
    saved: termios,
}

impl StdinRawGuard {
    pub fn enable() -> io::Result<Self> {
        unsafe {
            let mut saved: termios = std::mem::zeroed();
            if tcgetattr(STDIN_FILENO, &mut saved) != 0 {
                return Err(io::Error::last_os_error());
            }

            let mut raw = saved;
            raw.c_lflag &= !(ICANON | ECHO);
            raw.c_cc[VMIN] = 0;
            raw.c_cc[VTIME] = 1;

            if tcsetattr(STDIN_FILENO, TCSANOW, &raw) != 0 {
                return Err(io::Error::last_os_error());
            }

            Ok(StdinRawGuard { saved })
        }
    }
}

impl Drop for StdinRawGuard {
    fn drop(&mut self) {
        unsafe {
            tcsetattr(STDIN_FILENO, TCSANOW, &self.saved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_matches_canonical_form() {
        // 2021-03-04 05:06:07 UTC
        let time = 1614834367.0;
        let name = make_filename(Path::new("log"), "VN200_GPS", time, 0xdead_beef, "csv");
        let s = name.to_string_lossy();
        assert!(s.ends_with("_deadbeef.csv"), "{}", s);
        assert!(s.contains("VN200_GPS-"), "{}", s);
    }

    #[test]
    fn mkdir_p_is_idempotent() {
        let dir = std::env::temp_dir().join("mrfusion_util_test_dir");
        mkdir_p(&dir).unwrap();
        mkdir_p(&dir).unwrap();
        let _ = fs::remove_dir(&dir);
    }

    #[test]
    fn now_double_is_monotonic_enough() {
        let a = now_double();
        let b = now_double();
        assert!(b >= a);
    }
}
