//! Serial line (UART) driver (C2).
//!
//! Raw 8N1 line discipline, no canonical processing, no echo, software
//! flow control disabled, `VMIN=0`/`VTIME=1` for non-blocking partial
//! reads. Grounded on `original_source/system/src/uart.c`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::sys::termios::{
    cfsetspeed, tcsetattr, BaudRate, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
    SpecialCharacterIndices, Termios,
};

use error::{Result, SerialError};

fn baud_rate(baud: u32) -> BaudRate {
    match baud {
        9600 => BaudRate::B9600,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        _ => BaudRate::B9600,
    }
}

/// An open, raw-mode serial line.
pub struct SerialLine {
    file: File,
    path: String,
    baud: u32,
}

impl SerialLine {
    /// Opens `path` read-write at `baud`, configuring raw 8N1 mode with
    /// `VMIN=0, VTIME=1`.
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        Self::open_with(path, baud, true)
    }

    /// Opens `path` read-only, for devices that reset on open and are
    /// subsequently reconfigured by a write-side command.
    pub fn open_read_only(path: &str, baud: u32) -> Result<Self> {
        Self::open_with(path, baud, false)
    }

    fn open_with(path: &str, baud: u32, writable: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .custom_flags(libc::O_NOCTTY | libc::O_NDELAY)
            .open(Path::new(path))
            .map_err(|inner| SerialError::Open {
                path: path.to_string(),
                inner,
            })?;

        let mut line = SerialLine {
            file,
            path: path.to_string(),
            baud,
        };
        line.configure_raw(baud)?;
        Ok(line)
    }

    fn configure_raw(&mut self, baud: u32) -> Result<()> {
        let fd = self.file.as_raw_fd();
        let mut termios = Termios::from_fd(fd).map_err(|inner| SerialError::Termios { inner })?;

        termios.input_flags = InputFlags::empty();
        termios.output_flags = OutputFlags::empty();
        termios.local_flags = LocalFlags::empty();
        termios.control_flags = (termios.control_flags
            & !(ControlFlags::CSIZE | ControlFlags::PARENB))
            | ControlFlags::CS8
            | ControlFlags::CREAD
            | ControlFlags::CLOCAL;
        termios.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        termios.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;

        cfsetspeed(&mut termios, baud_rate(baud)).map_err(|inner| SerialError::Termios { inner })?;
        tcsetattr(fd, SetArg::TCSANOW, &termios).map_err(|inner| SerialError::Termios { inner })?;

        self.baud = baud;
        Ok(())
    }

    /// Re-configures the line's baud rate without reopening the fd.
    pub fn set_baud(&mut self, baud: u32) -> Result<()> {
        self.configure_raw(baud)
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-blocking partial read. Returns 0 when no data is currently
    /// available (per `VMIN=0`), `>0` on partial success.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(inner) => Err(SerialError::Read { inner }.into()),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file
            .write(buf)
            .map_err(|inner| SerialError::Write { inner }.into())
    }

    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_rate_maps_known_values() {
        assert_eq!(baud_rate(9600), BaudRate::B9600);
        assert_eq!(baud_rate(57600), BaudRate::B57600);
        assert_eq!(baud_rate(115200), BaudRate::B115200);
    }

    #[test]
    fn open_nonexistent_device_reports_open_error() {
        let err = SerialLine::open("/dev/does-not-exist-mrfusion", 9600);
        assert!(err.is_err());
    }
}
