use std::io;

use failure;
use nix;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "serial line error: {}", inner)]
    Serial { inner: SerialError },
    #[fail(display = "TCP endpoint error: {}", inner)]
    Tcp { inner: TcpError },
    #[fail(display = "log sink error: {}", inner)]
    LogSink { inner: io::Error },
    #[fail(display = "thread creation failed: {}", inner)]
    Thread { inner: nix::Error },
    #[fail(display = "configuration error: {}", inner)]
    Config { inner: String },
    #[fail(display = "initial-conditions handshake failed: {}", inner)]
    Handshake { inner: String },
    #[fail(display = "encountered an unknown error: {}", inner)]
    Misc { inner: failure::Error },
}

impl From<failure::Error> for Error {
    fn from(inner: failure::Error) -> Self {
        Error::Misc { inner }
    }
}

impl From<SerialError> for Error {
    fn from(inner: SerialError) -> Self {
        Error::Serial { inner }
    }
}

impl From<TcpError> for Error {
    fn from(inner: TcpError) -> Self {
        Error::Tcp { inner }
    }
}

impl From<io::Error> for Error {
    fn from(inner: io::Error) -> Self {
        Error::LogSink { inner }
    }
}

impl From<nix::Error> for Error {
    fn from(inner: nix::Error) -> Self {
        Error::Thread { inner }
    }
}

/// Errors opening or operating on a serial line (C2).
#[derive(Debug, Fail)]
pub enum SerialError {
    #[fail(display = "could not open serial device {}: {}", path, inner)]
    Open { path: String, inner: io::Error },
    #[fail(display = "failed to configure termios attributes: {}", inner)]
    Termios { inner: nix::Error },
    #[fail(display = "read from serial device failed: {}", inner)]
    Read { inner: io::Error },
    #[fail(display = "write to serial device failed: {}", inner)]
    Write { inner: io::Error },
}

/// Errors from the TCP mesh endpoint (C6).
#[derive(Debug, Fail)]
pub enum TcpError {
    #[fail(display = "failed to create socket: {}", inner)]
    Socket { inner: nix::Error },
    #[fail(display = "failed to bind {}: {}", addr, inner)]
    Bind { addr: String, inner: nix::Error },
    #[fail(display = "failed to listen: {}", inner)]
    Listen { inner: nix::Error },
    #[fail(display = "connect/accept retry budget of {} attempts exhausted", attempts)]
    RetryBudgetExhausted { attempts: u32 },
}
