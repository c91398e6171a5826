//! TCP endpoint (C6): listen/accept and connect/retry primitives for a
//! fixed IP:port mesh. Grounded on `original_source/system/src/tcp.c`.

use std::os::unix::io::RawFd;
use std::time::Duration;

use nix::sys::socket::{
    accept, bind, connect, listen, setsockopt, socket, sockopt, AddressFamily, InetAddr, IpAddr,
    Ipv4Addr as NixIpv4Addr, SockAddr, SockFlag, SockType,
};
use nix::unistd::close as nix_close;

use error::{Result, TcpError};

/// Creates a blocking TCP stream socket with `SO_REUSEADDR|SO_REUSEPORT`.
pub fn client_new() -> Result<RawFd> {
    let fd = socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), 0)
        .map_err(|inner| TcpError::Socket { inner })?;
    let _ = setsockopt(fd, sockopt::ReuseAddr, &true);
    let _ = setsockopt(fd, sockopt::ReusePort, &true);
    Ok(fd)
}

fn inet_addr(ip: &str, port: u16) -> SockAddr {
    let std_addr: std::net::Ipv4Addr = ip.parse().unwrap_or(std::net::Ipv4Addr::LOCALHOST);
    let addr = IpAddr::V4(NixIpv4Addr::from_std(&std_addr));
    SockAddr::Inet(InetAddr::new(addr, port))
}

/// Non-blocking connect attempt. `ECONNREFUSED` (peer not listening yet)
/// is not fatal: the caller is expected to retry. On success, transitions
/// `fd` to non-blocking for subsequent reads/writes.
pub fn client_try_connect(fd: RawFd, ip: &str, port: u16) -> Result<bool> {
    let addr = inet_addr(ip, port);
    match connect(fd, &addr) {
        Ok(()) => {
            set_nonblocking(fd)?;
            Ok(true)
        }
        Err(nix::Error::Sys(nix::errno::Errno::ECONNREFUSED)) => Ok(false),
        Err(nix::Error::Sys(nix::errno::Errno::EINPROGRESS)) => Ok(false),
        Err(nix::Error::Sys(nix::errno::Errno::EISCONN)) => {
            set_nonblocking(fd)?;
            Ok(true)
        }
        Err(inner) => Err(TcpError::Socket { inner }.into()),
    }
}

/// Binds and listens (backlog 1) on `ip:port`.
pub fn server_new(ip: &str, port: u16) -> Result<RawFd> {
    let fd = socket(AddressFamily::Inet, SockType::Stream, SockFlag::empty(), 0)
        .map_err(|inner| TcpError::Socket { inner })?;
    let _ = setsockopt(fd, sockopt::ReuseAddr, &true);
    let _ = setsockopt(fd, sockopt::ReusePort, &true);

    let addr = inet_addr(ip, port);
    bind(fd, &addr).map_err(|inner| TcpError::Bind {
        addr: format!("{}:{}", ip, port),
        inner,
    })?;
    listen(fd, 1).map_err(|inner| TcpError::Listen { inner })?;
    Ok(fd)
}

pub fn set_nonblocking(fd: RawFd) -> Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|inner| TcpError::Socket { inner })?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|inner| TcpError::Socket { inner })?;
    Ok(())
}

/// One-shot accept attempt on a non-blocking listening socket. On success,
/// closes the listening fd and returns the connected fd.
pub fn server_try_accept(listen_fd: RawFd) -> Result<Option<RawFd>> {
    match accept(listen_fd) {
        Ok(conn_fd) => {
            let _ = nix_close(listen_fd);
            set_nonblocking(conn_fd)?;
            Ok(Some(conn_fd))
        }
        Err(nix::Error::Sys(nix::errno::Errno::EAGAIN)) => Ok(None),
        Err(nix::Error::Sys(nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
        Err(inner) => Err(TcpError::Socket { inner }.into()),
    }
}

/// Non-blocking read. A return of `0` means "no data available now", not
/// peer close (the mesh never relies on EOF detection).
pub fn read(fd: RawFd, buf: &mut [u8]) -> usize {
    use nix::sys::socket::{recv, MsgFlags};
    match recv(fd, buf, MsgFlags::MSG_DONTWAIT) {
        Ok(n) => n,
        Err(_) => 0,
    }
}

/// Non-blocking write; suppresses `SIGPIPE` via `MSG_NOSIGNAL`.
pub fn write(fd: RawFd, buf: &[u8]) -> usize {
    use nix::sys::socket::{send, MsgFlags};
    match send(fd, buf, MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_NOSIGNAL) {
        Ok(n) => n,
        Err(_) => 0,
    }
}

pub fn close(fd: RawFd) {
    let _ = nix_close(fd);
}

/// Bounded connect/accept retry loop used at subsystem startup (spec
/// §4.12 step 4): one iteration touches every still-unconnected peer, with
/// a fixed sleep between iterations.
pub struct RetryBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryBudget {
    pub fn startup_default() -> Self {
        RetryBudget {
            max_attempts: 10_000,
            interval: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn loopback_client_server_handshake() {
        let port = 31777;
        let server_fd = server_new("127.0.0.1", port).expect("server bind/listen");
        set_nonblocking(server_fd).unwrap();

        let client_fd = client_new().unwrap();
        let _ = client_try_connect(client_fd, "127.0.0.1", port);

        let mut accepted = None;
        for _ in 0..200 {
            if let Some(fd) = server_try_accept(server_fd).unwrap() {
                accepted = Some(fd);
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        let accepted = accepted.expect("server accepted a connection");

        for _ in 0..200 {
            if client_try_connect(client_fd, "127.0.0.1", port).unwrap_or(false) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        let sent = write(client_fd, b"init");
        assert_eq!(sent, 4);

        let mut buf = [0u8; 4];
        let mut got = 0;
        for _ in 0..200 {
            got = read(accepted, &mut buf);
            if got > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(got, 4);
        assert_eq!(&buf, b"init");

        close(client_fd);
        close(accepted);
    }
}
