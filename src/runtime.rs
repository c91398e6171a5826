//! Subsystem runtime (C12): init handshake, TCP mesh setup, worker thread
//! orchestration, and cooperative shutdown. Grounded on
//! `original_source/system/src/main.c`'s command loop and
//! `original_source/system/deploy.c`'s wire handshake.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use buffer::RingBuffer;
use config::Config;
use error::{Error, Result};
use protocol::{self, Message};
use tcp;
use thread_rt::ContinueFlag;
use util::now_double;

/// Single-pole low-pass filter, `y[n] = y[n-1] + (x[n] - y[n-1]) / size`.
/// Spec §9 Open Question 3 makes `size` a configuration knob (default
/// 16, matching the source's hard-coded constant).
pub struct LowPassFilter {
    size: f64,
    value: f64,
}

impl LowPassFilter {
    pub fn new(size: usize) -> Self {
        LowPassFilter {
            size: size.max(1) as f64,
            value: 0.0,
        }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        self.value += (sample - self.value) / self.size;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Immutable (post-construction) parameters shared by every worker
/// thread: start time and key from the handshake, and the mesh's
/// connected peer sockets.
pub struct SubsystemParams {
    pub start_time: f64,
    pub key: u32,
    pub peers: HashMap<String, RawFd>,
}

/// One entry in the fixed peer table: the role name, its address, and
/// whether this subsystem connects-to or accepts-from it.
pub enum PeerSpec {
    ConnectTo { role: String, ip: String, port: u16 },
    AcceptFrom { role: String, ip: String, port: u16 },
}

enum PeerState {
    Connecting { fd: RawFd, ip: String, port: u16 },
    Listening { fd: RawFd },
    Done { fd: RawFd },
}

/// Runs the bounded, fixpoint connect/accept retry loop of spec §4.12 step
/// 4: one iteration touches every still-unconnected peer; the loop
/// tolerates any startup order between connecting and accepting sides
/// (spec §9, "cyclic structure at startup").
pub fn connect_mesh(specs: Vec<PeerSpec>, cfg: &Config) -> Result<HashMap<String, RawFd>> {
    let mut states: HashMap<String, PeerState> = HashMap::new();

    for spec in specs {
        match spec {
            PeerSpec::ConnectTo { role, ip, port } => {
                let fd = tcp::client_new()?;
                states.insert(role, PeerState::Connecting { fd, ip, port });
            }
            PeerSpec::AcceptFrom { role, ip, port } => {
                let fd = tcp::server_new(&ip, port)?;
                tcp::set_nonblocking(fd)?;
                states.insert(role, PeerState::Listening { fd });
            }
        }
    }

    for attempt in 0..cfg.tcp_retry_attempts {
        let mut all_done = true;

        for (role, state) in states.iter_mut() {
            match state {
                PeerState::Connecting { fd, ip, port } => {
                    if tcp::client_try_connect(*fd, ip, *port)? {
                        info!("connected to {}", role);
                        *state = PeerState::Done { fd: *fd };
                    } else {
                        all_done = false;
                    }
                }
                PeerState::Listening { fd } => {
                    if let Some(conn_fd) = tcp::server_try_accept(*fd)? {
                        info!("accepted connection from {}", role);
                        *state = PeerState::Done { fd: conn_fd };
                    } else {
                        all_done = false;
                    }
                }
                PeerState::Done { .. } => {}
            }
        }

        if all_done {
            break;
        }
        if attempt + 1 == cfg.tcp_retry_attempts {
            return Err(Error::Handshake {
                inner: "TCP connect/accept retry budget exhausted".to_string(),
            });
        }
        std::thread::sleep(cfg.tcp_retry_interval());
    }

    Ok(states
        .into_iter()
        .map(|(role, state)| {
            let fd = match state {
                PeerState::Done { fd } => fd,
                PeerState::Connecting { fd, .. } => fd,
                PeerState::Listening { fd } => fd,
            };
            (role, fd)
        })
        .collect())
}

/// Waits on `guidance_fd` for the 16-byte init handshake (spec §4.12 step
/// 5), up to `timeout`. Falls back to the local clock and a random key if
/// no message arrives (interactive fallback).
pub fn wait_for_handshake(guidance_fd: RawFd, timeout: Duration) -> (f64, u32) {
    let mut buf = RingBuffer::new();
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        let mut chunk = [0u8; 64];
        let n = tcp::read(guidance_fd, &mut chunk);
        if n > 0 {
            buf.append_many(&chunk[..n]);
            if let Some(Message::Init { start_time, key }) = protocol::poll_one(&mut buf) {
                return (start_time, key);
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    warn!("no init handshake received within timeout; seeding from local clock");
    (now_double(), rand_key())
}

fn rand_key() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    nanos ^ 0x9E37_79B9
}

/// One iteration of the main command loop (spec §4.12 step 7): drains
/// pending TCP messages from `buf`, applies the low-pass filters, and
/// returns the commands that should be acted on this iteration.
pub struct CommandLoopState {
    pub speed_filter: LowPassFilter,
    pub rotation_filter: LowPassFilter,
    pub stop_requested: bool,
}

impl CommandLoopState {
    pub fn new(filter_size: usize) -> Self {
        CommandLoopState {
            speed_filter: LowPassFilter::new(filter_size),
            rotation_filter: LowPassFilter::new(filter_size),
            stop_requested: false,
        }
    }

    /// Feeds newly-arrived bytes and drains every complete message,
    /// updating filter state and the stop flag accordingly.
    pub fn ingest(&mut self, buf: &mut RingBuffer) {
        while let Some(msg) = protocol::poll_one(buf) {
            match msg {
                Message::Stop | Message::Ctlx => self.stop_requested = true,
                Message::Ctls { speed_mps } => {
                    self.speed_filter.update(speed_mps);
                }
                Message::Ctlr { rotation_radps } => {
                    self.rotation_filter.update(rotation_radps);
                }
                Message::Init { .. } => {
                    // Already consumed at startup; ignore if seen again.
                }
            }
        }
    }
}

/// Shuts down every worker by clearing its continue-flag and joining with
/// a bounded-retry loop (spec §4.12 step 8).
pub fn shutdown_workers(
    flags: &[ContinueFlag],
    handles: Vec<std::thread::JoinHandle<()>>,
    max_attempts: u32,
    interval: Duration,
) {
    for flag in flags {
        flag.stop();
    }
    for handle in handles {
        ::thread_rt::try_join_bounded(handle, max_attempts, interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_pass_filter_converges_toward_step_input() {
        let mut f = LowPassFilter::new(16);
        for _ in 0..500 {
            f.update(1.0);
        }
        assert!((f.value() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn low_pass_filter_first_sample_is_fraction_of_step() {
        let mut f = LowPassFilter::new(16);
        let v = f.update(16.0);
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn command_loop_sets_stop_on_stop_message() {
        let mut state = CommandLoopState::new(16);
        let mut buf = RingBuffer::new();
        buf.append_many(&Message::Stop.encode());
        state.ingest(&mut buf);
        assert!(state.stop_requested);
    }

    #[test]
    fn command_loop_filters_speed_and_rotation() {
        let mut state = CommandLoopState::new(4);
        let mut buf = RingBuffer::new();
        buf.append_many(&Message::Ctls { speed_mps: 4.0 }.encode());
        buf.append_many(&Message::Ctlr { rotation_radps: 4.0 }.encode());
        state.ingest(&mut buf);
        assert!((state.speed_filter.value() - 1.0).abs() < 1e-9);
        assert!((state.rotation_filter.value() - 1.0).abs() < 1e-9);
        assert!(!state.stop_requested);
    }
}
