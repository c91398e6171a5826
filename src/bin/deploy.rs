//! Deploy harness (C13): forks the navigation and control subsystem
//! processes, waits for both to connect over TCP, sends the init
//! handshake, lets them run for a fixed collection window, then sends
//! the stop message and waits for both children to exit.
//!
//! Grounded on `original_source/system/deploy.c`. Port numbers from
//! `original_source/system/inc/config.h`.

extern crate libc;
extern crate mrfusion_core;
extern crate nix;

use std::ffi::CString;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{execv, fork, ForkResult, Pid};

use mrfusion_core::tcp;
use mrfusion_core::util::now_double;

const IP_ADDR: &str = "127.0.0.1";
const NAVIGATION_TCP_PORT: u16 = 31402;
const CONTROL_TCP_PORT: u16 = 31401;

const NAVIGATION_EXE: &str = "./navigation/navigation_main.elf";
const CONTROL_EXE: &str = "./sensors/robot_test/robot_test_main.elf";

const MAX_ACCEPT_ATTEMPTS: u32 = 20;
const ACCEPT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const COLLECTION_WINDOW: Duration = Duration::from_secs(10);

fn exec_child(executable: &str) -> ! {
    let path = CString::new(executable).expect("executable path has no interior NUL");
    let args = [path.clone()];
    match execv(&path, &args) {
        Ok(_) => unreachable!(),
        Err(e) => {
            eprintln!("FAILED TO START CHILD EXECUTABLE {}: {}", executable, e);
            std::process::exit(-1);
        }
    }
}

fn fork_child(label: &str, executable: &str) -> Pid {
    println!("\nDEPLOYING CHILD TO RUN {}\n", executable);
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => child,
        Ok(ForkResult::Child) => exec_child(executable),
        Err(e) => {
            eprintln!("Failed to fork {} process: {}", label, e);
            std::process::exit(1);
        }
    }
}

fn main() {
    let nav_pid = fork_child("navigation", NAVIGATION_EXE);
    let control_pid = fork_child("control", CONTROL_EXE);

    let nav_listen = tcp::server_new(IP_ADDR, NAVIGATION_TCP_PORT).expect("navigation TCP bind");
    let control_listen = tcp::server_new(IP_ADDR, CONTROL_TCP_PORT).expect("control TCP bind");
    tcp::set_nonblocking(nav_listen).expect("navigation TCP nonblocking");
    tcp::set_nonblocking(control_listen).expect("control TCP nonblocking");

    let mut nav_sock = None;
    let mut control_sock = None;

    for _ in 0..MAX_ACCEPT_ATTEMPTS {
        if nav_sock.is_none() {
            if let Ok(Some(fd)) = tcp::server_try_accept(nav_listen) {
                println!("SUCCESSFUL TCP CONNECTION TO NAVIGATION");
                nav_sock = Some(fd);
            }
        }
        if control_sock.is_none() {
            if let Ok(Some(fd)) = tcp::server_try_accept(control_listen) {
                println!("SUCCESSFUL TCP CONNECTION TO CONTROL");
                control_sock = Some(fd);
            }
        }
        if nav_sock.is_some() && control_sock.is_some() {
            break;
        }
        std::thread::sleep(ACCEPT_RETRY_INTERVAL);
    }

    let (nav_sock, control_sock) = match (nav_sock, control_sock) {
        (Some(n), Some(c)) => (n, c),
        _ => {
            eprintln!("MAX TCP CONNECTION ATTEMPTS EXCEEDED; EXITING");
            let _ = kill(nav_pid, Signal::SIGINT);
            let _ = kill(control_pid, Signal::SIGINT);
            std::process::exit(1);
        }
    };

    let start_time = now_double();
    let key = rand_key();

    let mut init_msg = Vec::with_capacity(16);
    init_msg.extend_from_slice(b"init");
    init_msg.extend_from_slice(&start_time.to_le_bytes());
    init_msg.extend_from_slice(&key.to_le_bytes());

    if tcp::write(nav_sock, &init_msg) < 16 {
        eprintln!("FAILED TO SEND INIT MESSAGE TO NAVIGATION");
    } else {
        println!("SENT INIT MESSAGE TO NAVIGATION");
    }
    if tcp::write(control_sock, &init_msg) < 16 {
        eprintln!("FAILED TO SEND INIT MESSAGE TO CONTROL");
    } else {
        println!("SENT INIT MESSAGE TO CONTROL");
    }

    std::thread::sleep(COLLECTION_WINDOW);

    if tcp::write(nav_sock, b"stop") < 4 {
        eprintln!("FAILED TO SEND STOP MESSAGE TO NAVIGATION");
    } else {
        println!("SENT STOP MESSAGE TO NAVIGATION");
    }
    if tcp::write(control_sock, b"stop") < 4 {
        eprintln!("FAILED TO SEND STOP MESSAGE TO CONTROL");
    } else {
        println!("SENT STOP MESSAGE TO CONTROL");
    }

    tcp::close(nav_sock);
    tcp::close(control_sock);

    let mut last_status = 0;
    if let Ok(status) = waitpid(nav_pid, None) {
        println!("\nCHILD 1 EXITED WITH STATUS {:?}\n", status);
        last_status = exit_code(&status);
    }
    if let Ok(status) = waitpid(control_pid, None) {
        println!("\nCHILD 2 EXITED WITH STATUS {:?}\n", status);
        last_status = exit_code(&status);
    }

    std::process::exit(last_status);
}

fn exit_code(status: &nix::sys::wait::WaitStatus) -> i32 {
    match status {
        nix::sys::wait::WaitStatus::Exited(_, code) => *code,
        _ => 1,
    }
}

/// Seeds from the wall clock the same way the source does (`srand(tv_sec +
/// tv_nsec)`), without adding a real (non-dev) dependency on `rand`.
fn rand_key() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seed = d.as_secs().wrapping_add(u64::from(d.subsec_nanos()));
    unsafe {
        libc::srand(seed as libc::c_uint);
        libc::rand() as u32
    }
}
