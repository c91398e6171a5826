//! Generic subsystem main (C12): one binary plays any subsystem's role
//! (navigation, control, guidance, ...) depending on which config file it
//! is launched with — `Config::device_paths` selects which serial drivers
//! to start, `Config::peers`/`accept_roles`/`guidance_role` select the
//! mesh topology. Grounded on `original_source/system/src/main.c`'s
//! command loop and `original_source/navigation/src/main.c`'s per-subsystem
//! device/peer wiring.

#[macro_use]
extern crate log;
extern crate mrfusion_core;

use std::collections::HashMap;
use std::env;
use std::io::Read;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mrfusion_core::adsb::AdsbDriver;
use mrfusion_core::binary_packet::BinaryParsed;
use mrfusion_core::buffer::RingBuffer;
use mrfusion_core::config::Config;
use mrfusion_core::debug_log::{self, Backend, DebugLevel};
use mrfusion_core::kangaroo::KangarooDriver;
use mrfusion_core::log_sink::{LogFile, LogMode};
use mrfusion_core::mailbox;
use mrfusion_core::runtime::{self, CommandLoopState, PeerSpec, SubsystemParams};
use mrfusion_core::tcp;
use mrfusion_core::thread_rt;
use mrfusion_core::util::{self, StdinRawGuard};
use mrfusion_core::vn200::{self, Mode, Vn200Driver};

const MAIN_LOOP_INTERVAL: Duration = Duration::from_millis(20);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_JOIN_ATTEMPTS: u32 = 10;
const SHUTDOWN_JOIN_INTERVAL: Duration = Duration::from_millis(100);
const VN200_SAMPLE_FREQ_HZ: u32 = 200;
const KANGAROO_POSITION_REQUEST_PERIOD: u32 = 5;
const MANUAL_CONTROL_STEP: f64 = 0.1;
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

const GPS_HEADER: [&str; 16] = [
    "time_of_week", "week", "fix_type", "num_sats",
    "pos_ecef_x", "pos_ecef_y", "pos_ecef_z",
    "vel_ned_n", "vel_ned_e", "vel_ned_d",
    "pos_accuracy_n", "pos_accuracy_e", "pos_accuracy_d",
    "speed_accuracy", "time_accuracy", "timestamp",
];
const IMU_HEADER: [&str; 12] = [
    "mag_x", "mag_y", "mag_z",
    "accel_x", "accel_y", "accel_z",
    "gyro_x", "gyro_y", "gyro_z",
    "temperature", "pressure", "timestamp",
];
const ODOMETRY_HEADER: [&str; 3] = ["left_mm", "right_mm", "timestamp"];
const ADSB_HEADER: [&str; 13] = [
    "icao_address", "lat_e7", "lon_e7", "alt_mm", "heading_cdeg",
    "h_velocity_cms", "v_velocity_cms", "valid_flags", "squawk",
    "altitude_type", "callsign", "emitter_type", "tslc",
];

fn run_directory(config: &Config, subsystem_name: &str, start_time: f64, key: u32) -> PathBuf {
    let base = config.log_dir.clone().unwrap_or_else(|| "log".to_string());
    let run_dir = util::make_filename(Path::new(&base), "MRFUSION_RUN", start_time, key, "d");
    run_dir.join(subsystem_name)
}

/// Creates a CSV sink and writes its fixed header row (spec §6: "CSV
/// headers are fixed in §3"). A failure to open or to write the header is
/// logged at INFO rather than propagated: a missing log sink must not
/// abort an otherwise-healthy subsystem.
fn open_csv_log(dir: &Path, prefix: &str, key: u32, header: &[&str]) -> Option<LogFile> {
    match LogFile::init(dir, prefix, key, "csv", LogMode::Text) {
        Ok(mut log) => {
            let header: Vec<String> = header.iter().map(|s| s.to_string()).collect();
            if let Err(e) = log.write_csv_row(&header) {
                info!("failed to write {} CSV header: {}", prefix, e);
            }
            Some(log)
        }
        Err(e) => {
            info!("failed to open {} CSV log: {}", prefix, e);
            None
        }
    }
}

fn open_raw_log(dir: &Path, prefix: &str, key: u32) -> Option<LogFile> {
    match LogFile::init(dir, prefix, key, "bin", LogMode::Binary) {
        Ok(log) => Some(log),
        Err(e) => {
            info!("failed to open {} raw log: {}", prefix, e);
            None
        }
    }
}

/// Writes one CSV row to `log`, if present, logging (not propagating) a
/// write failure at INFO per spec §7: "log at INFO; continue".
fn write_csv_row(log: &mut Option<LogFile>, prefix: &str, fields: &[String]) {
    if let Some(log) = log.as_mut() {
        if let Err(e) = log.write_csv_row(fields) {
            info!("write failure on {} log file: {}; continuing", prefix, e);
        }
    }
}

fn write_raw(log: &mut Option<LogFile>, prefix: &str, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    if let Some(log) = log.as_mut() {
        if let Err(e) = log.write(bytes) {
            info!("write failure on {} raw log file: {}; continuing", prefix, e);
        }
    }
}

#[derive(Clone, Copy)]
enum ArrowKey {
    Up,
    Down,
    Left,
    Right,
}

/// Interprets a `CSI` arrow-key escape sequence (`ESC [ A/B/C/D`) read from
/// a raw-mode stdin (spec §4.12 step 7: "optionally interpret terminal
/// arrow-key escape sequences when running interactively"). `StdinRawGuard`
/// already configures `VMIN=0, VTIME=1`, so this read behaves like a
/// short-timeout poll rather than a blocking one. Returns `None` if fewer
/// than three bytes arrived within that window.
fn read_arrow_key(stdin: &mut std::io::Stdin) -> Option<ArrowKey> {
    let mut buf = [0u8; 3];
    let n = stdin.read(&mut buf).unwrap_or(0);
    if n < 3 || buf[0] != 0x1b || buf[1] != b'[' {
        return None;
    }
    match buf[2] {
        b'A' => Some(ArrowKey::Up),
        b'B' => Some(ArrowKey::Down),
        b'C' => Some(ArrowKey::Right),
        b'D' => Some(ArrowKey::Left),
        _ => None,
    }
}

fn main() {
    let _ = debug_log::init(Backend::Stdout, DebugLevel::Info);

    let mut args = env::args().skip(1);
    let config_path = args.next();
    let subsystem_name = args.next().unwrap_or_else(|| "subsystem".to_string());

    let config = match config_path {
        Some(path) => Config::from_file(Path::new(&path)).unwrap_or_else(|e| {
            warn!("failed to load config {}: {}; using defaults", path, e);
            Config::default()
        }),
        None => Config::default(),
    };

    let specs: Vec<PeerSpec> = config
        .peers
        .iter()
        .map(|(role, addr)| {
            if config.accept_roles.contains(role) {
                PeerSpec::AcceptFrom {
                    role: role.clone(),
                    ip: addr.ip().to_string(),
                    port: addr.port(),
                }
            } else {
                PeerSpec::ConnectTo {
                    role: role.clone(),
                    ip: addr.ip().to_string(),
                    port: addr.port(),
                }
            }
        })
        .collect();

    let peers: HashMap<String, RawFd> = runtime::connect_mesh(specs, &config).unwrap_or_else(|e| {
        error!("TCP mesh setup failed: {}", e);
        std::process::exit(-1);
    });

    let (start_time, key) = match config.guidance_role.as_ref().and_then(|role| peers.get(role)) {
        Some(&guidance_fd) => runtime::wait_for_handshake(guidance_fd, HANDSHAKE_TIMEOUT),
        None => (util::now_double(), 0),
    };
    info!("subsystem start_time={} key={:08x}", start_time, key);

    let _params = SubsystemParams {
        start_time,
        key,
        peers: peers.clone(),
    };

    let log_dir = run_directory(&config, &subsystem_name, start_time, key);
    let have_vn200 = config.device_paths.contains_key("vn200");
    let have_kangaroo = config.device_paths.contains_key("kangaroo");
    let have_adsb = config.device_paths.contains_key("adsb");

    let mut gps_log = if have_vn200 {
        open_csv_log(&log_dir, "VN200_GPS", key, &GPS_HEADER)
    } else {
        None
    };
    let mut imu_log = if have_vn200 {
        open_csv_log(&log_dir, "VN200_IMU", key, &IMU_HEADER)
    } else {
        None
    };
    let mut odometry_log = if have_kangaroo {
        open_csv_log(&log_dir, "ODOMETRY_K", key, &ODOMETRY_HEADER)
    } else {
        None
    };
    let mut adsb_log = if have_adsb {
        open_csv_log(&log_dir, "ADS_B", key, &ADSB_HEADER)
    } else {
        None
    };

    let (vn200_writer, vn200_reader) = mailbox::mailbox();
    let (imu_writer, imu_reader) = mailbox::mailbox();
    let (odometry_writer, odometry_reader) = mailbox::mailbox();
    let (adsb_writer, adsb_reader) = mailbox::mailbox::<Vec<BinaryParsed>>();
    let (kangaroo_cmd_writer, kangaroo_cmd_reader) = mailbox::mailbox::<(i32, i32)>();

    let mut flags = Vec::new();
    let mut handles = Vec::new();

    if let Some(path) = config.device_paths.get("vn200").cloned() {
        let baud = config.vn200_baud;
        let mut raw_log = open_raw_log(&log_dir, "VN200", key);
        let (handle, flag) = thread_rt::spawn_worker(0, move |cf| {
            let mut driver = match Vn200Driver::init(&path, baud, VN200_SAMPLE_FREQ_HZ, Mode::Both) {
                Ok(d) => d,
                Err(e) => {
                    error!("VN200 init failed: {}", e);
                    return;
                }
            };
            while cf.should_continue() {
                match driver.poll() {
                    Ok((raw, batch)) => {
                        write_raw(&mut raw_log, "VN200", &raw);
                        let (gps, imu) = vn200::latest_records(&batch);
                        if let Some(r) = gps {
                            vn200_writer.publish(r);
                        }
                        if let Some(r) = imu {
                            imu_writer.publish(r);
                        }
                    }
                    Err(e) => warn!("VN200 read error: {}", e),
                }
                std::thread::sleep(WORKER_POLL_INTERVAL);
            }
        });
        flags.push(flag);
        handles.push(handle);
    }

    if let Some(path) = config.device_paths.get("kangaroo").cloned() {
        let window = config.odometry_pairing_window_s;
        let mut raw_log = open_raw_log(&log_dir, "ODOMETRY_K", key);
        let (handle, flag) = thread_rt::spawn_worker(0, move |cf| {
            let mut driver = match KangarooDriver::init(&path, window) {
                Ok(d) => d,
                Err(e) => {
                    error!("Kangaroo init failed: {}", e);
                    return;
                }
            };
            let mut iteration: u32 = 0;
            while cf.should_continue() {
                if let Some((left, right)) = kangaroo_cmd_reader.take_latest() {
                    if let Err(e) = driver.command_speed(1, left) {
                        warn!("Kangaroo left speed command failed: {}", e);
                    }
                    if let Err(e) = driver.command_speed(2, right) {
                        warn!("Kangaroo right speed command failed: {}", e);
                    }
                }

                iteration = iteration.wrapping_add(1);
                if iteration % KANGAROO_POSITION_REQUEST_PERIOD == 0 {
                    if let Err(e) = driver.request_position() {
                        warn!("Kangaroo position request failed: {}", e);
                    }
                }

                match driver.poll() {
                    Ok(raw) => write_raw(&mut raw_log, "ODOMETRY_K", &raw),
                    Err(e) => warn!("Kangaroo read error: {}", e),
                }
                if let Some(row) = driver.consume() {
                    odometry_writer.publish(row);
                }
                std::thread::sleep(WORKER_POLL_INTERVAL);
            }
        });
        flags.push(flag);
        handles.push(handle);
    }

    if let Some(path) = config.device_paths.get("adsb").cloned() {
        let baud = config.adsb_baud;
        let mut raw_log = open_raw_log(&log_dir, "ADS_B", key);
        let (handle, flag) = thread_rt::spawn_worker(0, move |cf| {
            let mut driver = match AdsbDriver::init(&path, baud) {
                Ok(d) => d,
                Err(e) => {
                    error!("ADS-B init failed: {}", e);
                    return;
                }
            };
            while cf.should_continue() {
                match driver.poll() {
                    Ok((raw, batch)) => {
                        write_raw(&mut raw_log, "ADS_B", &raw);
                        if !batch.is_empty() {
                            adsb_writer.publish(batch);
                        }
                    }
                    Err(e) => warn!("ADS-B read error: {}", e),
                }
                std::thread::sleep(WORKER_POLL_INTERVAL);
            }
        });
        flags.push(flag);
        handles.push(handle);
    }

    let stdin_guard = StdinRawGuard::enable().ok();
    let mut stdin = std::io::stdin();
    let mut manual_speed = 0.0f64;
    let mut manual_rotation = 0.0f64;

    let mut command_state = CommandLoopState::new(config.filter_size);
    let mut peer_bufs: HashMap<String, RingBuffer> =
        peers.keys().map(|k| (k.clone(), RingBuffer::new())).collect();

    while !command_state.stop_requested {
        for (role, fd) in &peers {
            let buf = peer_bufs.entry(role.clone()).or_insert_with(RingBuffer::new);
            let mut chunk = [0u8; 64];
            let n = tcp::read(*fd, &mut chunk);
            if n > 0 {
                buf.append_many(&chunk[..n]);
            }
            command_state.ingest(buf);
        }

        if stdin_guard.is_some() {
            if let Some(arrow) = read_arrow_key(&mut stdin) {
                match arrow {
                    ArrowKey::Up => manual_speed += MANUAL_CONTROL_STEP,
                    ArrowKey::Down => manual_speed -= MANUAL_CONTROL_STEP,
                    ArrowKey::Right => manual_rotation += MANUAL_CONTROL_STEP,
                    ArrowKey::Left => manual_rotation -= MANUAL_CONTROL_STEP,
                }
                command_state.speed_filter.update(manual_speed);
                command_state.rotation_filter.update(manual_rotation);
            }
        }

        if have_kangaroo {
            let speed = command_state.speed_filter.value();
            let rotation = command_state.rotation_filter.value();
            let left = (speed - rotation) as i32;
            let right = (speed + rotation) as i32;
            kangaroo_cmd_writer.publish((left, right));
        }

        if let Some(r) = vn200_reader.take_latest() {
            write_csv_row(
                &mut gps_log,
                "VN200_GPS",
                &[
                    r.time_of_week.to_string(),
                    r.week.to_string(),
                    r.fix_type.to_string(),
                    r.num_sats.to_string(),
                    r.pos_ecef[0].to_string(),
                    r.pos_ecef[1].to_string(),
                    r.pos_ecef[2].to_string(),
                    r.vel_ned[0].to_string(),
                    r.vel_ned[1].to_string(),
                    r.vel_ned[2].to_string(),
                    r.pos_accuracy[0].to_string(),
                    r.pos_accuracy[1].to_string(),
                    r.pos_accuracy[2].to_string(),
                    r.speed_accuracy.to_string(),
                    r.time_accuracy.to_string(),
                    r.timestamp.to_string(),
                ],
            );
        }
        if let Some(r) = imu_reader.take_latest() {
            write_csv_row(
                &mut imu_log,
                "VN200_IMU",
                &[
                    r.mag[0].to_string(),
                    r.mag[1].to_string(),
                    r.mag[2].to_string(),
                    r.accel[0].to_string(),
                    r.accel[1].to_string(),
                    r.accel[2].to_string(),
                    r.gyro[0].to_string(),
                    r.gyro[1].to_string(),
                    r.gyro[2].to_string(),
                    r.temperature.to_string(),
                    r.pressure.to_string(),
                    r.timestamp.to_string(),
                ],
            );
        }
        if let Some((left_mm, right_mm, ts)) = odometry_reader.take_latest() {
            write_csv_row(
                &mut odometry_log,
                "ODOMETRY_K",
                &[left_mm.to_string(), right_mm.to_string(), ts.to_string()],
            );
        }
        if let Some(batch) = adsb_reader.take_latest() {
            for parsed in batch {
                match parsed {
                    BinaryParsed::Frame(m) => {
                        write_csv_row(
                            &mut adsb_log,
                            "ADS_B",
                            &[
                                m.icao_address.to_string(),
                                m.lat_e7.to_string(),
                                m.lon_e7.to_string(),
                                m.alt_mm.to_string(),
                                m.heading_cdeg.to_string(),
                                m.h_velocity_cms.to_string(),
                                m.v_velocity_cms.to_string(),
                                format!("{:?}", m.valid_flags),
                                m.squawk.to_string(),
                                m.altitude_type.to_string(),
                                String::from_utf8_lossy(&m.callsign).trim_end_matches('\0').to_string(),
                                m.emitter_type.to_string(),
                                m.tslc.to_string(),
                            ],
                        );
                    }
                    BinaryParsed::ChecksumFailure => {
                        info!("ADS-B: discarded frame with bad checksum");
                    }
                }
            }
        }

        std::thread::sleep(MAIN_LOOP_INTERVAL);
    }

    info!("stop received; shutting down");
    runtime::shutdown_workers(&flags, handles, SHUTDOWN_JOIN_ATTEMPTS, SHUTDOWN_JOIN_INTERVAL);

    for fd in peers.values() {
        tcp::close(*fd);
    }
    drop(stdin_guard);
}
