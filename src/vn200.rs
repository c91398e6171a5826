//! Sensor driver (C11): VN200 GPS/IMU, device init dialogue and the
//! runtime polling loop. Grounded on
//! `original_source/navigation/src/vn200.c` — the authoritative version;
//! early scratch copies elsewhere in the source tree contain stray
//! invalid syntax and are not used (spec §9 Open Question 1).

use std::thread;
use std::time::Duration;

use strum_macros::{Display, EnumString};

use ascii_packet::{self, GpsRecord, ImuRecord, Parsed};
use buffer::RingBuffer;
use checksum::xor8;
use error::Result;
use serial::SerialLine;

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumString, Display)]
pub enum Mode {
    #[strum(to_string = "IMU only")]
    ImuOnly,
    #[strum(to_string = "GPS only")]
    GpsOnly,
    #[strum(to_string = "IMU+GPS interleaved")]
    Both,
}

impl Mode {
    fn register_value(self) -> u32 {
        match self {
            Mode::ImuOnly => 19,
            Mode::GpsOnly => 20,
            Mode::Both => 248,
        }
    }
}

pub struct Vn200Driver {
    line: SerialLine,
    in_buf: RingBuffer,
}

fn checksummed(body: &str) -> String {
    let chk = xor8(body.as_bytes());
    format!("${}*{:02X}\r\n", body, chk)
}

impl Vn200Driver {
    /// Runs the full init dialogue documented in spec §4.11 and returns a
    /// driver ready for the runtime polling loop.
    ///
    /// `device_open_baud` is the baud the device is currently configured
    /// at (57600 unless a previous run upshifted it); `sample_freq` is the
    /// sensor sample rate in Hz; `mode` selects IMU-only/GPS-only/both.
    pub fn init(dev_path: &str, device_open_baud: u32, sample_freq: u32, mode: Mode) -> Result<Self> {
        let mut line = SerialLine::open(dev_path, device_open_baud)?;

        if device_open_baud == 57600 {
            // Possibly upshift: ask the device to switch to 115200, then
            // re-initialize the local line to match.
            line.write(checksummed("VNWRG,05,115200").as_bytes())?;
            line.set_baud(115200)?;
        }

        line.write(checksummed("VNRRG,03").as_bytes())?; // serial number, response discarded
        line.write(checksummed("VNWRG,06,0").as_bytes())?; // disable async output
        line.write(checksummed(&format!("VNWRG,07,{}", sample_freq)).as_bytes())?;

        line.write(b"$VNWNV*XX\r\n")?;
        line.write(b"$VNRST*XX\r\n")?;
        thread::sleep(Duration::from_secs(1));

        line.write(checksummed(&format!("VNWRG,06,{}", mode.register_value())).as_bytes())?;

        // Drain any buffered response bytes.
        let mut scratch = [0u8; 256];
        loop {
            let n = line.read(&mut scratch)?;
            if n == 0 {
                break;
            }
        }

        Ok(Vn200Driver {
            line,
            in_buf: RingBuffer::new(),
        })
    }

    /// One runtime-loop iteration: poll the UART into the ring buffer, run
    /// the ASCII parser to completion, returning the raw bytes read (for
    /// the raw-log sink) alongside every record produced (for the caller's
    /// mailboxes).
    pub fn poll(&mut self) -> Result<(Vec<u8>, Vec<Parsed>)> {
        let mut chunk = [0u8; 512];
        let n = self.line.read(&mut chunk)?;
        let raw = chunk[..n].to_vec();
        if n > 0 {
            self.in_buf.append_many(&raw);
        }

        let mut results = Vec::new();
        while let Some(parsed) = ascii_packet::poll_one(&mut self.in_buf) {
            results.push(parsed);
        }
        Ok((raw, results))
    }
}

/// Splits a batch of parsed frames into the latest GPS and IMU record of
/// each kind, for publication into their respective mailboxes. Every
/// discarded frame (bad checksum, short field list, unrecognized sentence
/// id) is logged at INFO per spec §4.8 steps 5-7.
pub fn latest_records(batch: &[Parsed]) -> (Option<GpsRecord>, Option<ImuRecord>) {
    let mut gps = None;
    let mut imu = None;
    for p in batch {
        match p {
            Parsed::Gps(r) => gps = Some(*r),
            Parsed::Imu(r) => imu = Some(*r),
            Parsed::ChecksumFailure => info!("VN200: discarded frame with bad checksum"),
            Parsed::FieldCountMismatch => info!("VN200: discarded frame with short field list"),
            Parsed::UnknownId(id) => info!("VN200: discarded frame with unknown sentence id {}", id),
        }
    }
    (gps, imu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_register_values_match_spec() {
        assert_eq!(Mode::ImuOnly.register_value(), 19);
        assert_eq!(Mode::GpsOnly.register_value(), 20);
        assert_eq!(Mode::Both.register_value(), 248);
    }

    #[test]
    fn checksummed_command_has_correct_trailer() {
        let cmd = checksummed("VNRRG,03");
        assert!(cmd.starts_with("$VNRRG,03*"));
        assert!(cmd.ends_with("\r\n"));
    }

    #[test]
    fn latest_records_keeps_most_recent_of_each_kind() {
        let imu = ImuRecord {
            mag: [0.0; 3],
            accel: [0.0; 3],
            gyro: [0.0; 3],
            temperature: 21.0,
            pressure: 84.0,
            timestamp: 1.0,
        };
        let batch = vec![Parsed::Imu(imu), Parsed::UnknownId("X".into())];
        let (gps, got_imu) = latest_records(&batch);
        assert!(gps.is_none());
        assert_eq!(got_imu, Some(imu));
    }
}
