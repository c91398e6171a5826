//! ASCII packet parser (C8): frame extraction, checksum validation, and
//! typed dispatch for `$VN***` sentences, e.g. `$VNIMU,...*6D\r\n`.
//!
//! Grounded on `original_source/navigation/src/vn200.c`'s parse loop.

use buffer::RingBuffer;
use checksum::xor8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpsRecord {
    pub time_of_week: f64,
    pub week: u16,
    pub fix_type: u8,
    pub num_sats: u8,
    pub pos_ecef: [f64; 3],
    pub vel_ned: [f32; 3],
    pub pos_accuracy: [f32; 3],
    pub speed_accuracy: f32,
    pub time_accuracy: f32,
    pub timestamp: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImuRecord {
    pub mag: [f64; 3],
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
    pub temperature: f64,
    pub pressure: f64,
    pub timestamp: f64,
}

#[derive(Debug, PartialEq)]
pub enum Parsed {
    Gps(GpsRecord),
    Imu(ImuRecord),
    /// A well-formed, checksummed frame with an id this parser does not
    /// know how to dispatch.
    UnknownId(String),
    /// A checksummed frame whose field count was short.
    FieldCountMismatch,
    /// The trailer's checksum did not match the computed one.
    ChecksumFailure,
}

/// Scans `buf` for one complete frame, runs it to completion, and advances
/// `buf` past whatever it consumed. Returns `None` if no complete frame is
/// currently available (an incomplete frame is left for the next poll).
pub fn poll_one(buf: &mut RingBuffer) -> Option<Parsed> {
    let len = buf.len();

    let dollar = (0..len).find(|&i| buf.at(i) == b'$')?;

    // The search for '*' stops three bytes before end-of-buffer to leave
    // room for the checksum trailer ("*HH").
    if len < 3 {
        return None;
    }
    let search_end = len - 3;
    let star = (dollar + 1..=search_end).find(|&i| buf.at(i) == b'*');
    let star = match star {
        Some(s) => s,
        None => return None, // incomplete frame; wait for more input
    };

    // Need two trailer hex digits plus \r\n after '*', i.e. up to star+4.
    if star + 2 >= len {
        return None;
    }

    let hex_hi = buf.at(star + 1);
    let hex_lo = buf.at(star + 2);
    let chk_read = match (hex_digit(hex_hi), hex_digit(hex_lo)) {
        (Some(hi), Some(lo)) => (hi << 4) | lo,
        _ => {
            buf.remove_front(star + 3);
            return Some(Parsed::ChecksumFailure);
        }
    };

    let body: Vec<u8> = (dollar + 1..star).map(|i| buf.at(i)).collect();
    let chk_computed = xor8(&body);

    if chk_read != chk_computed {
        buf.remove_front(star + 3);
        return Some(Parsed::ChecksumFailure);
    }

    let id_end = body.iter().position(|&b| b == b',').unwrap_or(body.len());
    let id = String::from_utf8_lossy(&body[..id_end]).to_string();
    let fields_raw = if id_end < body.len() {
        &body[id_end + 1..]
    } else {
        &[][..]
    };
    let fields: Vec<&str> = std::str::from_utf8(fields_raw)
        .unwrap_or("")
        .split(',')
        .collect();

    buf.remove_front(star + 3);

    let result = match id.as_str() {
        "VNGPE" => parse_gps(&fields).map(Parsed::Gps).unwrap_or(Parsed::FieldCountMismatch),
        "VNIMU" => parse_imu(&fields).map(Parsed::Imu).unwrap_or(Parsed::FieldCountMismatch),
        _ => Parsed::UnknownId(id),
    };
    Some(result)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// 15 fields, per spec §3/§4.8, in VNGPE order: time-of-week, week, fix,
/// nsats, ecef x/y/z, vel n/e/d, pos-accuracy n/e/d, speed-accuracy,
/// time-accuracy.
fn parse_gps(fields: &[&str]) -> Option<GpsRecord> {
    if fields.len() < 15 {
        return None;
    }
    Some(GpsRecord {
        time_of_week: fields[0].parse().ok()?,
        week: fields[1].parse().ok()?,
        fix_type: fields[2].parse().ok()?,
        num_sats: fields[3].parse().ok()?,
        pos_ecef: [
            fields[4].parse().ok()?,
            fields[5].parse().ok()?,
            fields[6].parse().ok()?,
        ],
        vel_ned: [
            fields[7].parse().ok()?,
            fields[8].parse().ok()?,
            fields[9].parse().ok()?,
        ],
        pos_accuracy: [
            fields[10].parse().ok()?,
            fields[11].parse().ok()?,
            fields[12].parse().ok()?,
        ],
        speed_accuracy: fields[13].parse().ok()?,
        time_accuracy: fields[14].parse().ok()?,
        timestamp: ::util::now_double(),
    })
}

/// 11 fields, per spec §3/§4.8: mag x/y/z, accel x/y/z, gyro x/y/z, temp,
/// pressure.
fn parse_imu(fields: &[&str]) -> Option<ImuRecord> {
    if fields.len() < 11 {
        return None;
    }
    Some(ImuRecord {
        mag: [
            fields[0].parse().ok()?,
            fields[1].parse().ok()?,
            fields[2].parse().ok()?,
        ],
        accel: [
            fields[3].parse().ok()?,
            fields[4].parse().ok()?,
            fields[5].parse().ok()?,
        ],
        gyro: [
            fields[6].parse().ok()?,
            fields[7].parse().ok()?,
            fields[8].parse().ok()?,
        ],
        temperature: fields[9].parse().ok()?,
        pressure: fields[10].parse().ok()?,
        timestamp: ::util::now_double(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_sentence(buf: &mut RingBuffer, s: &str) {
        buf.append_many(s.as_bytes());
    }

    #[test]
    fn parses_known_imu_sentence() {
        let mut buf = RingBuffer::new();
        push_sentence(
            &mut buf,
            "$VNIMU,+01.0854,-02.0143,+02.1980,-01.157,+00.271,-09.847,\
+00.001114,+00.000727,+00.002568,+21.4,+084.334*6D\r\n",
        );
        match poll_one(&mut buf).unwrap() {
            Parsed::Imu(rec) => {
                assert!((rec.mag[0] - 1.0854).abs() < 1e-9);
                assert!((rec.accel[2] - (-9.847)).abs() < 1e-9);
                assert!((rec.temperature - 21.4).abs() < 1e-9);
            }
            other => panic!("expected Imu, got {:?}", other),
        }
        assert_eq!(buf.len(), 2); // trailing \r\n left behind is consumed too
    }

    #[test]
    fn parses_known_gps_sentence() {
        let mut buf = RingBuffer::new();
        push_sentence(
            &mut buf,
            "$VNGPE,570937.199558,2075,3,07,-2006902.850,-4857470.210,\
+3604176.410,+000.110,-000.680,+000.170,+019.320,+016.935,+016.758,+001.312,9.00E-09*07\r\n",
        );
        match poll_one(&mut buf).unwrap() {
            Parsed::Gps(rec) => {
                assert_eq!(rec.week, 2075);
                assert_eq!(rec.fix_type, 3);
                assert_eq!(rec.num_sats, 7);
                assert!((rec.pos_ecef[2] - 3604176.410).abs() < 1e-6);
                assert!((rec.speed_accuracy - 1.312).abs() < 1e-6);
            }
            other => panic!("expected Gps, got {:?}", other),
        }
    }

    #[test]
    fn bad_checksum_is_discarded_and_resyncs() {
        let mut buf = RingBuffer::new();
        push_sentence(
            &mut buf,
            "$VNIMU,+01.0854,-02.0143,+02.1980,-01.157,+00.271,-09.847,\
+00.001114,+00.000727,+00.002568,+21.4,+084.334*00\r\n",
        );
        assert_eq!(poll_one(&mut buf), Some(Parsed::ChecksumFailure));
        assert_eq!(buf.len(), 2);

        push_sentence(
            &mut buf,
            "$VNIMU,+01.0854,-02.0143,+02.1980,-01.157,+00.271,-09.847,\
+00.001114,+00.000727,+00.002568,+21.4,+084.334*6D\r\n",
        );
        let second = poll_one(&mut buf);
        assert!(matches!(second, Some(Parsed::Imu(_)) | Some(Parsed::ChecksumFailure)));
    }

    #[test]
    fn incomplete_frame_waits_for_more_input() {
        let mut buf = RingBuffer::new();
        push_sentence(&mut buf, "$VNIMU,+01.0854");
        assert!(poll_one(&mut buf).is_none());
        assert_eq!(buf.len(), "$VNIMU,+01.0854".len());
    }

    #[test]
    fn unknown_id_is_reported_and_consumed() {
        let mut buf = RingBuffer::new();
        let body = b"VNXXX,1,2,3";
        let chk = xor8(body);
        let s = format!("$VNXXX,1,2,3*{:02X}\r\n", chk);
        push_sentence(&mut buf, &s);
        assert_eq!(poll_one(&mut buf), Some(Parsed::UnknownId("VNXXX".to_string())));
    }
}
