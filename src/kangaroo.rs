//! Motion controller driver (C10): Kangaroo x2, wrapped over a serial
//! line at 9600 baud. Grounded on
//! `original_source/sensors/robot_test/src/kangaroo.c` — the
//! fully-implemented authoritative driver (the `control/src/kangaroo*.c`
//! files are empty scratch stubs, per spec §9 Open Question 1, and are
//! not used as grounding here).

use strum_macros::Display;

use buffer::RingBuffer;
use error::Result;
use serial::SerialLine;
use util::now_double;

pub const KANGAROO_BAUD: u32 = 9600;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display)]
pub enum PacketType {
    Error,
    Position,
    Speed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KangarooPacket {
    pub channel: u8,
    pub kind: PacketType,
    pub value: i32,
    pub timestamp: f64,
    pub valid: bool,
}

/// The odometry pairing heuristic (spec §4.10, §9 Open Question 4): when
/// the latest left/right POSITION packets fall within the configured
/// window of each other, emit one row and clear both slots.
struct OdometryPairer {
    window_s: f64,
    pending_left: Option<KangarooPacket>,
    pending_right: Option<KangarooPacket>,
}

impl OdometryPairer {
    fn new(window_s: f64) -> Self {
        OdometryPairer {
            window_s,
            pending_left: None,
            pending_right: None,
        }
    }

    fn observe(&mut self, packet: KangarooPacket) -> Option<(i32, i32, f64)> {
        if packet.kind != PacketType::Position || !packet.valid {
            return None;
        }
        match packet.channel {
            1 => self.pending_left = Some(packet),
            2 => self.pending_right = Some(packet),
            _ => return None,
        }

        if let (Some(left), Some(right)) = (self.pending_left, self.pending_right) {
            if (left.timestamp - right.timestamp).abs() <= self.window_s {
                self.pending_left = None;
                self.pending_right = None;
                let earlier = left.timestamp.min(right.timestamp);
                return Some((left.value, right.value, earlier));
            }
        }
        None
    }
}

pub struct KangarooDriver {
    line: SerialLine,
    in_buf: RingBuffer,
    pairer: OdometryPairer,
}

impl KangarooDriver {
    /// Opens `dev_path` and runs the start/unit init sequence:
    /// `1,start`, `2,start`, `1,units798mm=420lines`,
    /// `2,units798mm=420lines`.
    pub fn init(dev_path: &str, pairing_window_s: f64) -> Result<Self> {
        let mut line = SerialLine::open(dev_path, KANGAROO_BAUD)?;
        for cmd in &[
            "1,start\r\n",
            "2,start\r\n",
            "1,units798mm=420lines\r\n",
            "2,units798mm=420lines\r\n",
        ] {
            line.write(cmd.as_bytes())?;
        }
        Ok(KangarooDriver {
            line,
            in_buf: RingBuffer::new(),
            pairer: OdometryPairer::new(pairing_window_s),
        })
    }

    /// Commands channel 1 or 2 at a signed speed: `<ch>,s<signed-int>\r\n`.
    pub fn command_speed(&mut self, channel: u8, speed: i32) -> Result<()> {
        let cmd = format!("{},s{}\r\n", channel, speed);
        self.line.write(cmd.as_bytes())?;
        Ok(())
    }

    /// Requests position on both channels: `1,getp` / `2,getp`.
    pub fn request_position(&mut self) -> Result<()> {
        self.line.write(b"1,getp\r\n")?;
        self.line.write(b"2,getp\r\n")?;
        Ok(())
    }

    /// Sends the shutdown sequence: `1,powerdown`, `2,powerdown`.
    pub fn shutdown(mut self) -> Result<()> {
        self.line.write(b"1,powerdown\r\n")?;
        self.line.write(b"2,powerdown\r\n")?;
        Ok(())
    }

    /// Polls the serial line into the input ring buffer. Returns the bytes
    /// read, for the caller to forward to a raw-log sink.
    pub fn poll(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; 256];
        let n = self.line.read(&mut chunk)?;
        let raw = chunk[..n].to_vec();
        if n > 0 {
            self.in_buf.append_many(&raw);
        }
        Ok(raw)
    }

    /// Parses all complete `\r\n`-terminated lines currently buffered,
    /// feeding each through `parse_line`. Returns the odometry CSV row
    /// (`left_mm,right_mm,timestamp`) produced, if the pairing heuristic
    /// fired during this call.
    pub fn consume(&mut self) -> Option<(i32, i32, f64)> {
        let mut odometry_row = None;
        while let Some(line) = extract_line(&mut self.in_buf) {
            if let Some(packet) = parse_line(&line) {
                if let Some(row) = self.pairer.observe(packet) {
                    odometry_row = Some(row);
                }
            }
        }
        odometry_row
    }
}

/// Extracts one `\r`- or `\n`-terminated line from the front of `buf`,
/// removing it (and its terminator) from the buffer. Returns `None` if no
/// terminator has arrived yet.
fn extract_line(buf: &mut RingBuffer) -> Option<Vec<u8>> {
    let len = buf.len();
    let term = (0..len).find(|&i| matches!(buf.at(i), b'\r' | b'\n'))?;
    let line: Vec<u8> = (0..term).map(|i| buf.at(i)).collect();
    // Consume the line plus its terminator, and a following paired \n\r if present.
    let mut consume = term + 1;
    if consume < len && matches!(buf.at(consume), b'\r' | b'\n') && buf.at(consume) != buf.at(term)
    {
        consume += 1;
    }
    buf.remove_front(consume);
    Some(line)
}

/// Parses a reply line of the form `<ch>,<letter><signed-int>`, e.g.
/// `1,p120`. Letter maps case-insensitively: `p`->Position, `s`->Speed,
/// `e`->Error. Unrecognized letters mark the packet invalid.
fn parse_line(line: &[u8]) -> Option<KangarooPacket> {
    let s = std::str::from_utf8(line).ok()?;
    let mut parts = s.splitn(2, ',');
    let channel: u8 = parts.next()?.trim().parse().ok()?;
    let rest = parts.next()?;
    let mut chars = rest.chars();
    let letter = chars.next()?;
    let value: i32 = chars.as_str().trim().parse().ok()?;

    let (kind, valid) = match letter.to_ascii_lowercase() {
        'p' => (PacketType::Position, true),
        's' => (PacketType::Speed, true),
        'e' => (PacketType::Error, true),
        _ => (PacketType::Error, false),
    };

    Some(KangarooPacket {
        channel,
        kind,
        value,
        timestamp: now_double(),
        valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_position_reply() {
        let pkt = parse_line(b"1,p120").unwrap();
        assert_eq!(pkt.channel, 1);
        assert_eq!(pkt.kind, PacketType::Position);
        assert_eq!(pkt.value, 120);
        assert!(pkt.valid);
    }

    #[test]
    fn parses_negative_value() {
        let pkt = parse_line(b"2,p-118").unwrap();
        assert_eq!(pkt.value, -118);
    }

    #[test]
    fn unrecognized_letter_is_invalid() {
        let pkt = parse_line(b"1,z99").unwrap();
        assert!(!pkt.valid);
    }

    #[test]
    fn extract_line_consumes_crlf_pair() {
        let mut buf = RingBuffer::new();
        buf.append_many(b"1,p120\r\n2,p-118\r\n");
        let line = extract_line(&mut buf).unwrap();
        assert_eq!(line, b"1,p120");
        let line2 = extract_line(&mut buf).unwrap();
        assert_eq!(line2, b"2,p-118");
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn odometry_pairing_within_window_emits_row() {
        let left = KangarooPacket {
            channel: 1,
            kind: PacketType::Position,
            value: 120,
            timestamp: 1.000,
            valid: true,
        };
        let right = KangarooPacket {
            channel: 2,
            kind: PacketType::Position,
            value: -118,
            timestamp: 1.020,
            valid: true,
        };

        let mut pairer = OdometryPairer::new(0.050);
        assert_eq!(pairer.observe(left), None);
        let row = pairer.observe(right).expect("pair within window");
        assert_eq!(row, (120, -118, 1.000));
    }

    #[test]
    fn odometry_pairing_outside_window_emits_nothing() {
        let left = KangarooPacket {
            channel: 1,
            kind: PacketType::Position,
            value: 1,
            timestamp: 1.100,
            valid: true,
        };
        let right = KangarooPacket {
            channel: 2,
            kind: PacketType::Position,
            value: 2,
            timestamp: 1.200,
            valid: true,
        };
        let mut pairer = OdometryPairer::new(0.050);
        assert_eq!(pairer.observe(left), None);
        assert_eq!(pairer.observe(right), None);
    }
}
