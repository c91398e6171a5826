//! Binary packet parser (C9): frame synchronization and field extraction
//! for the ADS-B 0xFE/length/type/data/CRC frame.
//!
//! Grounded on `original_source/adsb/pingusb.c`'s `pingUSBParse`.

use buffer::RingBuffer;
use checksum::x25_crc;

const FRAME_LEN: usize = 46;
const LEN_FIELD: u8 = 0x26;
const MSGID_FIELD: u8 = 246;
const CRC_EXTRA: u8 = 184;

bitflags! {
    /// Per-field validity bitmask carried in the traffic report payload.
    pub struct ValidFlags: u16 {
        const VALID_ALTITUDE  = 0b0000_0001;
        const VALID_HEADING   = 0b0000_0010;
        const VALID_VELOCITY  = 0b0000_0100;
        const VALID_CALLSIGN  = 0b0000_1000;
        const VALID_SQUAWK    = 0b0001_0000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Message246 {
    pub icao_address: u32,
    pub lat_e7: i32,
    pub lon_e7: i32,
    pub alt_mm: i32,
    pub heading_cdeg: u16,
    pub h_velocity_cms: u16,
    pub v_velocity_cms: i16,
    pub valid_flags: ValidFlags,
    pub squawk: u16,
    pub altitude_type: u8,
    pub callsign: [u8; 9],
    pub emitter_type: u8,
    pub tslc: u8,
}

#[derive(Debug, PartialEq)]
pub enum BinaryParsed {
    Frame(Message246),
    ChecksumFailure,
}

/// Scans `buf` for the three-byte signature `(0xFE, 0x26, .., .., ..,
/// 246)` at offsets `i, i+1, i+5`, validates the trailing CRC, and
/// extracts the payload. On checksum failure, advances by exactly one
/// byte (not one frame) so a spurious signature can be stepped past.
/// Returns `None` if fewer than `FRAME_LEN` bytes are buffered from the
/// first candidate signature onward.
pub fn poll_one(buf: &mut RingBuffer) -> Option<BinaryParsed> {
    let len = buf.len();
    if len < FRAME_LEN {
        return None;
    }

    let mut i = 0;
    while i + FRAME_LEN <= len {
        if buf.at(i) == 0xFE && buf.at(i + 1) == LEN_FIELD && buf.at(i + 5) == MSGID_FIELD {
            let frame: Vec<u8> = (i..i + FRAME_LEN).map(|k| buf.at(k)).collect();

            let crc_region = &frame[1..44];
            let crc_computed = x25_crc(crc_region, CRC_EXTRA);
            let crc_read = u16::from(frame[44]) | (u16::from(frame[45]) << 8);

            if crc_computed != crc_read {
                buf.remove_front(i + 1);
                return Some(BinaryParsed::ChecksumFailure);
            }

            let payload = &frame[6..44];
            let msg = decode_payload(payload);
            buf.remove_front(i + FRAME_LEN);
            return Some(BinaryParsed::Frame(msg));
        }
        i += 1;
    }

    // Signature not found (or found too close to the end to validate);
    // wait for more input without consuming anything.
    None
}

fn decode_payload(p: &[u8]) -> Message246 {
    let icao_address = u32::from(p[0]) | (u32::from(p[1]) << 8) | (u32::from(p[2]) << 16);
    let lat_e7 = i32::from_le_bytes([p[3], p[4], p[5], p[6]]);
    let lon_e7 = i32::from_le_bytes([p[7], p[8], p[9], p[10]]);
    let alt_mm = i32::from_le_bytes([p[11], p[12], p[13], p[14]]);
    let heading_cdeg = u16::from_le_bytes([p[15], p[16]]);
    let h_velocity_cms = u16::from_le_bytes([p[17], p[18]]);
    let v_velocity_cms = i16::from_le_bytes([p[19], p[20]]);
    let valid_flags = ValidFlags::from_bits_truncate(u16::from_le_bytes([p[21], p[22]]));
    let squawk = u16::from_le_bytes([p[23], p[24]]);
    let altitude_type = p[25];
    let mut callsign = [0u8; 9];
    callsign.copy_from_slice(&p[26..35]);
    let emitter_type = p[35];
    let tslc = p[36];

    Message246 {
        icao_address,
        lat_e7,
        lon_e7,
        alt_mm,
        heading_cdeg,
        h_velocity_cms,
        v_velocity_cms,
        valid_flags,
        squawk,
        altitude_type,
        callsign,
        emitter_type,
        tslc,
    }
}

fn encode_frame(seq: u8, sysid: u8, comp: u8, payload: &[u8; 38]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.push(0xFE);
    frame.push(LEN_FIELD);
    frame.push(seq);
    frame.push(sysid);
    frame.push(comp);
    frame.push(MSGID_FIELD);
    frame.extend_from_slice(payload);
    let crc = x25_crc(&frame[1..44], CRC_EXTRA);
    frame.push((crc & 0xFF) as u8);
    frame.push((crc >> 8) as u8);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> [u8; 38] {
        let mut p = [0u8; 38];
        p[0] = 0xAB;
        p[1] = 0xCD;
        p[2] = 0xEF; // icao
        p[26..35].copy_from_slice(b"N12345AB\0");
        p
    }

    #[test]
    fn parses_valid_frame() {
        let mut buf = RingBuffer::new();
        let frame = encode_frame(1, 1, 0, &sample_payload());
        buf.append_many(&frame);

        match poll_one(&mut buf).unwrap() {
            BinaryParsed::Frame(msg) => {
                assert_eq!(msg.icao_address, 0x00EFCDAB);
            }
            other => panic!("expected Frame, got {:?}", other),
        }
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn checksum_failure_advances_by_one_byte() {
        let mut buf = RingBuffer::new();
        let mut frame = encode_frame(1, 1, 0, &sample_payload());
        frame[44] ^= 0xFF; // corrupt the CRC
        buf.append_many(&frame);

        let before = buf.len();
        assert_eq!(poll_one(&mut buf), Some(BinaryParsed::ChecksumFailure));
        assert_eq!(buf.len(), before - 1);
    }

    #[test]
    fn waits_for_more_input_when_signature_near_end() {
        let mut buf = RingBuffer::new();
        // Signature present but frame incomplete (short by a few bytes).
        let frame = encode_frame(1, 1, 0, &sample_payload());
        buf.append_many(&frame[..FRAME_LEN - 5]);
        assert_eq!(poll_one(&mut buf), None);
    }
}
