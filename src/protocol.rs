//! Fixed 4-byte-tag TCP mesh protocol (spec §6). Framing is
//! length-implicit: a reader accumulates bytes into a ring buffer and
//! scans for a known tag, consuming either 4 bytes (`stop`, `ctlx`) or
//! `4 + 8` bytes (`ctls`, `ctlr`) or `4 + 8 + 4` bytes (`init`).

use buffer::RingBuffer;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Message {
    Init { start_time: f64, key: u32 },
    Stop,
    Ctlx,
    Ctls { speed_mps: f64 },
    Ctlr { rotation_radps: f64 },
}

const TAG_INIT: &[u8; 4] = b"init";
const TAG_STOP: &[u8; 4] = b"stop";
const TAG_CTLX: &[u8; 4] = b"ctlx";
const TAG_CTLS: &[u8; 4] = b"ctls";
const TAG_CTLR: &[u8; 4] = b"ctlr";

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Init { start_time, key } => {
                let mut buf = Vec::with_capacity(16);
                buf.extend_from_slice(TAG_INIT);
                buf.extend_from_slice(&start_time.to_le_bytes());
                buf.extend_from_slice(&key.to_le_bytes());
                buf
            }
            Message::Stop => TAG_STOP.to_vec(),
            Message::Ctlx => TAG_CTLX.to_vec(),
            Message::Ctls { speed_mps } => {
                let mut buf = Vec::with_capacity(12);
                buf.extend_from_slice(TAG_CTLS);
                buf.extend_from_slice(&speed_mps.to_le_bytes());
                buf
            }
            Message::Ctlr { rotation_radps } => {
                let mut buf = Vec::with_capacity(12);
                buf.extend_from_slice(TAG_CTLR);
                buf.extend_from_slice(&rotation_radps.to_le_bytes());
                buf
            }
        }
    }
}

/// Scans `buf` for one recognized tag at its front and decodes the
/// message, consuming exactly the bytes that belong to it. An
/// unrecognized tag consumes one byte and returns `None` (spec §7:
/// "Unrecognized TCP tag: consume one byte and retry").
pub fn poll_one(buf: &mut RingBuffer) -> Option<Message> {
    if buf.len() < 4 {
        return None;
    }
    let tag: [u8; 4] = [buf.at(0), buf.at(1), buf.at(2), buf.at(3)];

    match &tag {
        b"init" => {
            if buf.len() < 16 {
                return None;
            }
            let mut st = [0u8; 8];
            let mut k = [0u8; 4];
            for i in 0..8 {
                st[i] = buf.at(4 + i);
            }
            for i in 0..4 {
                k[i] = buf.at(12 + i);
            }
            buf.remove_front(16);
            Some(Message::Init {
                start_time: f64::from_le_bytes(st),
                key: u32::from_le_bytes(k),
            })
        }
        b"stop" => {
            buf.remove_front(4);
            Some(Message::Stop)
        }
        b"ctlx" => {
            buf.remove_front(4);
            Some(Message::Ctlx)
        }
        b"ctls" => {
            if buf.len() < 12 {
                return None;
            }
            let mut v = [0u8; 8];
            for i in 0..8 {
                v[i] = buf.at(4 + i);
            }
            buf.remove_front(12);
            Some(Message::Ctls {
                speed_mps: f64::from_le_bytes(v),
            })
        }
        b"ctlr" => {
            if buf.len() < 12 {
                return None;
            }
            let mut v = [0u8; 8];
            for i in 0..8 {
                v[i] = buf.at(4 + i);
            }
            buf.remove_front(12);
            Some(Message::Ctlr {
                rotation_radps: f64::from_le_bytes(v),
            })
        }
        _ => {
            buf.remove_front(1);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_round_trips() {
        let msg = Message::Init {
            start_time: 1.7e9,
            key: 0xDEAD_BEEF,
        };
        let mut buf = RingBuffer::new();
        buf.append_many(&msg.encode());
        assert_eq!(poll_one(&mut buf), Some(msg));
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn literal_init_handshake_bytes_decode() {
        // '69 6E 69 74' | f64 1.7e9 LE | u32 0xDEADBEEF LE
        let mut raw = Vec::new();
        raw.extend_from_slice(b"init");
        raw.extend_from_slice(&1.7e9f64.to_le_bytes());
        raw.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let mut buf = RingBuffer::new();
        buf.append_many(&raw);
        match poll_one(&mut buf).unwrap() {
            Message::Init { start_time, key } => {
                assert!((start_time - 1.7e9).abs() < 1.0);
                assert_eq!(key, 0xDEAD_BEEF);
            }
            other => panic!("expected Init, got {:?}", other),
        }
    }

    #[test]
    fn stop_is_four_bytes() {
        let mut buf = RingBuffer::new();
        buf.append_many(&Message::Stop.encode());
        assert_eq!(poll_one(&mut buf), Some(Message::Stop));
    }

    #[test]
    fn unrecognized_tag_consumes_one_byte() {
        let mut buf = RingBuffer::new();
        buf.append_many(b"xxxxinit");
        assert_eq!(poll_one(&mut buf), None);
        assert_eq!(buf.len(), 7);
    }

    #[test]
    fn incomplete_ctls_waits_for_body() {
        let mut buf = RingBuffer::new();
        buf.append_many(b"ctls\x00\x00\x00"); // short body
        assert_eq!(poll_one(&mut buf), None);
        assert_eq!(buf.len(), 7); // nothing consumed, waiting for more
    }
}
