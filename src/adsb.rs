//! Sensor driver (C9 wiring): pingUSB ADS-B receiver, raw UART polling and
//! binary frame dispatch. Grounded on
//! `original_source/adsb/pingusb.c`'s `pingUSBInit`/`pingUSBPoll` — unlike
//! the VN200 (C11), the device needs no init command dialogue: it streams
//! frames as soon as the line is opened.

use buffer::RingBuffer;
use binary_packet::{self, BinaryParsed};
use error::Result;
use serial::SerialLine;

pub const ADSB_BAUD: u32 = 57600;

pub struct AdsbDriver {
    line: SerialLine,
    in_buf: RingBuffer,
}

impl AdsbDriver {
    pub fn init(dev_path: &str, baud: u32) -> Result<Self> {
        let line = SerialLine::open(dev_path, baud)?;
        Ok(AdsbDriver {
            line,
            in_buf: RingBuffer::new(),
        })
    }

    /// One runtime-loop iteration: read whatever bytes are currently
    /// available, returning them alongside every frame the parser could
    /// produce from the accumulated buffer, so the caller can forward the
    /// raw bytes to a raw-log sink and the frames to a CSV sink.
    pub fn poll(&mut self) -> Result<(Vec<u8>, Vec<BinaryParsed>)> {
        let mut chunk = [0u8; 512];
        let n = self.line.read(&mut chunk)?;
        let raw = chunk[..n].to_vec();
        if n > 0 {
            self.in_buf.append_many(&raw);
        }

        let mut results = Vec::new();
        while let Some(parsed) = binary_packet::poll_one(&mut self.in_buf) {
            results.push(parsed);
        }
        Ok((raw, results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_reports_open_error_for_missing_device() {
        let err = AdsbDriver::init("/dev/does-not-exist-mrfusion-adsb", ADSB_BAUD);
        assert!(err.is_err());
    }
}
