//! Wire framing for master↔worker pipes (§4.12, §6): a fixed
//! `{u64 pid; u32 size; u8 quit; u8 pad[3]}` little-endian header followed
//! by `size` opaque bytes.

use std::io;

pub const HEADER_LEN: usize = 16;
pub const MAX_MESSAGE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub pid: u64,
    pub size: u32,
    pub quit: bool,
}

impl FrameHeader {
    pub fn encode(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..8].copy_from_slice(&self.pid.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
        out[12] = self.quit as u8;
        out
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let pid = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let quit = bytes[12] != 0;
        FrameHeader { pid, size, quit }
    }
}

/// A decoded message: the header plus its payload bytes.
#[derive(Debug, Clone)]
pub struct Message {
    pub pid: u64,
    pub quit: bool,
    pub payload: Vec<u8>,
}

/// Encode a full frame (header + payload) ready to write to the pipe.
/// Returns an error if `payload` exceeds `MAX_MESSAGE` (§3 invariant:
/// `0 < size <= MAX_MESSAGE`).
pub fn encode_frame(pid: u64, quit: bool, payload: &[u8]) -> io::Result<Vec<u8>> {
    if payload.is_empty() || payload.len() as u64 > MAX_MESSAGE as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload size {} outside 1..={MAX_MESSAGE}", payload.len()),
        ));
    }
    let header = FrameHeader {
        pid,
        size: payload.len() as u32,
        quit,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Incremental frame reassembly over a byte stream fed in arbitrary chunks,
/// mirroring the HTTP parser's "byte-streaming" shape (§4.6 analog for the
/// pipe protocol).
#[derive(Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        FrameReader::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete message out of the buffer, if any bytes
    /// received so far form a full header + payload.
    pub fn poll(&mut self) -> io::Result<Option<Message>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let header_bytes: [u8; HEADER_LEN] = self.buf[..HEADER_LEN].try_into().unwrap();
        let header = FrameHeader::decode(&header_bytes);
        if header.size == 0 || header.size > MAX_MESSAGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("cluster ipc frame size {} out of bounds", header.size),
            ));
        }
        let total = HEADER_LEN + header.size as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let payload = self.buf[HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(Message {
            pid: header.pid,
            quit: header.quit,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let header = FrameHeader {
            pid: 4242,
            size: 17,
            quit: true,
        };
        let encoded = header.encode();
        assert_eq!(FrameHeader::decode(&encoded), header);
    }

    #[test]
    fn reader_reassembles_a_frame_fed_in_pieces() {
        let frame = encode_frame(99, false, b"hello world").unwrap();
        let mut reader = FrameReader::new();
        reader.feed(&frame[..5]);
        assert!(reader.poll().unwrap().is_none());
        reader.feed(&frame[5..]);
        let msg = reader.poll().unwrap().unwrap();
        assert_eq!(msg.pid, 99);
        assert!(!msg.quit);
        assert_eq!(msg.payload, b"hello world");
    }

    #[test]
    fn reader_reassembles_back_to_back_frames() {
        let a = encode_frame(1, false, b"first").unwrap();
        let b = encode_frame(2, true, b"second").unwrap();
        let mut reader = FrameReader::new();
        reader.feed(&a);
        reader.feed(&b);
        let first = reader.poll().unwrap().unwrap();
        assert_eq!(first.payload, b"first");
        let second = reader.poll().unwrap().unwrap();
        assert_eq!(second.payload, b"second");
        assert!(second.quit);
        assert!(reader.poll().unwrap().is_none());
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(encode_frame(1, false, b"").is_err());
    }
}
