//! RFC 7540 frame header codec: the 9-byte `{length(24), type(8), flags(8),
//! R(1)+stream_id(31)}` prefix shared by every frame type.

use breakwater_common::ProtocolError;

pub const FRAME_HEADER_LEN: usize = 9;

pub const TYPE_DATA: u8 = 0x0;
pub const TYPE_HEADERS: u8 = 0x1;
pub const TYPE_PRIORITY: u8 = 0x2;
pub const TYPE_RST_STREAM: u8 = 0x3;
pub const TYPE_SETTINGS: u8 = 0x4;
pub const TYPE_PUSH_PROMISE: u8 = 0x5;
pub const TYPE_PING: u8 = 0x6;
pub const TYPE_GOAWAY: u8 = 0x7;
pub const TYPE_WINDOW_UPDATE: u8 = 0x8;
pub const TYPE_CONTINUATION: u8 = 0x9;

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_ACK: u8 = 0x1;

/// The connection preface every HTTP/2 connection must start with (§6).
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub fn alpn_protocols() -> &'static [&'static [u8]] {
    &[b"h2", b"http/1.1"]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn encode(self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[0..3].copy_from_slice(&self.length.to_be_bytes()[1..4]);
        out[3] = self.frame_type;
        out[4] = self.flags;
        out[5..9].copy_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8; FRAME_HEADER_LEN]) -> Self {
        let length = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & 0x7FFF_FFFF;
        FrameHeader {
            length,
            frame_type: bytes[3],
            flags: bytes[4],
            stream_id,
        }
    }
}

/// Byte-streaming frame parse: returns `Ok(None)` if `input` doesn't yet
/// contain a full frame, mirroring the HTTP/1.x parser's feed shape.
pub fn try_parse_frame(input: &[u8]) -> Result<Option<(FrameHeader, &[u8], usize)>, ProtocolError> {
    if input.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let header_bytes: [u8; FRAME_HEADER_LEN] = input[..FRAME_HEADER_LEN].try_into().unwrap();
    let header = FrameHeader::decode(&header_bytes);
    let total = FRAME_HEADER_LEN + header.length as usize;
    if input.len() < total {
        return Ok(None);
    }
    let payload = &input[FRAME_HEADER_LEN..total];
    Ok(Some((header, payload, total)))
}

pub fn encode_frame(header: FrameHeader, payload: &[u8]) -> Vec<u8> {
    let mut header = header;
    header.length = payload.len() as u32;
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    out
}

pub fn encode_settings_frame(params: &[(u16, u32)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(params.len() * 6);
    for &(id, value) in params {
        payload.extend_from_slice(&id.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    encode_frame(
        FrameHeader {
            length: 0,
            frame_type: TYPE_SETTINGS,
            flags: 0,
            stream_id: 0,
        },
        &payload,
    )
}

pub fn parse_settings_payload(payload: &[u8]) -> Result<Vec<(u16, u32)>, ProtocolError> {
    if payload.len() % 6 != 0 {
        return Err(ProtocolError::H2FrameError(
            "SETTINGS payload length not a multiple of 6".into(),
        ));
    }
    Ok(payload
        .chunks_exact(6)
        .map(|chunk| {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            (id, value)
        })
        .collect())
}

pub fn settings_ack() -> Vec<u8> {
    encode_frame(
        FrameHeader {
            length: 0,
            frame_type: TYPE_SETTINGS,
            flags: FLAG_ACK,
            stream_id: 0,
        },
        &[],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_bytes() {
        let header = FrameHeader {
            length: 42,
            frame_type: TYPE_HEADERS,
            flags: FLAG_END_HEADERS,
            stream_id: 7,
        };
        let encoded = header.encode();
        assert_eq!(FrameHeader::decode(&encoded), header);
    }

    #[test]
    fn stream_id_reserved_bit_is_masked_off() {
        let header = FrameHeader {
            length: 0,
            frame_type: TYPE_DATA,
            flags: 0,
            stream_id: 0x8000_0003,
        };
        let encoded = header.encode();
        let decoded = FrameHeader::decode(&encoded);
        assert_eq!(decoded.stream_id, 3);
    }

    #[test]
    fn settings_frame_round_trips_params() {
        let params = vec![(0x3u16, 100u32), (0x4, 65535)];
        let frame = encode_settings_frame(&params);
        let (header, payload, consumed) = try_parse_frame(&frame).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(header.frame_type, TYPE_SETTINGS);
        let decoded = parse_settings_payload(payload).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn incomplete_frame_returns_none() {
        let frame = encode_settings_frame(&[(0x1, 4096)]);
        assert!(try_parse_frame(&frame[..FRAME_HEADER_LEN + 2]).unwrap().is_none());
    }

    #[test]
    fn malformed_settings_length_is_rejected() {
        assert!(parse_settings_payload(&[0u8; 5]).is_err());
    }
}
