//! The HTTP/2 adapter (§4.9): multiplexes streams over the same
//! header/body/compression model C7 already builds, using the `hpack`
//! crate for RFC 7541 header compression (no HPACK implementation exists
//! anywhere in the retrieval pack, so this pulls in the standalone crate
//! rather than hand-rolling a Huffman/static-table codec).

pub mod frame;
pub mod settings;

use std::collections::HashMap;

use breakwater_common::ProtocolError;

use crate::http1::message::Headers;
use frame::{FrameHeader, FLAG_END_HEADERS, FLAG_END_STREAM, TYPE_DATA, TYPE_HEADERS};
pub use settings::Settings;

/// Per-connection HPACK state plus the settings negotiated with the peer.
/// One `Connection` is created per HTTP/2 socket; it has no knowledge of
/// the transport, only of bytes in and bytes out.
pub struct Connection {
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
    pub local_settings: Settings,
    pub peer_settings: Settings,
    streams: HashMap<u32, StreamState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl Connection {
    pub fn new(local_settings: Settings) -> Self {
        Connection {
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(),
            local_settings,
            peer_settings: Settings::default(),
            streams: HashMap::new(),
        }
    }

    /// The connection preface plus an initial `SETTINGS` frame, sent once
    /// at connection start.
    pub fn opening_bytes(&self) -> Vec<u8> {
        let mut out = frame::PREFACE.to_vec();
        out.extend(frame::encode_settings_frame(&self.local_settings.to_wire_params()));
        out
    }

    /// Apply a `SETTINGS` frame received from the peer, replying with an
    /// ack unless the frame itself was already an ack.
    pub fn on_settings_frame(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<Option<Vec<u8>>, ProtocolError> {
        if header.flags & frame::FLAG_ACK != 0 {
            return Ok(None);
        }
        let params = frame::parse_settings_payload(payload)?;
        self.peer_settings.apply_wire_params(&params);
        Ok(Some(frame::settings_ack()))
    }

    /// Encode `headers` as a `send(stream_id, headers, flags)` HEADERS
    /// frame (§4.9). Continuation frames are not emitted: this adapter
    /// relies on `SETTINGS_MAX_FRAME_SIZE` being large enough for one
    /// block, matching every other module's "byte-exact, no partial
    /// framing surprises" posture.
    pub fn send_headers(&mut self, stream_id: u32, headers: &Headers, end_stream: bool) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers
            .iter()
            .map(|(k, v)| (k.as_bytes(), v.as_bytes()))
            .collect();
        let block = self.encoder.encode(pairs);
        let mut flags = FLAG_END_HEADERS;
        if end_stream {
            flags |= FLAG_END_STREAM;
        }
        self.streams.insert(
            stream_id,
            if end_stream {
                StreamState::HalfClosedLocal
            } else {
                StreamState::Open
            },
        );
        frame::encode_frame(
            FrameHeader {
                length: 0,
                frame_type: TYPE_HEADERS,
                flags,
                stream_id,
            },
            &block,
        )
    }

    /// Encode a `send(stream_id, data, end_stream)` DATA frame, splitting
    /// across frames no larger than the peer's advertised
    /// `SETTINGS_MAX_FRAME_SIZE`.
    pub fn send_data(&mut self, stream_id: u32, data: &[u8], end_stream: bool) -> Vec<u8> {
        let max_frame = self.peer_settings.max_frame_size.max(16_384) as usize;
        let mut out = Vec::new();
        if data.is_empty() {
            out.extend(frame::encode_frame(
                FrameHeader {
                    length: 0,
                    frame_type: TYPE_DATA,
                    flags: if end_stream { FLAG_END_STREAM } else { 0 },
                    stream_id,
                },
                &[],
            ));
        } else {
            let chunks: Vec<&[u8]> = data.chunks(max_frame).collect();
            let last = chunks.len() - 1;
            for (i, chunk) in chunks.into_iter().enumerate() {
                let flags = if i == last && end_stream { FLAG_END_STREAM } else { 0 };
                out.extend(frame::encode_frame(
                    FrameHeader {
                        length: 0,
                        frame_type: TYPE_DATA,
                        flags,
                        stream_id,
                    },
                    chunk,
                ));
            }
        }
        if end_stream {
            self.streams.insert(stream_id, StreamState::HalfClosedLocal);
        }
        out
    }

    /// Decode a HEADERS frame's block back into a [`Headers`] multimap.
    pub fn decode_headers(&mut self, block: &[u8]) -> Result<Headers, ProtocolError> {
        let pairs = self
            .decoder
            .decode(block)
            .map_err(|e| ProtocolError::H2FrameError(format!("HPACK decode failed: {e:?}")))?;
        let mut headers = Headers::new();
        for (name, value) in pairs {
            let name = String::from_utf8(name)
                .map_err(|_| ProtocolError::H2FrameError("header name is not UTF-8".into()))?;
            let value = String::from_utf8(value)
                .map_err(|_| ProtocolError::H2FrameError("header value is not UTF-8".into()))?;
            headers.push(&name, &value);
        }
        Ok(headers)
    }

    pub fn stream_closed(&mut self, stream_id: u32) {
        self.streams.insert(stream_id, StreamState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_bytes_start_with_the_connection_preface() {
        let conn = Connection::new(Settings::default());
        let bytes = conn.opening_bytes();
        assert!(bytes.starts_with(frame::PREFACE));
    }

    #[test]
    fn headers_round_trip_through_hpack() {
        let mut conn = Connection::new(Settings::default());
        let mut headers = Headers::new();
        headers.push(":method", "GET");
        headers.push(":path", "/ping");
        let frame_bytes = conn.send_headers(1, &headers, true);
        let (header, payload, _) = frame::try_parse_frame(&frame_bytes).unwrap().unwrap();
        assert_eq!(header.frame_type, TYPE_HEADERS);
        assert_eq!(header.flags & FLAG_END_STREAM, FLAG_END_STREAM);

        let mut peer = Connection::new(Settings::default());
        let decoded = peer.decode_headers(payload).unwrap();
        assert_eq!(decoded.get(":method"), Some("GET"));
        assert_eq!(decoded.get(":path"), Some("/ping"));
    }

    #[test]
    fn data_frame_carries_end_stream_flag() {
        let mut conn = Connection::new(Settings::default());
        let frame_bytes = conn.send_data(3, b"pong", true);
        let (header, payload, _) = frame::try_parse_frame(&frame_bytes).unwrap().unwrap();
        assert_eq!(header.frame_type, TYPE_DATA);
        assert_eq!(payload, b"pong");
        assert_eq!(header.flags & FLAG_END_STREAM, FLAG_END_STREAM);
    }

    #[test]
    fn settings_ack_is_emitted_for_a_non_ack_frame() {
        let mut conn = Connection::new(Settings::default());
        let incoming = frame::encode_settings_frame(&[(settings::SETTINGS_MAX_CONCURRENT_STREAMS, 50)]);
        let (header, payload, _) = frame::try_parse_frame(&incoming).unwrap().unwrap();
        let reply = conn.on_settings_frame(&header, payload).unwrap();
        assert!(reply.is_some());
        assert_eq!(conn.peer_settings.max_concurrent_streams, Some(50));
    }
}
