//! Chunked transfer-coding: hex size, optional trailers, `0\r\n\r\n`
//! terminator (§4.6, §6). The decoder is a byte-streaming state machine so
//! it can be fed arbitrary slices without re-parsing from the start.

use breakwater_common::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    SizeCr,
    Data,
    DataCr,
    DataLf,
    Trailer,
    Done,
}

pub struct ChunkDecoder {
    state: ChunkState,
    size_buf: String,
    remaining: u64,
    pub output: Vec<u8>,
    trailer_buf: Vec<u8>,
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkDecoder {
    pub fn new() -> Self {
        ChunkDecoder {
            state: ChunkState::Size,
            size_buf: String::new(),
            remaining: 0,
            output: Vec::new(),
            trailer_buf: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Feed more bytes. Returns the number of bytes consumed from `input`;
    /// any unconsumed suffix belongs to whatever follows (there is none in
    /// valid HTTP, but the byte-streaming parser never assumes that).
    pub fn feed(&mut self, input: &[u8]) -> Result<usize, ProtocolError> {
        let mut i = 0;
        while i < input.len() && self.state != ChunkState::Done {
            let b = input[i];
            match self.state {
                ChunkState::Size => {
                    if b == b'\r' {
                        self.state = ChunkState::SizeCr;
                    } else if b.is_ascii_hexdigit() {
                        self.size_buf.push(b as char);
                    } else if b == b';' {
                        // chunk extension — ignore until CRLF
                    } else if b != b' ' {
                        return Err(ProtocolError::HttpChunkMalformed(format!(
                            "unexpected byte 0x{b:02x} in chunk size"
                        )));
                    }
                }
                ChunkState::SizeCr => {
                    if b != b'\n' {
                        return Err(ProtocolError::HttpChunkMalformed(
                            "expected LF after chunk size CR".into(),
                        ));
                    }
                    self.remaining = u64::from_str_radix(&self.size_buf, 16).map_err(|_| {
                        ProtocolError::HttpChunkMalformed(format!(
                            "invalid hex chunk size: {}",
                            self.size_buf
                        ))
                    })?;
                    self.size_buf.clear();
                    self.state = if self.remaining == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data
                    };
                }
                ChunkState::Data => {
                    let take = (input.len() - i).min(self.remaining as usize);
                    self.output.extend_from_slice(&input[i..i + take]);
                    self.remaining -= take as u64;
                    i += take;
                    if self.remaining == 0 {
                        self.state = ChunkState::DataCr;
                    }
                    continue;
                }
                ChunkState::DataCr => {
                    if b != b'\r' {
                        return Err(ProtocolError::HttpChunkMalformed(
                            "expected CR after chunk data".into(),
                        ));
                    }
                    self.state = ChunkState::DataLf;
                }
                ChunkState::DataLf => {
                    if b != b'\n' {
                        return Err(ProtocolError::HttpChunkMalformed(
                            "expected LF after chunk data CR".into(),
                        ));
                    }
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    self.trailer_buf.push(b);
                    if self.trailer_buf.ends_with(b"\r\n\r\n")
                        || self.trailer_buf == b"\r\n"
                    {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => unreachable!(),
            }
            i += 1;
        }
        Ok(i)
    }
}

/// Encode a complete body as chunked transfer (single chunk, matching what
/// the serializer emits for a fully-buffered message; streaming emission
/// calls this per application-level write).
pub fn encode_chunk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn encode_final() -> &'static [u8] {
    b"0\r\n\r\n"
}

pub fn encode_full_body(data: &[u8]) -> Vec<u8> {
    let mut out = encode_chunk(data);
    out.extend_from_slice(encode_final());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_of_encode_is_identity_for_arbitrary_bodies() {
        for body in [
            Vec::new(),
            b"Hello".to_vec(),
            vec![0u8; 10_000],
            (0..=255u8).collect::<Vec<u8>>(),
        ] {
            let wire = encode_full_body(&body);
            let mut dec = ChunkDecoder::new();
            let consumed = dec.feed(&wire).unwrap();
            assert_eq!(consumed, wire.len());
            assert!(dec.is_done());
            assert_eq!(dec.output, body);
        }
    }

    #[test]
    fn decode_accepts_arbitrary_feed_boundaries() {
        let wire = encode_full_body(b"split across many small feeds");
        let mut dec = ChunkDecoder::new();
        for byte in &wire {
            dec.feed(std::slice::from_ref(byte)).unwrap();
        }
        assert!(dec.is_done());
        assert_eq!(dec.output, b"split across many small feeds");
    }

    #[test]
    fn multi_chunk_stream_decodes_in_order() {
        let mut wire = encode_chunk(b"Hel");
        wire.extend(encode_chunk(b"lo"));
        wire.extend_from_slice(encode_final());
        let mut dec = ChunkDecoder::new();
        dec.feed(&wire).unwrap();
        assert_eq!(dec.output, b"Hello");
    }

    #[test]
    fn rejects_non_hex_size() {
        let mut dec = ChunkDecoder::new();
        assert!(dec.feed(b"zz\r\n").is_err());
    }
}
