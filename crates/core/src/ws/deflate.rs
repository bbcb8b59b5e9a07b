//! permessage-deflate extension, RFC 7692: negotiation parameters and the
//! stateful raw-deflate codec used per message (not per frame).

use breakwater_common::ApplicationError;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// The trailing bytes RFC 7692 §7.2.1 strips from a compressed message
/// before sending, and that the receiver must append back before inflating.
const TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

#[derive(Debug, Clone, Copy)]
pub struct DeflateParams {
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
    pub server_max_window_bits: u8,
    pub client_max_window_bits: u8,
}

impl Default for DeflateParams {
    fn default() -> Self {
        DeflateParams {
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            server_max_window_bits: 15,
            client_max_window_bits: 15,
        }
    }
}

/// Parse a `Sec-WebSocket-Extensions: permessage-deflate; ...` offer into
/// its parameters. Unknown tokens are ignored rather than rejected, per
/// RFC 7692's guidance to degrade gracefully.
pub fn parse_extension_header(header: &str) -> Option<DeflateParams> {
    let mut params = DeflateParams::default();
    let mut saw_permessage_deflate = false;
    for offer in header.split(',') {
        for token in offer.split(';') {
            let token = token.trim();
            if token.eq_ignore_ascii_case("permessage-deflate") {
                saw_permessage_deflate = true;
                continue;
            }
            if !saw_permessage_deflate {
                continue;
            }
            if token.eq_ignore_ascii_case("server_no_context_takeover") {
                params.server_no_context_takeover = true;
            } else if token.eq_ignore_ascii_case("client_no_context_takeover") {
                params.client_no_context_takeover = true;
            } else if let Some(bits) = token.strip_prefix("server_max_window_bits") {
                if let Some(v) = parse_window_bits(bits) {
                    params.server_max_window_bits = clamp_window_bits(v);
                }
            } else if let Some(bits) = token.strip_prefix("client_max_window_bits") {
                if let Some(v) = parse_window_bits(bits) {
                    params.client_max_window_bits = clamp_window_bits(v);
                }
            }
        }
    }
    saw_permessage_deflate.then_some(params)
}

fn parse_window_bits(rest: &str) -> Option<u8> {
    rest.trim_start_matches('=').trim().parse().ok()
}

/// RFC 7692 §7.1.2.1/§7.1.2.2: a `*_max_window_bits` value must be 8-15.
/// Clamp a negotiated offer into range rather than rejecting the whole
/// extension over a single out-of-range parameter.
fn clamp_window_bits(bits: u8) -> u8 {
    bits.clamp(8, 15)
}

pub fn extension_header_value(params: &DeflateParams) -> String {
    let mut parts = vec!["permessage-deflate".to_string()];
    if params.server_no_context_takeover {
        parts.push("server_no_context_takeover".to_string());
    }
    if params.client_no_context_takeover {
        parts.push("client_no_context_takeover".to_string());
    }
    parts.join("; ")
}

/// A persistent deflate compressor for one direction of a permessage-deflate
/// stream (§4.7, RFC 7692 §7.2.1). When context takeover is negotiated for
/// this direction, the sliding window is carried across messages rather than
/// reset, so later messages can back-reference earlier ones.
pub struct Encoder {
    compress: Compress,
    no_context_takeover: bool,
}

impl Encoder {
    /// `window_bits` is the negotiated RFC 7692 window size (8-15) for this
    /// direction, recorded for bookkeeping only: flate2's default
    /// (miniz_oxide) backend always compresses with a full 32K window
    /// regardless of the value offered here, since tuning the window
    /// requires the optional system-zlib Cargo feature this workspace does
    /// not enable (see DESIGN.md). A peer that asked for a smaller window
    /// can still decode output produced with a larger one, so this only
    /// costs a little unused compression ratio, never correctness.
    pub fn new(window_bits: u8, no_context_takeover: bool) -> Self {
        let _ = window_bits;
        Encoder {
            compress: Compress::new(Compression::default(), false),
            no_context_takeover,
        }
    }

    /// Compress one message's payload. When context takeover is in effect
    /// for this direction, the compressed form is always used even if it
    /// isn't smaller than the input: skipping it would advance this
    /// encoder's window past data the peer's decoder never saw, desyncing
    /// the shared context for every later message. Without context
    /// takeover each message is independent, so the smaller-of-the-two
    /// heuristic is safe and preserved.
    pub fn compress(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if self.no_context_takeover {
            self.compress.reset();
        }
        let compressed = compress_block(&mut self.compress, data).ok()?;
        if self.no_context_takeover {
            (compressed.len() < data.len()).then_some(compressed)
        } else {
            Some(compressed)
        }
    }
}

/// A persistent deflate decompressor for one direction, mirroring [`Encoder`].
pub struct Decoder {
    decompress: Decompress,
    no_context_takeover: bool,
}

impl Decoder {
    pub fn new(window_bits: u8, no_context_takeover: bool) -> Self {
        let _ = window_bits;
        Decoder {
            decompress: Decompress::new(false),
            no_context_takeover,
        }
    }

    /// Inflate a payload that arrived with RSV1 set: append the trailer
    /// back on and run it through the persistent raw-deflate context,
    /// resetting first only when this direction has no context takeover.
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>, ApplicationError> {
        if self.no_context_takeover {
            self.decompress.reset(false);
        }
        let mut with_trailer = Vec::with_capacity(data.len() + TRAILER.len());
        with_trailer.extend_from_slice(data);
        with_trailer.extend_from_slice(&TRAILER);
        decompress_block(&mut self.decompress, &with_trailer)
            .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))
    }
}

fn compress_block(compress: &mut Compress, data: &[u8]) -> Result<Vec<u8>, flate2::CompressError> {
    let mut out = vec![0u8; (data.len() / 2).max(64)];
    let mut input_consumed = 0usize;
    let mut output_written = 0usize;
    loop {
        let in_before = compress.total_in();
        let out_before = compress.total_out();
        let status = compress.compress(&data[input_consumed..], &mut out[output_written..], FlushCompress::Sync)?;
        input_consumed += (compress.total_in() - in_before) as usize;
        output_written += (compress.total_out() - out_before) as usize;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if input_consumed >= data.len() {
                    break;
                }
                if output_written == out.len() {
                    out.resize(out.len() * 2, 0);
                }
            }
        }
    }
    out.truncate(output_written);
    if out.ends_with(&TRAILER) {
        out.truncate(out.len() - TRAILER.len());
    }
    Ok(out)
}

fn decompress_block(decompress: &mut Decompress, data: &[u8]) -> Result<Vec<u8>, flate2::DecompressError> {
    let mut out = vec![0u8; (data.len() * 3).max(256)];
    let mut input_consumed = 0usize;
    let mut output_written = 0usize;
    loop {
        let in_before = decompress.total_in();
        let out_before = decompress.total_out();
        let status = decompress.decompress(&data[input_consumed..], &mut out[output_written..], FlushDecompress::Sync)?;
        input_consumed += (decompress.total_in() - in_before) as usize;
        output_written += (decompress.total_out() - out_before) as usize;
        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if input_consumed >= data.len() {
                    break;
                }
                if output_written == out.len() {
                    out.resize(out.len() * 2, 0);
                }
            }
        }
    }
    out.truncate(output_written);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_decompress_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let mut enc = Encoder::new(15, true);
        let mut dec = Decoder::new(15, true);
        let compressed = enc.compress(&data).expect("should compress smaller");
        let decompressed = dec.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn tiny_payload_is_not_worth_compressing_without_takeover() {
        let mut enc = Encoder::new(15, true);
        assert!(enc.compress(b"hi").is_none());
    }

    #[test]
    fn context_takeover_chains_across_messages() {
        let mut enc = Encoder::new(15, false);
        let mut dec = Decoder::new(15, false);
        let messages: Vec<Vec<u8>> = vec![
            b"repeated text repeated text repeated text".to_vec(),
            b"repeated text repeated text repeated text".to_vec(),
            b"repeated text repeated text repeated text".to_vec(),
        ];
        for msg in &messages {
            let compressed = enc.compress(msg).expect("takeover always yields compressed output");
            let decompressed = dec.decompress(&compressed).unwrap();
            assert_eq!(&decompressed, msg);
        }
    }

    #[test]
    fn no_context_takeover_resets_each_message() {
        let mut enc = Encoder::new(15, true);
        let mut dec = Decoder::new(15, true);
        let data = b"the quick brown fox jumps over the lazy dog".repeat(5);
        let first = enc.compress(&data).unwrap();
        let second = enc.compress(&data).unwrap();
        assert_eq!(first, second, "resetting each message makes independent messages compress identically");
        assert_eq!(dec.decompress(&first).unwrap(), data);
        assert_eq!(dec.decompress(&second).unwrap(), data);
    }

    #[test]
    fn parses_negotiated_parameters() {
        let header = "permessage-deflate; server_no_context_takeover; client_max_window_bits=10";
        let params = parse_extension_header(header).unwrap();
        assert!(params.server_no_context_takeover);
        assert!(!params.client_no_context_takeover);
        assert_eq!(params.client_max_window_bits, 10);
    }

    #[test]
    fn out_of_range_window_bits_are_clamped() {
        let header = "permessage-deflate; server_max_window_bits=20; client_max_window_bits=2";
        let params = parse_extension_header(header).unwrap();
        assert_eq!(params.server_max_window_bits, 15);
        assert_eq!(params.client_max_window_bits, 8);
    }

    #[test]
    fn missing_extension_token_returns_none() {
        assert!(parse_extension_header("permessage-snappy").is_none());
    }
}
