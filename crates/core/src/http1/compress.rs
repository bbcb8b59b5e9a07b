//! Content-Encoding negotiation: gzip, deflate, brotli, zstd (§4.6).

use std::io::{Read, Write};

use breakwater_common::ApplicationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl Compressor {
    pub fn header_value(self) -> &'static str {
        match self {
            Compressor::Gzip => "gzip",
            Compressor::Deflate => "deflate",
            Compressor::Brotli => "br",
            Compressor::Zstd => "zstd",
        }
    }

    pub fn from_header_value(v: &str) -> Option<Self> {
        match v.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Compressor::Gzip),
            "deflate" => Some(Compressor::Deflate),
            "br" => Some(Compressor::Brotli),
            "zstd" => Some(Compressor::Zstd),
            _ => None,
        }
    }

    /// Pick the first mutually acceptable compressor from an `Accept-Encoding`
    /// header's comma-separated list, preferring the server's own order.
    pub fn negotiate(accept_encoding: &str, preferred: &[Compressor]) -> Option<Compressor> {
        let offered: Vec<&str> = accept_encoding
            .split(',')
            .map(|s| s.split(';').next().unwrap_or("").trim())
            .collect();
        preferred
            .iter()
            .copied()
            .find(|c| offered.iter().any(|o| o.eq_ignore_ascii_case(c.header_value())))
    }

    pub fn encode(self, data: &[u8]) -> Result<Vec<u8>, ApplicationError> {
        match self {
            Compressor::Gzip => {
                let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(data)
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))?;
                enc.finish()
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))
            }
            Compressor::Deflate => {
                let mut enc =
                    flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(data)
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))?;
                enc.finish()
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))
            }
            Compressor::Brotli => {
                let mut out = Vec::new();
                let params = brotli::enc::BrotliEncoderParams::default();
                brotli::BrotliCompress(&mut &data[..], &mut out, &params)
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))?;
                Ok(out)
            }
            Compressor::Zstd => zstd::stream::encode_all(data, 0)
                .map_err(|e| ApplicationError::CompressionFailed(e.to_string())),
        }
    }

    pub fn decode(self, data: &[u8]) -> Result<Vec<u8>, ApplicationError> {
        match self {
            Compressor::Gzip => {
                let mut dec = flate2::read::GzDecoder::new(data);
                let mut out = Vec::new();
                dec.read_to_end(&mut out)
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))?;
                Ok(out)
            }
            Compressor::Deflate => {
                let mut dec = flate2::read::DeflateDecoder::new(data);
                let mut out = Vec::new();
                dec.read_to_end(&mut out)
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))?;
                Ok(out)
            }
            Compressor::Brotli => {
                let mut out = Vec::new();
                let mut reader = brotli::Decompressor::new(data, 4096);
                reader
                    .read_to_end(&mut out)
                    .map_err(|e| ApplicationError::CompressionFailed(e.to_string()))?;
                Ok(out)
            }
            Compressor::Zstd => zstd::stream::decode_all(data)
                .map_err(|e| ApplicationError::CompressionFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let packed = Compressor::Gzip.encode(&data).unwrap();
        let unpacked = Compressor::Gzip.decode(&packed).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn deflate_round_trips() {
        let data = b"hello world".to_vec();
        let packed = Compressor::Deflate.encode(&data).unwrap();
        let unpacked = Compressor::Deflate.decode(&packed).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn zstd_round_trips() {
        let data = b"zstandard payload".repeat(5);
        let packed = Compressor::Zstd.encode(&data).unwrap();
        let unpacked = Compressor::Zstd.decode(&packed).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn negotiate_prefers_server_order() {
        let preferred = [Compressor::Brotli, Compressor::Gzip];
        let chosen = Compressor::negotiate("gzip, br, deflate", &preferred);
        assert_eq!(chosen, Some(Compressor::Brotli));
    }

    #[test]
    fn negotiate_returns_none_when_no_overlap() {
        assert_eq!(Compressor::negotiate("identity", &[Compressor::Gzip]), None);
    }
}
