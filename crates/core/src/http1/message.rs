//! The HTTP message model shared by requests and responses (§3, §4.6):
//! headers are stored in insertion order but looked up case-insensitively,
//! since a handful of servers break on reordered or re-cased header names.

use crate::http1::chunked::ChunkDecoder;
use crate::http1::compress::Compressor;
use crate::http1::crypto_envelope::KeyBits;

/// Where a message sits in the QUERY→HEADERS→BODY→GOOD/HANDSHAKE/BROKEN
/// state machine (§3). `Good` and `Handshake` are terminal: the parser
/// refuses further input until [`HttpMessage::reset`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Query,
    Headers,
    Body,
    Good,
    Handshake,
    Broken,
}

/// An ordered, case-insensitive-lookup multimap. Duplicate header names
/// (e.g. repeated `Set-Cookie`) are kept as separate entries in arrival
/// order; emission walks the vector verbatim.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace every existing entry for `name` with a single new value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.0.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Canonical casing for emission: first letter and every letter after a
/// hyphen uppercase, everything else lowercase (`content-type` →
/// `Content-Type`).
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut start_of_word = true;
    for c in name.chars() {
        if start_of_word {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        start_of_word = c == '-';
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Request,
    Response,
}

/// An in-flight HTTP/1.x message, owned by the parser while it is being
/// filled and by the application once it reaches `Good`.
#[derive(Debug, Clone)]
pub struct HttpMessage {
    pub role: Role,
    pub state: ParseState,
    pub method: String,
    pub url: String,
    pub version: (u8, u8),
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub chunked: bool,
    pub content_length: Option<u64>,
    pub compressor: Option<Compressor>,
    pub encryption: Option<KeyBits>,
}

impl HttpMessage {
    pub fn new(role: Role) -> Self {
        HttpMessage {
            role,
            state: ParseState::Query,
            method: String::new(),
            url: String::new(),
            version: (1, 1),
            status: 0,
            reason: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
            chunked: false,
            content_length: None,
            compressor: None,
            encryption: None,
        }
    }

    /// Whether the message has reached a terminal success state and must
    /// not accept further parser input until [`reset`](Self::reset).
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ParseState::Good | ParseState::Handshake | ParseState::Broken)
    }

    /// Clear everything but `role`, returning the message to `Query` so a
    /// keep-alive connection can parse the next message on the wire.
    pub fn reset(&mut self) {
        let role = self.role;
        *self = HttpMessage::new(role);
    }

    /// Read `Content-Encoding` / `X-AWH-Encryption` and populate the
    /// negotiated compressor/encryption fields from the headers already
    /// parsed. Called once headers are complete, before body parsing.
    pub fn adopt_header_derived_state(&mut self) {
        self.chunked = self
            .headers
            .get("Transfer-Encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        self.content_length = self
            .headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse().ok());
        self.compressor = self
            .headers
            .get("Content-Encoding")
            .and_then(Compressor::from_header_value);
        self.encryption = self
            .headers
            .get("X-AWH-Encryption")
            .and_then(KeyBits::from_header_value);
    }

    pub fn new_chunk_decoder(&self) -> ChunkDecoder {
        ChunkDecoder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_lookup_is_case_insensitive_but_emits_verbatim() {
        let mut h = Headers::new();
        h.push("Content-Type", "text/plain");
        h.push("X-Custom", "a");
        h.push("x-custom", "b");
        assert_eq!(h.get("content-TYPE"), Some("text/plain"));
        let all: Vec<_> = h.get_all("X-Custom").collect();
        assert_eq!(all, vec!["a", "b"]);
        let emitted: Vec<_> = h.iter().collect();
        assert_eq!(
            emitted,
            vec![
                ("Content-Type", "text/plain"),
                ("X-Custom", "a"),
                ("x-custom", "b"),
            ]
        );
    }

    #[test]
    fn set_replaces_all_prior_values() {
        let mut h = Headers::new();
        h.push("Set-Cookie", "a=1");
        h.push("Set-Cookie", "b=2");
        h.set("Set-Cookie", "c=3");
        let all: Vec<_> = h.get_all("Set-Cookie").collect();
        assert_eq!(all, vec!["c=3"]);
    }

    #[test]
    fn canonical_casing_follows_hyphen_boundaries() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("X-AWH-ENCRYPTION"), "X-Awh-Encryption");
    }

    #[test]
    fn good_state_is_terminal_until_reset() {
        let mut msg = HttpMessage::new(Role::Response);
        msg.state = ParseState::Good;
        assert!(msg.is_terminal());
        msg.reset();
        assert_eq!(msg.state, ParseState::Query);
        assert!(!msg.is_terminal());
    }

    #[test]
    fn header_derived_state_reads_transfer_and_encoding_headers() {
        let mut msg = HttpMessage::new(Role::Response);
        msg.headers.push("Transfer-Encoding", "chunked");
        msg.headers.push("Content-Encoding", "gzip");
        msg.headers.push("X-AWH-Encryption", "256");
        msg.adopt_header_derived_state();
        assert!(msg.chunked);
        assert_eq!(msg.compressor, Some(Compressor::Gzip));
        assert_eq!(msg.encryption, Some(KeyBits::Bits256));
    }
}
