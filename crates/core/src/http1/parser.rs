//! Byte-streaming HTTP/1.x parser (§4.6): feeds arbitrary-sized slices and
//! advances `QUERY -> HEADERS -> BODY -> GOOD`, or `BROKEN` on malformed
//! input. Mirrors the message model's terminal-state invariant: once a
//! message reaches `Good`, further `feed` calls are refused until `reset`.

use breakwater_common::ProtocolError;

use crate::http1::chunked::ChunkDecoder;
use crate::http1::message::{HttpMessage, ParseState, Role};

const MAX_LINE_LEN: usize = 16 * 1024;
const MAX_HEADER_COUNT: usize = 256;

pub struct Parser {
    buf: Vec<u8>,
    chunk_decoder: Option<ChunkDecoder>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            buf: Vec::new(),
            chunk_decoder: None,
        }
    }

    /// Feed `input` into the in-progress `msg`. Returns the number of bytes
    /// consumed. Once `msg` is in `Good`/`Handshake`/`Broken` it refuses to
    /// consume anything; the caller must `reset()` first.
    pub fn feed(&mut self, msg: &mut HttpMessage, input: &[u8]) -> Result<usize, ProtocolError> {
        if msg.is_terminal() {
            return Ok(0);
        }
        self.buf.extend_from_slice(input);

        loop {
            match msg.state {
                ParseState::Query => {
                    let Some(line_end) = find_crlf_or_lf(&self.buf) else {
                        if self.buf.len() > MAX_LINE_LEN {
                            msg.state = ParseState::Broken;
                            return Err(ProtocolError::HttpMalformedStartLine(
                                "start line exceeds maximum length".into(),
                            ));
                        }
                        break;
                    };
                    let (line, _total) = take_line(&mut self.buf, line_end);
                    parse_start_line(msg, &line)?;
                    msg.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line_end) = find_crlf_or_lf(&self.buf) else {
                        if self.buf.len() > MAX_LINE_LEN {
                            msg.state = ParseState::Broken;
                            return Err(ProtocolError::HttpMalformedHeader(
                                "header line exceeds maximum length".into(),
                            ));
                        }
                        break;
                    };
                    let (line, _total) = take_line(&mut self.buf, line_end);
                    if line.is_empty() {
                        msg.adopt_header_derived_state();
                        if msg.chunked {
                            self.chunk_decoder = Some(msg.new_chunk_decoder());
                            msg.state = ParseState::Body;
                        } else if msg.content_length.unwrap_or(0) > 0 {
                            msg.state = ParseState::Body;
                        } else {
                            msg.state = ParseState::Good;
                        }
                    } else {
                        if msg.headers.len() >= MAX_HEADER_COUNT {
                            msg.state = ParseState::Broken;
                            return Err(ProtocolError::HttpMalformedHeader(
                                "too many headers".into(),
                            ));
                        }
                        let (name, value) = parse_header_line(&line)?;
                        msg.headers.push(name, value);
                    }
                }
                ParseState::Body => {
                    if msg.chunked {
                        let decoder = self.chunk_decoder.as_mut().expect("chunked body has a decoder");
                        let used = decoder.feed(&self.buf)?;
                        self.buf.drain(0..used);
                        if decoder.is_done() {
                            msg.body = std::mem::take(&mut decoder.output);
                            msg.state = ParseState::Good;
                        } else {
                            break;
                        }
                    } else {
                        let need = msg.content_length.unwrap_or(0) as usize - msg.body.len();
                        let take = need.min(self.buf.len());
                        msg.body.extend(self.buf.drain(0..take));
                        if msg.body.len() as u64 >= msg.content_length.unwrap_or(0) {
                            msg.state = ParseState::Good;
                        } else {
                            break;
                        }
                    }
                }
                ParseState::Good | ParseState::Handshake | ParseState::Broken => break,
            }
        }

        Ok(input.len())
    }
}

fn find_crlf_or_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

/// Remove the line up to and including the terminator from `buf`, trimming
/// a trailing `\r`. Returns the trimmed line and the number of raw bytes
/// removed (for CRLF/LF-tolerant splitting, §4.6).
fn take_line(buf: &mut Vec<u8>, lf_index: usize) -> (String, usize) {
    let mut end = lf_index;
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[0..end]).into_owned();
    let removed = lf_index + 1;
    buf.drain(0..removed);
    (line, removed)
}

fn parse_start_line(msg: &mut HttpMessage, line: &str) -> Result<(), ProtocolError> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    if parts.len() != 3 {
        return Err(ProtocolError::HttpMalformedStartLine(line.to_string()));
    }
    match msg.role {
        Role::Request => {
            msg.method = parts[0].to_string();
            msg.url = parts[1].to_string();
            msg.version = parse_version(parts[2])?;
        }
        Role::Response => {
            msg.version = parse_version(parts[0])?;
            msg.status = parts[1]
                .parse()
                .map_err(|_| ProtocolError::HttpMalformedStartLine(line.to_string()))?;
            msg.reason = parts[2].to_string();
        }
    }
    Ok(())
}

fn parse_version(token: &str) -> Result<(u8, u8), ProtocolError> {
    let rest = token
        .strip_prefix("HTTP/")
        .ok_or_else(|| ProtocolError::HttpMalformedStartLine(token.to_string()))?;
    let (major, minor) = rest
        .split_once('.')
        .ok_or_else(|| ProtocolError::HttpMalformedStartLine(token.to_string()))?;
    let major: u8 = major
        .parse()
        .map_err(|_| ProtocolError::HttpMalformedStartLine(token.to_string()))?;
    let minor: u8 = minor
        .parse()
        .map_err(|_| ProtocolError::HttpMalformedStartLine(token.to_string()))?;
    Ok((major, minor))
}

fn parse_header_line(line: &str) -> Result<(String, String), ProtocolError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ProtocolError::HttpMalformedHeader(line.to_string()))?;
    if name.is_empty() || name.contains(' ') {
        return Err(ProtocolError::HttpMalformedHeader(line.to_string()));
    }
    Ok((name.trim().to_string(), value.trim().to_string()))
}
