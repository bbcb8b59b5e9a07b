//! Emission side of HTTP/1.x (§4.6): canonical header casing, chunked
//! transfer only when no `Content-Length` is set and the body is non-empty,
//! and compression headers omitted for empty bodies.

use crate::http1::chunked::encode_full_body;
use crate::http1::message::{canonical_header_name, HttpMessage, Role};
use crate::http1::status::reason_phrase;

/// Serialize `msg` to the wire. If `msg.chunked` is set and no
/// `Content-Length` header is present, the body is chunk-encoded;
/// otherwise a `Content-Length` is computed from the (already
/// compressed/encrypted) body.
pub fn serialize(msg: &HttpMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + msg.body.len());

    match msg.role {
        Role::Request => {
            out.extend_from_slice(
                format!(
                    "{} {} HTTP/{}.{}\r\n",
                    msg.method, msg.url, msg.version.0, msg.version.1
                )
                .as_bytes(),
            );
        }
        Role::Response => {
            let reason = if msg.reason.is_empty() {
                reason_phrase(msg.status)
            } else {
                &msg.reason
            };
            out.extend_from_slice(
                format!(
                    "HTTP/{}.{} {} {}\r\n",
                    msg.version.0, msg.version.1, msg.status, reason
                )
                .as_bytes(),
            );
        }
    }

    let use_chunked = msg.chunked && msg.headers.get("Content-Length").is_none() && !msg.body.is_empty();

    for (name, value) in msg.headers.iter() {
        if use_chunked && name.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        out.extend_from_slice(
            format!("{}: {}\r\n", canonical_header_name(name), value).as_bytes(),
        );
    }

    if msg.body.is_empty() {
        // No Content-Encoding/Content-Length churn for an empty body; many
        // clients treat a framing header on a bodyless message as an error.
    } else if use_chunked {
        out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
    } else if msg.headers.get("Content-Length").is_none() {
        out.extend_from_slice(format!("Content-Length: {}\r\n", msg.body.len()).as_bytes());
    }

    out.extend_from_slice(b"\r\n");

    if use_chunked {
        out.extend_from_slice(&encode_full_body(&msg.body));
    } else {
        out.extend_from_slice(&msg.body);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http1::message::HttpMessage;

    #[test]
    fn serializes_request_with_content_length() {
        let mut msg = HttpMessage::new(Role::Request);
        msg.method = "POST".to_string();
        msg.url = "/submit".to_string();
        msg.headers.push("Host", "example.com");
        msg.body = b"payload".to_vec();
        let wire = serialize(&msg);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("POST /submit HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.ends_with("\r\n\r\npayload"));
    }

    #[test]
    fn chunks_body_when_flagged_and_no_content_length() {
        let mut msg = HttpMessage::new(Role::Response);
        msg.status = 200;
        msg.chunked = true;
        msg.body = b"hello".to_vec();
        let wire = serialize(&msg);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.ends_with("5\r\nhello\r\n0\r\n\r\n"));
    }

    #[test]
    fn empty_body_omits_framing_headers() {
        let mut msg = HttpMessage::new(Role::Response);
        msg.status = 204;
        let wire = serialize(&msg);
        let text = String::from_utf8(wire).unwrap();
        assert!(!text.contains("Content-Length"));
        assert!(!text.contains("Transfer-Encoding"));
    }

    #[test]
    fn unknown_status_falls_back_to_table_reason() {
        let mut msg = HttpMessage::new(Role::Response);
        msg.status = 404;
        let wire = serialize(&msg);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    }
}
