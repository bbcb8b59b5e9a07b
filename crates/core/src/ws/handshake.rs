//! WebSocket HTTP upgrade handshake, RFC 6455 §4.2.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::http1::message::Headers;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute `Sec-WebSocket-Accept` from a client's `Sec-WebSocket-Key`.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh 16-byte `Sec-WebSocket-Key`, base64-encoded, for an
/// outbound client handshake.
pub fn generate_client_key() -> String {
    let mut raw = [0u8; 16];
    rand::rng().fill_bytes(&mut raw);
    BASE64.encode(raw)
}

/// Validate a server-received upgrade request. Returns the client's key on
/// success, or the first violated requirement's description.
pub fn validate_upgrade_request(method: &str, headers: &Headers) -> Result<String, &'static str> {
    if !method.eq_ignore_ascii_case("GET") {
        return Err("method must be GET");
    }
    match headers.get("Upgrade") {
        Some(v) if v.to_ascii_lowercase().contains("websocket") => {}
        _ => return Err("missing or invalid Upgrade header"),
    }
    match headers.get("Connection") {
        Some(v) if v.to_ascii_lowercase().contains("upgrade") => {}
        _ => return Err("missing or invalid Connection header"),
    }
    let client_key = headers
        .get("Sec-WebSocket-Key")
        .ok_or("missing Sec-WebSocket-Key header")?
        .to_string();
    match headers.get("Sec-WebSocket-Version") {
        Some("13") => {}
        _ => return Err("missing or invalid Sec-WebSocket-Version (must be 13)"),
    }
    Ok(client_key)
}

/// Validate a client-received `101` response against the key it sent.
pub fn validate_upgrade_response(client_key: &str, headers: &Headers) -> Result<(), &'static str> {
    let expected = compute_accept_key(client_key);
    match headers.get("Sec-WebSocket-Accept") {
        Some(v) if v == expected => Ok(()),
        Some(_) => Err("Sec-WebSocket-Accept does not match computed value"),
        None => Err("missing Sec-WebSocket-Accept header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc_example() {
        let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn validates_complete_upgrade_request() {
        let mut headers = Headers::new();
        headers.push("Upgrade", "websocket");
        headers.push("Connection", "Upgrade");
        headers.push("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        headers.push("Sec-WebSocket-Version", "13");
        let key = validate_upgrade_request("GET", &headers).unwrap();
        assert_eq!(key, "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn rejects_missing_upgrade_header() {
        let mut headers = Headers::new();
        headers.push("Connection", "Upgrade");
        headers.push("Sec-WebSocket-Key", "x");
        headers.push("Sec-WebSocket-Version", "13");
        assert!(validate_upgrade_request("GET", &headers).is_err());
    }

    #[test]
    fn client_round_trip_validates_its_own_response() {
        let key = generate_client_key();
        let accept = compute_accept_key(&key);
        let mut resp_headers = Headers::new();
        resp_headers.push("Sec-WebSocket-Accept", accept);
        assert!(validate_upgrade_response(&key, &resp_headers).is_ok());
    }
}
