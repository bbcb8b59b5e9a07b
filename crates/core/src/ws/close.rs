//! Close handshake payload framing and status codes, RFC 6455 §5.5.1, §7.4.1.

pub struct CloseCode;

impl CloseCode {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const NO_STATUS: u16 = 1005;
    pub const ABNORMAL: u16 = 1006;
    pub const INVALID_DATA: u16 = 1007;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Parse a close frame payload into (status_code, reason). A payload under
/// 2 bytes means no status code was present (§7.4.1): reported as 1005.
pub fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    if payload.len() >= 2 {
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
        (code, reason)
    } else {
        (CloseCode::NO_STATUS, String::new())
    }
}

/// Build a close frame payload, truncating the reason so the total stays
/// within the 125-byte control frame limit.
pub fn build_close_payload(code: u16, reason: &str) -> Vec<u8> {
    let reason_bytes = reason.as_bytes();
    let max_reason_len = 123;
    let truncated_len = reason_bytes.len().min(max_reason_len);
    let mut payload = Vec::with_capacity(2 + truncated_len);
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(&reason_bytes[..truncated_len]);
    payload
}

pub fn validate_text_payload(payload: &[u8]) -> bool {
    std::str::from_utf8(payload).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_code_and_reason() {
        let payload = vec![0x03, 0xE8, b'o', b'k'];
        assert_eq!(parse_close_payload(&payload), (1000, "ok".to_string()));
    }

    #[test]
    fn empty_payload_reports_no_status() {
        assert_eq!(parse_close_payload(&[]), (CloseCode::NO_STATUS, String::new()));
    }

    #[test]
    fn build_truncates_long_reason() {
        let long_reason = "x".repeat(200);
        let payload = build_close_payload(1000, &long_reason);
        assert_eq!(payload.len(), 125);
    }

    #[test]
    fn text_payload_validation_rejects_bad_utf8() {
        assert!(validate_text_payload(b"Hello"));
        assert!(!validate_text_payload(&[0xFF, 0xFE]));
    }
}
