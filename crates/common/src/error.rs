//! The error taxonomy from the design's error-handling section: five kinds
//! (transport, protocol, application, resource, fatal), each a flat enum of
//! named failure modes rather than a type hierarchy.

use std::fmt;
use thiserror::Error;

/// Which of the five kinds an error belongs to — mirrors the `flag`
/// argument of the `error(flag, kind, text)` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorFlag {
    Transport,
    Protocol,
    Application,
    Resource,
    Fatal,
}

impl fmt::Display for ErrorFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorFlag::Transport => "transport",
            ErrorFlag::Protocol => "protocol",
            ErrorFlag::Application => "application",
            ErrorFlag::Resource => "resource",
            ErrorFlag::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectRefused,
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
    #[error("TLS certificate invalid: {0}")]
    TlsCertInvalid(String),
    #[error("connection reset while reading")]
    ReadReset,
    #[error("connection reset while writing")]
    WriteReset,
    #[error("DNS lookup found no record for {0}")]
    DnsNotFound(String),
    #[error("DNS lookup timed out for {0}")]
    DnsTimeout(String),
    #[error("backpressure: send queue is at capacity")]
    Backpressure,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed HTTP start line: {0}")]
    HttpMalformedStartLine(String),
    #[error("malformed HTTP header: {0}")]
    HttpMalformedHeader(String),
    #[error("malformed chunk framing: {0}")]
    HttpChunkMalformed(String),
    #[error("WebSocket reserved bit set without negotiated extension")]
    WsRsvViolation,
    #[error("WebSocket frame has unknown opcode 0x{0:x}")]
    WsUnknownOpcode(u8),
    #[error("WebSocket client frame missing mask bit")]
    WsMaskMissing,
    #[error("WebSocket continuation frame out of order")]
    WsFragmentOrder,
    #[error("WebSocket control frame payload exceeds 125 bytes")]
    WsControlOversized,
    #[error("WebSocket text frame is not valid UTF-8")]
    WsUtf8Invalid,
    #[error("WebSocket permessage-deflate decompression failed: {0}")]
    WsDecompressionFailed(String),
    #[error("SOCKS5 server reply malformed: {0}")]
    Socks5BadReply(String),
    #[error("HTTP/2 frame error: {0}")]
    H2FrameError(String),
    #[error("encryption envelope truncated")]
    EncryptionEnvelopeTruncated,
    #[error("encryption padding invalid (wrong passphrase or corrupted payload)")]
    EncryptionPaddingInvalid,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("authentication required")]
    AuthRequired,
    #[error("authentication failed")]
    AuthFailed,
    #[error("redirect/reauth attempts exhausted")]
    RedirectExhausted,
    #[error("payload exceeds configured size limit")]
    PayloadTooLarge,
    #[error("compression failed: {0}")]
    CompressionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("file descriptor table exhausted")]
    FdExhausted,
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("invariant broken: {0}")]
    InvariantBroken(String),
    #[error("zombie process detected: pid {0}")]
    ZombieProcessDetected(i32),
}

/// The top-level error type threaded through the core. Each variant carries
/// one of the five kind-specific enums above, so `flag()` is a cheap match
/// rather than a stored duplicate field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreakwaterError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl BreakwaterError {
    pub fn flag(&self) -> ErrorFlag {
        match self {
            BreakwaterError::Transport(_) => ErrorFlag::Transport,
            BreakwaterError::Protocol(_) => ErrorFlag::Protocol,
            BreakwaterError::Application(_) => ErrorFlag::Application,
            BreakwaterError::Resource(_) => ErrorFlag::Resource,
            BreakwaterError::Fatal(_) => ErrorFlag::Fatal,
        }
    }

    /// Transport and protocol errors close only the offending broker;
    /// everything else is handled by the caller per §7's propagation policy.
    pub fn closes_broker(&self) -> bool {
        matches!(
            self,
            BreakwaterError::Transport(_) | BreakwaterError::Protocol(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_matches_variant_kind() {
        let e: BreakwaterError = TransportError::Backpressure.into();
        assert_eq!(e.flag(), ErrorFlag::Transport);
        assert!(e.closes_broker());

        let e: BreakwaterError = ApplicationError::AuthRequired.into();
        assert_eq!(e.flag(), ErrorFlag::Application);
        assert!(!e.closes_broker());
    }

    #[test]
    fn display_messages_are_human_readable() {
        assert_eq!(
            TransportError::DnsNotFound("example.com".into()).to_string(),
            "DNS lookup found no record for example.com"
        );
        assert_eq!(ErrorFlag::Fatal.to_string(), "fatal");
    }
}
