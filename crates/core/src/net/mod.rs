//! Socket engine (§4.2): connect/accept/read/write/close across TCP, TLS,
//! UDP, UNIX stream, and (Linux-only) SCTP. DTLS is a known limitation —
//! see [`transport::Transport::Dtls`].

pub mod rate_limit;
pub mod tls;
pub mod transport;

pub use rate_limit::TokenBucket;
pub use tls::TlsConfig;
pub use transport::{SonetKind, Transport};
