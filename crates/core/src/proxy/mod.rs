//! The forwarding proxy core (C12, §4.11): owns a server endpoint and a
//! pool of client endpoints, deciding per incoming request whether to
//! open a CONNECT tunnel (plain byte-splice, no rewriting) or rewrite and
//! forward a plain HTTP request. Per-session auth, recompression, and the
//! `maxRequests`/`alive` connection-close policy all live here as pure
//! decision functions so the bridging loop itself stays thin.

use breakwater_common::ApplicationError;

use crate::http1::compress::Compressor;
use crate::http1::message::{HttpMessage, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    Basic,
    Digest,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub connect_enabled: bool,
    pub auth_type: AuthType,
    /// Realm/nonce/opaque used to build a Digest challenge. Ignored when
    /// `auth_type` is `Basic` or `None`.
    pub digest_realm: String,
    pub digest_nonce: String,
    pub digest_opaque: String,
    /// Close the connection once this many requests have been served on
    /// it. `None` means no count-based limit.
    pub max_requests: Option<u32>,
    /// Keep a persistent bridge up across requests regardless of
    /// `max_requests`. §4.11: "absent either, the connection closes
    /// after each response."
    pub alive: bool,
    pub compressor: Option<Compressor>,
    pub agent_os: String,
    pub agent_name: String,
    pub agent_id: String,
    pub agent_version: String,
    pub self_host: String,
    pub self_port: u16,
}

/// What the proxy should do with one incoming request.
#[derive(Debug, Clone)]
pub enum RequestAction {
    /// Method was CONNECT and tunneling is enabled: dial `target`, then
    /// byte-splice once the outbound handshake completes.
    Tunnel { target: String },
    /// A plain request to rewrite (Via/X-Proxy-Agent/recompress) and
    /// forward upstream.
    Forward,
    /// CONNECT requested but tunneling is disabled for this scheme.
    ConnectDisabled,
}

/// Classify an incoming request line (§4.11 step 1). CONNECT is tunneled
/// verbatim only when the scheme allows it; every other method is a plain
/// forward.
pub fn classify_request(method: &str, target: &str, config: &ProxyConfig) -> RequestAction {
    if method.eq_ignore_ascii_case("CONNECT") {
        if config.connect_enabled {
            RequestAction::Tunnel { target: target.to_string() }
        } else {
            RequestAction::ConnectDisabled
        }
    } else {
        RequestAction::Forward
    }
}

/// Outcome of checking a forwarded request's `Proxy-Authorization`
/// against the configured auth policy.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    Authenticated,
    /// No auth required.
    NotRequired,
    /// Emit a 407 with this `Proxy-Authenticate` challenge value.
    Challenge(String),
}

fn digest_challenge(config: &ProxyConfig) -> String {
    format!(
        "Digest realm=\"{}\", nonce=\"{}\", qop=\"auth\", opaque=\"{}\"",
        config.digest_realm, config.digest_nonce, config.digest_opaque
    )
}

/// §4.11: "Per-session authentication is required before any bridging:
/// if `auth_type != NONE` and the client's `Proxy-Authorization` fails,
/// emit 407 with a challenge." This only validates presence/scheme
/// match; credential verification is the caller's concern (it owns the
/// user database).
pub fn check_proxy_auth(proxy_authorization: Option<&str>, config: &ProxyConfig) -> AuthOutcome {
    match config.auth_type {
        AuthType::None => AuthOutcome::NotRequired,
        AuthType::Basic => match proxy_authorization {
            Some(value) if value.starts_with("Basic ") => AuthOutcome::Authenticated,
            _ => AuthOutcome::Challenge("Basic realm=\"proxy\"".to_string()),
        },
        AuthType::Digest => match proxy_authorization {
            Some(value) if value.starts_with("Digest ") => AuthOutcome::Authenticated,
            _ => AuthOutcome::Challenge(digest_challenge(config)),
        },
    }
}

/// §4.11 step 2: strip `Proxy-Authorization`, append a `Via` entry, set
/// `X-Proxy-Agent`, and recompress the body if a compressor is
/// configured and the client didn't already ask for one. Mutates `msg`
/// in place so the existing parser-owned buffers are reused.
pub fn rewrite_request(msg: &mut HttpMessage, config: &ProxyConfig) -> Result<(), ApplicationError> {
    debug_assert_eq!(msg.role, Role::Request);
    msg.headers.remove("Proxy-Authorization");

    let via_entry = format!("{}.{} {}:{}", msg.version.0, msg.version.1, config.self_host, config.self_port);
    let via = match msg.headers.get("Via") {
        Some(existing) => format!("{existing}, {via_entry}"),
        None => via_entry,
    };
    msg.headers.set("Via", via);

    msg.headers.set(
        "X-Proxy-Agent",
        format!("({}; {}) {}/{}", config.agent_os, config.agent_name, config.agent_id, config.agent_version),
    );

    if let Some(compressor) = config.compressor {
        if msg.headers.get("Content-Encoding").is_none() && !msg.body.is_empty() {
            msg.body = compressor.encode(&msg.body)?;
            msg.headers.set("Content-Encoding", compressor.header_value());
            msg.headers.set("Content-Length", msg.body.len().to_string());
        }
    }
    Ok(())
}

/// Per-connection bookkeeping for the `maxRequests`/`alive` policy
/// (§4.11 limits).
#[derive(Debug, Clone, Default)]
pub struct ConnectionPolicy {
    pub requests_served: u32,
}

impl ConnectionPolicy {
    pub fn record_response(&mut self) {
        self.requests_served += 1;
    }

    /// Whether the connection should be closed after the response just
    /// served. `alive` overrides a count limit; absent both, every
    /// response closes the connection.
    pub fn should_close_after_response(&self, config: &ProxyConfig) -> bool {
        if config.alive {
            return false;
        }
        match config.max_requests {
            Some(limit) => self.requests_served >= limit,
            None => true,
        }
    }
}

// Open Question (b)'s "stopBytes" write-gate is resolved at the broker
// level (`Broker::begin_closing` / `Broker::ready_to_drop`): once the
// proxy decides a connection should end, it calls `begin_closing` and
// lets the send queue finish draining before the socket is torn down,
// rather than modeling a separate half-open state here.

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfig {
        ProxyConfig {
            connect_enabled: true,
            auth_type: AuthType::None,
            digest_realm: "r".to_string(),
            digest_nonce: "n".to_string(),
            digest_opaque: "o".to_string(),
            max_requests: None,
            alive: false,
            compressor: None,
            agent_os: "linux".to_string(),
            agent_name: "breakwater".to_string(),
            agent_id: "bw".to_string(),
            agent_version: "1.0".to_string(),
            self_host: "proxy.local".to_string(),
            self_port: 8080,
        }
    }

    #[test]
    fn connect_is_tunneled_when_enabled() {
        let action = classify_request("CONNECT", "upstream:443", &config());
        assert!(matches!(action, RequestAction::Tunnel { target } if target == "upstream:443"));
    }

    #[test]
    fn connect_is_rejected_when_disabled() {
        let mut cfg = config();
        cfg.connect_enabled = false;
        let action = classify_request("CONNECT", "upstream:443", &cfg);
        assert!(matches!(action, RequestAction::ConnectDisabled));
    }

    #[test]
    fn get_is_always_forwarded() {
        let action = classify_request("GET", "http://upstream/", &config());
        assert!(matches!(action, RequestAction::Forward));
    }

    #[test]
    fn digest_auth_challenges_a_missing_proxy_authorization() {
        let mut cfg = config();
        cfg.auth_type = AuthType::Digest;
        let outcome = check_proxy_auth(None, &cfg);
        match outcome {
            AuthOutcome::Challenge(value) => {
                assert!(value.contains("realm=\"r\""));
                assert!(value.contains("nonce=\"n\""));
            }
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[test]
    fn digest_auth_accepts_a_matching_scheme_header() {
        let mut cfg = config();
        cfg.auth_type = AuthType::Digest;
        let outcome = check_proxy_auth(Some("Digest username=\"u\""), &cfg);
        assert!(matches!(outcome, AuthOutcome::Authenticated));
    }

    #[test]
    fn rewrite_strips_proxy_authorization_and_adds_via_and_agent() {
        let mut msg = HttpMessage::new(Role::Request);
        msg.version = (1, 1);
        msg.headers.push("Proxy-Authorization", "Basic xyz");
        rewrite_request(&mut msg, &config()).unwrap();
        assert_eq!(msg.headers.get("Proxy-Authorization"), None);
        assert_eq!(msg.headers.get("Via"), Some("1.1 proxy.local:8080"));
        assert!(msg.headers.get("X-Proxy-Agent").unwrap().contains("bw/1.0"));
    }

    #[test]
    fn rewrite_appends_to_an_existing_via_chain() {
        let mut msg = HttpMessage::new(Role::Request);
        msg.version = (1, 1);
        msg.headers.push("Via", "1.0 upstream-proxy");
        rewrite_request(&mut msg, &config()).unwrap();
        assert_eq!(msg.headers.get("Via"), Some("1.0 upstream-proxy, 1.1 proxy.local:8080"));
    }

    #[test]
    fn max_requests_closes_once_the_limit_is_reached() {
        let mut cfg = config();
        cfg.max_requests = Some(2);
        let mut policy = ConnectionPolicy::default();
        policy.record_response();
        assert!(!policy.should_close_after_response(&cfg));
        policy.record_response();
        assert!(policy.should_close_after_response(&cfg));
    }

    #[test]
    fn alive_overrides_max_requests() {
        let mut cfg = config();
        cfg.max_requests = Some(1);
        cfg.alive = true;
        let mut policy = ConnectionPolicy::default();
        policy.record_response();
        assert!(!policy.should_close_after_response(&cfg));
    }

    #[test]
    fn absent_limits_close_after_every_response() {
        let cfg = config();
        let mut policy = ConnectionPolicy::default();
        policy.record_response();
        assert!(policy.should_close_after_response(&cfg));
    }

}
