//! The callback registry (C14, §4.13): SPEC_FULL.md's design note on the
//! "dynamic multi-type callback registry" resolves the original's variadic
//! template map into (a) a fixed enum of event kinds and (b) one typed
//! function-pointer field per kind on [`Callbacks`], rather than a
//! `HashMap<String, Box<dyn Any>>`. `on_any` is the one genuinely dynamic
//! hook, firing on every invocation with the stable name and arity so a
//! language binding or test harness can instrument late-bound callbacks
//! without the core knowing about it.

use crate::broker::BrokerId;
use crate::http1::message::Headers;
use crate::scheme::SchemeId;
use breakwater_common::ErrorFlag;

pub type RequestId = u64;
pub type StreamId = u32;

/// One event kind per name in §4.10's contractual callback list. Carries
/// typed payloads so dispatch is a single `match`, not a downcast.
#[derive(Debug, Clone)]
pub enum Event {
    Open { scheme_id: SchemeId },
    Status { core_status: String },
    Connect { broker_id: BrokerId, scheme_id: SchemeId },
    Disconnect { broker_id: BrokerId, scheme_id: SchemeId },
    Read { bytes: usize, broker_id: BrokerId, scheme_id: SchemeId },
    Response { stream_id: StreamId, request_id: RequestId, code: u16, reason: String },
    Headers { stream_id: StreamId, request_id: RequestId, code: u16, reason: String, headers: Headers },
    Entity { stream_id: StreamId, request_id: RequestId, code: u16, reason: String, body: Vec<u8> },
    Complete { stream_id: StreamId, request_id: RequestId, code: u16, reason: String, body: Vec<u8>, headers: Headers },
    Chunks { stream_id: StreamId, request_id: RequestId, bytes: Vec<u8> },
    Handshake { stream_id: StreamId, broker_id: BrokerId, agent: String },
    Origin { list: Vec<String> },
    Altsvc { origin: String, field: String },
    Error { flag: ErrorFlag, kind: String, text: String },
}

impl Event {
    /// The stable string id used by `on_any`, matching §4.10's naming.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Open { .. } => "open",
            Event::Status { .. } => "status",
            Event::Connect { .. } => "connect",
            Event::Disconnect { .. } => "disconnect",
            Event::Read { .. } => "read",
            Event::Response { .. } => "response",
            Event::Headers { .. } => "headers",
            Event::Entity { .. } => "entity",
            Event::Complete { .. } => "complete",
            Event::Chunks { .. } => "chunks",
            Event::Handshake { .. } => "handshake",
            Event::Origin { .. } => "origin",
            Event::Altsvc { .. } => "altsvc",
            Event::Error { .. } => "error",
        }
    }

    /// Number of typed fields carried by this variant, reported to
    /// `on_any` the way the original's variadic registry reported arity.
    pub fn arity(&self) -> usize {
        match self {
            Event::Open { .. } => 1,
            Event::Status { .. } => 1,
            Event::Connect { .. } | Event::Disconnect { .. } => 2,
            Event::Read { .. } => 3,
            Event::Response { .. } => 4,
            Event::Headers { .. } => 5,
            Event::Entity { .. } => 5,
            Event::Complete { .. } => 6,
            Event::Chunks { .. } => 3,
            Event::Handshake { .. } => 3,
            Event::Origin { .. } => 1,
            Event::Altsvc { .. } => 2,
            Event::Error { .. } => 3,
        }
    }
}

type VoidCallback = Box<dyn FnMut(Event) + Send>;
type AcceptCallback = Box<dyn FnMut(Option<std::net::SocketAddr>, Option<[u8; 6]>, u16) -> bool + Send>;
type SslCallback = Box<dyn FnMut(&str, BrokerId, SchemeId) -> bool + Send>;
type AnyHook = Box<dyn FnMut(&'static str, usize) + Send>;

/// One slot per §4.10 callback name. `accept` and `ssl` return `bool` (the
/// only two callbacks the original gates behavior on), so they get their
/// own typed fields instead of folding into [`Event`].
#[derive(Default)]
pub struct Callbacks {
    pub on_event: Option<VoidCallback>,
    pub on_accept: Option<AcceptCallback>,
    pub on_ssl: Option<SslCallback>,
    pub on_any: Option<AnyHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Callbacks::default()
    }

    /// Dispatch any of the non-bool-returning events: call the single
    /// `on_event` slot (if set), then always fire `on_any`.
    pub fn fire(&mut self, event: Event) {
        let name = event.name();
        let arity = event.arity();
        if let Some(cb) = self.on_event.as_mut() {
            cb(event);
        }
        if let Some(hook) = self.on_any.as_mut() {
            hook(name, arity);
        }
    }

    /// `accept(ip, mac, port) -> bool` (§4.10). Defaults to accepting the
    /// connection when no handler is registered.
    pub fn fire_accept(&mut self, ip: Option<std::net::SocketAddr>, mac: Option<[u8; 6]>, port: u16) -> bool {
        let result = self.on_accept.as_mut().map(|cb| cb(ip, mac, port)).unwrap_or(true);
        if let Some(hook) = self.on_any.as_mut() {
            hook("accept", 3);
        }
        result
    }

    /// `ssl(url, bid, sid) -> bool` (§4.10). Defaults to approving the
    /// handshake when no handler is registered.
    pub fn fire_ssl(&mut self, url: &str, broker_id: BrokerId, scheme_id: SchemeId) -> bool {
        let result = self.on_ssl.as_mut().map(|cb| cb(url, broker_id, scheme_id)).unwrap_or(true);
        if let Some(hook) = self.on_any.as_mut() {
            hook("ssl", 3);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn on_any_fires_for_every_event_with_matching_arity() {
        let mut callbacks = Callbacks::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        callbacks.on_any = Some(Box::new(move |name, arity| {
            seen2.lock().unwrap().push((name, arity));
        }));
        callbacks.fire(Event::Open { scheme_id: SchemeId(1) });
        callbacks.fire(Event::Connect { broker_id: BrokerId::next(), scheme_id: SchemeId(1) });
        let recorded = seen.lock().unwrap();
        assert_eq!(recorded[0], ("open", 1));
        assert_eq!(recorded[1], ("connect", 2));
    }

    #[test]
    fn accept_defaults_to_true_when_unregistered() {
        let mut callbacks = Callbacks::new();
        assert!(callbacks.fire_accept(None, None, 8080));
    }

    #[test]
    fn accept_honors_a_registered_handler() {
        let mut callbacks = Callbacks::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        callbacks.on_accept = Some(Box::new(move |_ip, _mac, port| {
            calls2.fetch_add(1, Ordering::SeqCst);
            port != 9999
        }));
        assert!(callbacks.fire_accept(None, None, 80));
        assert!(!callbacks.fire_accept(None, None, 9999));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
