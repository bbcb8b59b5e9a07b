//! The endpoint layer (C11, §4.10/§4.13): correlates requests and
//! responses by `(stream_id, request_id)`, drives auto-redirect and
//! auto-reauthenticate retries bounded by `attempts`, and owns the
//! `WAIT_MESS` idle policy. Built on top of the typed callback registry
//! in [`callbacks`].

pub mod callbacks;

use std::collections::HashMap;

use crate::broker::BrokerId;
use crate::http1::message::Headers;
use callbacks::{Callbacks, Event, RequestId, StreamId};

/// Default bound on auto-redirect/auto-reauthenticate retries (§4.10).
pub const DEFAULT_ATTEMPTS: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Digest,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Maximum number of redirect+reauth retries before giving up and
    /// delivering the response as-is.
    pub attempts: u8,
    /// §4.13's `WAIT_MESS` policy inversion: when `true`, an idle
    /// connection with no pending request is kept open rather than
    /// closed. Default is `false` (close on idle), matching the
    /// original's default before the flag is set.
    pub wait_mess: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            attempts: DEFAULT_ATTEMPTS,
            wait_mess: false,
        }
    }
}

/// State tracked per in-flight request so a redirect or reauth challenge
/// can be retried against the same logical call.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: String,
    pub url: String,
    pub attempts_made: u8,
    pub auth_scheme: Option<AuthScheme>,
}

impl PendingRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        PendingRequest {
            method: method.into(),
            url: url.into(),
            attempts_made: 0,
            auth_scheme: None,
        }
    }
}

/// What to do with a response once its status code and headers are known.
#[derive(Debug, Clone)]
pub enum ResponseOutcome {
    /// Hand the response to the caller unmodified.
    Deliver,
    /// Reissue the request against `location`, consuming one attempt.
    Retry { location: String },
    /// The attempt budget is exhausted; deliver the last response anyway.
    Exhausted,
}

fn is_redirect(code: u16) -> bool {
    matches!(code, 301 | 302 | 303 | 307 | 308)
}

fn is_auth_challenge(code: u16) -> bool {
    matches!(code, 401 | 407)
}

/// Decide what an endpoint should do with a response given its pending
/// request's retry budget. A pure function so the redirect/reauth policy
/// can be tested without a real connection.
pub fn decide_response(
    pending: &mut PendingRequest,
    code: u16,
    location: Option<&str>,
    config: &EndpointConfig,
) -> ResponseOutcome {
    if pending.attempts_made >= config.attempts {
        return ResponseOutcome::Exhausted;
    }
    if (is_redirect(code) || is_auth_challenge(code)) && location.is_some() {
        pending.attempts_made += 1;
        return ResponseOutcome::Retry {
            location: location.unwrap().to_string(),
        };
    }
    ResponseOutcome::Deliver
}

/// Whether an idle connection (no pending requests) should be closed,
/// honoring §4.13's `WAIT_MESS` inversion.
pub fn should_close_idle(config: &EndpointConfig) -> bool {
    !config.wait_mess
}

/// One HTTP endpoint: owns the callback registry and the table of
/// requests in flight, keyed by `(stream_id, request_id)` so HTTP/2
/// multiplexed streams and HTTP/1.x pipelined requests share the same
/// correlation model.
pub struct Endpoint {
    pub config: EndpointConfig,
    pub callbacks: Callbacks,
    pending: HashMap<(StreamId, RequestId), PendingRequest>,
    next_request_id: RequestId,
}

impl Endpoint {
    pub fn new(config: EndpointConfig) -> Self {
        Endpoint {
            config,
            callbacks: Callbacks::new(),
            pending: HashMap::new(),
            next_request_id: 1,
        }
    }

    /// Register a new outbound request, returning the id it will be
    /// correlated under.
    pub fn begin_request(&mut self, stream_id: StreamId, method: &str, url: &str) -> RequestId {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.pending
            .insert((stream_id, request_id), PendingRequest::new(method, url));
        request_id
    }

    /// Feed a response's status line to the retry policy, firing the
    /// `response` callback and returning what the caller should do next.
    pub fn on_response(
        &mut self,
        stream_id: StreamId,
        request_id: RequestId,
        code: u16,
        reason: &str,
        location: Option<&str>,
    ) -> ResponseOutcome {
        self.callbacks.fire(Event::Response {
            stream_id,
            request_id,
            code,
            reason: reason.to_string(),
        });
        let Some(pending) = self.pending.get_mut(&(stream_id, request_id)) else {
            return ResponseOutcome::Deliver;
        };
        let outcome = decide_response(pending, code, location, &self.config);
        if let ResponseOutcome::Retry { .. } | ResponseOutcome::Exhausted = outcome {
            self.pending.remove(&(stream_id, request_id));
        }
        outcome
    }

    pub fn on_headers(&mut self, stream_id: StreamId, request_id: RequestId, code: u16, reason: &str, headers: Headers) {
        self.callbacks.fire(Event::Headers {
            stream_id,
            request_id,
            code,
            reason: reason.to_string(),
            headers,
        });
    }

    pub fn on_entity(&mut self, stream_id: StreamId, request_id: RequestId, code: u16, reason: &str, body: Vec<u8>) {
        self.callbacks.fire(Event::Entity {
            stream_id,
            request_id,
            code,
            reason: reason.to_string(),
            body,
        });
    }

    pub fn on_complete(
        &mut self,
        stream_id: StreamId,
        request_id: RequestId,
        code: u16,
        reason: &str,
        body: Vec<u8>,
        headers: Headers,
    ) {
        self.pending.remove(&(stream_id, request_id));
        self.callbacks.fire(Event::Complete {
            stream_id,
            request_id,
            code,
            reason: reason.to_string(),
            body,
            headers,
        });
    }

    pub fn on_chunk(&mut self, stream_id: StreamId, request_id: RequestId, bytes: Vec<u8>) {
        self.callbacks.fire(Event::Chunks {
            stream_id,
            request_id,
            bytes,
        });
    }

    pub fn on_handshake(&mut self, stream_id: StreamId, broker_id: BrokerId, agent: &str) {
        self.callbacks.fire(Event::Handshake {
            stream_id,
            broker_id,
            agent: agent.to_string(),
        });
    }

    /// True when no requests are in flight, the trigger for the
    /// `WAIT_MESS`-governed idle-close decision.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
