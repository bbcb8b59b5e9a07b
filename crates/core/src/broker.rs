//! The broker: one live connection and all its per-socket state (§3).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::net::rate_limit::TokenBucket;
use crate::payload::PayloadQueue;
use crate::scheme::SchemeId;

/// Process-wide monotonic broker id generator. A broker id appears at most
/// once across all schemes for the lifetime of the process (§3 invariant).
static NEXT_BROKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrokerId(pub u64);

impl BrokerId {
    pub fn next() -> Self {
        BrokerId(NEXT_BROKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Connection state, used for both the actual (`real`) and desired (`wait`)
/// flags on a broker (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Preconnecting,
    Connected,
    Reconnecting,
}

/// Per-connection deadlines, in seconds. `None` means "no limit".
#[derive(Debug, Clone, Copy, Default)]
pub struct Timeouts {
    pub wait: Option<u32>,
    pub read: Option<u32>,
    pub write: Option<u32>,
    pub connect: Option<u32>,
}

/// SO_KEEPALIVE tuning, carried per-broker (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    pub count: u32,
    pub idle: u32,
    pub interval: u32,
}

impl Default for KeepAlive {
    fn default() -> Self {
        KeepAlive {
            count: 3,
            idle: 60,
            interval: 10,
        }
    }
}

/// Best-effort peer identity: address plus a MAC resolved via the local ARP
/// table when the peer is on-link (never guaranteed, hence `Option`).
#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
    pub addr: Option<SocketAddr>,
    pub unix_path: Option<std::path::PathBuf>,
    pub mac: Option<[u8; 6]>,
}

/// A single connection and all its per-socket bookkeeping.
///
/// `Broker` owns its send queue and liveness state but never the socket
/// handle directly here — transports live behind the `Node`'s connection
/// table so `Broker` stays `Send`-friendly and cheap to look up by id.
pub struct Broker {
    pub id: BrokerId,
    pub scheme_id: SchemeId,
    pub peer: PeerInfo,
    pub timeouts: Timeouts,
    pub keepalive: KeepAlive,
    pub ingress_limit: Option<TokenBucket>,
    pub egress_limit: Option<TokenBucket>,
    pub send_queue: PayloadQueue,
    pub last_activity: Instant,
    pub real: ConnState,
    pub wait: ConnState,
    /// Digest/Basic retry counter, tracked per-broker (not per-scheme) —
    /// see SPEC_FULL.md's proxy auth note.
    pub auth_attempts: u8,
    /// Set once a close has been requested but the send queue has not
    /// drained yet (SPEC_FULL.md's "stop bytes" resolution).
    pub closing: bool,
}

impl Broker {
    pub fn new(scheme_id: SchemeId, peer: PeerInfo, timeouts: Timeouts) -> Self {
        Broker {
            id: BrokerId::next(),
            scheme_id,
            peer,
            timeouts,
            keepalive: KeepAlive::default(),
            ingress_limit: None,
            egress_limit: None,
            send_queue: PayloadQueue::new(),
            last_activity: Instant::now(),
            real: ConnState::Disconnected,
            wait: ConnState::Disconnected,
            auth_attempts: 0,
            closing: false,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_idle_for(&self, secs: u32) -> bool {
        self.last_activity.elapsed().as_secs() >= secs as u64
    }

    /// Begin graceful close: reject further application writes but keep the
    /// broker alive until `send_queue` drains.
    pub fn begin_closing(&mut self) {
        self.closing = true;
    }

    pub fn ready_to_drop(&self) -> bool {
        self.closing && self.send_queue.is_empty()
    }
}
