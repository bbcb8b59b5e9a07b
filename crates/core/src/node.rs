//! Shared server/client plumbing: payload queues, memory quotas, and the
//! broker/scheme registry every endpoint (HTTP, WebSocket, proxy) builds on
//! top of (§4.5).

use rustc_hash::FxHashMap;

use breakwater_common::{BreakwaterError, ResourceError};

use crate::broker::{Broker, BrokerId};
use crate::payload::{Payload, MAX_PAYLOAD};
use crate::scheme::{Scheme, SchemeId};

/// `INSTANT` attempts a direct non-blocking write before enqueueing;
/// `DEFFER` always enqueues (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Instant,
    Deffer,
}

/// Process-wide and per-broker outbound queue quotas (§3, §5).
#[derive(Debug, Clone, Copy)]
pub struct Quotas {
    pub memory_available_size: usize,
    pub broker_available_size: usize,
}

impl Default for Quotas {
    fn default() -> Self {
        Quotas {
            memory_available_size: 64 * 1024 * 1024,
            broker_available_size: 4 * 1024 * 1024,
        }
    }
}

/// Owns every scheme and tracks the two quotas described in §4.5. This is
/// the thing a worker's reactor drives; it never crosses a thread boundary
/// (§5: "the scheme registry is owned by the reactor; no cross-thread
/// mutation").
pub struct Node {
    schemes: FxHashMap<SchemeId, Scheme>,
    /// Reverse index so a bare `BrokerId` resolves to its owning scheme
    /// without a linear scan (needed by the reaper and by callbacks that
    /// only carry the id).
    broker_to_scheme: FxHashMap<BrokerId, SchemeId>,
    quotas: Quotas,
    queued_bytes_total: usize,
    pub send_mode: SendMode,
}

impl Node {
    pub fn new(quotas: Quotas) -> Self {
        Node {
            schemes: FxHashMap::default(),
            broker_to_scheme: FxHashMap::default(),
            quotas,
            queued_bytes_total: 0,
            send_mode: SendMode::Deffer,
        }
    }

    pub fn add_scheme(&mut self, scheme: Scheme) {
        self.schemes.insert(scheme.id, scheme);
    }

    pub fn scheme(&self, id: SchemeId) -> Option<&Scheme> {
        self.schemes.get(&id)
    }

    pub fn scheme_mut(&mut self, id: SchemeId) -> Option<&mut Scheme> {
        self.schemes.get_mut(&id)
    }

    /// Register a broker under its scheme, maintaining the reverse index.
    pub fn insert_broker(&mut self, scheme_id: SchemeId, broker: Broker) -> Option<BrokerId> {
        let scheme = self.schemes.get_mut(&scheme_id)?;
        let id = scheme.insert(broker);
        self.broker_to_scheme.insert(id, scheme_id);
        Some(id)
    }

    pub fn broker(&self, id: BrokerId) -> Option<&Broker> {
        let scheme_id = self.broker_to_scheme.get(&id)?;
        self.schemes.get(scheme_id)?.get(id)
    }

    pub fn broker_mut(&mut self, id: BrokerId) -> Option<&mut Broker> {
        let scheme_id = *self.broker_to_scheme.get(&id)?;
        self.schemes.get_mut(&scheme_id)?.get_mut(id)
    }

    /// Remove the broker from its scheme and drop any pending payloads
    /// (§3 invariant: removal implies socket closed and queued frames
    /// discarded).
    pub fn remove_broker(&mut self, id: BrokerId) -> Option<Broker> {
        let scheme_id = self.broker_to_scheme.remove(&id)?;
        let scheme = self.schemes.get_mut(&scheme_id)?;
        let broker = scheme.remove(id)?;
        self.queued_bytes_total = self
            .queued_bytes_total
            .saturating_sub(broker.send_queue.queued_bytes());
        Some(broker)
    }

    /// Split `data` into `MAX_PAYLOAD`-sized frames and push them onto the
    /// broker's queue, honoring the two quotas (§4.5 steps 1-2).
    pub fn enqueue(&mut self, id: BrokerId, data: &[u8]) -> Result<(), BreakwaterError> {
        let broker = self
            .broker_mut(id)
            .ok_or(ResourceError::QuotaExceeded("unknown broker".into()))?;

        if broker.closing {
            return Err(ResourceError::QuotaExceeded("broker is closing".into()).into());
        }

        let incoming = data.len();
        if self.queued_bytes_total + incoming > self.quotas.memory_available_size {
            return Err(breakwater_common::TransportError::Backpressure.into());
        }
        if broker.send_queue.queued_bytes() + incoming > self.quotas.broker_available_size {
            return Err(breakwater_common::TransportError::Backpressure.into());
        }

        for chunk in data.chunks(MAX_PAYLOAD) {
            broker.send_queue.push(Payload::new(chunk.to_vec()));
        }
        self.queued_bytes_total += incoming;
        Ok(())
    }

    /// Whether a broker's queue has drained below 50% of its cap — the
    /// threshold at which §4.5 re-enables pushes after a flow-control stall.
    pub fn below_resume_threshold(&self, id: BrokerId) -> bool {
        self.broker(id)
            .map(|b| b.send_queue.queued_bytes() * 2 <= self.quotas.broker_available_size)
            .unwrap_or(true)
    }

    /// Record that `n` bytes were written to the socket and drained from
    /// the broker's queue head (called from the write-ready path).
    pub fn note_drained(&mut self, id: BrokerId, n: usize) {
        if let Some(broker) = self.broker_mut(id) {
            broker.send_queue.note_drained(n);
        }
        self.queued_bytes_total = self.queued_bytes_total.saturating_sub(n);
    }

    pub fn queued_bytes_total(&self) -> usize {
        self.queued_bytes_total
    }

    pub fn quotas(&self) -> Quotas {
        self.quotas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, PeerInfo, Timeouts};
    use crate::scheme::{Scheme, SchemeConfig};

    fn node_with_one_broker(broker_cap: usize) -> (Node, SchemeId, BrokerId) {
        let quotas = Quotas {
            memory_available_size: 1_000_000,
            broker_available_size: broker_cap,
        };
        let mut node = Node::new(quotas);
        let scheme_id = SchemeId(1);
        node.add_scheme(Scheme::new(scheme_id, SchemeConfig::default()));
        let broker = Broker::new(scheme_id, PeerInfo::default(), Timeouts::default());
        let id = node.insert_broker(scheme_id, broker).unwrap();
        (node, scheme_id, id)
    }

    #[test]
    fn enqueue_splits_oversized_writes_into_max_payload_frames() {
        let (mut node, _sid, id) = node_with_one_broker(10_000_000);
        let data = vec![7u8; MAX_PAYLOAD * 2 + 10];
        node.enqueue(id, &data).unwrap();
        assert_eq!(node.broker(id).unwrap().send_queue.queued_bytes(), data.len());
    }

    #[test]
    fn enqueue_rejects_once_broker_cap_exceeded() {
        let (mut node, _sid, id) = node_with_one_broker(100);
        let small = vec![1u8; 50];
        node.enqueue(id, &small).unwrap();
        let too_much = vec![1u8; 80];
        let err = node.enqueue(id, &too_much).unwrap_err();
        assert_eq!(err.flag(), breakwater_common::ErrorFlag::Transport);
    }

    #[test]
    fn memory_quota_never_exceeded_across_brokers() {
        let quotas = Quotas {
            memory_available_size: 100,
            broker_available_size: 1_000_000,
        };
        let mut node = Node::new(quotas);
        let scheme_id = SchemeId(1);
        node.add_scheme(Scheme::new(scheme_id, SchemeConfig::default()));
        let b1 = node
            .insert_broker(
                scheme_id,
                Broker::new(scheme_id, PeerInfo::default(), Timeouts::default()),
            )
            .unwrap();
        let b2 = node
            .insert_broker(
                scheme_id,
                Broker::new(scheme_id, PeerInfo::default(), Timeouts::default()),
            )
            .unwrap();
        node.enqueue(b1, &vec![0u8; 60]).unwrap();
        let err = node.enqueue(b2, &vec![0u8; 60]);
        assert!(err.is_err());
        assert!(node.queued_bytes_total() <= 100);
    }

    #[test]
    fn removing_broker_discards_pending_payloads() {
        let (mut node, _sid, id) = node_with_one_broker(1000);
        node.enqueue(id, &vec![1u8; 40]).unwrap();
        assert_eq!(node.queued_bytes_total(), 40);
        node.remove_broker(id);
        assert_eq!(node.queued_bytes_total(), 0);
        assert!(node.broker(id).is_none());
    }
}
