//! The scheme: a listener configuration (server mode) or a connect target
//! (client mode), plus the brokers it owns (§3).

use rustc_hash::FxHashMap;

use crate::broker::{Broker, BrokerId, KeepAlive, Timeouts};
use crate::http1::compress::Compressor;
use crate::net::tls::TlsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemeId(pub u16);

#[derive(Debug, Clone, Default)]
pub struct SchemeConfig {
    pub timeouts: Timeouts,
    pub keepalive: KeepAlive,
    pub compress: Option<Compressor>,
    pub tls: Option<TlsConfig>,
    /// `INSTANT` attempts a direct write before enqueueing; `DEFFER` always
    /// enqueues (§4.5).
    pub sending_instant: bool,
}

/// A listener or outbound target: owns the `broker_id -> Broker` map.
/// Invariant: a broker belongs to at most one scheme (enforced by `Node`,
/// the only code path that inserts into more than one scheme's map).
pub struct Scheme {
    pub id: SchemeId,
    pub config: SchemeConfig,
    brokers: FxHashMap<BrokerId, Broker>,
}

impl Scheme {
    pub fn new(id: SchemeId, config: SchemeConfig) -> Self {
        Scheme {
            id,
            config,
            brokers: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, broker: Broker) -> BrokerId {
        let id = broker.id;
        self.brokers.insert(id, broker);
        id
    }

    pub fn get(&self, id: BrokerId) -> Option<&Broker> {
        self.brokers.get(&id)
    }

    pub fn get_mut(&mut self, id: BrokerId) -> Option<&mut Broker> {
        self.brokers.get_mut(&id)
    }

    /// Remove a broker from this scheme. The caller (`Node`) is responsible
    /// for closing the underlying socket and discarding pending payloads —
    /// this only detaches the bookkeeping entry (§3 invariant).
    pub fn remove(&mut self, id: BrokerId) -> Option<Broker> {
        self.brokers.remove(&id)
    }

    pub fn broker_ids(&self) -> impl Iterator<Item = BrokerId> + '_ {
        self.brokers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PeerInfo;

    #[test]
    fn insert_then_remove_detaches_broker() {
        let mut scheme = Scheme::new(SchemeId(1), SchemeConfig::default());
        let broker = Broker::new(SchemeId(1), PeerInfo::default(), Timeouts::default());
        let id = scheme.insert(broker);
        assert!(scheme.get(id).is_some());
        let removed = scheme.remove(id);
        assert!(removed.is_some());
        assert!(scheme.get(id).is_none());
    }
}
