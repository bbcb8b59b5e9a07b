//! Timers / keepalive driver (C15, §4.14): the 10-second garbage reaper
//! that frees closed-but-not-yet-dropped brokers, and the per-connection
//! persist timer that pings WebSocket brokers and forces a close on a
//! missed pong or prolonged silence.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::broker::{Broker, BrokerId};

/// Reaper sweep interval (§4.14).
pub const REAPER_INTERVAL: Duration = Duration::from_secs(10);

/// Default persist-timer period; a WebSocket ping fires this often.
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(15);

/// A broker that has been closed but is still referenced by a pending
/// callback, kept around until it ages past [`REAPER_INTERVAL`].
struct Garbage {
    id: BrokerId,
    marked_at: Instant,
}

/// Sweeps brokers marked closed-but-not-freed, releasing those older
/// than the reaper interval. A callback that still holds a stale
/// `BrokerId` after the id is released will simply find nothing.
#[derive(Default)]
pub struct GarbageReaper {
    pending: Vec<Garbage>,
}

impl GarbageReaper {
    pub fn new() -> Self {
        GarbageReaper::default()
    }

    pub fn mark(&mut self, id: BrokerId, now: Instant) {
        self.pending.push(Garbage { id, marked_at: now });
    }

    /// Remove and return every broker id old enough to be freed.
    pub fn sweep(&mut self, now: Instant) -> Vec<BrokerId> {
        let mut freed = Vec::new();
        self.pending.retain(|garbage| {
            if now.duration_since(garbage.marked_at) >= REAPER_INTERVAL {
                freed.push(garbage.id);
                false
            } else {
                true
            }
        });
        freed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistAction {
    /// Nothing due yet.
    None,
    /// Send a PING carrying the broker id as payload.
    SendPing,
    /// No pong arrived in time, or the broker has been silent past
    /// `keepAlive`: close it.
    ForceClose,
}

/// Per-broker persist-timer state: when the next ping is due and whether
/// a ping sent earlier is still unanswered.
pub struct PersistTimer {
    interval: Duration,
    keep_alive: Duration,
    last_ping_sent: Option<Instant>,
    awaiting_pong: bool,
}

impl PersistTimer {
    pub fn new(interval: Duration, keep_alive: Duration) -> Self {
        PersistTimer {
            interval,
            keep_alive,
            last_ping_sent: None,
            awaiting_pong: false,
        }
    }

    /// Called once per reactor tick for a WebSocket broker. `last_activity`
    /// is the broker's most recent read/write timestamp.
    pub fn tick(&mut self, now: Instant, last_activity: Instant) -> PersistAction {
        if self.awaiting_pong {
            let since_ping = now.duration_since(self.last_ping_sent.unwrap_or(now));
            if since_ping >= self.keep_alive {
                return PersistAction::ForceClose;
            }
            return PersistAction::None;
        }
        if now.duration_since(last_activity) >= self.keep_alive {
            return PersistAction::ForceClose;
        }
        let due = self
            .last_ping_sent
            .map(|sent| now.duration_since(sent) >= self.interval)
            .unwrap_or(true);
        if due {
            self.last_ping_sent = Some(now);
            self.awaiting_pong = true;
            PersistAction::SendPing
        } else {
            PersistAction::None
        }
    }

    pub fn on_pong(&mut self) {
        self.awaiting_pong = false;
    }
}

/// Drives a [`PersistTimer`] per broker in a scheme, keyed by
/// [`BrokerId`]. Brokers without an entry are assumed non-WebSocket and
/// are left to ordinary idle-timeout handling instead.
#[derive(Default)]
pub struct KeepAliveDriver {
    timers: HashMap<BrokerId, PersistTimer>,
}

impl KeepAliveDriver {
    pub fn new() -> Self {
        KeepAliveDriver::default()
    }

    pub fn register(&mut self, id: BrokerId, interval: Duration, keep_alive: Duration) {
        self.timers.insert(id, PersistTimer::new(interval, keep_alive));
    }

    pub fn unregister(&mut self, id: BrokerId) {
        self.timers.remove(&id);
    }

    pub fn tick(&mut self, id: BrokerId, now: Instant, broker: &Broker) -> PersistAction {
        match self.timers.get_mut(&id) {
            Some(timer) => timer.tick(now, broker.last_activity),
            None => PersistAction::None,
        }
    }

    pub fn on_pong(&mut self, id: BrokerId) {
        if let Some(timer) = self.timers.get_mut(&id) {
            timer.on_pong();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::SchemeId;
    use crate::broker::{PeerInfo, Timeouts};

    #[test]
    fn reaper_releases_brokers_once_they_age_past_the_interval() {
        let mut reaper = GarbageReaper::new();
        let start = Instant::now();
        reaper.mark(BrokerId(1), start);
        assert!(reaper.sweep(start).is_empty());
        let later = start + REAPER_INTERVAL;
        assert_eq!(reaper.sweep(later), vec![BrokerId(1)]);
        assert_eq!(reaper.pending_count(), 0);
    }

    #[test]
    fn persist_timer_pings_once_the_interval_elapses() {
        let mut timer = PersistTimer::new(Duration::from_secs(15), Duration::from_secs(30));
        let start = Instant::now();
        assert_eq!(timer.tick(start, start), PersistAction::SendPing);
        assert_eq!(timer.tick(start + Duration::from_secs(5), start), PersistAction::None);
    }

    #[test]
    fn unanswered_ping_forces_close_after_keep_alive() {
        let mut timer = PersistTimer::new(Duration::from_secs(15), Duration::from_secs(20));
        let start = Instant::now();
        assert_eq!(timer.tick(start, start), PersistAction::SendPing);
        assert_eq!(
            timer.tick(start + Duration::from_secs(25), start),
            PersistAction::ForceClose
        );
    }

    #[test]
    fn a_pong_clears_the_awaiting_state() {
        let mut timer = PersistTimer::new(Duration::from_secs(15), Duration::from_secs(20));
        let start = Instant::now();
        assert_eq!(timer.tick(start, start), PersistAction::SendPing);
        timer.on_pong();
        assert_eq!(
            timer.tick(start + Duration::from_secs(10), start + Duration::from_secs(10)),
            PersistAction::None
        );
    }

    #[test]
    fn driver_ticks_the_registered_broker_using_its_last_activity() {
        let mut driver = KeepAliveDriver::new();
        let broker = Broker::new(SchemeId(1), PeerInfo::default(), Timeouts::default());
        driver.register(broker.id, Duration::from_secs(15), Duration::from_secs(30));
        let action = driver.tick(broker.id, Instant::now(), &broker);
        assert_eq!(action, PersistAction::SendPing);
    }
}
