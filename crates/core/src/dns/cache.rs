//! TTL-bounded resolution cache (§4.3): entries are evicted lazily on
//! lookup rather than by a background sweep.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use super::Family;

struct Entry {
    ip: IpAddr,
    inserted_at: Instant,
}

pub struct Cache {
    entries: HashMap<(String, Family), Entry>,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(default_ttl: Duration) -> Self {
        Cache {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    pub fn set_default_ttl(&mut self, ttl: Duration) {
        self.default_ttl = ttl;
    }

    pub fn insert(&mut self, hostname: &str, family: Family, ip: IpAddr) {
        self.entries.insert(
            (hostname.to_ascii_lowercase(), family),
            Entry {
                ip,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&mut self, hostname: &str, family: Family) -> Option<IpAddr> {
        let key = (hostname.to_ascii_lowercase(), family);
        match self.entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.default_ttl => Some(entry.ip),
            Some(_) => {
                self.entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn entry_within_ttl_is_returned() {
        let mut cache = Cache::new(Duration::from_secs(60));
        cache.insert("example.com", Family::Inet, IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(
            cache.get("example.com", Family::Inet),
            Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)))
        );
    }

    #[test]
    fn expired_entry_is_evicted_on_lookup() {
        let mut cache = Cache::new(Duration::from_millis(1));
        cache.insert("example.com", Family::Inet, IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("example.com", Family::Inet), None);
    }

    #[test]
    fn flush_clears_everything() {
        let mut cache = Cache::new(Duration::from_secs(60));
        cache.insert("example.com", Family::Inet, IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)));
        cache.flush();
        assert_eq!(cache.get("example.com", Family::Inet), None);
    }
}
