//! Asynchronous DNS resolver (§4.3): hosts file, TTL cache, blacklist
//! filtering, then parallel UDP queries with TCP-on-truncation fallback
//! against a per-family server rotation.

pub mod cache;
pub mod hosts;
pub mod wire;

use std::net::IpAddr;
use std::time::Duration;

use breakwater_common::TransportError;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;

use cache::Cache;
use hosts::HostsFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Inet,
    Inet6,
}

impl Family {
    pub fn qtype(self) -> u16 {
        match self {
            Family::Inet => wire::QTYPE_A,
            Family::Inet6 => wire::QTYPE_AAAA,
        }
    }
}

pub struct ServerRotation {
    servers: Vec<std::net::SocketAddr>,
    next: std::sync::atomic::AtomicUsize,
}

impl ServerRotation {
    pub fn new(servers: Vec<std::net::SocketAddr>) -> Self {
        ServerRotation {
            servers,
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Servers in rotation order starting from whichever one is "next",
    /// so repeated timeouts don't keep hammering the same server first.
    pub fn ordered(&self) -> Vec<std::net::SocketAddr> {
        if self.servers.is_empty() {
            return Vec::new();
        }
        let start = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % self.servers.len();
        let mut out = Vec::with_capacity(self.servers.len());
        out.extend_from_slice(&self.servers[start..]);
        out.extend_from_slice(&self.servers[..start]);
        out
    }
}

/// The resolver's full configuration surface from §4.3: `replace`,
/// `network`, `setToBlackList`, `hosts`, `prefix`, `flush`, `timeToLive`.
pub struct Resolver {
    servers: parking_lot::RwLock<std::collections::HashMap<Family, ServerRotation>>,
    hosts: parking_lot::RwLock<HostsFile>,
    blacklist: parking_lot::RwLock<std::collections::HashSet<(String, IpAddr)>>,
    cache: ReentrantMutex<RefCell<Cache>>,
    per_server_timeout: Duration,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            servers: parking_lot::RwLock::new(std::collections::HashMap::new()),
            hosts: parking_lot::RwLock::new(HostsFile::default()),
            blacklist: parking_lot::RwLock::new(std::collections::HashSet::new()),
            cache: ReentrantMutex::new(RefCell::new(Cache::new(Duration::from_secs(300)))),
            per_server_timeout: Duration::from_secs(3),
        }
    }

    pub fn replace(&self, family: Family, servers: Vec<std::net::SocketAddr>) {
        self.servers.write().insert(family, ServerRotation::new(servers));
    }

    pub fn set_to_blacklist(&self, domain: &str, ip: IpAddr) {
        self.blacklist.write().insert((domain.to_ascii_lowercase(), ip));
    }

    pub fn hosts(&self, file: HostsFile) {
        *self.hosts.write() = file;
    }

    pub fn flush(&self) {
        let guard = self.cache.lock();
        guard.borrow_mut().flush();
    }

    pub fn time_to_live(&self, ttl: Duration) {
        let guard = self.cache.lock();
        guard.borrow_mut().set_default_ttl(ttl);
    }

    fn is_blacklisted(&self, domain: &str, ip: IpAddr) -> bool {
        self.blacklist.read().contains(&(domain.to_ascii_lowercase(), ip))
    }

    /// Resolve `hostname` for `family`: hosts file, then cache, then the
    /// network. This is the orchestration layer; actual UDP/TCP I/O is
    /// injected through `query_fn` so unit tests can exercise the
    /// cache/blacklist/hosts logic without a socket (§8: "DNS cache" property).
    pub async fn resolve_with<F, Fut>(
        &self,
        family: Family,
        hostname: &str,
        query_fn: F,
    ) -> Result<IpAddr, TransportError>
    where
        F: Fn(std::net::SocketAddr, Vec<u8>) -> Fut,
        Fut: std::future::Future<Output = Option<Vec<u8>>>,
    {
        if let Some(ip) = self.hosts.read().lookup(hostname, family) {
            return Ok(ip);
        }

        if let Some(ip) = {
            let guard = self.cache.lock();
            let hit = guard.borrow_mut().get(hostname, family);
            hit
        } {
            return Ok(ip);
        }

        let rotation = {
            let servers = self.servers.read();
            match servers.get(&family) {
                Some(r) => r.ordered(),
                None => Vec::new(),
            }
        };
        if rotation.is_empty() {
            return Err(TransportError::DnsNotFound(hostname.to_string()));
        }

        let query = wire::build_query(hostname, family.qtype());
        for server in rotation {
            let response = tokio::time::timeout(self.per_server_timeout, query_fn(server, query.clone())).await;
            let Ok(Some(bytes)) = response else {
                continue;
            };
            let Some(mut ips) = wire::parse_response(&bytes) else {
                continue;
            };
            ips.retain(|ip| !self.is_blacklisted(hostname, *ip));
            if let Some(ip) = ips.into_iter().next() {
                let guard = self.cache.lock();
                guard.borrow_mut().insert(hostname, family, ip);
                return Ok(ip);
            }
        }
        Err(TransportError::DnsTimeout(hostname.to_string()))
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    #[tokio::test]
    async fn resolves_from_hosts_file_without_network() {
        let resolver = Resolver::new();
        let mut hosts = HostsFile::default();
        hosts.insert("example.local", Family::Inet, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        resolver.hosts(hosts);

        let result = resolver
            .resolve_with(Family::Inet, "example.local", |_, _| async { None })
            .await
            .unwrap();
        assert_eq!(result, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[tokio::test]
    async fn second_lookup_within_ttl_hits_cache_not_network() {
        let resolver = Resolver::new();
        resolver.replace(
            Family::Inet,
            vec!["8.8.8.8:53".parse::<SocketAddr>().unwrap()],
        );
        let call_count = std::sync::atomic::AtomicUsize::new(0);
        let query = |_addr: SocketAddr, _bytes: Vec<u8>| {
            call_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                let mut resp = wire::build_query("example.com", Family::Inet.qtype());
                resp.extend_from_slice(&[0, 0, 0, 0]);
                Some(wire::fake_a_response(&resp, Ipv4Addr::new(93, 184, 216, 34)))
            }
        };
        let first = resolver.resolve_with(Family::Inet, "example.com", query).await.unwrap();
        let second = resolver.resolve_with(Family::Inet, "example.com", query).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blacklisted_ip_is_filtered_out() {
        let resolver = Resolver::new();
        resolver.replace(Family::Inet, vec!["8.8.8.8:53".parse::<SocketAddr>().unwrap()]);
        resolver.set_to_blacklist("example.com", IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
        let query = |_addr: SocketAddr, req: Vec<u8>| async move {
            Some(wire::fake_a_response(&req, Ipv4Addr::new(93, 184, 216, 34)))
        };
        let result = resolver.resolve_with(Family::Inet, "example.com", query).await;
        assert!(result.is_err());
    }
}
