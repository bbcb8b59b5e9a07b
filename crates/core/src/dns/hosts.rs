//! `/etc/hosts`-compatible static overrides (§4.3, §6 "Persisted state:
//! None in core; hosts file is read-only").

use std::collections::HashMap;
use std::net::IpAddr;

use super::Family;

#[derive(Debug, Default, Clone)]
pub struct HostsFile {
    entries: HashMap<(String, Family), IpAddr>,
}

impl HostsFile {
    pub fn insert(&mut self, hostname: &str, family: Family, ip: IpAddr) {
        self.entries.insert((hostname.to_ascii_lowercase(), family), ip);
    }

    pub fn lookup(&self, hostname: &str, family: Family) -> Option<IpAddr> {
        self.entries.get(&(hostname.to_ascii_lowercase(), family)).copied()
    }

    /// Parse a standard `<ip> <hostname> [aliases...]` hosts file, one
    /// entry per non-comment line.
    pub fn parse(text: &str) -> Self {
        let mut hosts = HostsFile::default();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(ip_str) = fields.next() else { continue };
            let Ok(ip) = ip_str.parse::<IpAddr>() else { continue };
            let family = if ip.is_ipv4() { Family::Inet } else { Family::Inet6 };
            for name in fields {
                hosts.insert(name, family, ip);
            }
        }
        hosts
    }

    pub fn load_file(path: &std::path::Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn parses_standard_hosts_format() {
        let text = "127.0.0.1 localhost loopback\n# comment\n10.0.0.5 db.internal\n";
        let hosts = HostsFile::parse(text);
        assert_eq!(
            hosts.lookup("localhost", Family::Inet),
            Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)))
        );
        assert_eq!(
            hosts.lookup("loopback", Family::Inet),
            Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)))
        );
        assert_eq!(
            hosts.lookup("db.internal", Family::Inet),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
        );
    }

    #[test]
    fn ignores_comment_only_lines() {
        let hosts = HostsFile::parse("# nothing here\n\n");
        assert_eq!(hosts.lookup("anything", Family::Inet), None);
    }
}
