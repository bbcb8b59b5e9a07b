//! NTP client (§4.4): mode-3 query to mode-4 reply, 48-byte packets,
//! retried across a per-family server pool. Returns 0 on total failure
//! rather than propagating an error, matching the original's
//! synchronous-looking but non-blocking call shape.

use std::net::SocketAddr;
use std::time::Duration;

const NTP_PACKET_SIZE: usize = 48;
/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch.
const NTP_UNIX_EPOCH_OFFSET: u64 = 2_208_988_800;
const LI_NO_WARNING: u8 = 0;
const VN_3: u8 = 3;
const MODE_CLIENT: u8 = 3;
const MODE_SERVER: u8 = 4;

pub fn build_request() -> [u8; NTP_PACKET_SIZE] {
    let mut packet = [0u8; NTP_PACKET_SIZE];
    packet[0] = (LI_NO_WARNING << 6) | (VN_3 << 3) | MODE_CLIENT;
    packet
}

/// Extract the mode-4 transmit timestamp and convert to Unix milliseconds.
/// Returns `None` if the reply isn't a well-formed mode-4 packet.
pub fn parse_reply(packet: &[u8]) -> Option<u64> {
    if packet.len() < NTP_PACKET_SIZE {
        return None;
    }
    let mode = packet[0] & 0x07;
    if mode != MODE_SERVER {
        return None;
    }
    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]) as u64;
    let unix_seconds = seconds.checked_sub(NTP_UNIX_EPOCH_OFFSET)?;
    let millis_from_fraction = (fraction * 1000) >> 32;
    Some(unix_seconds * 1000 + millis_from_fraction)
}

/// Query each server in `pool` in order until one replies within
/// `per_server_timeout`; returns 0 if every server fails (§4.4).
/// `query_fn` performs the actual UDP round trip so tests can simulate
/// servers without a socket.
pub async fn now_unix_millis<F, Fut>(
    pool: &[SocketAddr],
    per_server_timeout: Duration,
    query_fn: F,
) -> u64
where
    F: Fn(SocketAddr, [u8; NTP_PACKET_SIZE]) -> Fut,
    Fut: std::future::Future<Output = Option<Vec<u8>>>,
{
    let request = build_request();
    for server in pool {
        let attempt = tokio::time::timeout(per_server_timeout, query_fn(*server, request)).await;
        if let Ok(Some(reply)) = attempt {
            if let Some(millis) = parse_reply(&reply) {
                return millis;
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn fake_reply(unix_seconds: u64) -> Vec<u8> {
        let mut packet = vec![0u8; NTP_PACKET_SIZE];
        packet[0] = (LI_NO_WARNING << 6) | (VN_3 << 3) | MODE_SERVER;
        let ntp_seconds = (unix_seconds + NTP_UNIX_EPOCH_OFFSET) as u32;
        packet[40..44].copy_from_slice(&ntp_seconds.to_be_bytes());
        packet
    }

    #[test]
    fn request_has_client_mode_and_version_3() {
        let req = build_request();
        assert_eq!(req[0] & 0x07, MODE_CLIENT);
        assert_eq!((req[0] >> 3) & 0x07, VN_3);
    }

    #[test]
    fn parses_reply_into_unix_millis() {
        let reply = fake_reply(1_700_000_000);
        let millis = parse_reply(&reply).unwrap();
        assert_eq!(millis, 1_700_000_000_000);
    }

    #[test]
    fn rejects_non_server_mode_reply() {
        let mut reply = fake_reply(1_700_000_000);
        reply[0] = (LI_NO_WARNING << 6) | (VN_3 << 3) | MODE_CLIENT;
        assert!(parse_reply(&reply).is_none());
    }

    #[tokio::test]
    async fn falls_through_pool_to_second_server() {
        let addr_a = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 123));
        let addr_b = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 123));
        let result = now_unix_millis(&[addr_a, addr_b], Duration::from_millis(50), |addr, _req| async move {
            if addr == addr_a {
                None
            } else {
                Some(fake_reply(1_700_000_000))
            }
        })
        .await;
        assert_eq!(result, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn all_servers_failing_returns_zero() {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 123));
        let result = now_unix_millis(&[addr], Duration::from_millis(10), |_addr, _req| async { None }).await;
        assert_eq!(result, 0);
    }
}
