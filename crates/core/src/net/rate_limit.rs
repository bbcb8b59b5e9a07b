//! Per-broker token-bucket bandwidth throttling (§4.2), parsed from strings
//! like `"12Mbps"`.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    rate_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_bytes_per_sec: f64) -> Self {
        TokenBucket {
            capacity: rate_bytes_per_sec,
            tokens: rate_bytes_per_sec,
            rate_per_sec: rate_bytes_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Returns the number of bytes (up to `want`) currently permitted, and
    /// consumes that many tokens. Never blocks — callers write less than
    /// requested and try again next turn.
    pub fn take(&mut self, want: usize) -> usize {
        self.refill();
        let allowed = self.tokens.min(want as f64);
        self.tokens -= allowed;
        allowed as usize
    }
}

/// Parse a throttle spec like `"12Mbps"`, `"512Kbps"`, `"1Gbps"` into
/// bytes/second. Bare numbers are treated as bytes/second.
pub fn parse_rate(spec: &str) -> Option<f64> {
    let spec = spec.trim();
    let lower = spec.to_ascii_lowercase();
    let (num_part, mult): (&str, f64) = if let Some(n) = lower.strip_suffix("gbps") {
        (n, 1_000_000_000.0 / 8.0)
    } else if let Some(n) = lower.strip_suffix("mbps") {
        (n, 1_000_000.0 / 8.0)
    } else if let Some(n) = lower.strip_suffix("kbps") {
        (n, 1_000.0 / 8.0)
    } else if let Some(n) = lower.strip_suffix("bps") {
        (n, 1.0 / 8.0)
    } else {
        (lower.as_str(), 1.0)
    };
    num_part.trim().parse::<f64>().ok().map(|n| n * mult)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_rate_suffixes() {
        assert_eq!(parse_rate("12Mbps"), Some(12_000_000.0 / 8.0));
        assert_eq!(parse_rate("512Kbps"), Some(512_000.0 / 8.0));
        assert_eq!(parse_rate("1Gbps"), Some(1_000_000_000.0 / 8.0));
        assert_eq!(parse_rate("100"), Some(100.0));
        assert_eq!(parse_rate("bogus"), None);
    }

    #[test]
    fn bucket_never_grants_more_than_available() {
        let mut b = TokenBucket::new(100.0);
        let got = b.take(1000);
        assert!(got <= 100);
    }
}
