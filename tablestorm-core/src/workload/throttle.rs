//! Per-worker rate limiting
//!
//! A token bucket owned by a single worker thread. Tokens accrue at the
//! configured rate up to a burst capacity; each operation spends one token
//! or waits. Unused credit lets a worker catch up after a latency stall
//! without ever exceeding the long-run average rate.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

fn default_burst() -> f64 {
    1.0
}

/// Throttle settings for one worker thread.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Target sustained rate, operations per second.
    pub ops_per_sec: f64,

    /// Burst capacity in seconds of accrued credit. 1.0 means at most one
    /// second's worth of operations can fire back to back.
    #[serde(default = "default_burst")]
    pub burst: f64,
}

impl ThrottleConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.ops_per_sec > 0.0) {
            anyhow::bail!("throttle ops_per_sec must be > 0, got {}", self.ops_per_sec);
        }
        if !(self.burst > 0.0) {
            anyhow::bail!("throttle burst must be > 0, got {}", self.burst);
        }
        Ok(())
    }
}

/// Live token bucket. Thread-confined; one per throttled worker.
#[derive(Debug)]
pub struct Throttle {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last: Instant,
}

impl Throttle {
    pub fn new(config: &ThrottleConfig) -> Self {
        let capacity = (config.ops_per_sec * config.burst).max(1.0);
        Throttle {
            rate: config.ops_per_sec,
            capacity,
            // Start full so the first operations are not artificially delayed.
            tokens: capacity,
            last: Instant::now(),
        }
    }

    /// Take one token. Returns `None` when the operation may proceed now, or
    /// the duration the caller must wait first. The token is spent either
    /// way; after sleeping the returned duration the caller proceeds without
    /// calling `acquire` again.
    pub fn acquire(&mut self) -> Option<Duration> {
        let now = Instant::now();
        self.tokens =
            (self.tokens + now.duration_since(self.last).as_secs_f64() * self.rate).min(self.capacity);
        self.last = now;
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(-self.tokens / self.rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_validation() {
        assert!(ThrottleConfig { ops_per_sec: 0.0, burst: 1.0 }.validate().is_err());
        assert!(ThrottleConfig { ops_per_sec: -5.0, burst: 1.0 }.validate().is_err());
        assert!(ThrottleConfig { ops_per_sec: 100.0, burst: 0.0 }.validate().is_err());
        assert!(ThrottleConfig { ops_per_sec: 100.0, burst: 1.0 }.validate().is_ok());
    }

    #[test]
    fn test_burst_then_wait() {
        let mut throttle = Throttle::new(&ThrottleConfig { ops_per_sec: 10.0, burst: 1.0 });

        // Capacity is 10 tokens; the first 10 acquisitions are free.
        for i in 0..10 {
            assert!(throttle.acquire().is_none(), "op {i} should ride the initial burst");
        }
        let wait = throttle.acquire();
        assert!(wait.is_some(), "11th immediate op must be delayed");
        assert!(wait.unwrap() <= Duration::from_millis(150));
    }

    #[test]
    fn test_long_run_rate_bounded() {
        let mut throttle = Throttle::new(&ThrottleConfig { ops_per_sec: 1000.0, burst: 0.01 });
        let start = Instant::now();
        let mut ops = 0u64;
        while start.elapsed() < Duration::from_millis(200) {
            if let Some(wait) = throttle.acquire() {
                thread::sleep(wait);
            }
            ops += 1;
        }
        // 1000 ops/s for 0.2 s plus the 10-token burst, with slack for
        // scheduler jitter.
        assert!(ops <= 320, "throttle let through {ops} ops in 200ms");
        assert!(ops >= 100, "throttle overshot: only {ops} ops in 200ms");
    }

    #[test]
    fn test_credit_capped_at_capacity() {
        let mut throttle = Throttle::new(&ThrottleConfig { ops_per_sec: 10_000.0, burst: 0.001 });
        thread::sleep(Duration::from_millis(50));
        // 50ms of idle time would accrue 500 tokens uncapped; capacity is 10.
        let mut free = 0;
        while throttle.acquire().is_none() {
            free += 1;
            assert!(free < 100, "burst credit not capped");
        }
        assert!(free <= 15, "expected ~10 free ops, got {free}");
    }
}
