//! Key generation
//!
//! Keys are drawn from a configured distribution and formatted to the
//! table's fixed key width. A [`KeySpec`] is the declarative, cloneable
//! description carried inside operation templates; each worker instantiates
//! its own [`KeyGenerator`] (with its own derived seed) at start, so there is
//! no RNG sharing across threads.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as _, Pareto};

/// Declarative key-distribution description.
///
/// - `Uniform`: every key in `[0, range)` equally likely.
/// - `Pareto`: long-tailed access concentrated on low keys. `skew` is the
///   Pareto shape parameter; skew = 1 degenerates to uniform and larger
///   values push more mass toward the hot low end of the range. This is the
///   knob that exercises cache/eviction behavior under non-uniform pressure.
/// - `Range`: `count` keys starting at `start`, spaced `stride` apart, each
///   produced exactly once. Disjoint ranges per worker avoid overlapping
///   writes during populate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeySpec {
    Uniform { range: u64 },
    Pareto { range: u64, skew: f64 },
    Range { start: u64, count: u64, stride: u64 },
}

impl KeySpec {
    pub fn validate(&self) -> anyhow::Result<()> {
        match *self {
            KeySpec::Uniform { range } => {
                if range == 0 {
                    anyhow::bail!("uniform key range must be > 0");
                }
            }
            KeySpec::Pareto { range, skew } => {
                if range == 0 {
                    anyhow::bail!("pareto key range must be > 0");
                }
                if !(skew > 0.0) {
                    anyhow::bail!("pareto skew must be > 0, got {skew}");
                }
            }
            KeySpec::Range { count, stride, .. } => {
                if count == 0 {
                    anyhow::bail!("key range partition must contain at least one key");
                }
                if stride == 0 {
                    anyhow::bail!("key stride must be >= 1");
                }
            }
        }
        Ok(())
    }

    /// Build the worker-owned generator for this spec.
    pub fn instantiate(&self, seed: u64) -> anyhow::Result<KeyGenerator> {
        self.validate()?;
        Ok(match *self {
            KeySpec::Uniform { range } => KeyGenerator::Uniform {
                range,
                rng: SmallRng::seed_from_u64(seed),
            },
            KeySpec::Pareto { range, skew } => KeyGenerator::Pareto {
                range,
                dist: Pareto::new(1.0, skew)?,
                rng: SmallRng::seed_from_u64(seed),
            },
            KeySpec::Range { start, count, stride } => KeyGenerator::Range {
                next: start,
                remaining: count,
                stride,
            },
        })
    }
}

/// Live per-worker key stream. Thread-confined; never shared.
#[derive(Debug)]
pub enum KeyGenerator {
    Uniform { range: u64, rng: SmallRng },
    Pareto { range: u64, dist: Pareto<f64>, rng: SmallRng },
    Range { next: u64, remaining: u64, stride: u64 },
}

impl KeyGenerator {
    /// Next key, or `None` once a finite range partition is exhausted.
    /// Uniform and Pareto streams never exhaust.
    pub fn next_key(&mut self) -> Option<u64> {
        match self {
            KeyGenerator::Uniform { range, rng } => Some(rng.random_range(0..*range)),
            KeyGenerator::Pareto { range, dist, rng } => {
                // Inverse-CDF mapping onto [0, range): a Pareto(1, skew)
                // sample s has CDF 1 - s^-skew, so 1 - 1/s lands in [0, 1)
                // with P(x < q) = 1 - (1-q)^skew. Uniform at skew = 1,
                // low-key-heavy above it.
                let s: f64 = dist.sample(rng);
                let frac = 1.0 - 1.0 / s;
                let key = (frac * *range as f64) as u64;
                Some(key.min(*range - 1))
            }
            KeyGenerator::Range { next, remaining, stride } => {
                if *remaining == 0 {
                    return None;
                }
                let key = *next;
                *next += *stride;
                *remaining -= 1;
                Some(key)
            }
        }
    }
}

/// Format a key to the table's fixed width: zero-padded decimal, truncated
/// to the low-order digits if the number is wider than the column.
pub fn format_key(key: u64, key_size: usize) -> Vec<u8> {
    let digits = format!("{key:0key_size$}");
    let bytes = digits.as_bytes();
    if bytes.len() > key_size {
        bytes[bytes.len() - key_size..].to_vec()
    } else {
        bytes.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_in_range() {
        let mut keygen = KeySpec::Uniform { range: 1000 }.instantiate(1).unwrap();
        for _ in 0..10_000 {
            assert!(keygen.next_key().unwrap() < 1000);
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let spec = KeySpec::Pareto { range: 100_000, skew: 10.0 };
        let mut a = spec.instantiate(42).unwrap();
        let mut b = spec.instantiate(42).unwrap();
        let seq_a: Vec<u64> = (0..100).map(|_| a.next_key().unwrap()).collect();
        let seq_b: Vec<u64> = (0..100).map(|_| b.next_key().unwrap()).collect();
        assert_eq!(seq_a, seq_b, "identical seeds must produce identical key sequences");

        let mut c = spec.instantiate(43).unwrap();
        let seq_c: Vec<u64> = (0..100).map(|_| c.next_key().unwrap()).collect();
        assert_ne!(seq_a, seq_c, "different seeds should diverge");
    }

    #[test]
    fn test_pareto_skews_toward_low_keys() {
        let range = 10_000u64;
        let mut keygen = KeySpec::Pareto { range, skew: 10.0 }.instantiate(7).unwrap();

        let n = 20_000;
        let lowest_decile = (0..n)
            .filter(|_| keygen.next_key().unwrap() < range / 10)
            .count();

        // Uniform would put ~10% in the lowest decile; skew 10 concentrates
        // far more there (expected ~65%).
        assert!(
            lowest_decile as f64 / n as f64 > 0.3,
            "lowest decile got only {lowest_decile}/{n} keys"
        );
    }

    #[test]
    fn test_pareto_skew_one_close_to_uniform() {
        let range = 10_000u64;
        let mut keygen = KeySpec::Pareto { range, skew: 1.0 }.instantiate(11).unwrap();

        let n = 50_000;
        let lowest_decile = (0..n)
            .filter(|_| keygen.next_key().unwrap() < range / 10)
            .count();

        let frac = lowest_decile as f64 / n as f64;
        assert!((frac - 0.1).abs() < 0.02, "skew=1 lowest-decile fraction {frac} not near 0.1");
    }

    #[test]
    fn test_range_partition_exhausts() {
        let mut keygen =
            KeySpec::Range { start: 100, count: 3, stride: 10 }.instantiate(0).unwrap();
        assert_eq!(keygen.next_key(), Some(100));
        assert_eq!(keygen.next_key(), Some(110));
        assert_eq!(keygen.next_key(), Some(120));
        assert_eq!(keygen.next_key(), None);
        assert_eq!(keygen.next_key(), None);
    }

    #[test]
    fn test_spec_validation() {
        assert!(KeySpec::Uniform { range: 0 }.validate().is_err());
        assert!(KeySpec::Pareto { range: 100, skew: 0.0 }.validate().is_err());
        assert!(KeySpec::Pareto { range: 100, skew: -2.0 }.validate().is_err());
        assert!(KeySpec::Range { start: 0, count: 0, stride: 1 }.validate().is_err());
        assert!(KeySpec::Range { start: 0, count: 1, stride: 0 }.validate().is_err());
        assert!(KeySpec::Pareto { range: 100, skew: 1.5 }.validate().is_ok());
    }

    #[test]
    fn test_format_key_width() {
        assert_eq!(format_key(42, 8), b"00000042".to_vec());
        assert_eq!(format_key(123_456_789, 4), b"6789".to_vec());
        assert_eq!(format_key(0, 3), b"000".to_vec());
    }

    #[test]
    fn test_format_key_sorts_like_numbers() {
        let a = format_key(99, 10);
        let b = format_key(100, 10);
        assert!(a < b, "zero-padded keys must sort numerically");
    }
}
