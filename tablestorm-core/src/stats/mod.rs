//! Latency and throughput accounting
//!
//! One [`LatencyRecorder`] is shared by every worker in a run. Each measured
//! operation kind gets its own mutex-guarded shard holding a cumulative and
//! an interval HDR histogram, so contention is per-kind rather than global.
//! Operation counts are always exact; histogram recording can be thinned
//! with `sample_rate` when timer overhead matters.

pub mod report;

use std::sync::Mutex;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;

use crate::error::{Error, Result};
use crate::workload::OpKind;

/// Highest latency the histograms can represent, one hour in microseconds.
/// Anything above is clamped, not dropped.
const HIGH_US: u64 = 3_600_000_000;
const SIGFIGS: u8 = 3;

#[derive(Debug)]
struct OpLatency {
    cumulative: Histogram<u64>,
    interval: Histogram<u64>,
    /// Exact counters, independent of histogram sampling.
    ops: u64,
    interval_ops: u64,
    over_max: u64,
    sum_us: u64,
    min_us: u64,
    max_us: u64,
    /// Total records seen, for the every-Nth sampling decision.
    seen: u64,
}

impl OpLatency {
    fn new() -> Result<Self> {
        let mk = || {
            Histogram::new_with_bounds(1, HIGH_US, SIGFIGS)
                .map_err(|e| Error::Stats(format!("histogram creation failed: {e}")))
        };
        Ok(OpLatency {
            cumulative: mk()?,
            interval: mk()?,
            ops: 0,
            interval_ops: 0,
            over_max: 0,
            sum_us: 0,
            min_us: u64::MAX,
            max_us: 0,
            seen: 0,
        })
    }
}

/// Per-operation figures for one reporting interval.
#[derive(Debug, Clone)]
pub struct IntervalStats {
    pub kind: OpKind,
    pub ops: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Cumulative per-operation figures for the whole run.
#[derive(Debug, Clone)]
pub struct OpSummary {
    pub kind: OpKind,
    pub ops: u64,
    pub over_max: u64,
    pub min_us: u64,
    pub avg_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Shared latency sink for all workers of a run.
#[derive(Debug)]
pub struct LatencyRecorder {
    start: Instant,
    sample_rate: u64,
    max_latency: Option<Duration>,
    shards: Vec<Mutex<OpLatency>>,
}

impl LatencyRecorder {
    /// `sample_rate` of N records every Nth latency into the histograms
    /// (counts stay exact); `max_latency` is the threshold for the
    /// `over_max` counter.
    pub fn new(sample_rate: u64, max_latency: Option<Duration>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Stats("sample_rate must be >= 1".into()));
        }
        let mut shards = Vec::with_capacity(OpKind::MEASURED.len());
        for _ in &OpKind::MEASURED {
            shards.push(Mutex::new(OpLatency::new()?));
        }
        Ok(LatencyRecorder { start: Instant::now(), sample_rate, max_latency, shards })
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record one completed operation. Non-measured kinds are ignored.
    pub fn record(&self, kind: OpKind, latency: Duration) {
        let Some(index) = kind.measured_index() else {
            return;
        };
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);

        // A poisoned shard means a worker panicked mid-record; the run is
        // already coming down, so drop the sample rather than cascade.
        let Ok(mut shard) = self.shards[index].lock() else {
            return;
        };
        shard.ops += 1;
        shard.interval_ops += 1;
        shard.sum_us = shard.sum_us.saturating_add(us);
        shard.min_us = shard.min_us.min(us);
        shard.max_us = shard.max_us.max(us);
        if let Some(max) = self.max_latency {
            if latency > max {
                shard.over_max += 1;
            }
        }
        shard.seen += 1;
        if shard.seen % self.sample_rate == 0 {
            let clamped = us.clamp(1, HIGH_US);
            shard.cumulative.saturating_record(clamped);
            shard.interval.saturating_record(clamped);
        }
    }

    /// Total exact operation count across all measured kinds.
    pub fn total_ops(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| s.lock().map(|shard| shard.ops).unwrap_or(0))
            .sum()
    }

    /// Exact operation count for one kind.
    pub fn ops(&self, kind: OpKind) -> u64 {
        kind.measured_index()
            .and_then(|i| self.shards[i].lock().ok().map(|shard| shard.ops))
            .unwrap_or(0)
    }

    /// Drain the current interval: per-kind figures since the previous call,
    /// with the interval histograms and counters reset.
    pub fn interval_snapshot(&self) -> Vec<IntervalStats> {
        OpKind::MEASURED
            .iter()
            .zip(&self.shards)
            .filter_map(|(&kind, shard)| {
                let mut shard = shard.lock().ok()?;
                let stats = IntervalStats {
                    kind,
                    ops: shard.interval_ops,
                    p95_us: shard.interval.value_at_quantile(0.95),
                    p99_us: shard.interval.value_at_quantile(0.99),
                    max_us: shard.interval.max(),
                };
                shard.interval_ops = 0;
                shard.interval.reset();
                Some(stats)
            })
            .collect()
    }

    /// Cumulative summary for the whole run, one entry per measured kind in
    /// a stable order, including kinds that saw no operations.
    pub fn summary(&self) -> Vec<OpSummary> {
        OpKind::MEASURED
            .iter()
            .zip(&self.shards)
            .map(|(&kind, shard)| match shard.lock() {
                Ok(shard) => OpSummary {
                    kind,
                    ops: shard.ops,
                    over_max: shard.over_max,
                    min_us: if shard.ops == 0 { 0 } else { shard.min_us },
                    avg_us: if shard.ops == 0 { 0 } else { shard.sum_us / shard.ops },
                    p50_us: shard.cumulative.value_at_quantile(0.5),
                    p95_us: shard.cumulative.value_at_quantile(0.95),
                    p99_us: shard.cumulative.value_at_quantile(0.99),
                    max_us: shard.cumulative.max(),
                },
                Err(_) => OpSummary {
                    kind,
                    ops: 0,
                    over_max: 0,
                    min_us: 0,
                    avg_us: 0,
                    p50_us: 0,
                    p95_us: 0,
                    p99_us: 0,
                    max_us: 0,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counts_exact_across_threads() {
        let recorder = Arc::new(LatencyRecorder::new(1, None).unwrap());
        let workers = 8;
        let samples = 1000;

        thread::scope(|scope| {
            for _ in 0..workers {
                let recorder = Arc::clone(&recorder);
                scope.spawn(move || {
                    for i in 0..samples {
                        recorder.record(OpKind::Insert, Duration::from_micros(i % 500 + 1));
                    }
                });
            }
        });

        assert_eq!(recorder.ops(OpKind::Insert), workers * samples);
        assert_eq!(recorder.total_ops(), workers * samples);
        assert_eq!(recorder.ops(OpKind::Search), 0);
    }

    #[test]
    fn test_sampling_keeps_counts_exact() {
        let recorder = LatencyRecorder::new(10, None).unwrap();
        for _ in 0..95 {
            recorder.record(OpKind::Search, Duration::from_micros(100));
        }
        assert_eq!(recorder.ops(OpKind::Search), 95, "ops count must ignore sampling");

        let summary = recorder.summary();
        let search = summary.iter().find(|s| s.kind == OpKind::Search).unwrap();
        // Every 10th of 95 records lands in the histogram.
        assert_eq!(search.p50_us, 100);
        assert_eq!(search.avg_us, 100);
    }

    #[test]
    fn test_over_max_counter() {
        let recorder = LatencyRecorder::new(1, Some(Duration::from_millis(1))).unwrap();
        recorder.record(OpKind::Insert, Duration::from_micros(500));
        recorder.record(OpKind::Insert, Duration::from_millis(5));
        recorder.record(OpKind::Insert, Duration::from_millis(2));

        let summary = recorder.summary();
        let insert = summary.iter().find(|s| s.kind == OpKind::Insert).unwrap();
        assert_eq!(insert.ops, 3);
        assert_eq!(insert.over_max, 2);
    }

    #[test]
    fn test_interval_resets() {
        let recorder = LatencyRecorder::new(1, None).unwrap();
        recorder.record(OpKind::Update, Duration::from_micros(200));
        recorder.record(OpKind::Update, Duration::from_micros(400));

        let first = recorder.interval_snapshot();
        let update = first.iter().find(|s| s.kind == OpKind::Update).unwrap();
        assert_eq!(update.ops, 2);
        assert!(update.max_us >= 400);

        let second = recorder.interval_snapshot();
        let update = second.iter().find(|s| s.kind == OpKind::Update).unwrap();
        assert_eq!(update.ops, 0, "interval counters must reset after a snapshot");
        assert_eq!(update.max_us, 0);

        // Cumulative view is unaffected by interval drains.
        assert_eq!(recorder.ops(OpKind::Update), 2);
    }

    #[test]
    fn test_sleep_not_measured() {
        let recorder = LatencyRecorder::new(1, None).unwrap();
        recorder.record(OpKind::Sleep, Duration::from_secs(30));
        assert_eq!(recorder.total_ops(), 0);
    }

    #[test]
    fn test_summary_covers_all_kinds() {
        let recorder = LatencyRecorder::new(1, None).unwrap();
        let summary = recorder.summary();
        assert_eq!(summary.len(), OpKind::MEASURED.len());
        assert!(summary.iter().all(|s| s.ops == 0 && s.min_us == 0));
    }
}
