//! Workload construction and execution
//!
//! A [`Workload`] is a validated set of worker thread blueprints plus run
//! options. [`Workload::run`] drives one phase end to end: it spawns one OS
//! thread per worker plus the idle-cycle monitor, ticks reporting timers on
//! the calling thread, tears everything down on the deadline or the first
//! fatal condition, and always writes the latency report before returning.

pub mod key;
pub mod ops;
pub mod throttle;
pub mod worker;

mod value;

pub use key::{format_key, KeyGenerator, KeySpec};
pub use ops::{
    expand_over_tables, populate_with_range, replicate, sequence, OpKind, Operation,
};
pub use throttle::{Throttle, ThrottleConfig};
pub use worker::ThreadSpec;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tablestorm_engine::{EngineError, StorageEngine};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::monitor::{run_monitor, MonitorConfig};
use crate::stats::report::{self, RunStatus};
use crate::stats::{LatencyRecorder, OpSummary};
use crate::workload::worker::run_worker;

/// Why a run was aborted. The first cause to fire wins; later ones are
/// dropped.
#[derive(Debug)]
pub(crate) enum FatalCause {
    Engine(EngineError),
    IdleCycle { observed: Duration, threshold: Duration },
    Setup(String),
}

impl fmt::Display for FatalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalCause::Engine(e) => write!(f, "storage engine error: {e}"),
            FatalCause::IdleCycle { observed, threshold } => {
                write!(f, "idle handle cycle took {observed:?}, bound {threshold:?}")
            }
            FatalCause::Setup(msg) => write!(f, "setup failed: {msg}"),
        }
    }
}

impl FatalCause {
    fn into_error(self) -> Error {
        match self {
            FatalCause::Engine(e) => Error::Engine(e),
            FatalCause::IdleCycle { observed, threshold } => {
                Error::IdleCycle { observed, threshold }
            }
            FatalCause::Setup(msg) => Error::Config(msg),
        }
    }
}

/// Caller-side cancellation handle for a running workload phase.
///
/// Cloneable and thread-safe; hand a clone to a signal handler or a
/// supervising thread and call [`cancel`](CancelToken::cancel) to end the
/// phase early. Cancellation is a clean termination, not an error: the run
/// drains, writes its report, and returns `Ok` with whatever it measured.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Shared shutdown latch. Workers poll it between operations; sleeps check
/// it in slices so even a 30s checkpoint-interval sleep unwinds promptly.
/// The latch is backed by the caller's [`CancelToken`], so an external
/// cancel, the deadline, and a fatal cause all stop through the same flag.
pub(crate) struct StopSignal {
    stopped: Arc<AtomicBool>,
    fatal: Mutex<Option<FatalCause>>,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self::with_token(CancelToken::new())
    }

    pub(crate) fn with_token(token: CancelToken) -> Self {
        StopSignal { stopped: token.cancelled, fatal: Mutex::new(None) }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Orderly shutdown, e.g. the run deadline. Not an error.
    pub(crate) fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Fatal shutdown. Only the first cause is kept.
    pub(crate) fn abort(&self, cause: FatalCause) {
        if let Ok(mut fatal) = self.fatal.lock() {
            fatal.get_or_insert(cause);
        }
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn take_fatal(&self) -> Option<FatalCause> {
        self.fatal.lock().ok().and_then(|mut fatal| fatal.take())
    }

    /// Sleep for `duration` unless the stop signal fires first. Returns true
    /// if the full duration elapsed.
    pub(crate) fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(50);
        let deadline = Instant::now() + duration;
        while !self.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLICE));
        }
        false
    }
}

fn default_report_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_sample_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_sample_rate() -> u64 {
    1
}

/// Options shared by every thread of one workload phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadOptions {
    /// Wall-clock duration of the phase. `None` runs to completion instead:
    /// the phase ends when every worker has drained its finite key ranges.
    #[serde(default, with = "humantime_serde")]
    pub run_time: Option<Duration>,

    /// Cadence of interval throughput log lines.
    #[serde(default = "default_report_interval", with = "humantime_serde")]
    pub report_interval: Duration,

    /// Record every Nth latency into the histograms. Counts stay exact.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u64,

    /// Cadence of cumulative latency snapshot log lines.
    #[serde(default = "default_sample_interval", with = "humantime_serde")]
    pub sample_interval: Duration,

    /// Operations slower than this are tallied in the `over_max` column.
    #[serde(default, with = "humantime_serde")]
    pub max_latency: Option<Duration>,

    /// Idle table-handle cycle watchdog; absent means unmonitored.
    #[serde(default)]
    pub idle_cycle: Option<MonitorConfig>,
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        WorkloadOptions {
            run_time: None,
            report_interval: default_report_interval(),
            sample_rate: default_sample_rate(),
            sample_interval: default_sample_interval(),
            max_latency: None,
            idle_cycle: None,
        }
    }
}

impl WorkloadOptions {
    fn validate(&self) -> anyhow::Result<()> {
        if self.report_interval.is_zero() {
            anyhow::bail!("report_interval must be > 0");
        }
        if self.sample_interval.is_zero() {
            anyhow::bail!("sample_interval must be > 0");
        }
        if self.sample_rate == 0 {
            anyhow::bail!("sample_rate must be >= 1");
        }
        if let Some(run_time) = self.run_time {
            if run_time.is_zero() {
                anyhow::bail!("run_time must be > 0 when set");
            }
        }
        if let Some(max) = self.max_latency {
            if max.is_zero() {
                anyhow::bail!("max_latency must be > 0 when set");
            }
        }
        if let Some(idle) = &self.idle_cycle {
            idle.validate()?;
        }
        Ok(())
    }
}

/// Validated, runnable workload phase.
pub struct Workload {
    threads: Vec<ThreadSpec>,
    options: WorkloadOptions,
}

/// Assembles thread blueprints into a [`Workload`], failing fast on any
/// inconsistent option before a single thread starts.
pub struct WorkloadBuilder {
    threads: Vec<ThreadSpec>,
    options: WorkloadOptions,
}

impl WorkloadBuilder {
    pub fn new(options: WorkloadOptions) -> Self {
        WorkloadBuilder { threads: Vec::new(), options }
    }

    pub fn add_thread(mut self, spec: ThreadSpec) -> Self {
        self.threads.push(spec);
        self
    }

    /// Add `count` workers sharing one blueprint. They share the name and
    /// throttle settings but each gets independent key streams.
    pub fn add_thread_group(mut self, spec: ThreadSpec, count: usize) -> Self {
        for _ in 0..count {
            self.threads.push(spec.clone());
        }
        self
    }

    pub fn build(self) -> Result<Workload> {
        self.options.validate()?;
        if self.threads.is_empty() {
            return Err(Error::Config("workload has no threads".into()));
        }
        for spec in &self.threads {
            if spec.ops.is_empty() {
                return Err(Error::Config(format!(
                    "thread {} has an empty operation sequence",
                    spec.name
                )));
            }
            for op in &spec.ops {
                op.validate()?;
            }
            if let Some(throttle) = &spec.throttle {
                throttle.validate()?;
            }
        }
        Ok(Workload { threads: self.threads, options: self.options })
    }
}

/// Terminal figures of a completed (non-fatal) run.
#[derive(Debug)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub total_ops: u64,
    pub idle_cycle_warnings: u64,
    pub report_path: PathBuf,
    summaries: Vec<OpSummary>,
}

impl RunSummary {
    pub fn op(&self, kind: OpKind) -> Option<&OpSummary> {
        self.summaries.iter().find(|s| s.kind == kind)
    }

    pub fn ops(&self, kind: OpKind) -> u64 {
        self.op(kind).map(|s| s.ops).unwrap_or(0)
    }

    pub fn summaries(&self) -> &[OpSummary] {
        &self.summaries
    }
}

/// Orchestrator tick; bounds how late a deadline or stop can be noticed.
const TICK: Duration = Duration::from_millis(20);

impl Workload {
    pub fn options(&self) -> &WorkloadOptions {
        &self.options
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Execute the phase to its end: deadline, completion, external cancel,
    /// or first fatal condition. The latency report is written in every
    /// case; a fatal run returns the cause as an error after the report is
    /// on disk.
    pub fn run<E: StorageEngine>(&self, ctx: &Context<E>) -> Result<RunSummary> {
        self.run_with_cancel(ctx, CancelToken::new())
    }

    /// Like [`run`](Workload::run), with a caller-held [`CancelToken`].
    /// Cancelling ends the phase promptly and cleanly: workers drain, the
    /// report is written, and the partial figures come back as `Ok`.
    pub fn run_with_cancel<E: StorageEngine>(
        &self,
        ctx: &Context<E>,
        token: CancelToken,
    ) -> Result<RunSummary> {
        let recorder =
            LatencyRecorder::new(self.options.sample_rate, self.options.max_latency)?;
        let stop = StopSignal::with_token(token);
        let run_to_completion = self.options.run_time.is_none();
        let active = AtomicUsize::new(self.threads.len());

        tracing::info!(
            threads = self.threads.len(),
            run_time = ?self.options.run_time,
            "starting workload phase"
        );

        let idle_cycle_warnings = thread::scope(|scope| {
            // Workers of the same group get consecutive indices so their
            // derived seeds never collide.
            let mut group_index: HashMap<&str, usize> = HashMap::new();
            for spec in &self.threads {
                let index = group_index.entry(spec.name.as_str()).or_insert(0);
                let worker_index = *index;
                *index += 1;

                let (recorder, stop, active) = (&recorder, &stop, &active);
                scope.spawn(move || {
                    run_worker(spec, worker_index, ctx, recorder, stop, run_to_completion);
                    active.fetch_sub(1, Ordering::AcqRel);
                });
            }

            let monitor_handle = self.options.idle_cycle.as_ref().map(|config| {
                let stop = &stop;
                scope.spawn(move || run_monitor(ctx.engine(), config, stop))
            });

            let started = Instant::now();
            let mut next_report = self.options.report_interval;
            let mut next_sample = self.options.sample_interval;
            loop {
                thread::sleep(TICK);
                if stop.is_stopped() {
                    break;
                }
                if run_to_completion && active.load(Ordering::Acquire) == 0 {
                    break;
                }
                let elapsed = started.elapsed();
                if let Some(run_time) = self.options.run_time {
                    if elapsed >= run_time {
                        break;
                    }
                }
                if elapsed >= next_report {
                    next_report += self.options.report_interval;
                    for s in recorder.interval_snapshot() {
                        if s.ops > 0 {
                            tracing::info!(
                                op = s.kind.name(),
                                ops = s.ops,
                                p95_us = s.p95_us,
                                p99_us = s.p99_us,
                                max_us = s.max_us,
                                "interval throughput"
                            );
                        }
                    }
                }
                if elapsed >= next_sample {
                    next_sample += self.options.sample_interval;
                    for s in recorder.summary() {
                        if s.ops > 0 {
                            tracing::debug!(
                                op = s.kind.name(),
                                ops = s.ops,
                                p50_us = s.p50_us,
                                p99_us = s.p99_us,
                                "cumulative latency"
                            );
                        }
                    }
                }
            }
            stop.request_stop();

            // Workers are joined by scope exit; the monitor is joined here
            // so its warning count survives.
            monitor_handle.and_then(|handle| handle.join().ok()).unwrap_or(0)
        });

        let elapsed = recorder.elapsed();
        let fatal = stop.take_fatal();
        let summaries = recorder.summary();
        let status = match &fatal {
            None => RunStatus::Ok,
            Some(cause) => RunStatus::Fatal(cause.to_string()),
        };
        let report_path = ctx.output_dir().join("latency.out");
        report::write_summary(&report_path, elapsed, &summaries, &status)?;

        match fatal {
            Some(cause) => {
                tracing::error!(cause = %cause, "workload phase aborted");
                Err(cause.into_error())
            }
            None => {
                let total_ops = summaries.iter().map(|s| s.ops).sum();
                tracing::info!(
                    elapsed_s = elapsed.as_secs_f64(),
                    total_ops,
                    idle_cycle_warnings,
                    "workload phase complete"
                );
                Ok(RunSummary {
                    elapsed,
                    total_ops,
                    idle_cycle_warnings,
                    report_path,
                    summaries,
                })
            }
        }
    }
}
