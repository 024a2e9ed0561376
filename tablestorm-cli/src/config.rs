//! Profile configuration
//!
//! TOML profiles are the primary interface: one file pins down the whole
//! run (tables, populate, thread groups, watchdog, output) so a stress run
//! is reproducible from the profile plus a seed. CLI flags exist only for
//! quick overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use tablestorm_core::{ContextOptions, MonitorConfig, TableOptions, WorkloadOptions};

/// Top-level profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileConfig {
    pub experiment: ExperimentConfig,
    pub tables: TablesConfig,
    /// Populate phase; absent skips straight to the main workload.
    #[serde(default)]
    pub populate: Option<PopulateConfig>,
    /// Dedicated checkpoint thread for the main workload.
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
    /// Idle table-handle cycle watchdog.
    #[serde(default)]
    pub idle_cycle: Option<MonitorConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    /// Worker thread groups of the main workload.
    pub threads: Vec<ThreadGroupConfig>,
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

/// Run-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Random seed for reproducibility (absent = draw from entropy).
    #[serde(default)]
    pub seed: Option<u64>,
    /// Duration of the main workload phase.
    #[serde(with = "humantime_serde")]
    pub run_time: Duration,
    #[serde(default = "default_report_interval", with = "humantime_serde")]
    pub report_interval: Duration,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u64,
    #[serde(default = "default_sample_interval", with = "humantime_serde")]
    pub sample_interval: Duration,
    /// Operations slower than this count as over-max in the report.
    #[serde(default, with = "humantime_serde")]
    pub max_latency: Option<Duration>,
}

fn default_key_size() -> usize {
    20
}

fn default_value_size() -> usize {
    100
}

fn default_key_range() -> u64 {
    101_000
}

/// Table set definition. Handle-churn stress scales with `count`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TablesConfig {
    pub count: usize,
    #[serde(default = "default_key_size")]
    pub key_size: usize,
    #[serde(default = "default_value_size")]
    pub value_size: usize,
    /// Per-table key range the main-phase key distributions draw from.
    #[serde(default = "default_key_range")]
    pub key_range: u64,
}

fn default_populate_threads() -> usize {
    1
}

/// Populate phase: `icount` records split across the table set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PopulateConfig {
    pub icount: u64,
    #[serde(default = "default_populate_threads")]
    pub threads: usize,
    /// Total key space populate keys are spread over; defaults to `icount`
    /// (densely packed keys).
    #[serde(default)]
    pub random_range: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointConfig {
    /// Sleep between checkpoints.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("tablestorm-out")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory receiving latency.out.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig { dir: default_output_dir() }
    }
}

fn default_group_count() -> usize {
    1
}

fn default_throttle_burst() -> f64 {
    1.0
}

/// One group of identical worker threads. The `inserts`/`reads`/`updates`
/// counts say how many operations of each kind one cycle performs; each is
/// fanned out over the whole table set (or the group's partition of it).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreadGroupConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_group_count")]
    pub count: usize,
    #[serde(default)]
    pub inserts: u32,
    #[serde(default)]
    pub reads: u32,
    #[serde(default)]
    pub updates: u32,
    /// Per-thread rate limit, operations per second.
    #[serde(default)]
    pub throttle: Option<f64>,
    #[serde(default = "default_throttle_burst")]
    pub throttle_burst: f64,
    /// Pareto shape for key selection; absent means uniform keys.
    #[serde(default)]
    pub pareto: Option<f64>,
    /// Give each worker a disjoint slice of the table set instead of the
    /// whole set.
    #[serde(default)]
    pub partitioned: bool,
}

impl ThreadGroupConfig {
    pub fn display_name(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("group{index}"))
    }
}

impl ProfileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        let config: ProfileConfig = toml::from_str(&text)
            .with_context(|| format!("parsing profile {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.experiment.run_time.is_zero() {
            bail!("experiment.run_time must be > 0");
        }
        if self.experiment.sample_rate == 0 {
            bail!("experiment.sample_rate must be >= 1");
        }
        if self.tables.count == 0 {
            bail!("tables.count must be >= 1");
        }
        if self.tables.key_size == 0 {
            bail!("tables.key_size must be >= 1");
        }
        if self.tables.key_range == 0 {
            bail!("tables.key_range must be >= 1");
        }
        if let Some(populate) = &self.populate {
            if populate.icount == 0 {
                bail!("populate.icount must be > 0");
            }
            if populate.threads == 0 {
                bail!("populate.threads must be >= 1");
            }
            if let Some(range) = populate.random_range {
                if range < populate.icount {
                    bail!(
                        "populate.random_range ({range}) must be >= populate.icount ({})",
                        populate.icount
                    );
                }
            }
        }
        if let Some(checkpoint) = &self.checkpoint {
            if checkpoint.interval.is_zero() {
                bail!("checkpoint.interval must be > 0");
            }
        }
        if let Some(idle) = &self.idle_cycle {
            idle.validate()?;
        }
        if self.threads.is_empty() {
            bail!("profile defines no thread groups");
        }
        for (i, group) in self.threads.iter().enumerate() {
            let name = group.display_name(i);
            if group.count == 0 {
                bail!("thread group {name}: count must be >= 1");
            }
            if group.inserts == 0 && group.reads == 0 && group.updates == 0 {
                bail!("thread group {name}: operation mix is empty");
            }
            if let Some(throttle) = group.throttle {
                if !(throttle > 0.0) {
                    bail!("thread group {name}: throttle must be > 0");
                }
            }
            if !(group.throttle_burst > 0.0) {
                bail!("thread group {name}: throttle_burst must be > 0");
            }
            if let Some(pareto) = group.pareto {
                if !(pareto > 0.0) {
                    bail!("thread group {name}: pareto shape must be > 0");
                }
            }
        }
        Ok(())
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            table_count: self.tables.count,
            table_options: TableOptions {
                key_size: self.tables.key_size,
                value_size: self.tables.value_size,
                key_range: self.tables.key_range,
            },
            output_dir: self.output.dir.clone(),
            seed: self.experiment.seed,
        }
    }

    /// Options for the main (timed) workload phase.
    pub fn main_options(&self) -> WorkloadOptions {
        WorkloadOptions {
            run_time: Some(self.experiment.run_time),
            report_interval: self.experiment.report_interval,
            sample_rate: self.experiment.sample_rate,
            sample_interval: self.experiment.sample_interval,
            max_latency: self.experiment.max_latency,
            idle_cycle: self.idle_cycle.clone(),
        }
    }

    /// Options for the populate phase: run to completion, no watchdog.
    pub fn populate_options(&self) -> WorkloadOptions {
        WorkloadOptions {
            run_time: None,
            report_interval: self.experiment.report_interval,
            sample_rate: self.experiment.sample_rate,
            sample_interval: self.experiment.sample_interval,
            max_latency: None,
            idle_cycle: None,
        }
    }
}
