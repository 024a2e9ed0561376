//! Workload-execution engine for the tablestorm harness
//!
//! tablestorm stress-tests multi-table storage engines under table-handle
//! churn: many tables, mixed insert/read traffic spread across all of them,
//! periodic checkpoints, and a watchdog on the engine's idle-handle sweep.
//! This crate holds the machinery shared by every front-end: key and value
//! generation, operation templates and their multi-table expansion, the
//! worker threads and their rate limiting, latency accounting, and the run
//! orchestrator.
//!
//! A typical phase is assembled from operation templates and run against a
//! [`Context`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tablestorm_core::{
//!     Context, ContextOptions, KeySpec, Operation, TableOptions, ThreadSpec,
//!     WorkloadBuilder, WorkloadOptions,
//! };
//! use tablestorm_engine::MemoryEngine;
//!
//! # fn main() -> tablestorm_core::Result<()> {
//! let ctx = Context::create(
//!     MemoryEngine::new(),
//!     ContextOptions {
//!         table_count: 8,
//!         table_options: TableOptions::default(),
//!         output_dir: "run-out".into(),
//!         seed: Some(42),
//!     },
//! )?;
//!
//! let insert = Operation::insert(Arc::clone(&ctx.tables()[0]), KeySpec::Uniform { range: 1000 });
//! let workload = WorkloadBuilder::new(WorkloadOptions {
//!     run_time: Some(std::time::Duration::from_secs(10)),
//!     ..WorkloadOptions::default()
//! })
//! .add_thread(ThreadSpec { name: "inserts".into(), ops: vec![insert], throttle: None })
//! .build()?;
//!
//! let summary = workload.run(&ctx)?;
//! println!("{} ops in {:?}", summary.total_ops, summary.elapsed);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod error;
pub mod monitor;
pub mod seed;
pub mod stats;
pub mod workload;

pub use context::{Context, ContextOptions, Table};
pub use error::{Error, Result};
pub use monitor::{IdleCycleVerdict, MonitorConfig};
pub use stats::report::RunStatus;
pub use stats::{IntervalStats, LatencyRecorder, OpSummary};
pub use workload::{
    expand_over_tables, populate_with_range, replicate, sequence, CancelToken, KeySpec, OpKind,
    Operation, RunSummary, ThreadSpec, ThrottleConfig, Workload, WorkloadBuilder,
    WorkloadOptions,
};

// The engine seam, re-exported so front-ends depend on one crate.
pub use tablestorm_engine::{Session, StorageEngine, TableOptions};
