//! End-of-run latency report
//!
//! Plain line-oriented `key=value` text, stable across runs so files from
//! different runs diff cleanly. One line per measured operation kind, even
//! for kinds that saw no traffic.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use super::OpSummary;

/// Terminal state recorded in the report header.
#[derive(Debug, Clone)]
pub enum RunStatus {
    Ok,
    Fatal(String),
}

impl RunStatus {
    fn as_line(&self) -> String {
        match self {
            RunStatus::Ok => "ok".to_string(),
            RunStatus::Fatal(cause) => format!("fatal: {cause}"),
        }
    }
}

/// Write the cumulative latency summary to `path`, overwriting any previous
/// report at that location.
pub fn write_summary(
    path: &Path,
    elapsed: Duration,
    summaries: &[OpSummary],
    status: &RunStatus,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "# elapsed_s={:.3} status={}", elapsed.as_secs_f64(), status.as_line())?;
    for s in summaries {
        writeln!(
            out,
            "op={} ops={} over_max={} min_us={} avg_us={} p50_us={} p95_us={} p99_us={} max_us={}",
            s.kind.name(),
            s.ops,
            s.over_max,
            s.min_us,
            s.avg_us,
            s.p50_us,
            s.p95_us,
            s.p99_us,
            s.max_us,
        )?;
    }
    out.flush()
}
