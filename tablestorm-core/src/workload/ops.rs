//! Operation model and composition
//!
//! An [`Operation`] is a template, not a running instance: a closed tagged
//! variant binding an operation kind to a table reference and a key
//! distribution. Templates compose through [`sequence`], [`replicate`] and
//! [`expand_over_tables`]; workers instantiate live key generators from the
//! templates at start time.

use std::sync::Arc;
use std::time::Duration;

use crate::context::Table;

use super::key::KeySpec;

/// Operation kinds, including the two non-keyed control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Search,
    Update,
    Sleep,
    Checkpoint,
}

impl OpKind {
    /// Kinds whose latency is measured and reported. Sleep only suspends the
    /// issuing worker and is excluded from latency accounting.
    pub const MEASURED: [OpKind; 4] =
        [OpKind::Insert, OpKind::Search, OpKind::Update, OpKind::Checkpoint];

    pub fn name(self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Search => "search",
            OpKind::Update => "update",
            OpKind::Sleep => "sleep",
            OpKind::Checkpoint => "checkpoint",
        }
    }

    /// Index into the recorder's per-kind shards.
    pub(crate) fn measured_index(self) -> Option<usize> {
        Self::MEASURED.iter().position(|&k| k == self)
    }
}

/// One atomic unit of work, bound to a table and key source where keyed.
#[derive(Debug, Clone)]
pub enum Operation {
    Insert { table: Arc<Table>, keys: KeySpec },
    Update { table: Arc<Table>, keys: KeySpec },
    Search { table: Arc<Table>, keys: KeySpec },
    Sleep { duration: Duration },
    Checkpoint,
}

impl Operation {
    pub fn insert(table: Arc<Table>, keys: KeySpec) -> Self {
        Operation::Insert { table, keys }
    }

    pub fn update(table: Arc<Table>, keys: KeySpec) -> Self {
        Operation::Update { table, keys }
    }

    pub fn search(table: Arc<Table>, keys: KeySpec) -> Self {
        Operation::Search { table, keys }
    }

    pub fn sleep(duration: Duration) -> Self {
        Operation::Sleep { duration }
    }

    pub fn checkpoint() -> Self {
        Operation::Checkpoint
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Insert { .. } => OpKind::Insert,
            Operation::Update { .. } => OpKind::Update,
            Operation::Search { .. } => OpKind::Search,
            Operation::Sleep { .. } => OpKind::Sleep,
            Operation::Checkpoint => OpKind::Checkpoint,
        }
    }

    /// Key distribution, if this is a keyed operation.
    pub fn keys(&self) -> Option<&KeySpec> {
        match self {
            Operation::Insert { keys, .. }
            | Operation::Update { keys, .. }
            | Operation::Search { keys, .. } => Some(keys),
            Operation::Sleep { .. } | Operation::Checkpoint => None,
        }
    }

    pub fn table(&self) -> Option<&Arc<Table>> {
        match self {
            Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Search { table, .. } => Some(table),
            Operation::Sleep { .. } | Operation::Checkpoint => None,
        }
    }

    fn with_table(&self, table: Arc<Table>) -> Self {
        match self {
            Operation::Insert { keys, .. } => Operation::Insert { table, keys: *keys },
            Operation::Update { keys, .. } => Operation::Update { table, keys: *keys },
            Operation::Search { keys, .. } => Operation::Search { table, keys: *keys },
            other => other.clone(),
        }
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        match self {
            Operation::Sleep { duration } => {
                if duration.is_zero() {
                    anyhow::bail!("sleep duration must be > 0");
                }
            }
            Operation::Checkpoint => {}
            keyed => keyed.keys().expect("keyed operation").validate()?,
        }
        Ok(())
    }
}

/// Concatenate two operation sequences: `a` then `b`, in order.
pub fn sequence(mut a: Vec<Operation>, b: Vec<Operation>) -> Vec<Operation> {
    a.extend(b);
    a
}

/// `n` structurally identical copies of a sequence. Copies share templates
/// only; each running worker derives its own independent key streams.
pub fn replicate(n: usize, seq: &[Operation]) -> Vec<Vec<Operation>> {
    (0..n).map(|_| seq.to_vec()).collect()
}

/// Contiguous slice of `len` items assigned to partition `index` of `parts`,
/// with the remainder spread over the leading partitions.
pub(crate) fn partition_slice(len: usize, parts: usize, index: usize) -> (usize, usize) {
    let base = len / parts;
    let rem = len % parts;
    let start = index * base + index.min(rem);
    let size = base + usize::from(index < rem);
    (start, start + size)
}

/// Multi-table fan-out: materialize one copy of a keyed operation template
/// per target table.
///
/// With `partitioned = false` every worker's cycle touches every table,
/// stressing all handles equally. With `partitioned = true` worker
/// `worker_index` of `worker_count` only touches its disjoint contiguous
/// slice of the table set, trading handle churn for lower cross-worker
/// contention. Which to use is workload policy, hence the flag.
pub fn expand_over_tables(
    template: &Operation,
    tables: &[Arc<Table>],
    partitioned: bool,
    worker_index: usize,
    worker_count: usize,
) -> anyhow::Result<Vec<Operation>> {
    if template.keys().is_none() {
        anyhow::bail!("multi-table expansion applies only to keyed operations");
    }
    if tables.is_empty() {
        anyhow::bail!("multi-table expansion needs at least one table");
    }
    if worker_count == 0 || worker_index >= worker_count {
        anyhow::bail!("worker index {worker_index} out of range for {worker_count} workers");
    }

    let (start, end) = if partitioned {
        partition_slice(tables.len(), worker_count, worker_index)
    } else {
        (0, tables.len())
    };

    Ok(tables[start..end]
        .iter()
        .map(|table| template.with_table(Arc::clone(table)))
        .collect())
}

/// Build the populate phase: split `icount` records across the table set and
/// the populate workers so every worker inserts a disjoint, contiguous
/// key-space slice (no write conflicts), spread over `[0, random_range)`.
///
/// Returns one operation sequence per populate worker that has tables to
/// fill; with more workers than tables the surplus workers get no sequence,
/// so the result may be shorter than `populate_threads`. Each sequence runs
/// to completion rather than for a duration.
pub fn populate_with_range(
    tables: &[Arc<Table>],
    icount: u64,
    random_range: u64,
    populate_threads: usize,
) -> anyhow::Result<Vec<Vec<Operation>>> {
    if tables.is_empty() {
        anyhow::bail!("populate needs at least one table");
    }
    if icount == 0 {
        anyhow::bail!("populate icount must be > 0");
    }
    if populate_threads == 0 {
        anyhow::bail!("populate needs at least one thread");
    }
    if random_range < icount {
        anyhow::bail!("random_range {random_range} smaller than icount {icount}");
    }

    let stride = random_range / icount;
    let table_count = tables.len() as u64;
    let base = icount / table_count;
    let rem = icount % table_count;

    // Per-table record counts and key-space offsets, table-major.
    let mut offset = 0u64;
    let mut plans = Vec::with_capacity(tables.len());
    for (i, table) in tables.iter().enumerate() {
        let count = base + u64::from((i as u64) < rem);
        plans.push((Arc::clone(table), offset * stride, count));
        offset += count;
    }

    let mut sequences = Vec::with_capacity(populate_threads);
    for worker in 0..populate_threads {
        let (lo, hi) = partition_slice(plans.len(), populate_threads, worker);
        let ops: Vec<Operation> = plans[lo..hi]
            .iter()
            .filter(|(_, _, count)| *count > 0)
            .map(|(table, start, count)| {
                Operation::insert(
                    Arc::clone(table),
                    KeySpec::Range { start: *start, count: *count, stride },
                )
            })
            .collect();
        // More workers than tables leaves trailing partitions empty; an
        // empty sequence is not a runnable thread, so drop it here.
        if !ops.is_empty() {
            sequences.push(ops);
        }
    }
    Ok(sequences)
}
