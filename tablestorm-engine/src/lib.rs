//! Storage-engine capability interface
//!
//! The tablestorm harness drives load against an embedded multi-table
//! key-value engine, but never looks inside it. Everything the harness needs
//! is expressed by the two traits in this crate: a [`StorageEngine`] (the
//! connection-scoped capability set) and its per-worker [`Session`] handles.
//!
//! The crate also ships [`MemoryEngine`], an in-process reference engine used
//! by the test suite and the CLI demo driver. It implements just enough table
//! semantics to exercise the harness; it is not a storage engine.

use std::fmt;
use std::time::Duration;

mod memory;

pub use memory::{MemoryEngine, MemorySession};

/// Per-table creation options.
///
/// Tables are immutable after creation; these options also feed key/value
/// generation (key width, value width, per-table key-space range).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    /// Formatted key width in bytes.
    pub key_size: usize,
    /// Value payload width in bytes.
    pub value_size: usize,
    /// Per-table key-space range for access operations.
    pub key_range: u64,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { key_size: 20, value_size: 100, key_range: 101_000 }
    }
}

/// Errors surfaced by storage-engine calls.
///
/// The harness treats every engine error as fatal for the run; it never
/// retries on the engine's behalf.
#[derive(Debug)]
pub enum EngineError {
    /// Operation referenced a table that was never created.
    TableMissing(String),
    /// `create_table` on a name that already exists.
    TableExists(String),
    /// The connection has been closed.
    Closed,
    /// Engine-internal failure, opaque to the harness.
    Backend(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::TableMissing(name) => write!(f, "no such table: {name}"),
            EngineError::TableExists(name) => write!(f, "table already exists: {name}"),
            EngineError::Closed => write!(f, "connection closed"),
            EngineError::Backend(msg) => write!(f, "engine error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Result alias for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Connection-scoped capability set.
///
/// One logical connection is shared by the whole run, but the engine's
/// session model is not assumed to be concurrency-safe: every worker opens
/// its own [`Session`] and the harness never shares one across threads.
pub trait StorageEngine: Send + Sync {
    type Session: Session;

    /// Create a logical table. Called once per table before any workload
    /// starts; the table set is never mutated afterwards.
    fn create_table(&self, name: &str, options: &TableOptions) -> EngineResult<()>;

    /// Open a session handle for one worker.
    fn open_session(&self) -> EngineResult<Self::Session>;

    /// Introspection hook: how long the most recent idle-handle sweep waited
    /// to reclaim stale table handles. Consumed only by the handle monitor.
    fn idle_handle_sweep_latency(&self) -> Duration;

    /// Close the connection. No session may be used afterwards.
    fn close(&self) -> EngineResult<()>;
}

/// Per-worker session handle.
///
/// Sessions are `Send` (a worker is spawned with its session) but not
/// `Sync`; each worker owns exactly one.
pub trait Session: Send {
    fn insert(&mut self, table: &str, key: &[u8], value: &[u8]) -> EngineResult<()>;

    /// Overwrite an existing record. Engines that do not distinguish update
    /// from insert may implement both identically.
    fn update(&mut self, table: &str, key: &[u8], value: &[u8]) -> EngineResult<()>;

    fn search(&mut self, table: &str, key: &[u8]) -> EngineResult<Option<Vec<u8>>>;

    /// Blocking engine-wide checkpoint. The harness issues checkpoints from a
    /// single dedicated thread; concurrent checkpoints are never attempted.
    fn checkpoint(&mut self) -> EngineResult<()>;
}
