//! In-process reference engine
//!
//! Backs the test suite and the CLI demo driver. Tables are `BTreeMap`s
//! behind per-table locks; the idle-handle sweep latency is a settable knob
//! so monitor behavior can be driven deterministically, and a fault hook can
//! fail the Nth operation to exercise the harness's fatal-error path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::{EngineError, EngineResult, Session, StorageEngine, TableOptions};

type TableData = Arc<RwLock<std::collections::BTreeMap<Vec<u8>, Vec<u8>>>>;

#[derive(Debug)]
struct Inner {
    tables: RwLock<HashMap<String, TableData>>,
    /// Simulated idle-handle sweep latency, nanoseconds.
    sweep_latency_ns: AtomicU64,
    /// Remaining operations before the injected fault fires; negative means
    /// no fault is armed.
    fault_countdown: AtomicI64,
    closed: AtomicBool,
    /// Serializes checkpoints, mirroring a single-checkpoint engine.
    checkpoint_lock: Mutex<()>,
}

/// Shared-state in-memory engine. Cloning yields another handle to the same
/// connection, which is how tests hand the engine to background threads.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<Inner>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: RwLock::new(HashMap::new()),
                sweep_latency_ns: AtomicU64::new(0),
                fault_countdown: AtomicI64::new(-1),
                closed: AtomicBool::new(false),
                checkpoint_lock: Mutex::new(()),
            }),
        }
    }

    /// Set the value reported by `idle_handle_sweep_latency`.
    pub fn set_idle_sweep_latency(&self, latency: Duration) {
        self.inner
            .sweep_latency_ns
            .store(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Arm a fault: the next `nth` data operations succeed, then one fails
    /// with a backend error. Counted across all sessions.
    pub fn fail_after(&self, nth: u64) {
        self.inner.fault_countdown.store(nth as i64, Ordering::SeqCst);
    }

    /// Number of records currently in `table`. Test helper, not part of the
    /// capability interface.
    pub fn table_len(&self, table: &str) -> Option<usize> {
        let tables = self.inner.tables.read().unwrap();
        tables.get(table).map(|t| t.read().unwrap().len())
    }

    fn check_fault(inner: &Inner) -> EngineResult<()> {
        if inner.closed.load(Ordering::Relaxed) {
            return Err(EngineError::Closed);
        }
        // fetch_sub walks the countdown through zero exactly once.
        if inner.fault_countdown.load(Ordering::Relaxed) >= 0
            && inner.fault_countdown.fetch_sub(1, Ordering::SeqCst) == 0
        {
            return Err(EngineError::Backend("injected fault".into()));
        }
        Ok(())
    }

    fn table(inner: &Inner, name: &str) -> EngineResult<TableData> {
        let tables = inner.tables.read().unwrap();
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::TableMissing(name.to_string()))
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    type Session = MemorySession;

    fn create_table(&self, name: &str, _options: &TableOptions) -> EngineResult<()> {
        if self.inner.closed.load(Ordering::Relaxed) {
            return Err(EngineError::Closed);
        }
        let mut tables = self.inner.tables.write().unwrap();
        if tables.contains_key(name) {
            return Err(EngineError::TableExists(name.to_string()));
        }
        tables.insert(name.to_string(), Arc::new(RwLock::new(Default::default())));
        Ok(())
    }

    fn open_session(&self) -> EngineResult<Self::Session> {
        if self.inner.closed.load(Ordering::Relaxed) {
            return Err(EngineError::Closed);
        }
        Ok(MemorySession { inner: Arc::clone(&self.inner) })
    }

    fn idle_handle_sweep_latency(&self) -> Duration {
        Duration::from_nanos(self.inner.sweep_latency_ns.load(Ordering::Relaxed))
    }

    fn close(&self) -> EngineResult<()> {
        self.inner.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Session over the shared engine state. One per worker.
#[derive(Debug)]
pub struct MemorySession {
    inner: Arc<Inner>,
}

impl Session for MemorySession {
    fn insert(&mut self, table: &str, key: &[u8], value: &[u8]) -> EngineResult<()> {
        MemoryEngine::check_fault(&self.inner)?;
        let data = MemoryEngine::table(&self.inner, table)?;
        data.write().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn update(&mut self, table: &str, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.insert(table, key, value)
    }

    fn search(&mut self, table: &str, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        MemoryEngine::check_fault(&self.inner)?;
        let data = MemoryEngine::table(&self.inner, table)?;
        let found = data.read().unwrap().get(key).cloned();
        Ok(found)
    }

    fn checkpoint(&mut self) -> EngineResult<()> {
        MemoryEngine::check_fault(&self.inner)?;
        let _guard = self.inner.checkpoint_lock.lock().unwrap();
        // Touch every table under its read lock; stands in for a flush.
        let tables: Vec<TableData> = {
            let map = self.inner.tables.read().unwrap();
            map.values().cloned().collect()
        };
        let mut records = 0usize;
        for table in &tables {
            records += table.read().unwrap().len();
        }
        tracing::debug!(tables = tables.len(), records, "checkpoint complete");
        Ok(())
    }
}
