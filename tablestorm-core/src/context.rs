//! Run context: engine connection, table set, output location, master seed
//!
//! The context is created once before any workload phase and shared by all
//! of them, so populate and the main mixed workload see the same tables and
//! the same seed-derived randomness.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tablestorm_engine::{StorageEngine, TableOptions};

use crate::error::{Error, Result};

/// One named table and its creation-time options.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub options: TableOptions,
}

impl Table {
    pub fn new(name: String, options: TableOptions) -> Self {
        Table { name, options }
    }
}

/// Options for building a [`Context`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Number of tables to create. Handle-churn stress scales with this.
    pub table_count: usize,

    /// Shared creation options for every table.
    pub table_options: TableOptions,

    /// Directory receiving the latency report. Created if missing.
    pub output_dir: PathBuf,

    /// Master seed; `None` draws a fresh one from the OS so unrelated runs
    /// differ while any recorded seed can replay a run exactly.
    pub seed: Option<u64>,
}

/// Everything a run shares: the open engine, the created tables, where the
/// report goes, and the master seed all worker streams derive from.
pub struct Context<E: StorageEngine> {
    engine: E,
    tables: Vec<Arc<Table>>,
    output_dir: PathBuf,
    master_seed: u64,
}

impl<E: StorageEngine> Context<E> {
    /// Create the output directory and all `table_count` tables up front.
    /// Tables are named `test00000`, `test00001`, ... so listings sort in
    /// creation order.
    pub fn create(engine: E, options: ContextOptions) -> Result<Self> {
        if options.table_count == 0 {
            return Err(Error::Config("table_count must be >= 1".into()));
        }
        std::fs::create_dir_all(&options.output_dir)?;

        let master_seed = options.seed.unwrap_or_else(rand::random);
        tracing::info!(
            table_count = options.table_count,
            master_seed,
            output_dir = %options.output_dir.display(),
            "creating run context"
        );

        let mut tables = Vec::with_capacity(options.table_count);
        for i in 0..options.table_count {
            let name = format!("test{i:05}");
            engine.create_table(&name, &options.table_options)?;
            tables.push(Arc::new(Table::new(name, options.table_options.clone())));
        }

        Ok(Context { engine, tables, output_dir: options.output_dir, master_seed })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Close the engine connection. The context is unusable afterwards.
    pub fn close(self) -> Result<()> {
        self.engine.close()?;
        Ok(())
    }
}
