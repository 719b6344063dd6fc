//! Worker pools that bound how much work runs at once.
//!
//! Reads (searches and cache clears) and writes (indexing and model
//! creation) run on separate pools, so a large bulk index cannot starve
//! queries. Submitting to a full pool blocks the caller.

mod pool;

pub use pool::{TaskHandle, WorkerPool};

use crate::config::ExecutorConfig;
use crate::error::Result;

/// The query and index pools.
pub struct Scheduler {
    query: WorkerPool,
    index: WorkerPool,
}

impl Scheduler {
    /// Starts both pools.
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let query = WorkerPool::new(
            "aknn-query",
            config.query.workers,
            config.query.queue_capacity,
        )?;
        let index = WorkerPool::new(
            "aknn-index",
            config.index.workers,
            config.index.queue_capacity,
        )?;
        Ok(Self { query, index })
    }

    /// Pool for searches and cache clears.
    pub fn query(&self) -> &WorkerPool {
        &self.query
    }

    /// Pool for indexing and model creation.
    pub fn index(&self) -> &WorkerPool {
        &self.index
    }
}
