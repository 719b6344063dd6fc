//! Keyed, weight-bounded cache of LSH models.
//!
//! Backed by a [`moka::sync::Cache`] weighed by
//! [`LshModel::estimate_bytes_usage`] and evicting by recency. At most one
//! load runs per key: concurrent callers for the same uncached key share
//! the result of a single [`ModelLoader::load`], successful or not. Failed
//! loads are not cached, so the next call retries.
//!
//! Entries are keyed by an epoch as well as the model location.
//! [`ModelCache::invalidate_all`] advances the epoch, so a load started
//! before the invalidation is never served to later callers.

mod loader;

pub use loader::{ModelLoader, StoreModelLoader};

use crate::error::{AknnError, Result};
use crate::lsh::LshModel;
use crate::store::ModelKey;
use log::debug;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing cache activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls served from a ready entry.
    pub hits: u64,
    /// Calls that found no ready entry.
    pub misses: u64,
    /// Loads actually performed.
    pub loads: u64,
    /// Loads that failed.
    pub load_failures: u64,
    /// Entries evicted to respect the weight bound.
    pub evictions: u64,
    /// Ready entries currently cached.
    pub entries: usize,
    /// Aggregate weight of ready entries.
    pub weight: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: Arc<AtomicU64>,
}

type EpochKey = (u64, ModelKey);

/// Cache of [`LshModel`]s keyed by model location.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    max_weight: u64,
    models: Cache<EpochKey, Arc<LshModel>>,
    epoch: AtomicU64,
    counters: Counters,
}

impl ModelCache {
    /// Creates a cache that loads through `loader` and holds at most
    /// `max_weight` bytes of models.
    pub fn new(loader: Arc<dyn ModelLoader>, max_weight: u64) -> Self {
        let counters = Counters::default();
        let evictions = Arc::clone(&counters.evictions);

        let models = Cache::builder()
            .max_capacity(max_weight)
            .eviction_policy(EvictionPolicy::lru())
            .weigher(|_key: &EpochKey, model: &Arc<LshModel>| -> u32 {
                u32::try_from(model.estimate_bytes_usage()).unwrap_or(u32::MAX)
            })
            .eviction_listener(move |key: Arc<EpochKey>, _model, cause| {
                if cause == RemovalCause::Size {
                    evictions.fetch_add(1, Ordering::Relaxed);
                    debug!("Evicted model {}", key.1);
                }
            })
            .build();

        Self {
            loader,
            max_weight,
            models,
            epoch: AtomicU64::new(0),
            counters,
        }
    }

    /// Returns the model for `key`, loading it if needed.
    ///
    /// Concurrent callers for the same uncached key share one load and all
    /// receive the same instance. Load failures, including a panicking
    /// loader, surface as [`AknnError::ModelLoad`] to every caller of that
    /// load.
    pub fn get(&self, key: &ModelKey) -> Result<Arc<LshModel>> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let cache_key = (epoch, key.clone());

        if let Some(model) = self.models.get(&cache_key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(model);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let result = self.models.try_get_with(cache_key.clone(), || {
            self.counters.loads.fetch_add(1, Ordering::Relaxed);
            debug!("Loading model {}", key);
            match panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(key))) {
                Ok(Ok(model)) => Ok(Arc::new(model)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(AknnError::ModelLoad {
                    key: key.to_string(),
                    reason: "model load panicked".to_string(),
                }),
            }
        });

        match result {
            Ok(model) => {
                if self.epoch.load(Ordering::Acquire) != epoch {
                    // Invalidated while loading.
                    self.models.invalidate(&cache_key);
                }
                Ok(model)
            }
            Err(err) => {
                self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                Err(load_error(key, &err))
            }
        }
    }

    /// Drops every cached model. The store is not touched.
    ///
    /// Loads in flight still deliver their result to their waiters but are
    /// not cached.
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.models.invalidate_all();
        debug!("Model cache invalidated");
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.models.run_pending_tasks();
        let (entries, weight) = self
            .models
            .iter()
            .fold((0, 0), |(n, w), (_, model)| (n + 1, w + model.estimate_bytes_usage()));

        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            load_failures: self.counters.load_failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries,
            weight,
        }
    }

    /// Returns the weight bound in bytes.
    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }
}

fn load_error(key: &ModelKey, err: &AknnError) -> AknnError {
    let reason = match err {
        AknnError::ModelLoad { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    AknnError::ModelLoad {
        key: key.to_string(),
        reason,
    }
}
