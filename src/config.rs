//! Configuration for the aknn search engine.

use crate::error::{AknnError, Result};
use crate::query::{RescoreMode, SortOrder};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the aknn engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model cache configuration.
    pub cache: CacheConfig,

    /// Query defaults.
    pub query: QueryConfig,

    /// Indexing configuration.
    pub index: IndexConfig,

    /// Worker pool configuration.
    pub executor: ExecutorConfig,
}

impl Config {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AknnError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.query.k1 == 0 {
            return Err(AknnError::Config("query.k1 must be at least 1".into()));
        }
        for (name, pool) in [("query", &self.executor.query), ("index", &self.executor.index)] {
            if pool.workers == 0 {
                return Err(AknnError::Config(format!(
                    "executor.{name}.workers must be at least 1"
                )));
            }
            if pool.queue_capacity == 0 {
                return Err(AknnError::Config(format!(
                    "executor.{name}.queue_capacity must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// Model cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum aggregate weight of cached models, in megabytes.
    /// Default: 256.
    pub max_size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size_mb: 256 }
    }
}

impl CacheConfig {
    /// Returns the weight bound in bytes.
    #[inline]
    pub fn max_weight_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1_000_000)
    }
}

/// Defaults applied to search requests that leave a parameter unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Candidate pool size.
    /// Default: 99.
    pub k1: usize,

    /// Result size.
    /// Default: 10.
    pub k2: usize,

    /// Number of hash tables that must agree for a candidate to be retrieved.
    /// Default: 1.
    pub minimum_should_match: usize,

    /// Rescoring mode.
    /// Default: cosine.
    pub rescore: RescoreMode,

    /// Result order.
    /// Default: descending.
    pub order: SortOrder,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            k1: 99,
            k2: 10,
            minimum_should_match: 1,
            rescore: RescoreMode::Cosine,
            order: SortOrder::Desc,
        }
    }
}

/// Indexing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// How many times the store retries an upsert on a version conflict.
    /// Default: 5.
    pub retry_on_conflict: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            retry_on_conflict: 5,
        }
    }
}

/// Sizes of the two worker pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pool for searches and cache clears.
    pub query: PoolConfig,

    /// Pool for bulk indexing and model creation.
    pub index: PoolConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            query: PoolConfig {
                workers: 4,
                queue_capacity: 256,
            },
            index: PoolConfig {
                workers: 1,
                queue_capacity: 64,
            },
        }
    }
}

/// Size of one bounded worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,

    /// Maximum number of queued tasks before submitters block.
    pub queue_capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.query.k1, 99);
        assert_eq!(config.query.k2, 10);
        assert_eq!(config.query.minimum_should_match, 1);
        assert_eq!(config.query.rescore, RescoreMode::Cosine);
        assert_eq!(config.query.order, SortOrder::Desc);
        assert_eq!(config.index.retry_on_conflict, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_weight_bytes() {
        let config = CacheConfig { max_size_mb: 3 };
        assert_eq!(config.max_weight_bytes(), 3_000_000);
    }

    #[test]
    fn test_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache": {{"max_size_mb": 8}}, "query": {{"k2": 3}}}}"#).unwrap();

        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.cache.max_size_mb, 8);
        assert_eq!(config.query.k2, 3);
        assert_eq!(config.query.k1, 99);
        assert_eq!(config.executor.query.workers, 4);
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = Config::default();
        config.executor.index.workers = 0;
        assert!(matches!(config.validate(), Err(AknnError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_json_file("/definitely/not/here.json");
        assert!(matches!(result, Err(AknnError::Config(_))));
    }
}
