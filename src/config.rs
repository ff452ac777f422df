//! Construction-time configuration surface.

use crate::error::{BrainyError, BrainyResult};
use crate::types::HnswParams;
use serde::{Deserialize, Serialize};

/// Which distance kernel the store uses for vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dot,
}

/// Which storage backend variant to construct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StorageConfig {
    Memory,
    Filesystem { root: String },
    ObjectStore { bucket: String, prefix: String },
}

/// Distributed-deployment knobs; absent when the store runs standalone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributedOptions {
    pub role: Option<String>,
    pub heartbeat_interval_secs: Option<u64>,
    pub partition_count: Option<u32>,
}

/// Result-cache and entity-cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub search_ttl_secs: u64,
    pub search_max_size: usize,
    pub entity_max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_secs: 180,
            search_max_size: 1_000,
            entity_max_size: 10_000,
        }
    }
}

/// Fusion weights for the triple-intelligence query planner. Must sum to ~1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionWeights {
    pub vector: f32,
    pub graph: f32,
    pub field: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.6,
            graph: 0.2,
            field: 0.2,
        }
    }
}

/// Batch-write coalescing knobs (spec §5 "Backpressure").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackpressureConfig {
    /// Caller-supplied batches larger than this are chunked client-side into
    /// sub-batches of at most this many entities before being applied.
    pub max_batch_size: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { max_batch_size: 100 }
    }
}

/// The full construction-time configuration record (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainyConfig {
    pub dimensions: usize,
    pub distance: DistanceMetric,
    pub hnsw: HnswParams,
    pub ef_search: usize,
    pub storage: StorageConfig,
    #[serde(default)]
    pub distributed: DistributedOptions,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub weights: FusionWeights,
    #[serde(default)]
    pub backpressure: BackpressureConfig,
}

impl Default for BrainyConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            distance: DistanceMetric::Cosine,
            hnsw: HnswParams::default(),
            ef_search: 50,
            storage: StorageConfig::Memory,
            distributed: DistributedOptions::default(),
            cache: CacheConfig::default(),
            weights: FusionWeights::default(),
            backpressure: BackpressureConfig::default(),
        }
    }
}

impl BrainyConfig {
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_distance(mut self, distance: DistanceMetric) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_hnsw(mut self, m: usize, ef_construction: usize) -> Self {
        self.hnsw = HnswParams { m, ef_construction };
        self
    }

    pub fn with_ef_search(mut self, ef_search: usize) -> Self {
        self.ef_search = ef_search;
        self
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_distributed(mut self, distributed: DistributedOptions) -> Self {
        self.distributed = distributed;
        self
    }

    pub fn with_backpressure(mut self, backpressure: BackpressureConfig) -> Self {
        self.backpressure = backpressure;
        self
    }

    /// Reject unsupported parameter combinations before the store is built.
    pub fn validate(&self) -> BrainyResult<()> {
        if self.dimensions == 0 {
            return Err(BrainyError::InvalidConfig {
                reason: "dimensions must be greater than zero".to_string(),
            });
        }
        if self.hnsw.m == 0 {
            return Err(BrainyError::InvalidConfig {
                reason: "hnsw.m must be greater than zero".to_string(),
            });
        }
        if self.hnsw.ef_construction < self.hnsw.m {
            return Err(BrainyError::InvalidConfig {
                reason: "hnsw.ef_construction must be at least m".to_string(),
            });
        }
        if self.ef_search == 0 {
            return Err(BrainyError::InvalidConfig {
                reason: "ef_search must be greater than zero".to_string(),
            });
        }
        let w = &self.weights;
        let sum = w.vector + w.graph + w.field;
        if !(0.99..=1.01).contains(&sum) {
            return Err(BrainyError::InvalidConfig {
                reason: format!("fusion weights must sum to ~1.0, got {sum}"),
            });
        }
        if let Some(role) = &self.distributed.role {
            role.parse::<crate::types::Role>()
                .map_err(|_| BrainyError::InvalidConfig {
                    reason: format!("invalid distributed role '{role}'"),
                })?;
        }
        if let Some(count) = self.distributed.partition_count {
            if count == 0 {
                return Err(BrainyError::InvalidConfig {
                    reason: "distributed.partition_count must be greater than zero".to_string(),
                });
            }
        }
        if self.backpressure.max_batch_size == 0 {
            return Err(BrainyError::InvalidConfig {
                reason: "backpressure.max_batch_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(BrainyConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_dimensions_is_invalid_config() {
        let cfg = BrainyConfig::default().with_dimensions(0);
        assert!(matches!(cfg.validate(), Err(BrainyError::InvalidConfig { .. })));
    }

    #[test]
    fn ef_construction_below_m_is_invalid() {
        let cfg = BrainyConfig::default().with_hnsw(32, 10);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let cfg = BrainyConfig::default().with_weights(FusionWeights {
            vector: 0.9,
            graph: 0.9,
            field: 0.9,
        });
        assert!(cfg.validate().is_err());
    }
}
