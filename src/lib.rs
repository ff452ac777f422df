//! # Brainy — an embeddable vector-plus-graph store
//!
//! Brainy stores typed, vectorized entities ("nouns") connected by typed,
//! weighted edges ("verbs"), indexed for three complementary query modes:
//! approximate nearest-neighbor vector search (one HNSW graph per noun
//! type), bounded-depth graph traversal, and metadata-field filtering. Its
//! `find` operation fuses all three into one ranked result (§4.I).
//!
//! Storage is pluggable: in-process memory, local filesystem, or any
//! object store reachable through [`storage::ObjectStoreClient`]. A single
//! process can run standalone or as one instance of a distributed
//! deployment coordinated through a shared, CAS'd config record
//! ([`distributed::ConfigManager`]).
//!
//! ## Quick start
//!
//! ```ignore
//! use brainy::{BrainyConfig, BrainyStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = BrainyStore::start(BrainyConfig::default().with_dimensions(3)).await?;
//!     Ok(())
//! }
//! ```

mod change_log;
mod config;
mod core;
mod distance;
mod distributed;
mod embedder;
mod error;
mod graph;
mod health;
mod metadata_index;
mod partition;
mod query;
pub mod storage;
mod types;
mod vector;

pub use config::{
    BackpressureConfig, BrainyConfig, CacheConfig, DistanceMetric, DistributedOptions, FusionWeights, StorageConfig,
};
pub use core::{BatchResult, BrainyStore, HealthReport, Query};
pub use distributed::ConfigManager;
pub use embedder::Embedder;
pub use error::{BrainyError, BrainyResult};
pub use graph::Neighbor;
pub use health::HealthSnapshot;
pub use metadata_index::MetadataFilter;
pub use query::{FindHit, FindOptions};
pub use types::{
    ChangeEntry, DistributedSettings, HealthStatus, HnswParams, Noun, NounType, Role, Statistics, Timestamp, Verb,
    VerbType,
};

static LOGGING_INIT: std::sync::Once = std::sync::Once::new();

/// Initialize logging from the `BRAINY_LOG` environment variable, defaulting
/// to `info` when unset or invalid.
///
/// Recognized levels: `error`, `warn`, `info`, `debug`, `trace`. Safe to call
/// more than once, or alongside another crate that installs its own global
/// subscriber first — later calls are no-ops rather than panicking.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("BRAINY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    LOGGING_INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init();
    });
}

/// Initialize logging at an explicit level, ignoring `BRAINY_LOG`. Same
/// once-only semantics as [`init_logging`].
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    LOGGING_INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(level))
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init();
    });
}
