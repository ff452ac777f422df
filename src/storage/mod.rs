//! The storage adapter: CRUD for noun/verb/metadata/statistics/change-log
//! entries over a pluggable backend.
//!
//! The capability set is exposed as an `async_trait` (the teacher has no
//! storage trait of its own — `CausalStorage` is a concrete struct — but the
//! spec requires three interchangeable backends, so the contract is new,
//! modeled after the capability set `CausalStorage` and `persistence.rs`
//! together provide).

mod filesystem;
mod memory;
mod object_store;

pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
pub use object_store::{ObjectStoreBackend, ObjectStoreClient};

use crate::error::BrainyResult;
use crate::types::{ChangeEntry, DistributedConfigRecord, Noun, Statistics, Verb, VerbType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A page request: opaque cursor plus a limit.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub cursor: Option<String>,
    pub limit: usize,
}

/// Pagination metadata returned alongside a page of items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub cursor: Option<String>,
    pub page_size: usize,
    pub total: Option<u64>,
}

/// A page of items plus pagination metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Coarse backend health, surfaced through the health monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageStatus {
    Ok,
    Degraded(String),
}

/// The storage adapter capability set (spec §4.B).
///
/// Every write is atomic at the entity granularity. A write that cannot be
/// confirmed returns `StorageUnavailable` and is not retried inside the
/// adapter — retry policy belongs to the caller.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn init(&self) -> BrainyResult<()>;

    async fn save_noun(&self, noun: &Noun) -> BrainyResult<()>;
    async fn get_noun(&self, id: &str) -> BrainyResult<Option<Noun>>;
    async fn delete_noun(&self, id: &str) -> BrainyResult<bool>;
    async fn get_nouns(&self, page: PageRequest) -> BrainyResult<Page<Noun>>;

    async fn save_verb(&self, verb: &Verb) -> BrainyResult<()>;
    async fn get_verb(&self, id: &str) -> BrainyResult<Option<Verb>>;
    async fn delete_verb(&self, id: &str) -> BrainyResult<bool>;
    async fn get_verbs_by_source(&self, source: &str) -> BrainyResult<Vec<Verb>>;
    async fn get_verbs_by_target(&self, target: &str) -> BrainyResult<Vec<Verb>>;
    async fn get_verbs_by_type(&self, verb_type: VerbType) -> BrainyResult<Vec<Verb>>;

    async fn save_metadata(&self, key: &str, value: &serde_json::Value) -> BrainyResult<()>;
    async fn get_metadata(&self, key: &str) -> BrainyResult<Option<serde_json::Value>>;

    async fn append_change(&self, entry: &ChangeEntry) -> BrainyResult<()>;
    async fn get_changes_since(&self, timestamp: i64) -> BrainyResult<Vec<ChangeEntry>>;

    async fn save_statistics(&self, day: &str, stats: &Statistics) -> BrainyResult<()>;
    async fn get_statistics(&self, day: &str) -> BrainyResult<Option<Statistics>>;

    async fn save_distributed_config(&self, record: &DistributedConfigRecord) -> BrainyResult<()>;
    async fn get_distributed_config(&self) -> BrainyResult<Option<DistributedConfigRecord>>;

    async fn get_storage_status(&self) -> BrainyResult<StorageStatus>;

    /// Remove every record. Used by test fixtures and explicit resets.
    async fn clear(&self) -> BrainyResult<()>;
}
