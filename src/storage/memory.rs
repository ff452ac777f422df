//! Process-local in-memory storage backend.
//!
//! Grounded on the teacher's `CausalStorage`: one `DashMap` per entity kind,
//! content keyed by ID, CRUD guarded per-key by the map's own sharded locking
//! rather than a single mutex over the whole store.

use super::{Page, PageRequest, Pagination, StorageBackend, StorageStatus};
use crate::error::BrainyResult;
use crate::types::{check_schema_version, ChangeEntry, DistributedConfigRecord, Noun, Statistics, Verb, VerbType};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

/// A `DashMap`-backed backend with no persistence across process restarts.
#[derive(Default)]
pub struct MemoryBackend {
    nouns: DashMap<String, Noun>,
    verbs: DashMap<String, Verb>,
    metadata: DashMap<String, serde_json::Value>,
    changes: Mutex<Vec<ChangeEntry>>,
    statistics: DashMap<String, Statistics>,
    distributed_config: Mutex<Option<DistributedConfigRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn init(&self) -> BrainyResult<()> {
        Ok(())
    }

    async fn save_noun(&self, noun: &Noun) -> BrainyResult<()> {
        self.nouns.insert(noun.id.clone(), noun.clone());
        Ok(())
    }

    async fn get_noun(&self, id: &str) -> BrainyResult<Option<Noun>> {
        match self.nouns.get(id) {
            Some(n) => {
                check_schema_version(n.schema_version)?;
                Ok(Some(n.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_noun(&self, id: &str) -> BrainyResult<bool> {
        Ok(self.nouns.remove(id).is_some())
    }

    async fn get_nouns(&self, page: PageRequest) -> BrainyResult<Page<Noun>> {
        let mut ids: Vec<String> = self.nouns.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        let start = page
            .cursor
            .as_ref()
            .and_then(|c| ids.iter().position(|id| id == c).map(|p| p + 1))
            .unwrap_or(0);
        let limit = if page.limit == 0 { ids.len().max(1) } else { page.limit };
        let slice: Vec<Noun> = ids
            .iter()
            .skip(start)
            .take(limit)
            .filter_map(|id| self.nouns.get(id).map(|n| n.clone()))
            .collect();
        let next_cursor = slice.last().map(|n| n.id.clone());
        Ok(Page {
            items: slice,
            pagination: Pagination {
                cursor: next_cursor,
                page_size: limit,
                total: Some(ids.len() as u64),
            },
        })
    }

    async fn save_verb(&self, verb: &Verb) -> BrainyResult<()> {
        self.verbs.insert(verb.id.clone(), verb.clone());
        Ok(())
    }

    async fn get_verb(&self, id: &str) -> BrainyResult<Option<Verb>> {
        match self.verbs.get(id) {
            Some(v) => {
                check_schema_version(v.schema_version)?;
                Ok(Some(v.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_verb(&self, id: &str) -> BrainyResult<bool> {
        Ok(self.verbs.remove(id).is_some())
    }

    async fn get_verbs_by_source(&self, source: &str) -> BrainyResult<Vec<Verb>> {
        Ok(self
            .verbs
            .iter()
            .filter(|e| e.value().source == source)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_verbs_by_target(&self, target: &str) -> BrainyResult<Vec<Verb>> {
        Ok(self
            .verbs
            .iter()
            .filter(|e| e.value().target == target)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_verbs_by_type(&self, verb_type: VerbType) -> BrainyResult<Vec<Verb>> {
        Ok(self
            .verbs
            .iter()
            .filter(|e| e.value().verb_type == verb_type)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn save_metadata(&self, key: &str, value: &serde_json::Value) -> BrainyResult<()> {
        self.metadata.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> BrainyResult<Option<serde_json::Value>> {
        Ok(self.metadata.get(key).map(|v| v.clone()))
    }

    async fn append_change(&self, entry: &ChangeEntry) -> BrainyResult<()> {
        self.changes.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn get_changes_since(&self, timestamp: i64) -> BrainyResult<Vec<ChangeEntry>> {
        Ok(self
            .changes
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp > timestamp)
            .cloned()
            .collect())
    }

    async fn save_statistics(&self, day: &str, stats: &Statistics) -> BrainyResult<()> {
        self.statistics.insert(day.to_string(), stats.clone());
        Ok(())
    }

    async fn get_statistics(&self, day: &str) -> BrainyResult<Option<Statistics>> {
        Ok(self.statistics.get(day).map(|s| s.clone()))
    }

    async fn save_distributed_config(&self, record: &DistributedConfigRecord) -> BrainyResult<()> {
        *self.distributed_config.lock().unwrap() = Some(record.clone());
        Ok(())
    }

    async fn get_distributed_config(&self) -> BrainyResult<Option<DistributedConfigRecord>> {
        Ok(self.distributed_config.lock().unwrap().clone())
    }

    async fn get_storage_status(&self) -> BrainyResult<StorageStatus> {
        Ok(StorageStatus::Ok)
    }

    async fn clear(&self) -> BrainyResult<()> {
        self.nouns.clear();
        self.verbs.clear();
        self.metadata.clear();
        self.changes.lock().unwrap().clear();
        self.statistics.clear();
        *self.distributed_config.lock().unwrap() = None;
        Ok(())
    }
}
