//! Object-store-backed storage: a single blob per entity, bucket-prefixed by
//! partition.
//!
//! The teacher has no object-store precedent; this backend's shape mirrors
//! the filesystem backend's capability set (same partitioned key scheme) but
//! is expressed against a narrow `ObjectStoreClient` trait so a concrete SDK
//! (S3, GCS, …) can be wired in without coupling the core crate to it.

use super::{Page, PageRequest, Pagination, StorageBackend, StorageStatus};
use crate::error::{BrainyError, BrainyResult};
use crate::partition::partition_path;
use crate::types::{check_schema_version, ChangeEntry, DistributedConfigRecord, Noun, Statistics, Verb, VerbType};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// The minimal capability set Brainy needs from an object store: put/get/
/// delete/list-with-prefix. A real SDK implements this trait.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> BrainyResult<()>;
    async fn get(&self, key: &str) -> BrainyResult<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> BrainyResult<bool>;
    /// List keys under a prefix. Callers cap `limit` to avoid unbounded fan-out.
    async fn list(&self, prefix: &str, limit: usize) -> BrainyResult<Vec<String>>;
    /// Hint that the backend should persist beyond the current session, where
    /// the underlying store distinguishes ephemeral from durable storage.
    async fn request_persistent_storage(&self) -> BrainyResult<()> {
        Ok(())
    }
}

/// A storage backend over any `ObjectStoreClient`, one blob per entity.
pub struct ObjectStoreBackend<C: ObjectStoreClient> {
    client: C,
    bucket_prefix: String,
    partition_count: u32,
    /// Cap on keys fetched per `list` call, to keep the cost-aware list policy bounded.
    list_page_limit: usize,
}

impl<C: ObjectStoreClient> ObjectStoreBackend<C> {
    pub fn new(client: C, bucket_prefix: impl Into<String>, partition_count: u32) -> Self {
        Self {
            client,
            bucket_prefix: bucket_prefix.into(),
            partition_count,
            list_page_limit: 1000,
        }
    }

    fn noun_key(&self, id: &str) -> String {
        format!(
            "{}/nouns/{}/{id}.json",
            self.bucket_prefix,
            partition_path(id, self.partition_count)
        )
    }

    fn verb_key(&self, id: &str) -> String {
        format!(
            "{}/verbs/{}/{id}.json",
            self.bucket_prefix,
            partition_path(id, self.partition_count)
        )
    }

    fn metadata_key(&self, key: &str) -> String {
        format!("{}/metadata/{key}.json", self.bucket_prefix)
    }

    fn statistics_key(&self, day: &str) -> String {
        format!("{}/index/statistics_{day}.json", self.bucket_prefix)
    }

    fn distributed_config_key(&self) -> String {
        format!("{}/index/distributed_config.json", self.bucket_prefix)
    }

    fn change_key(&self, timestamp: i64, sequence: u64) -> String {
        format!("{}/index/changes/{timestamp}-{sequence}.json", self.bucket_prefix)
    }

    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> BrainyResult<()> {
        self.client.put(key, serde_json::to_vec(value)?).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> BrainyResult<Option<T>> {
        match self.client.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<C: ObjectStoreClient> StorageBackend for ObjectStoreBackend<C> {
    async fn init(&self) -> BrainyResult<()> {
        self.client.request_persistent_storage().await
    }

    async fn save_noun(&self, noun: &Noun) -> BrainyResult<()> {
        self.put_json(&self.noun_key(&noun.id), noun).await
    }

    async fn get_noun(&self, id: &str) -> BrainyResult<Option<Noun>> {
        match self.get_json::<Noun>(&self.noun_key(id)).await? {
            Some(noun) => {
                check_schema_version(noun.schema_version)?;
                Ok(Some(noun))
            }
            None => Ok(None),
        }
    }

    async fn delete_noun(&self, id: &str) -> BrainyResult<bool> {
        self.client.delete(&self.noun_key(id)).await
    }

    async fn get_nouns(&self, page: PageRequest) -> BrainyResult<Page<Noun>> {
        let prefix = format!("{}/nouns/", self.bucket_prefix);
        let limit = if page.limit == 0 { self.list_page_limit } else { page.limit.min(self.list_page_limit) };
        let mut keys = self.client.list(&prefix, limit).await?;
        keys.sort();
        let start = page
            .cursor
            .as_ref()
            .and_then(|c| keys.iter().position(|k| k.ends_with(&format!("{c}.json"))).map(|p| p + 1))
            .unwrap_or(0);
        let mut items = Vec::new();
        for key in keys.iter().skip(start) {
            if let Some(noun) = self.get_json::<Noun>(key).await? {
                items.push(noun);
            }
        }
        let next_cursor = items.last().map(|n| n.id.clone());
        Ok(Page {
            items,
            pagination: Pagination {
                cursor: next_cursor,
                page_size: limit,
                total: None,
            },
        })
    }

    async fn save_verb(&self, verb: &Verb) -> BrainyResult<()> {
        self.put_json(&self.verb_key(&verb.id), verb).await
    }

    async fn get_verb(&self, id: &str) -> BrainyResult<Option<Verb>> {
        match self.get_json::<Verb>(&self.verb_key(id)).await? {
            Some(verb) => {
                check_schema_version(verb.schema_version)?;
                Ok(Some(verb))
            }
            None => Ok(None),
        }
    }

    async fn delete_verb(&self, id: &str) -> BrainyResult<bool> {
        self.client.delete(&self.verb_key(id)).await
    }

    async fn get_verbs_by_source(&self, source: &str) -> BrainyResult<Vec<Verb>> {
        self.scan_verbs(|v| v.source == source).await
    }

    async fn get_verbs_by_target(&self, target: &str) -> BrainyResult<Vec<Verb>> {
        self.scan_verbs(|v| v.target == target).await
    }

    async fn get_verbs_by_type(&self, verb_type: VerbType) -> BrainyResult<Vec<Verb>> {
        self.scan_verbs(|v| v.verb_type == verb_type).await
    }

    async fn save_metadata(&self, key: &str, value: &serde_json::Value) -> BrainyResult<()> {
        self.put_json(&self.metadata_key(key), value).await
    }

    async fn get_metadata(&self, key: &str) -> BrainyResult<Option<serde_json::Value>> {
        self.get_json(&self.metadata_key(key)).await
    }

    async fn append_change(&self, entry: &ChangeEntry) -> BrainyResult<()> {
        self.put_json(&self.change_key(entry.timestamp, entry.sequence), entry).await
    }

    async fn get_changes_since(&self, timestamp: i64) -> BrainyResult<Vec<ChangeEntry>> {
        let prefix = format!("{}/index/changes/", self.bucket_prefix);
        let mut keys = self.client.list(&prefix, self.list_page_limit).await?;
        keys.sort();
        let mut out = Vec::new();
        for key in keys.drain(..) {
            if let Some(entry) = self.get_json::<ChangeEntry>(&key).await? {
                if entry.timestamp > timestamp {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    async fn save_statistics(&self, day: &str, stats: &Statistics) -> BrainyResult<()> {
        self.put_json(&self.statistics_key(day), stats).await
    }

    async fn get_statistics(&self, day: &str) -> BrainyResult<Option<Statistics>> {
        self.get_json(&self.statistics_key(day)).await
    }

    async fn save_distributed_config(&self, record: &DistributedConfigRecord) -> BrainyResult<()> {
        self.put_json(&self.distributed_config_key(), record).await
    }

    async fn get_distributed_config(&self) -> BrainyResult<Option<DistributedConfigRecord>> {
        self.get_json(&self.distributed_config_key()).await
    }

    async fn get_storage_status(&self) -> BrainyResult<StorageStatus> {
        Ok(StorageStatus::Ok)
    }

    async fn clear(&self) -> BrainyResult<()> {
        for prefix in ["nouns", "verbs", "metadata", "index"] {
            let full_prefix = format!("{}/{prefix}/", self.bucket_prefix);
            for key in self.client.list(&full_prefix, self.list_page_limit).await? {
                self.client.delete(&key).await?;
            }
        }
        Ok(())
    }
}

impl<C: ObjectStoreClient> ObjectStoreBackend<C> {
    async fn scan_verbs(&self, predicate: impl Fn(&Verb) -> bool) -> BrainyResult<Vec<Verb>> {
        let prefix = format!("{}/verbs/", self.bucket_prefix);
        let keys = self.client.list(&prefix, self.list_page_limit).await?;
        let mut out = Vec::new();
        for key in keys {
            if let Some(v) = self.get_json::<Verb>(&key).await? {
                if predicate(&v) {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NounType;
    use dashmap::DashMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct InMemoryObjectStore {
        objects: Arc<DashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl ObjectStoreClient for InMemoryObjectStore {
        async fn put(&self, key: &str, bytes: Vec<u8>) -> BrainyResult<()> {
            self.objects.insert(key.to_string(), bytes);
            Ok(())
        }

        async fn get(&self, key: &str) -> BrainyResult<Option<Vec<u8>>> {
            Ok(self.objects.get(key).map(|v| v.clone()))
        }

        async fn delete(&self, key: &str) -> BrainyResult<bool> {
            Ok(self.objects.remove(key).is_some())
        }

        async fn list(&self, prefix: &str, limit: usize) -> BrainyResult<Vec<String>> {
            let mut keys: Vec<String> = self
                .objects
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| k.starts_with(prefix))
                .collect();
            keys.sort();
            keys.truncate(limit);
            Ok(keys)
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let backend = ObjectStoreBackend::new(InMemoryObjectStore::default(), "bucket", 4);
        let noun = Noun::new("n1", vec![0.1, 0.2], NounType::Thing);
        backend.save_noun(&noun).await.unwrap();
        assert_eq!(backend.get_noun("n1").await.unwrap().unwrap().id, "n1");
    }

    #[tokio::test]
    async fn noun_with_newer_schema_version_is_rejected_on_read() {
        let backend = ObjectStoreBackend::new(InMemoryObjectStore::default(), "bucket", 4);
        let mut noun = Noun::new("n1", vec![0.1], NounType::Thing);
        noun.schema_version = crate::types::SCHEMA_VERSION + 1;
        backend.save_noun(&noun).await.unwrap();

        let err = backend.get_noun("n1").await.unwrap_err();
        assert!(matches!(err, BrainyError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn clear_removes_every_prefix() {
        let backend = ObjectStoreBackend::new(InMemoryObjectStore::default(), "bucket", 4);
        backend.save_noun(&Noun::new("n1", vec![0.1], NounType::Thing)).await.unwrap();
        backend.clear().await.unwrap();
        assert!(backend.get_noun("n1").await.unwrap().is_none());
    }
}
