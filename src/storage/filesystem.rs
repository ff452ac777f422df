//! Per-file JSON storage backend, one file per entity under a partitioned
//! directory layout.
//!
//! Grounded on the teacher's `persistence.rs`: async `tokio::fs` I/O, and a
//! CRC32 checksum computed over the serialized JSON bytes
//! (`crc32fast::hash`), stored alongside the payload and verified on every
//! read. The directory layout itself follows spec §4.B rather than the
//! teacher's WAL-segment layout: one file per entity, not an append log.

use super::{Page, PageRequest, Pagination, StorageBackend, StorageStatus};
use crate::error::{BrainyError, BrainyResult};
use crate::partition::partition_path;
use crate::types::{check_schema_version, ChangeEntry, DistributedConfigRecord, Noun, Statistics, Verb, VerbType};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

#[derive(Serialize, serde::Deserialize)]
struct Checksummed<T> {
    checksum: u32,
    payload: T,
}

/// A filesystem-backed store rooted at a configured directory.
pub struct FilesystemBackend {
    root: PathBuf,
    partition_count: u32,
    change_sequence: AtomicU64,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>, partition_count: u32) -> Self {
        Self {
            root: root.into(),
            partition_count,
            change_sequence: AtomicU64::new(0),
        }
    }

    fn noun_path(&self, id: &str) -> PathBuf {
        self.root
            .join("nouns")
            .join(partition_path(id, self.partition_count))
            .join(format!("{id}.json"))
    }

    fn verb_path(&self, id: &str) -> PathBuf {
        self.root
            .join("verbs")
            .join(partition_path(id, self.partition_count))
            .join(format!("{id}.json"))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.root.join("metadata").join(format!("{key}.json"))
    }

    fn statistics_path(&self, day: &str) -> PathBuf {
        self.root.join("index").join(format!("statistics_{day}.json"))
    }

    fn distributed_config_path(&self) -> PathBuf {
        self.root.join("index").join("distributed_config.json")
    }

    fn changes_dir(&self) -> PathBuf {
        self.root.join("index").join("changes")
    }

    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> BrainyResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BrainyError::StorageUnavailable(e.to_string()))?;
        }
        let payload = serde_json::to_vec(value)?;
        let checksum = crc32fast::hash(&payload);
        let envelope = serde_json::to_vec(&Checksummed {
            checksum,
            payload: serde_json::from_slice::<serde_json::Value>(&payload)?,
        })?;
        fs::write(path, envelope)
            .await
            .map_err(|e| BrainyError::StorageUnavailable(e.to_string()))
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> BrainyResult<Option<T>> {
        let bytes = match fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BrainyError::StorageUnavailable(e.to_string())),
        };
        let envelope: Checksummed<serde_json::Value> = serde_json::from_slice(&bytes)?;
        let payload_bytes = serde_json::to_vec(&envelope.payload)?;
        if crc32fast::hash(&payload_bytes) != envelope.checksum {
            return Err(BrainyError::StorageUnavailable(format!(
                "checksum mismatch reading {}",
                path.display()
            )));
        }
        Ok(Some(serde_json::from_value(envelope.payload)?))
    }

    async fn remove_file(&self, path: &Path) -> BrainyResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BrainyError::StorageUnavailable(e.to_string())),
        }
    }

    async fn list_dir_files(&self, dir: &Path) -> BrainyResult<Vec<PathBuf>> {
        let mut out = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BrainyError::StorageUnavailable(e.to_string())),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| BrainyError::StorageUnavailable(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.push(path);
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn init(&self) -> BrainyResult<()> {
        for sub in ["nouns", "verbs", "metadata", "index/changes"] {
            fs::create_dir_all(self.root.join(sub))
                .await
                .map_err(|e| BrainyError::StorageUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn save_noun(&self, noun: &Noun) -> BrainyResult<()> {
        self.write_json(&self.noun_path(&noun.id), noun).await
    }

    async fn get_noun(&self, id: &str) -> BrainyResult<Option<Noun>> {
        match self.read_json::<Noun>(&self.noun_path(id)).await? {
            Some(noun) => {
                check_schema_version(noun.schema_version)?;
                Ok(Some(noun))
            }
            None => Ok(None),
        }
    }

    async fn delete_noun(&self, id: &str) -> BrainyResult<bool> {
        self.remove_file(&self.noun_path(id)).await
    }

    async fn get_nouns(&self, page: PageRequest) -> BrainyResult<Page<Noun>> {
        let mut paths = self.list_dir_files(&self.root.join("nouns")).await?;
        paths.sort();
        let start = page
            .cursor
            .as_ref()
            .and_then(|c| paths.iter().position(|p| p.ends_with(format!("{c}.json"))).map(|p| p + 1))
            .unwrap_or(0);
        let limit = if page.limit == 0 { paths.len().max(1) } else { page.limit };
        let mut items = Vec::new();
        for path in paths.iter().skip(start).take(limit) {
            if let Some(noun) = self.read_json::<Noun>(path).await? {
                items.push(noun);
            }
        }
        let next_cursor = items.last().map(|n| n.id.clone());
        Ok(Page {
            items,
            pagination: Pagination {
                cursor: next_cursor,
                page_size: limit,
                total: Some(paths.len() as u64),
            },
        })
    }

    async fn save_verb(&self, verb: &Verb) -> BrainyResult<()> {
        self.write_json(&self.verb_path(&verb.id), verb).await
    }

    async fn get_verb(&self, id: &str) -> BrainyResult<Option<Verb>> {
        match self.read_json::<Verb>(&self.verb_path(id)).await? {
            Some(verb) => {
                check_schema_version(verb.schema_version)?;
                Ok(Some(verb))
            }
            None => Ok(None),
        }
    }

    async fn delete_verb(&self, id: &str) -> BrainyResult<bool> {
        self.remove_file(&self.verb_path(id)).await
    }

    async fn get_verbs_by_source(&self, source: &str) -> BrainyResult<Vec<Verb>> {
        let all = self.list_dir_files(&self.root.join("verbs")).await?;
        let mut out = Vec::new();
        for path in all {
            if let Some(v) = self.read_json::<Verb>(&path).await? {
                if v.source == source {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    async fn get_verbs_by_target(&self, target: &str) -> BrainyResult<Vec<Verb>> {
        let all = self.list_dir_files(&self.root.join("verbs")).await?;
        let mut out = Vec::new();
        for path in all {
            if let Some(v) = self.read_json::<Verb>(&path).await? {
                if v.target == target {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    async fn get_verbs_by_type(&self, verb_type: VerbType) -> BrainyResult<Vec<Verb>> {
        let all = self.list_dir_files(&self.root.join("verbs")).await?;
        let mut out = Vec::new();
        for path in all {
            if let Some(v) = self.read_json::<Verb>(&path).await? {
                if v.verb_type == verb_type {
                    out.push(v);
                }
            }
        }
        Ok(out)
    }

    async fn save_metadata(&self, key: &str, value: &serde_json::Value) -> BrainyResult<()> {
        self.write_json(&self.metadata_path(key), value).await
    }

    async fn get_metadata(&self, key: &str) -> BrainyResult<Option<serde_json::Value>> {
        self.read_json(&self.metadata_path(key)).await
    }

    async fn append_change(&self, entry: &ChangeEntry) -> BrainyResult<()> {
        let seq = self.change_sequence.fetch_add(1, Ordering::Relaxed);
        let path = self
            .changes_dir()
            .join(format!("{}-{}.json", entry.timestamp, seq));
        self.write_json(&path, entry).await
    }

    async fn get_changes_since(&self, timestamp: i64) -> BrainyResult<Vec<ChangeEntry>> {
        let mut paths = self.list_dir_files(&self.changes_dir()).await?;
        paths.sort();
        let mut out = Vec::new();
        for path in paths {
            if let Some(entry) = self.read_json::<ChangeEntry>(&path).await? {
                if entry.timestamp > timestamp {
                    out.push(entry);
                }
            }
        }
        Ok(out)
    }

    async fn save_statistics(&self, day: &str, stats: &Statistics) -> BrainyResult<()> {
        self.write_json(&self.statistics_path(day), stats).await
    }

    async fn get_statistics(&self, day: &str) -> BrainyResult<Option<Statistics>> {
        self.read_json(&self.statistics_path(day)).await
    }

    async fn save_distributed_config(&self, record: &DistributedConfigRecord) -> BrainyResult<()> {
        self.write_json(&self.distributed_config_path(), record).await
    }

    async fn get_distributed_config(&self) -> BrainyResult<Option<DistributedConfigRecord>> {
        self.read_json(&self.distributed_config_path()).await
    }

    async fn get_storage_status(&self) -> BrainyResult<StorageStatus> {
        match fs::metadata(&self.root).await {
            Ok(_) => Ok(StorageStatus::Ok),
            Err(e) => Ok(StorageStatus::Degraded(e.to_string())),
        }
    }

    async fn clear(&self) -> BrainyResult<()> {
        if fs::metadata(&self.root).await.is_ok() {
            fs::remove_dir_all(&self.root)
                .await
                .map_err(|e| BrainyError::StorageUnavailable(e.to_string()))?;
        }
        self.init().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NounType;
    use tempfile::tempdir;

    fn sample_noun(id: &str) -> Noun {
        Noun::new(id, vec![0.1, 0.2], NounType::Thing)
    }

    #[tokio::test]
    async fn save_then_get_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), 4);
        backend.init().await.unwrap();
        backend.save_noun(&sample_noun("n1")).await.unwrap();
        let fetched = backend.get_noun("n1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "n1");
    }

    #[tokio::test]
    async fn corrupted_checksum_is_rejected() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), 4);
        backend.init().await.unwrap();
        backend.save_noun(&sample_noun("n1")).await.unwrap();

        let path = backend.noun_path("n1");
        let mut bytes = tokio::fs::read(&path).await.unwrap();
        bytes[0] ^= 0xFF;
        tokio::fs::write(&path, bytes).await.unwrap();

        assert!(backend.get_noun("n1").await.is_err());
    }

    #[tokio::test]
    async fn noun_with_newer_schema_version_is_rejected_on_read() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), 4);
        backend.init().await.unwrap();
        let mut noun = sample_noun("n1");
        noun.schema_version = crate::types::SCHEMA_VERSION + 1;
        backend.save_noun(&noun).await.unwrap();

        let err = backend.get_noun("n1").await.unwrap_err();
        assert!(matches!(err, BrainyError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn delete_missing_returns_false() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), 4);
        backend.init().await.unwrap();
        assert!(!backend.delete_noun("missing").await.unwrap());
    }

    #[tokio::test]
    async fn changes_are_listed_in_append_order() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), 4);
        backend.init().await.unwrap();
        backend
            .append_change(&ChangeEntry {
                timestamp: 1,
                sequence: 0,
                entity_type: crate::types::EntityType::Noun,
                entity_id: "n1".to_string(),
                op: crate::types::ChangeOp::Upsert,
            })
            .await
            .unwrap();
        let changes = backend.get_changes_since(0).await.unwrap();
        assert_eq!(changes.len(), 1);
    }
}
