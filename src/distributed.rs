//! Distributed config manager: a single shared config record CAS'd through
//! the storage adapter, plus per-instance role resolution and heartbeat.
//!
//! Grounded on the teacher's `ClusterNode`/`ClusterConfig` (`cluster.rs`):
//! the `start`/`stop` lifecycle with a `broadcast::Sender<()>` shutdown
//! signal and a `tokio::time::interval` driving a background loop survives
//! unchanged. What changes is the substrate: the teacher gossips cluster
//! state peer-to-peer over TCP; Brainy has no peer network; every instance
//! instead reads and optimistically CASes one `DistributedConfigRecord`
//! blob through the shared storage backend (§4.H). Role resolution
//! (explicit config → `ROLE` env var → writable/readable hints →
//! `RoleRequired`) has no teacher precedent and is new.

use crate::error::{BrainyError, BrainyResult};
use crate::storage::StorageBackend;
use crate::types::{DistributedSettings, HealthStatus, InstanceEntry, Role, SCHEMA_VERSION};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{info, warn};

/// Hints used to resolve a role when none is explicitly configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleHints {
    pub writable: bool,
    pub readable: bool,
}

/// Resolve the effective role per §4.H's priority order.
pub fn resolve_role(
    configured: Option<Role>,
    role_env: Option<&str>,
    hints: RoleHints,
) -> BrainyResult<Role> {
    if let Some(role) = configured {
        return Ok(role);
    }
    if let Some(raw) = role_env {
        return raw.parse::<Role>();
    }
    match (hints.writable, hints.readable) {
        (true, true) => Ok(Role::Hybrid),
        (true, false) => Ok(Role::Writer),
        (false, true) => Ok(Role::Reader),
        (false, false) => Err(BrainyError::RoleRequired),
    }
}

/// Manages one instance's registration in the shared distributed config.
pub struct ConfigManager {
    instance_id: String,
    storage: Arc<dyn StorageBackend>,
    role: Role,
    heartbeat_interval: Duration,
    settings: RwLock<DistributedSettings>,
    config_version: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConfigManager {
    /// Read the config record (creating it from `defaults` if absent via
    /// compare-and-set), resolve this instance's role, and register it.
    pub async fn start(
        instance_id: impl Into<String>,
        storage: Arc<dyn StorageBackend>,
        defaults: DistributedSettings,
        configured_role: Option<Role>,
        role_env: Option<&str>,
        hints: RoleHints,
        heartbeat_interval: Duration,
    ) -> BrainyResult<Arc<Self>> {
        let instance_id = instance_id.into();
        let role = resolve_role(configured_role, role_env, hints)?;

        let record = match storage.get_distributed_config().await? {
            Some(existing) => existing,
            None => {
                let fresh = crate::types::DistributedConfigRecord {
                    schema_version: SCHEMA_VERSION,
                    version: 1,
                    updated: crate::types::Timestamp::now().secs,
                    settings: defaults.clone(),
                    instances: Default::default(),
                };
                // Single-writer election: if another instance raced us and
                // already wrote a record, prefer theirs.
                storage.save_distributed_config(&fresh).await?;
                storage.get_distributed_config().await?.unwrap_or(fresh)
            }
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        let manager = Arc::new(Self {
            instance_id,
            storage,
            role,
            heartbeat_interval,
            settings: RwLock::new(record.settings.clone()),
            config_version: AtomicU64::new(record.version),
            shutdown_tx,
        });

        manager.register(record).await?;
        manager.clone().spawn_heartbeat();
        Ok(manager)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub async fn settings(&self) -> DistributedSettings {
        self.settings.read().await.clone()
    }

    async fn register(&self, mut record: crate::types::DistributedConfigRecord) -> BrainyResult<()> {
        record.instances.insert(
            self.instance_id.clone(),
            InstanceEntry {
                role: self.role,
                last_heartbeat: crate::types::Timestamp::now().secs,
                health_status: HealthStatus::Healthy,
            },
        );
        self.cas_write(record).await
    }

    /// Attempt to write `record` with `version` bumped by one. On a lost
    /// race (someone else wrote first), reload and report `ConflictingVersion`;
    /// callers decide whether to retry.
    async fn cas_write(&self, mut record: crate::types::DistributedConfigRecord) -> BrainyResult<()> {
        let expected = self.config_version.load(Ordering::SeqCst);
        record.version = expected + 1;
        record.updated = crate::types::Timestamp::now().secs;

        let current = self.storage.get_distributed_config().await?;
        if let Some(current) = &current {
            if current.version != expected {
                warn!(
                    instance = %self.instance_id,
                    expected,
                    found = current.version,
                    "config CAS lost, reloading"
                );
                *self.settings.write().await = current.settings.clone();
                self.config_version.store(current.version, Ordering::SeqCst);
                return Err(BrainyError::ConflictingVersion {
                    expected,
                    found: current.version,
                });
            }
        }

        self.storage.save_distributed_config(&record).await?;
        self.config_version.store(record.version, Ordering::SeqCst);
        *self.settings.write().await = record.settings.clone();
        Ok(())
    }

    /// Heartbeat: re-register with a bumped timestamp and poll for settings
    /// changes made by other instances. Runs until `stop()` is called.
    fn spawn_heartbeat(self: Arc<Self>) {
        let interval_dur = self.heartbeat_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(interval_dur);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.heartbeat_once().await {
                            warn!(instance = %self.instance_id, error = %err, "heartbeat failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!(instance = %self.instance_id, "config manager heartbeat stopped");
                        break;
                    }
                }
            }
        });
    }

    async fn heartbeat_once(&self) -> BrainyResult<()> {
        let Some(mut record) = self.storage.get_distributed_config().await? else {
            return Ok(());
        };
        if record.version > self.config_version.load(Ordering::SeqCst) {
            *self.settings.write().await = record.settings.clone();
            self.config_version.store(record.version, Ordering::SeqCst);
        }
        record.instances.insert(
            self.instance_id.clone(),
            InstanceEntry {
                role: self.role,
                last_heartbeat: crate::types::Timestamp::now().secs,
                health_status: HealthStatus::Healthy,
            },
        );
        self.cas_write(record).await
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use crate::types::HnswParams;

    fn defaults() -> DistributedSettings {
        DistributedSettings {
            partition_strategy: "hash".into(),
            partition_count: 4,
            dimensions: 8,
            distance_metric: "cosine".into(),
            hnsw_params: HnswParams::default(),
        }
    }

    #[test]
    fn resolve_role_prefers_explicit_over_env_and_hints() {
        let role = resolve_role(Some(Role::Writer), Some("reader"), RoleHints::default()).unwrap();
        assert_eq!(role, Role::Writer);
    }

    #[test]
    fn resolve_role_falls_back_to_env() {
        let role = resolve_role(None, Some("hybrid"), RoleHints::default()).unwrap();
        assert_eq!(role, Role::Hybrid);
    }

    #[test]
    fn resolve_role_rejects_invalid_env_value() {
        let err = resolve_role(None, Some("bogus"), RoleHints::default()).unwrap_err();
        assert!(matches!(err, BrainyError::InvalidRole(_)));
    }

    #[test]
    fn resolve_role_without_any_signal_requires_role() {
        let err = resolve_role(None, None, RoleHints::default()).unwrap_err();
        assert!(matches!(err, BrainyError::RoleRequired));
    }

    #[test]
    fn resolve_role_from_hints_when_both_writable_and_readable() {
        let hints = RoleHints { writable: true, readable: true };
        assert_eq!(resolve_role(None, None, hints).unwrap(), Role::Hybrid);
    }

    #[tokio::test]
    async fn start_creates_config_record_when_absent() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let manager = ConfigManager::start(
            "instance-a",
            storage.clone(),
            defaults(),
            Some(Role::Hybrid),
            None,
            RoleHints::default(),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
        manager.stop();

        let record = storage.get_distributed_config().await.unwrap().unwrap();
        assert!(record.instances.contains_key("instance-a"));
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn second_instance_joins_existing_record() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let first = ConfigManager::start(
            "instance-a",
            storage.clone(),
            defaults(),
            Some(Role::Writer),
            None,
            RoleHints::default(),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
        first.stop();

        let second = ConfigManager::start(
            "instance-b",
            storage.clone(),
            defaults(),
            Some(Role::Reader),
            None,
            RoleHints::default(),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
        second.stop();

        let record = storage.get_distributed_config().await.unwrap().unwrap();
        assert!(record.instances.contains_key("instance-a"));
        assert!(record.instances.contains_key("instance-b"));
    }
}
