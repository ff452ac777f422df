//! The core facade: composes the distance kernels, storage adapter, type-aware
//! HNSW index, metadata index, graph adjacency, change log, query planner, and
//! health monitor into the public operations callers actually use.
//!
//! Grounded on the teacher's `KoruDeltaGeneric<R: Runtime>` (`core.rs`): an
//! `Arc<Inner>`-wrapped facade whose public methods are thin, logged wrappers
//! around calls into the composed subsystems, with a `stats()`/cold-start-load
//! shape. Brainy has no `Runtime` type parameter — every instance runs on
//! tokio — so the facade is monomorphized rather than generic.

use crate::change_log::ChangeLog;
use crate::config::BrainyConfig;
use crate::distributed::{ConfigManager, RoleHints};
use crate::embedder::Embedder;
use crate::error::{BrainyError, BrainyResult};
use crate::graph::{Edge, GraphAdjacency};
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::metadata_index::{MetadataFilter, MetadataIndex};
use crate::query::{self, FindHit, FindOptions, PlannerContext, ResultCache};
use crate::storage::{self, PageRequest, StorageBackend};
use crate::types::{
    ChangeEntry, ChangeOp, DistributedSettings, EntityType, HealthStatus, Noun, NounType, Role, Statistics,
    Timestamp, Verb, VerbType,
};
use dashmap::DashMap;
use serde_json::Map as JsonMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// What the caller is searching by. Text embedding is an external collaborator
/// (spec §6) — callers that only have text must embed it themselves and pass
/// [`Query::Vector`].
pub enum Query {
    Vector(Vec<f32>),
    /// Find-similar: search using the stored vector of an existing noun.
    NounId(String),
    /// Embed this text with the store's configured [`Embedder`] and search
    /// the resulting vector. Requires a store started with
    /// [`BrainyStore::start_with_embedder`].
    Text(String),
    /// No vector phase; ranking comes from graph reachability and field matches alone.
    StructuredOnly,
}

/// A point-in-time health view plus the identity fields callers need to route on.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub role: Role,
    pub instance_id: String,
    pub metrics: HealthSnapshot,
}

/// Per-entity isolated outcome of a batch write (spec §7 propagation policy):
/// one entity's failure never aborts the rest of the batch.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub done: Vec<String>,
    pub failed: Vec<(String, BrainyError)>,
}

struct Inner {
    config: BrainyConfig,
    instance_id: String,
    storage: Arc<dyn StorageBackend>,
    vector_index: crate::vector::TypeAwareHnsw,
    metadata_index: MetadataIndex,
    all_metadata: DashMap<String, JsonMap<String, serde_json::Value>>,
    graph: GraphAdjacency,
    change_log: ChangeLog,
    cache: ResultCache,
    health: HealthMonitor,
    role: Role,
    frozen: AtomicBool,
    config_manager: Option<Arc<ConfigManager>>,
    /// Per-type noun/metadata counts, maintained incrementally rather than
    /// scanned, so `get_statistics` stays O(active types) instead of O(nouns).
    noun_counts: DashMap<NounType, AtomicU64>,
    metadata_counts: DashMap<NounType, AtomicU64>,
    embedder: Option<Arc<dyn Embedder>>,
}

fn bump(counts: &DashMap<NounType, AtomicU64>, noun_type: NounType) {
    counts.entry(noun_type).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
}

fn unbump(counts: &DashMap<NounType, AtomicU64>, noun_type: NounType) {
    if let Some(counter) = counts.get(&noun_type) {
        counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1))).ok();
    }
}

/// An embeddable vector-plus-graph store.
///
/// Cheap to clone — internally an `Arc` over the composed subsystems.
#[derive(Clone)]
pub struct BrainyStore {
    inner: Arc<Inner>,
}

impl BrainyStore {
    /// Build a store from `config`, wiring its storage backend and, if
    /// `config.distributed` names a role, joining the shared distributed
    /// config record. Cold-starts the in-memory indexes from storage.
    #[instrument(skip(config))]
    pub async fn start(config: BrainyConfig) -> BrainyResult<Self> {
        config.validate()?;

        let storage: Arc<dyn StorageBackend> = match &config.storage {
            crate::config::StorageConfig::Memory => Arc::new(storage::MemoryBackend::new()),
            crate::config::StorageConfig::Filesystem { root } => Arc::new(storage::FilesystemBackend::new(
                root.clone(),
                config.distributed.partition_count.unwrap_or(16),
            )),
            crate::config::StorageConfig::ObjectStore { .. } => {
                return Err(BrainyError::InvalidConfig {
                    reason: "object store backend requires a client; use `BrainyStore::start_with_storage`"
                        .to_string(),
                })
            }
        };
        Self::start_with_storage(config, storage).await
    }

    /// As [`Self::start`], but with an already-constructed storage backend —
    /// the entry point object-store deployments use, since the client needs
    /// credentials the configuration record doesn't carry.
    pub async fn start_with_storage(config: BrainyConfig, storage: Arc<dyn StorageBackend>) -> BrainyResult<Self> {
        Self::start_full(config, storage, None).await
    }

    /// As [`Self::start_with_storage`], additionally wiring a caller-supplied
    /// [`Embedder`] so [`Query::Text`] and [`Self::add_noun_from_text`] work.
    /// Brainy never loads an embedding model itself (spec §6); this is the
    /// only entry point that accepts text directly.
    pub async fn start_with_embedder(
        config: BrainyConfig,
        storage: Arc<dyn StorageBackend>,
        embedder: Arc<dyn Embedder>,
    ) -> BrainyResult<Self> {
        Self::start_full(config, storage, Some(embedder)).await
    }

    async fn start_full(
        config: BrainyConfig,
        storage: Arc<dyn StorageBackend>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> BrainyResult<Self> {
        config.validate()?;
        storage.init().await?;

        let vector_index = crate::vector::TypeAwareHnsw::new(config.hnsw, config.distance);
        let metadata_index = MetadataIndex::new();
        let all_metadata = DashMap::new();
        let graph = GraphAdjacency::new();
        let change_log = ChangeLog::new(crate::change_log::DEFAULT_RETENTION_SECS);
        let noun_counts: DashMap<NounType, AtomicU64> = DashMap::new();
        let metadata_counts: DashMap<NounType, AtomicU64> = DashMap::new();

        let loaded = cold_start_load(
            &storage,
            &vector_index,
            &metadata_index,
            &all_metadata,
            &graph,
            &noun_counts,
            &metadata_counts,
        )
        .await?;
        info!(nouns = loaded.0, verbs = loaded.1, "cold start complete");

        let instance_id = uuid::Uuid::new_v4().to_string();
        let config_manager = if let Some(role_str) = &config.distributed.role {
            let configured_role = Some(role_str.parse::<Role>()?);
            let heartbeat = Duration::from_secs(config.distributed.heartbeat_interval_secs.unwrap_or(30));
            let defaults = DistributedSettings {
                partition_strategy: "hash".to_string(),
                partition_count: config.distributed.partition_count.unwrap_or(16),
                dimensions: config.dimensions,
                distance_metric: format!("{:?}", config.distance).to_lowercase(),
                hnsw_params: config.hnsw,
            };
            let manager = ConfigManager::start(
                instance_id.clone(),
                storage.clone(),
                defaults,
                configured_role,
                std::env::var("ROLE").ok().as_deref(),
                RoleHints::default(),
                heartbeat,
            )
            .await?;
            Some(manager)
        } else {
            None
        };

        let role = match &config_manager {
            Some(manager) => manager.role(),
            None => Role::Hybrid,
        };

        let inner = Inner {
            cache: ResultCache::new(Duration::from_secs(config.cache.search_ttl_secs), config.cache.search_max_size),
            health: HealthMonitor::new(),
            config,
            instance_id,
            storage,
            vector_index,
            metadata_index,
            all_metadata,
            graph,
            change_log,
            role,
            frozen: AtomicBool::new(false),
            config_manager,
            noun_counts,
            metadata_counts,
            embedder,
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Insert a noun. `noun.id` must be unique; callers that want a generated
    /// ID should leave it empty and use [`Self::add_noun_generating_id`].
    #[instrument(skip(self, noun), fields(id = %noun.id))]
    pub async fn add_noun(&self, noun: Noun) -> BrainyResult<Noun> {
        self.check_writable("add_noun")?;
        let started = Instant::now();
        let result = self.add_noun_inner(noun).await;
        self.record_outcome(started, result.is_err());
        result
    }

    async fn add_noun_inner(&self, mut noun: Noun) -> BrainyResult<Noun> {
        if noun.id.is_empty() {
            return Err(BrainyError::InvalidInput {
                reason: "noun id must not be empty".to_string(),
            });
        }
        if noun.vector.len() != self.inner.config.dimensions {
            return Err(BrainyError::DimensionMismatch {
                expected: self.inner.config.dimensions,
                actual: noun.vector.len(),
            });
        }
        noun.updated_at = Timestamp::now();

        self.inner.storage.save_noun(&noun).await?;
        self.inner.metadata_index.index_noun(&noun.id, &noun.metadata);
        self.inner.all_metadata.insert(noun.id.clone(), noun.metadata.clone());
        self.inner.vector_index.insert(noun.noun_type, &noun.id, noun.vector.clone())?;
        bump(&self.inner.noun_counts, noun.noun_type);
        if !noun.metadata.is_empty() {
            bump(&self.inner.metadata_counts, noun.noun_type);
        }
        self.append_change(EntityType::Noun, &noun.id, ChangeOp::Upsert).await?;
        self.inner.cache.invalidate_all();
        Ok(noun)
    }

    /// Generate a UUID v4 ID and insert the noun under it.
    pub async fn add_noun_generating_id(
        &self,
        vector: Vec<f32>,
        noun_type: NounType,
        metadata: JsonMap<String, serde_json::Value>,
    ) -> BrainyResult<Noun> {
        let mut noun = Noun::new(uuid::Uuid::new_v4().to_string(), vector, noun_type);
        noun.metadata = metadata;
        self.add_noun(noun).await
    }

    /// Embed `text` with the store's configured [`Embedder`] and insert the
    /// result under `id`. Requires a store started with
    /// [`Self::start_with_embedder`].
    pub async fn add_noun_from_text(
        &self,
        id: impl Into<String>,
        text: &str,
        noun_type: NounType,
        metadata: JsonMap<String, serde_json::Value>,
    ) -> BrainyResult<Noun> {
        let embedder = self.inner.embedder.as_ref().ok_or_else(|| BrainyError::InvalidConfig {
            reason: "add_noun_from_text requires a store started with an embedder (see start_with_embedder)"
                .to_string(),
        })?;
        let vector = embedder.embed_one(text).await?;
        let mut noun = Noun::new(id, vector, noun_type);
        noun.metadata = metadata;
        self.add_noun(noun).await
    }

    /// Insert many nouns, isolating per-entity failures (spec §7). Caller
    /// batches larger than `config.backpressure.max_batch_size` are chunked
    /// client-side and each sub-batch is applied concurrently (spec §5
    /// "Backpressure").
    pub async fn add_nouns_batch(&self, nouns: Vec<Noun>) -> BatchResult {
        let mut result = BatchResult::default();
        let chunk_size = self.inner.config.backpressure.max_batch_size.max(1);
        for chunk in nouns.chunks(chunk_size) {
            let outcomes = futures::future::join_all(chunk.iter().map(|noun| {
                let id = noun.id.clone();
                let noun = noun.clone();
                async move { (id, self.add_noun(noun).await) }
            }))
            .await;
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(_) => result.done.push(id),
                    Err(e) => result.failed.push((id, e)),
                }
            }
        }
        result
    }

    /// Fetch a noun by ID. Returns `Ok(None)` when absent — callers distinguish
    /// "missing" from "error" themselves.
    #[instrument(skip(self))]
    pub async fn get_noun(&self, id: &str) -> BrainyResult<Option<Noun>> {
        self.check_readable("get_noun")?;
        let started = Instant::now();
        let result = self.inner.storage.get_noun(id).await;
        self.record_outcome(started, result.is_err());
        result
    }

    /// Replace a noun's vector and/or metadata in place, re-indexing both.
    #[instrument(skip(self, vector, metadata))]
    pub async fn update_noun(
        &self,
        id: &str,
        vector: Option<Vec<f32>>,
        metadata: Option<JsonMap<String, serde_json::Value>>,
    ) -> BrainyResult<Noun> {
        self.check_writable("update_noun")?;
        let started = Instant::now();
        let result = self.update_noun_inner(id, vector, metadata).await;
        self.record_outcome(started, result.is_err());
        result
    }

    async fn update_noun_inner(
        &self,
        id: &str,
        vector: Option<Vec<f32>>,
        metadata: Option<JsonMap<String, serde_json::Value>>,
    ) -> BrainyResult<Noun> {
        let Some(mut noun) = self.inner.storage.get_noun(id).await? else {
            return Err(BrainyError::NotFound { kind: "noun", id: id.to_string() });
        };

        if let Some(new_vector) = vector {
            if new_vector.len() != self.inner.config.dimensions {
                return Err(BrainyError::DimensionMismatch {
                    expected: self.inner.config.dimensions,
                    actual: new_vector.len(),
                });
            }
            noun.vector = new_vector.clone();
            self.inner.vector_index.insert(noun.noun_type, id, new_vector)?;
        }
        if let Some(new_metadata) = metadata {
            let was_empty = noun.metadata.is_empty();
            let now_empty = new_metadata.is_empty();
            self.inner.metadata_index.remove_noun(id, &noun.metadata);
            self.inner.metadata_index.index_noun(id, &new_metadata);
            self.inner.all_metadata.insert(id.to_string(), new_metadata.clone());
            noun.metadata = new_metadata;
            if was_empty && !now_empty {
                bump(&self.inner.metadata_counts, noun.noun_type);
            } else if !was_empty && now_empty {
                unbump(&self.inner.metadata_counts, noun.noun_type);
            }
        }
        noun.updated_at = Timestamp::now();

        self.inner.storage.save_noun(&noun).await?;
        self.append_change(EntityType::Noun, id, ChangeOp::Upsert).await?;
        self.inner.cache.invalidate_all();
        Ok(noun)
    }

    /// Delete a noun. `soft` marks it deleted without removing storage or the
    /// vector index entry (searches stop surfacing it; `get` still finds it).
    /// `hard` with `cascade` also removes every verb touching it.
    #[instrument(skip(self))]
    pub async fn delete_noun(&self, id: &str, soft: bool, cascade: bool) -> BrainyResult<bool> {
        self.check_writable("delete_noun")?;
        let started = Instant::now();
        let result = self.delete_noun_inner(id, soft, cascade).await;
        self.record_outcome(started, result.is_err());
        result
    }

    async fn delete_noun_inner(&self, id: &str, soft: bool, cascade: bool) -> BrainyResult<bool> {
        let Some(mut noun) = self.inner.storage.get_noun(id).await? else {
            return Ok(false);
        };

        if soft {
            let old_metadata = noun.metadata.clone();
            noun.mark_soft_deleted();
            self.inner.storage.save_noun(&noun).await?;
            self.inner.vector_index.remove(noun.noun_type, id);
            // Drop from the planner-facing indexes (not storage) so a
            // structured/metadata-only query no longer surfaces it, matching
            // the vector path's exclusion above.
            self.inner.metadata_index.remove_noun(id, &old_metadata);
            self.inner.all_metadata.remove(id);
        } else {
            if cascade {
                for verb_id in self.inner.graph.verbs_touching(id) {
                    self.delete_verb_inner(&verb_id).await?;
                }
            }
            self.inner.storage.delete_noun(id).await?;
            self.inner.vector_index.remove(noun.noun_type, id);
            self.inner.metadata_index.remove_noun(id, &noun.metadata);
            self.inner.all_metadata.remove(id);
            unbump(&self.inner.noun_counts, noun.noun_type);
            if !noun.metadata.is_empty() {
                unbump(&self.inner.metadata_counts, noun.noun_type);
            }
        }
        self.append_change(EntityType::Noun, id, ChangeOp::Delete).await?;
        self.inner.cache.invalidate_all();
        Ok(true)
    }

    /// Delete many nouns, isolating per-entity failures (spec §7). See
    /// [`Self::add_nouns_batch`] for the chunking/concurrency policy.
    pub async fn delete_nouns_batch(&self, ids: Vec<String>, soft: bool, cascade: bool) -> BatchResult {
        let mut result = BatchResult::default();
        let chunk_size = self.inner.config.backpressure.max_batch_size.max(1);
        for chunk in ids.chunks(chunk_size) {
            let outcomes = futures::future::join_all(
                chunk.iter().map(|id| async move { (id.clone(), self.delete_noun(id, soft, cascade).await) }),
            )
            .await;
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(_) => result.done.push(id),
                    Err(e) => result.failed.push((id, e)),
                }
            }
        }
        result
    }

    /// Insert a verb. Both endpoints must already exist unless
    /// `auto_create_missing_nouns` is set, in which case a bare `Thing` noun
    /// with a zero vector is created for any missing endpoint.
    #[instrument(skip(self, verb), fields(id = %verb.id))]
    pub async fn add_verb(&self, verb: Verb, auto_create_missing_nouns: bool) -> BrainyResult<Verb> {
        self.check_writable("add_verb")?;
        let started = Instant::now();
        let result = self.add_verb_inner(verb, auto_create_missing_nouns).await;
        self.record_outcome(started, result.is_err());
        result
    }

    async fn add_verb_inner(&self, verb: Verb, auto_create_missing_nouns: bool) -> BrainyResult<Verb> {
        if verb.id.is_empty() {
            return Err(BrainyError::InvalidInput {
                reason: "verb id must not be empty".to_string(),
            });
        }
        for endpoint in [&verb.source, &verb.target] {
            if self.inner.storage.get_noun(endpoint).await?.is_none() {
                if auto_create_missing_nouns {
                    let placeholder = Noun::new(endpoint.clone(), vec![0.0; self.inner.config.dimensions], NounType::Thing);
                    self.add_noun_inner(placeholder).await?;
                } else {
                    return Err(BrainyError::NotFound { kind: "noun", id: endpoint.clone() });
                }
            }
        }

        self.inner.storage.save_verb(&verb).await?;
        self.inner.graph.add_edge(Edge {
            verb_id: verb.id.clone(),
            source: verb.source.clone(),
            target: verb.target.clone(),
            verb_type: verb.verb_type,
        });
        self.append_change(EntityType::Verb, &verb.id, ChangeOp::Upsert).await?;
        self.inner.cache.invalidate_all();
        Ok(verb)
    }

    /// Insert many verbs, isolating per-entity failures (spec §7). See
    /// [`Self::add_nouns_batch`] for the chunking/concurrency policy.
    pub async fn add_verbs_batch(&self, verbs: Vec<Verb>, auto_create_missing_nouns: bool) -> BatchResult {
        let mut result = BatchResult::default();
        let chunk_size = self.inner.config.backpressure.max_batch_size.max(1);
        for chunk in verbs.chunks(chunk_size) {
            let outcomes = futures::future::join_all(chunk.iter().map(|verb| {
                let id = verb.id.clone();
                let verb = verb.clone();
                async move { (id, self.add_verb(verb, auto_create_missing_nouns).await) }
            }))
            .await;
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(_) => result.done.push(id),
                    Err(e) => result.failed.push((id, e)),
                }
            }
        }
        result
    }

    #[instrument(skip(self))]
    pub async fn get_verb(&self, id: &str) -> BrainyResult<Option<Verb>> {
        self.check_readable("get_verb")?;
        self.inner.storage.get_verb(id).await
    }

    /// Hard-delete a verb. Verbs have no soft-delete mode in the spec.
    #[instrument(skip(self))]
    pub async fn delete_verb(&self, id: &str) -> BrainyResult<bool> {
        self.check_writable("delete_verb")?;
        let started = Instant::now();
        let result = self.delete_verb_inner(id).await;
        self.record_outcome(started, result.is_err());
        result
    }

    async fn delete_verb_inner(&self, id: &str) -> BrainyResult<bool> {
        let deleted = self.inner.storage.delete_verb(id).await?;
        if deleted {
            self.inner.graph.remove_edge(id);
            self.append_change(EntityType::Verb, id, ChangeOp::Delete).await?;
            self.inner.cache.invalidate_all();
        }
        Ok(deleted)
    }

    /// Triple-intelligence search: fuses vector similarity, graph reachability,
    /// and metadata-field matches into one ranked, paginated list (spec §4.I).
    #[instrument(skip(self, query, options))]
    pub async fn find(&self, query: Query, options: FindOptions) -> BrainyResult<Vec<FindHit>> {
        self.check_readable("find")?;
        let started = Instant::now();
        let result = self.find_inner(query, options).await;
        self.record_outcome(started, result.is_err());
        result
    }

    async fn find_inner(&self, query: Query, options: FindOptions) -> BrainyResult<Vec<FindHit>> {
        let resolved_vector = match query {
            Query::Vector(v) => Some(v),
            Query::NounId(id) => {
                let noun = self
                    .inner
                    .storage
                    .get_noun(&id)
                    .await?
                    .ok_or(BrainyError::NotFound { kind: "noun", id: id.clone() })?;
                Some(noun.vector)
            }
            Query::Text(text) => {
                let embedder = self.inner.embedder.as_ref().ok_or_else(|| BrainyError::InvalidConfig {
                    reason: "Query::Text requires a store started with an embedder (see start_with_embedder)"
                        .to_string(),
                })?;
                Some(embedder.embed_one(&text).await?)
            }
            Query::StructuredOnly => None,
        };

        let query_key = match &resolved_vector {
            Some(v) => format!("{v:?}"),
            None => "structured".to_string(),
        };
        let fingerprint = query::fingerprint(&query_key, &options);

        let ctx = PlannerContext {
            vector_index: &self.inner.vector_index,
            metadata_index: &self.inner.metadata_index,
            all_metadata: &self.inner.all_metadata,
            graph: &self.inner.graph,
            ef_search: self.inner.config.ef_search,
            default_weights: self.inner.config.weights,
        };
        let skip_cache = options.skip_cache;

        let (hits, was_cached) = query::find_with_cache(&self.inner.cache, fingerprint, skip_cache, || async {
            query::plan_and_score(&ctx, resolved_vector.as_deref(), &options)
        })
        .await?;
        self.inner.health.record_cache_lookup(was_cached);
        Ok(hits)
    }

    /// Metadata-only convenience wrapper over [`Self::find`].
    pub async fn find_by_filter(&self, filter: MetadataFilter, limit: usize, offset: usize) -> BrainyResult<Vec<FindHit>> {
        let options = FindOptions {
            limit,
            offset,
            filter: Some(filter),
            ..Default::default()
        };
        self.find(Query::StructuredOnly, options).await
    }

    /// Noun types with at least one indexed vector.
    pub fn get_active_types(&self) -> Vec<NounType> {
        self.inner.vector_index.active_types()
    }

    /// Bounded-depth graph traversal from `start`, independent of `find`'s fusion scoring.
    pub fn neighbors(&self, start: &str, depth: usize, verb_types: Option<&[VerbType]>) -> Vec<crate::graph::Neighbor> {
        self.inner.graph.neighbors(start, depth, verb_types)
    }

    /// Change-log entries strictly newer than `since`, for cross-instance catch-up.
    #[instrument(skip(self))]
    pub async fn get_changes_since(&self, since: i64) -> BrainyResult<Vec<ChangeEntry>> {
        self.check_readable("get_changes_since")?;
        if self.inner.frozen.load(Ordering::SeqCst) {
            return Err(BrainyError::Frozen { operation: "get_changes_since" });
        }
        match self.inner.change_log.changes_since(since, Timestamp::now().secs) {
            Some(entries) => Ok(entries),
            None => {
                warn!(since, "change log retention exceeded, caller must resync from storage");
                Ok(Vec::new())
            }
        }
    }

    /// A point-in-time health view for routing decisions.
    pub fn get_health_status(&self) -> HealthReport {
        let metrics = self.inner.health.snapshot();
        HealthReport {
            status: metrics.status,
            role: self.inner.role,
            instance_id: self.inner.instance_id.clone(),
            metrics,
        }
    }

    /// Per-service entity counts and index size, computed from the live
    /// incremental counters rather than a full storage scan.
    pub fn get_statistics(&self) -> Statistics {
        let mut hnsw_index_size = std::collections::BTreeMap::new();
        for noun_type in self.inner.vector_index.active_types() {
            hnsw_index_size.insert(noun_type.to_string(), self.inner.vector_index.len_for(noun_type));
        }
        let noun_count = self
            .inner
            .noun_counts
            .iter()
            .map(|e| (e.key().to_string(), e.value().load(Ordering::Relaxed)))
            .collect();
        let metadata_count = self
            .inner
            .metadata_counts
            .iter()
            .map(|e| (e.key().to_string(), e.value().load(Ordering::Relaxed)))
            .collect();
        Statistics {
            schema_version: crate::types::SCHEMA_VERSION,
            noun_count,
            verb_count: self.inner.graph.count_by_type(),
            metadata_count,
            hnsw_index_size,
            field_names: self.inner.metadata_index.field_names(),
            last_updated: Timestamp::now().secs,
        }
    }

    /// Flush today's statistics snapshot to storage. Rejected when frozen.
    pub async fn flush_statistics(&self) -> BrainyResult<()> {
        if self.inner.frozen.load(Ordering::SeqCst) {
            return Err(BrainyError::Frozen { operation: "flush_statistics" });
        }
        let stats = self.get_statistics();
        let day = chrono::Utc::now().format("%Y%m%d").to_string();
        self.inner.storage.save_statistics(&day, &stats).await
    }

    /// Disable all mutation, statistics writes, and change-log polling. There
    /// is no `unfreeze` — a frozen instance is meant to be a terminal, immutable view.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::SeqCst);
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    fn check_writable(&self, operation: &'static str) -> BrainyResult<()> {
        if self.inner.frozen.load(Ordering::SeqCst) {
            return Err(BrainyError::Frozen { operation });
        }
        if self.inner.role == Role::Reader {
            return Err(BrainyError::ReadOnly { operation });
        }
        Ok(())
    }

    fn check_readable(&self, operation: &'static str) -> BrainyResult<()> {
        if self.inner.role == Role::Writer {
            return Err(BrainyError::WriteOnly { operation });
        }
        Ok(())
    }

    async fn append_change(&self, entity_type: EntityType, id: &str, op: ChangeOp) -> BrainyResult<()> {
        if self.inner.frozen.load(Ordering::SeqCst) {
            return Err(BrainyError::Frozen { operation: "append_change" });
        }
        let now = Timestamp::now().secs;
        self.inner.change_log.record(entity_type, id, op, now);
        self.inner
            .storage
            .append_change(&ChangeEntry {
                timestamp: now,
                sequence: 0,
                entity_type,
                entity_id: id.to_string(),
                op,
            })
            .await
    }

    fn record_outcome(&self, started: Instant, is_error: bool) {
        self.inner.health.record_request(started.elapsed(), is_error);
    }

    /// The distributed config manager, when this instance joined a shared
    /// deployment. `None` for a standalone instance.
    pub fn config_manager(&self) -> Option<&Arc<ConfigManager>> {
        self.inner.config_manager.as_ref()
    }
}

/// Rebuild the metadata index, the full-metadata mirror, the type-aware HNSW
/// index, and graph adjacency from a full storage scan. Returns `(nouns, verbs)` loaded.
async fn cold_start_load(
    storage: &Arc<dyn StorageBackend>,
    vector_index: &crate::vector::TypeAwareHnsw,
    metadata_index: &MetadataIndex,
    all_metadata: &DashMap<String, JsonMap<String, serde_json::Value>>,
    graph: &GraphAdjacency,
    noun_counts: &DashMap<NounType, AtomicU64>,
    metadata_counts: &DashMap<NounType, AtomicU64>,
) -> BrainyResult<(usize, usize)> {
    let mut noun_count = 0usize;
    let mut cursor = None;
    loop {
        let page = storage
            .get_nouns(PageRequest { cursor: cursor.clone(), limit: 500 })
            .await?;
        for noun in &page.items {
            if !noun.is_soft_deleted() {
                vector_index.insert(noun.noun_type, &noun.id, noun.vector.clone())?;
            }
            metadata_index.index_noun(&noun.id, &noun.metadata);
            all_metadata.insert(noun.id.clone(), noun.metadata.clone());
            bump(noun_counts, noun.noun_type);
            if !noun.metadata.is_empty() {
                bump(metadata_counts, noun.noun_type);
            }
            noun_count += 1;
        }
        cursor = page.pagination.cursor;
        if cursor.is_none() || page.items.is_empty() {
            break;
        }
    }

    let mut verb_count = 0usize;
    for verb_type in VerbType::ALL {
        let verbs = storage.get_verbs_by_type(*verb_type).await?;
        for verb in verbs {
            let verb_id = verb.id.clone();
            graph.add_edge(Edge {
                verb_id,
                source: verb.source,
                target: verb.target,
                verb_type: *verb_type,
            });
            verb_count += 1;
        }
    }
    debug!(noun_count, verb_count, "replayed storage into in-memory indexes");
    Ok((noun_count, verb_count))
}
