//! Triple-intelligence query planner: fuses vector similarity, graph
//! reachability, and metadata-field matches into one ranked result list.
//!
//! The five-step pipeline (prefilter, vector phase, fusion, pagination,
//! result cache) has no single teacher analogue — the teacher's
//! `query::QueryExecutor` only runs a `Filter` over a flat document set
//! (`query.rs`). Step 1's candidate-set intersection is grounded there;
//! the vector and graph phases reuse [`crate::vector::TypeAwareHnsw`] and
//! [`crate::graph::GraphAdjacency`] directly. The result cache's
//! singleflight behavior has no teacher precedent: it is built fresh on
//! `tokio::sync::Notify`, the same primitive the teacher uses for
//! `ClusterState` readiness signaling in `cluster.rs`.

use crate::config::FusionWeights;
use crate::graph::GraphAdjacency;
use crate::metadata_index::{MetadataFilter, MetadataIndex};
use crate::types::{NounType, VerbType};
use crate::vector::TypeAwareHnsw;
use dashmap::DashMap;
use serde_json::Map as JsonMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub limit: usize,
    pub offset: usize,
    pub filter: Option<MetadataFilter>,
    pub noun_types: Option<Vec<NounType>>,
    pub verb_types: Option<Vec<VerbType>>,
    pub source_id: Option<String>,
    pub depth: usize,
    pub skip_cache: bool,
    pub fusion_weights: Option<FusionWeights>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindHit {
    pub id: String,
    pub score: f32,
}

/// Inputs the planner needs per call: a snapshot view over storage-backed
/// state, supplied by the facade so this module stays storage-agnostic.
pub struct PlannerContext<'a> {
    pub vector_index: &'a TypeAwareHnsw,
    pub metadata_index: &'a MetadataIndex,
    pub all_metadata: &'a DashMap<String, JsonMap<String, serde_json::Value>>,
    pub graph: &'a GraphAdjacency,
    pub ef_search: usize,
    pub default_weights: FusionWeights,
}

struct CachedResult {
    hits: Vec<FindHit>,
    inserted_at: Instant,
}

/// LRU-by-insertion-order result cache with per-fingerprint singleflight.
/// `ready` holds completed entries; `inflight` tracks fingerprints currently
/// being computed so concurrent identical lookups wait on the same `Notify`
/// rather than re-running the pipeline.
pub struct ResultCache {
    ready: DashMap<u64, CachedResult>,
    inflight: DashMap<u64, Arc<Notify>>,
    order: std::sync::Mutex<std::collections::VecDeque<u64>>,
    ttl: Duration,
    max_size: usize,
    generation: AtomicU64,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ready: DashMap::new(),
            inflight: DashMap::new(),
            order: std::sync::Mutex::new(std::collections::VecDeque::new()),
            ttl,
            max_size,
            generation: AtomicU64::new(0),
        }
    }

    /// Invalidate every cached entry — called on any storage mutation.
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.ready.clear();
        self.order.lock().unwrap().clear();
    }

    fn evict_if_over_capacity(&self) {
        let mut order = self.order.lock().unwrap();
        while order.len() > self.max_size {
            if let Some(oldest) = order.pop_front() {
                self.ready.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn get_fresh(&self, fingerprint: u64) -> Option<Vec<FindHit>> {
        let entry = self.ready.get(&fingerprint)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.hits.clone())
        } else {
            drop(entry);
            self.ready.remove(&fingerprint);
            None
        }
    }
}

/// Execute `find`, applying the result cache with singleflight de-duplication
/// around `run`. `run` performs the actual five-step pipeline on a cache miss.
/// The returned `bool` is `true` when the result came from the cache, for the
/// health monitor's cache-hit-rate tracking.
pub async fn find_with_cache<F, Fut>(
    cache: &ResultCache,
    fingerprint: u64,
    skip_cache: bool,
    run: F,
) -> crate::error::BrainyResult<(Vec<FindHit>, bool)>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = crate::error::BrainyResult<Vec<FindHit>>>,
{
    if skip_cache {
        return Ok((run().await?, false));
    }
    if let Some(hits) = cache.get_fresh(fingerprint) {
        return Ok((hits, true));
    }

    let notify = match cache.inflight.entry(fingerprint) {
        dashmap::mapref::entry::Entry::Vacant(v) => {
            v.insert(Arc::new(Notify::new()));
            None
        }
        dashmap::mapref::entry::Entry::Occupied(o) => Some(o.get().clone()),
    };

    if let Some(notify) = notify {
        notify.notified().await;
        return Ok((cache.get_fresh(fingerprint).unwrap_or_default(), true));
    }

    let result = run().await;
    if let Ok(hits) = &result {
        cache.ready.insert(
            fingerprint,
            CachedResult {
                hits: hits.clone(),
                inserted_at: Instant::now(),
            },
        );
        cache.order.lock().unwrap().push_back(fingerprint);
        cache.evict_if_over_capacity();
    }
    if let Some((_, notify)) = cache.inflight.remove(&fingerprint) {
        notify.notify_waiters();
    }
    Ok((result?, false))
}

/// Hash the parameters that determine a query's result set, for caching.
pub fn fingerprint(query_key: &str, options: &FindOptions) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    query_key.hash(&mut hasher);
    options.limit.hash(&mut hasher);
    options.offset.hash(&mut hasher);
    options.depth.hash(&mut hasher);
    options.source_id.hash(&mut hasher);
    if let Some(types) = &options.noun_types {
        for t in types {
            t.hash(&mut hasher);
        }
    }
    if let Some(types) = &options.verb_types {
        for t in types {
            t.hash(&mut hasher);
        }
    }
    format!("{:?}", options.filter).hash(&mut hasher);
    if let Some(w) = options.fusion_weights {
        w.vector.to_bits().hash(&mut hasher);
        w.graph.to_bits().hash(&mut hasher);
        w.field.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Run the five-step triple-intelligence pipeline against a resolved query vector.
pub fn plan_and_score(
    ctx: &PlannerContext,
    resolved_vector: Option<&[f32]>,
    options: &FindOptions,
) -> crate::error::BrainyResult<Vec<FindHit>> {
    // Step 1: prefilter.
    let filter_candidates: Option<HashSet<String>> = options
        .filter
        .as_ref()
        .map(|f| ctx.metadata_index.get_ids_matching(f, ctx.all_metadata).into_iter().collect());

    let graph_candidates: Option<Vec<(String, usize)>> = options.source_id.as_ref().map(|source| {
        ctx.graph
            .neighbors(source, options.depth.max(1), options.verb_types.as_deref())
            .into_iter()
            .map(|n| (n.noun_id, n.depth))
            .collect()
    });

    let candidate_ids: Option<HashSet<String>> = match (&filter_candidates, &graph_candidates) {
        (Some(f), Some(g)) => {
            let gset: HashSet<String> = g.iter().map(|(id, _)| id.clone()).collect();
            Some(f.intersection(&gset).cloned().collect())
        }
        (Some(f), None) => Some(f.clone()),
        (None, Some(g)) => Some(g.iter().map(|(id, _)| id.clone()).collect()),
        (None, None) => None,
    };

    if let Some(ids) = &candidate_ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
    }

    let depth_by_id: std::collections::HashMap<String, usize> =
        graph_candidates.unwrap_or_default().into_iter().collect();

    let weights = options.fusion_weights.unwrap_or(ctx.default_weights);
    let requested = options.limit + options.offset;

    // Step 2: vector phase.
    let mut fused: Vec<FindHit> = if let Some(vector) = resolved_vector {
        let empty_candidates = HashSet::new();
        let candidate_ref = candidate_ids.as_ref().unwrap_or(&empty_candidates);
        let has_candidates = candidate_ids.is_some();
        let closure = |id: &str| candidate_ref.contains(id);
        let filter_fn: Option<&dyn Fn(&str) -> bool> = if has_candidates {
            Some(&closure)
        } else {
            None
        };

        let hits = ctx.vector_index.search(
            options.noun_types.as_deref(),
            vector,
            requested.max(1),
            ctx.ef_search,
            filter_fn,
        )?;

        let max_distance = hits.iter().map(|h| h.distance).fold(0.0_f32, f32::max).max(1e-6);
        hits.into_iter()
            .map(|h| {
                let s_vec = 1.0 - (h.distance / max_distance).min(1.0);
                let s_graph = depth_by_id
                    .get(&h.id)
                    .map(|d| 1.0 / (1 + *d) as f32)
                    .unwrap_or(0.0);
                let s_field = satisfied_field_fraction(ctx, &h.id, &options.filter);
                let score = weights.vector * s_vec + weights.graph * s_graph + weights.field * s_field;
                FindHit { id: h.id, score }
            })
            .collect()
    } else if let Some(ids) = &candidate_ids {
        // No vector phase: rank purely on graph depth and field coverage.
        ids.iter()
            .map(|id| {
                let s_graph = depth_by_id.get(id).map(|d| 1.0 / (1 + *d) as f32).unwrap_or(0.0);
                let s_field = satisfied_field_fraction(ctx, id, &options.filter);
                let score = weights.graph * s_graph + weights.field * s_field;
                FindHit { id: id.clone(), score }
            })
            .collect()
    } else {
        Vec::new()
    };

    // Step 3: fusion tie-break by ID for deterministic ordering.
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    // Step 4: pagination.
    let page: Vec<FindHit> = fused.into_iter().skip(options.offset).take(options.limit).collect();
    Ok(page)
}

fn satisfied_field_fraction(ctx: &PlannerContext, id: &str, filter: &Option<MetadataFilter>) -> f32 {
    let Some(filter) = filter else { return 0.0 };
    let Some(metadata) = ctx.all_metadata.get(id) else { return 0.0 };
    let requested = count_predicates(filter);
    if requested == 0 {
        return 0.0;
    }
    let satisfied = count_satisfied(filter, &metadata);
    satisfied as f32 / requested as f32
}

fn count_predicates(filter: &MetadataFilter) -> usize {
    match filter {
        MetadataFilter::And(fs) | MetadataFilter::Or(fs) => fs.iter().map(count_predicates).sum(),
        _ => 1,
    }
}

fn count_satisfied(filter: &MetadataFilter, metadata: &JsonMap<String, serde_json::Value>) -> usize {
    match filter {
        MetadataFilter::And(fs) | MetadataFilter::Or(fs) => fs.iter().map(|f| count_satisfied(f, metadata)).sum(),
        leaf => usize::from(leaf.matches(metadata)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HnswParams;
    use serde_json::json;

    fn sample_ctx<'a>(
        vector_index: &'a TypeAwareHnsw,
        metadata_index: &'a MetadataIndex,
        all_metadata: &'a DashMap<String, JsonMap<String, serde_json::Value>>,
        graph: &'a GraphAdjacency,
    ) -> PlannerContext<'a> {
        PlannerContext {
            vector_index,
            metadata_index,
            all_metadata,
            graph,
            ef_search: 50,
            default_weights: FusionWeights::default(),
        }
    }

    #[test]
    fn empty_intersection_short_circuits() {
        let vector_index = TypeAwareHnsw::new(HnswParams::default(), crate::config::DistanceMetric::Cosine);
        let metadata_index = MetadataIndex::new();
        let all_metadata = DashMap::new();
        let graph = GraphAdjacency::new();
        let ctx = sample_ctx(&vector_index, &metadata_index, &all_metadata, &graph);

        let mut options = FindOptions::default();
        options.limit = 10;
        options.filter = Some(MetadataFilter::Eq("domain".into(), json!("finance")));
        options.source_id = Some("missing-root".into());

        let hits = plan_and_score(&ctx, None, &options).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn vector_phase_ranks_by_fused_score() {
        let vector_index = TypeAwareHnsw::new(HnswParams::default(), crate::config::DistanceMetric::Cosine);
        vector_index.insert(NounType::Thing, "a", vec![1.0, 0.0]).unwrap();
        vector_index.insert(NounType::Thing, "b", vec![0.0, 1.0]).unwrap();
        let metadata_index = MetadataIndex::new();
        let all_metadata = DashMap::new();
        let graph = GraphAdjacency::new();
        let ctx = sample_ctx(&vector_index, &metadata_index, &all_metadata, &graph);

        let mut options = FindOptions::default();
        options.limit = 2;

        let hits = plan_and_score(&ctx, Some(&[1.0, 0.0]), &options).unwrap();
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn pagination_windows_are_disjoint() {
        let vector_index = TypeAwareHnsw::new(HnswParams::default(), crate::config::DistanceMetric::Cosine);
        for i in 0..5 {
            vector_index
                .insert(NounType::Thing, &format!("n{i}"), vec![i as f32, 0.0])
                .unwrap();
        }
        let metadata_index = MetadataIndex::new();
        let all_metadata = DashMap::new();
        let graph = GraphAdjacency::new();
        let ctx = sample_ctx(&vector_index, &metadata_index, &all_metadata, &graph);

        let mut first = FindOptions::default();
        first.limit = 2;
        first.offset = 0;
        let mut second = FindOptions::default();
        second.limit = 2;
        second.offset = 2;

        let query = vec![0.0, 0.0];
        let page1 = plan_and_score(&ctx, Some(&query), &first).unwrap();
        let page2 = plan_and_score(&ctx, Some(&query), &second).unwrap();
        let ids1: HashSet<_> = page1.iter().map(|h| h.id.clone()).collect();
        let ids2: HashSet<_> = page2.iter().map(|h| h.id.clone()).collect();
        assert!(ids1.is_disjoint(&ids2));
    }

    #[tokio::test]
    async fn cache_hit_skips_run_closure() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        let calls = Arc::new(AtomicU64::new(0));
        let calls2 = calls.clone();
        let (hits, was_cached) = find_with_cache(&cache, 42, false, || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![FindHit { id: "x".into(), score: 1.0 }])
            }
        })
        .await
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(!was_cached);

        let calls3 = calls.clone();
        let (_, was_cached) = find_with_cache(&cache, 42, false, || {
            let calls = calls3.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(was_cached);
    }

    #[tokio::test]
    async fn skip_cache_always_runs() {
        let cache = ResultCache::new(Duration::from_secs(60), 10);
        let calls = Arc::new(AtomicU64::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            let (_, was_cached) = find_with_cache(&cache, 7, true, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            })
            .await
            .unwrap();
            assert!(!was_cached);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
