//! Type-aware HNSW: one graph per noun type, constructed lazily.
//!
//! Generalizes the teacher's single `HnswIndex` (optionally filtered to one
//! embedding model via `model_filter`) into a `DashMap<NounType, HnswGraph>`
//! with lazy per-type construction, so a search over K types touches exactly
//! K graphs and an unscoped search fans out over every populated type.

mod hnsw;

pub use hnsw::{HnswGraph, HnswGraphConfig};

use crate::config::DistanceMetric;
use crate::error::BrainyResult;
use crate::types::{HnswParams, NounType};
use dashmap::DashMap;

/// A scored search hit: noun ID and cosine distance (smaller = closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub id: String,
    pub distance: f32,
}

/// One HNSW graph per noun type, created on first insert of that type.
pub struct TypeAwareHnsw {
    graphs: DashMap<NounType, HnswGraph>,
    params: HnswParams,
    metric: DistanceMetric,
}

impl TypeAwareHnsw {
    pub fn new(params: HnswParams, metric: DistanceMetric) -> Self {
        Self {
            graphs: DashMap::new(),
            params,
            metric,
        }
    }

    fn graph_for(&self, noun_type: NounType) -> dashmap::mapref::one::RefMut<'_, NounType, HnswGraph> {
        self.graphs.entry(noun_type).or_insert_with(|| {
            HnswGraph::new(HnswGraphConfig::new(self.params.m, self.params.ef_construction, self.metric))
        })
    }

    pub fn insert(&self, noun_type: NounType, id: &str, vector: Vec<f32>) -> BrainyResult<()> {
        self.graph_for(noun_type).insert(id, vector)
    }

    /// No-op if `id` is not present under `noun_type`.
    pub fn remove(&self, noun_type: NounType, id: &str) {
        if let Some(graph) = self.graphs.get(&noun_type) {
            graph.remove(id);
        }
    }

    /// Types with at least one populated graph.
    pub fn active_types(&self) -> Vec<NounType> {
        self.graphs
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| *e.key())
            .collect()
    }

    /// Search across the given types (or every active type, if `None`/empty),
    /// merging per-graph results and truncating to the top `k` overall.
    pub fn search(
        &self,
        types: Option<&[NounType]>,
        query: &[f32],
        k: usize,
        ef_search: usize,
        filter: Option<&dyn Fn(&str) -> bool>,
    ) -> BrainyResult<Vec<ScoredHit>> {
        let target_types: Vec<NounType> = match types {
            Some(t) if !t.is_empty() => t.to_vec(),
            _ => self.active_types(),
        };

        let mut merged = Vec::new();
        for noun_type in target_types {
            let Some(graph) = self.graphs.get(&noun_type) else { continue };
            for (id, distance) in graph.search(query, k, ef_search, filter)? {
                merged.push(ScoredHit { id, distance });
            }
        }
        merged.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        merged.truncate(k);
        Ok(merged)
    }

    pub fn len_for(&self, noun_type: NounType) -> usize {
        self.graphs.get(&noun_type).map(|g| g.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.graphs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_type_gets_its_own_isolated_graph() {
        let index = TypeAwareHnsw::new(HnswParams::default(), crate::config::DistanceMetric::Cosine);
        index.insert(NounType::Person, "p1", vec![1.0, 0.0]).unwrap();
        index.insert(NounType::Document, "d1", vec![1.0, 0.0]).unwrap();

        let person_hits = index
            .search(Some(&[NounType::Person]), &[1.0, 0.0], 5, 50, None)
            .unwrap();
        assert_eq!(person_hits.len(), 1);
        assert_eq!(person_hits[0].id, "p1");
    }

    #[test]
    fn unscoped_search_merges_all_active_types() {
        let index = TypeAwareHnsw::new(HnswParams::default(), crate::config::DistanceMetric::Cosine);
        index.insert(NounType::Person, "p1", vec![1.0, 0.0]).unwrap();
        index.insert(NounType::Document, "d1", vec![0.0, 1.0]).unwrap();

        let hits = index.search(None, &[1.0, 0.0], 5, 50, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "p1");
    }

    #[test]
    fn active_types_only_lists_populated_graphs() {
        let index = TypeAwareHnsw::new(HnswParams::default(), crate::config::DistanceMetric::Cosine);
        assert!(index.active_types().is_empty());
        index.insert(NounType::Task, "t1", vec![1.0]).unwrap();
        assert_eq!(index.active_types(), vec![NounType::Task]);
    }

    #[test]
    fn remove_on_unpopulated_type_is_a_no_op() {
        let index = TypeAwareHnsw::new(HnswParams::default(), crate::config::DistanceMetric::Cosine);
        index.remove(NounType::Event, "missing");
    }
}
