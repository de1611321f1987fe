//! Hybrid Search (C7): merge vector, document, graph, and fact results for
//! one natural-language query into a single ranked, de-duplicated list.
//!
//! Unlike the teacher's weighted-fusion `HybridSearcher` (max-based scoring
//! plus agreement/exact-match/type bonuses across `WeightPreset`s), this
//! merge is source-precedence based: vector > document > graph > fact,
//! ties broken by score then id (spec.md §4.7). The simpler rule trades
//! the teacher's tunable weighting for determinism across backends that
//! expose different similarity scales.

use std::cmp::Ordering;

use remembrances_storage::{MatchSource, MemoryStore, SearchHit};

use crate::embeddings::EmbedderFactory;
use crate::error::Result;

/// Default number of hits returned when the caller doesn't specify a
/// limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Per-branch fan-out count before the merge+limit step trims the list.
/// Over-fetching a little per branch means a dominant source (e.g. many
/// near-duplicate vector hits) doesn't starve the others out before
/// dedup, while still bounding worst-case branch cost.
const BRANCH_FANOUT: usize = 25;

/// Orchestrates the hybrid query algorithm against one [`MemoryStore`],
/// embedding queries through an [`EmbedderFactory`]-resolved provider.
pub struct HybridSearcher {
    store: MemoryStore,
}

impl HybridSearcher {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Run the full hybrid query algorithm (spec.md §4.7):
    /// 1. Embed the query once.
    /// 2. Fan out to vector, document, fact, and (if the query resolves to
    ///    an entity) graph branches in parallel.
    /// 3. Merge by source precedence, tie-broken by score then id.
    /// 4. De-duplicate by canonical id, keeping the highest-scoring copy.
    /// 5. Truncate to `limit`.
    ///
    /// A single branch failing yields an empty list for that branch; the
    /// others still run. The call fails only if embedding the query
    /// fails.
    pub async fn search(
        &self,
        embedders: &EmbedderFactory,
        query: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let provider = embedders.default();
        let embedding = provider.embed_query(query).await?;

        let fanout = BRANCH_FANOUT.max(limit);

        let (vector_hits, document_hits, fact_hits, graph_hits) = tokio::join!(
            self.vector_branch(&embedding, user_id, fanout),
            self.document_branch(&embedding, user_id, fanout),
            self.fact_branch(query, user_id, fanout),
            self.graph_branch(query, user_id, fanout),
        );

        let mut merged = Vec::new();
        merged.extend(vector_hits);
        merged.extend(document_hits);
        merged.extend(graph_hits);
        merged.extend(fact_hits);

        Ok(merge_rank_dedupe(merged, limit))
    }

    async fn vector_branch(&self, embedding: &[f32], user_id: Option<&str>, limit: usize) -> Vec<SearchHit> {
        self.store
            .search_vectors(embedding, user_id, limit)
            .await
            .unwrap_or_default()
    }

    async fn document_branch(&self, embedding: &[f32], user_id: Option<&str>, limit: usize) -> Vec<SearchHit> {
        self.store
            .search_documents(embedding, user_id, limit)
            .await
            .unwrap_or_default()
    }

    async fn fact_branch(&self, query: &str, user_id: Option<&str>, limit: usize) -> Vec<SearchHit> {
        self.store
            .search_facts(query, user_id, limit)
            .await
            .unwrap_or_default()
    }

    /// If `query` contains an entity name that resolves (tried as the
    /// full query first, then word-by-word), return its 1-hop
    /// neighborhood tagged as graph hits. Resolution failure (no match,
    /// or a storage error) is not a search failure — it just yields no
    /// graph hits.
    async fn graph_branch(&self, query: &str, _user_id: Option<&str>, limit: usize) -> Vec<SearchHit> {
        let candidates = std::iter::once(query.trim()).chain(query.split_whitespace());

        for candidate in candidates {
            if candidate.is_empty() {
                continue;
            }
            if let Ok((nodes, _edges)) = self.store.traverse_graph(candidate, None, 1).await {
                if nodes.is_empty() {
                    continue;
                }
                return nodes
                    .into_iter()
                    .take(limit)
                    .map(|entity| SearchHit {
                        id: entity.id.clone(),
                        source: MatchSource::Graph,
                        content: entity.name.clone(),
                        score: 0.0,
                        metadata: serde_json::json!({ "labels": entity.labels }),
                    })
                    .collect();
            }
        }
        Vec::new()
    }
}

/// Source precedence order (lower sorts first): vector > document > graph
/// > fact.
fn precedence(source: &MatchSource) -> u8 {
    match source {
        MatchSource::Vector => 0,
        MatchSource::Document => 1,
        MatchSource::Graph => 2,
        MatchSource::Fact => 3,
    }
}

/// Merge hits from every branch: sort by source precedence then score
/// (descending) then id (ascending, for determinism), de-duplicate by id
/// keeping the first (highest-precedence, highest-scoring) copy, then
/// truncate to `limit`.
fn merge_rank_dedupe(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        precedence(&a.source)
            .cmp(&precedence(&b.source))
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut seen = std::collections::HashSet::new();
    hits.retain(|hit| seen.insert(hit.id.clone()));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, source: MatchSource, score: f32) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            source,
            content: id.to_string(),
            score,
            metadata: json!({}),
        }
    }

    #[test]
    fn vector_outranks_document_and_fact_regardless_of_score() {
        let hits = vec![
            hit("fact:1", MatchSource::Fact, 0.99),
            hit("vec:1", MatchSource::Vector, 0.1),
        ];
        let merged = merge_rank_dedupe(hits, 10);
        assert_eq!(merged[0].id, "vec:1");
        assert_eq!(merged[1].id, "fact:1");
    }

    #[test]
    fn dedupes_by_id_keeping_highest_precedence_copy() {
        let hits = vec![
            hit("x:1", MatchSource::Fact, 0.9),
            hit("x:1", MatchSource::Vector, 0.2),
        ];
        let merged = merge_rank_dedupe(hits, 10);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, MatchSource::Vector);
    }

    #[test]
    fn truncates_to_limit() {
        let hits = (0..20)
            .map(|i| hit(&format!("vec:{i}"), MatchSource::Vector, i as f32))
            .collect();
        let merged = merge_rank_dedupe(hits, 5);
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn ties_break_by_score_then_id() {
        let hits = vec![
            hit("vec:b", MatchSource::Vector, 0.5),
            hit("vec:a", MatchSource::Vector, 0.5),
        ];
        let merged = merge_rank_dedupe(hits, 10);
        assert_eq!(merged[0].id, "vec:a");
    }
}
