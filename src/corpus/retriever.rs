//! Question Retrieval
//!
//! Nearest-neighbour search over question segments with a subject filter
//! applied after ranking.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::QuestionSegment;
use super::store::{StoreError, VectorStore};
use crate::documents::embeddings::{check_dimension, Embedder, Embedding};
use crate::documents::subject::SubjectFilter;

/// How the candidate window grows when the subject filter rejects hits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalWindow {
    /// Start at `min(2k, n)` and double until `k` survive or the corpus is exhausted
    #[default]
    Widening,
    /// Single `min(2k, n)` window; may return fewer than `k`
    Fixed,
}

/// A retrieved segment with its squared L2 distance to the query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredSegment {
    pub segment: QuestionSegment,
    pub distance: f32,
}

/// First `k` segments matching `filter`, in ingestion order.
pub fn filter_by_subject(questions: &[QuestionSegment], filter: SubjectFilter, k: usize) -> Vec<QuestionSegment> {
    questions
        .iter()
        .filter(|q| filter.matches(q.subject))
        .take(k)
        .cloned()
        .collect()
}

/// Query vector for `query`, or `None` for a blank query.
pub fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Option<Embedding>, StoreError> {
    if query.trim().is_empty() {
        return Ok(None);
    }
    let vector = embedder.embed(query)?;
    check_dimension(&vector)?;
    Ok(Some(vector))
}

/// Up to `k` segments nearest to `query_vec` that pass `filter`, ascending
/// distance. Without a query vector this is `filter_by_subject` with
/// distance 0.
pub fn rank(
    store: &VectorStore<QuestionSegment>,
    query_vec: Option<&[f32]>,
    filter: SubjectFilter,
    k: usize,
    window: RetrievalWindow,
) -> Result<Vec<ScoredSegment>, StoreError> {
    if k == 0 || store.is_empty() {
        return Ok(Vec::new());
    }

    let Some(query_vec) = query_vec else {
        return Ok(filter_by_subject(store.records(), filter, k)
            .into_iter()
            .map(|segment| ScoredSegment { segment, distance: 0.0 })
            .collect());
    };

    let total = store.len();
    let mut candidates = k.saturating_mul(2).min(total);

    loop {
        let results: Vec<ScoredSegment> = store
            .search(query_vec, candidates)?
            .into_iter()
            .filter(|(_, q)| filter.matches(q.subject))
            .take(k)
            .map(|(hit, q)| ScoredSegment {
                segment: q.clone(),
                distance: hit.distance,
            })
            .collect();

        let exhausted = candidates >= total;
        if results.len() >= k || exhausted || window == RetrievalWindow::Fixed {
            debug!(
                candidates,
                returned = results.len(),
                filter = %filter,
                "Retrieved question segments"
            );
            return Ok(results);
        }

        candidates = candidates.saturating_mul(2).min(total);
    }
}

/// Up to `k` segments nearest to `query` that pass `filter`, ascending distance.
///
/// A blank query falls back to `filter_by_subject` with distance 0.
pub fn retrieve_scored(
    store: &VectorStore<QuestionSegment>,
    embedder: &dyn Embedder,
    query: &str,
    filter: SubjectFilter,
    k: usize,
    window: RetrievalWindow,
) -> Result<Vec<ScoredSegment>, StoreError> {
    if k == 0 || store.is_empty() {
        return Ok(Vec::new());
    }
    let query_vec = embed_query(embedder, query)?;
    rank(store, query_vec.as_deref(), filter, k, window)
}

/// Like [`retrieve_scored`] without distances.
pub fn retrieve(
    store: &VectorStore<QuestionSegment>,
    embedder: &dyn Embedder,
    query: &str,
    filter: SubjectFilter,
    k: usize,
    window: RetrievalWindow,
) -> Result<Vec<QuestionSegment>, StoreError> {
    Ok(retrieve_scored(store, embedder, query, filter, k, window)?
        .into_iter()
        .map(|s| s.segment)
        .collect())
}
