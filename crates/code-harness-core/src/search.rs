//! Vector, keyword and hybrid retrieval with Reciprocal Rank Fusion.
//!
//! The search functions operate entirely through the [`CorpusStore`]
//! trait. The caller supplies the embedding client and [`SearchParams`].
//!
//! # Hybrid Scoring Algorithm
//!
//! 1. Embed the query and fetch `candidate_k_vector` vector candidates
//!    (ascending cosine distance).
//! 2. Concurrently fetch `candidate_k_keyword` keyword candidates
//!    (descending lexical relevance).
//! 3. Fuse: `score(d) = Σ 1 / (k + rank_i(d))` over every list containing
//!    `d`, with 1-based ranks. Absent items contribute nothing.
//! 4. Sort by fused score (desc), item id (asc). Truncate to `limit`.
//!
//! RRF only looks at rank positions, so the incomparable scales of cosine
//! distance and lexical relevance never need normalizing. In vector mode
//! fusion is bypassed and the vector ordering is returned unmodified.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::embedding::EmbeddingClient;
use crate::error::{RetrievalError, RetrievalResult};
use crate::models::{HitSource, ItemId, ItemKind, SearchFilter, SearchHit};
use crate::store::CorpusStore;
use crate::text::tokenize;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Vector + keyword, merged by RRF.
    #[default]
    Hybrid,
    /// Vector similarity only; fusion bypassed.
    Vector,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Hybrid => "hybrid",
            SearchType::Vector => "vector",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(SearchType::Hybrid),
            "vector" => Ok(SearchType::Vector),
            other => Err(RetrievalError::invalid(format!(
                "unknown search type: {}. Use hybrid or vector.",
                other
            ))),
        }
    }
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// RRF constant `k`.
    pub rrf_k: u32,
    /// Number of vector candidates to fetch.
    pub candidate_k_vector: usize,
    /// Number of keyword candidates to fetch.
    pub candidate_k_keyword: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            candidate_k_vector: 20,
            candidate_k_keyword: 40,
        }
    }
}

/// Raw and merged output of one retrieval pass.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub vector_hits: Vec<SearchHit>,
    pub keyword_hits: Vec<SearchHit>,
    /// Final ordering: fused in hybrid mode, the vector list in vector mode.
    pub hits: Vec<SearchHit>,
}

/// Top-`limit` items nearest to `query_vec`, ascending cosine distance.
///
/// Ties are broken by lower item id. `score` on the returned hits is the
/// cosine similarity (`1 - distance`).
pub async fn search_vector<S: CorpusStore + ?Sized>(
    store: &S,
    query_vec: &[f32],
    limit: usize,
    filter: &SearchFilter,
) -> RetrievalResult<Vec<SearchHit>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut candidates = store
        .find_nearest_by_embedding(query_vec, limit, filter)
        .await?;
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.item_id.cmp(&b.item_id))
    });
    candidates.truncate(limit);

    Ok(candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| SearchHit {
            item_id: c.item_id,
            kind: c.kind,
            score: 1.0 - c.distance,
            rank: i + 1,
            source: HitSource::Vector,
        })
        .collect())
}

/// Top-`limit` items by lexical relevance, descending.
///
/// Empty or all-stopword queries return an empty list without touching
/// the index. Ties are broken by lower item id.
pub async fn search_keyword<S: CorpusStore + ?Sized>(
    store: &S,
    query: &str,
    limit: usize,
    filter: &SearchFilter,
) -> RetrievalResult<Vec<SearchHit>> {
    if limit == 0 || tokenize(query).is_empty() {
        return Ok(Vec::new());
    }
    let mut candidates = store.find_by_lexical_query(query, limit, filter).await?;
    candidates.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.item_id.cmp(&b.item_id))
    });
    candidates.truncate(limit);

    Ok(candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| SearchHit {
            item_id: c.item_id,
            kind: c.kind,
            score: c.relevance,
            rank: i + 1,
            source: HitSource::Keyword,
        })
        .collect())
}

/// Merge two ranked lists with Reciprocal Rank Fusion.
///
/// Each item's fused score is `Σ 1/(k + rank)` over the lists it appears
/// in, where rank is the 1-based position in that list. Output is sorted
/// by fused score descending, then item id ascending, and re-ranked from 1.
pub fn fuse(vector_hits: &[SearchHit], keyword_hits: &[SearchHit], k: u32) -> Vec<SearchHit> {
    let mut scores: HashMap<ItemId, (ItemKind, f64)> = HashMap::new();

    for list in [vector_hits, keyword_hits] {
        for (position, hit) in list.iter().enumerate() {
            let rrf = 1.0 / (k as f64 + (position + 1) as f64);
            scores.entry(hit.item_id).or_insert((hit.kind, 0.0)).1 += rrf;
        }
    }

    let mut fused: Vec<SearchHit> = scores
        .into_iter()
        .map(|(item_id, (kind, score))| SearchHit {
            item_id,
            kind,
            score,
            rank: 0,
            source: HitSource::Fused,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.item_id.cmp(&b.item_id))
    });
    for (i, hit) in fused.iter_mut().enumerate() {
        hit.rank = i + 1;
    }
    fused
}

/// Run one retrieval pass and keep the raw lists for reporting.
///
/// In hybrid mode the vector and keyword searches are issued concurrently
/// and joined before fusion. An empty or whitespace query returns an empty
/// outcome without embedding anything.
pub async fn retrieve<S: CorpusStore + ?Sized>(
    store: &S,
    embedder: &EmbeddingClient,
    query: &str,
    search_type: SearchType,
    limit: usize,
    filter: &SearchFilter,
    params: &SearchParams,
) -> RetrievalResult<RetrievalOutcome> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(RetrievalOutcome::default());
    }

    let query_vec = embedder.embed(query).await?;

    let outcome = match search_type {
        SearchType::Vector => {
            let vector_hits = search_vector(store, &query_vec, limit, filter).await?;
            RetrievalOutcome {
                hits: vector_hits.clone(),
                vector_hits,
                keyword_hits: Vec::new(),
            }
        }
        SearchType::Hybrid => {
            let (vector_hits, keyword_hits) = futures::join!(
                search_vector(store, &query_vec, params.candidate_k_vector.max(limit), filter),
                search_keyword(store, query, params.candidate_k_keyword.max(limit), filter),
            );
            let vector_hits = vector_hits?;
            let keyword_hits = keyword_hits?;
            let mut hits = fuse(&vector_hits, &keyword_hits, params.rrf_k);
            hits.truncate(limit);
            RetrievalOutcome {
                vector_hits,
                keyword_hits,
                hits,
            }
        }
    };

    debug!(
        strategy = %search_type,
        vector = outcome.vector_hits.len(),
        keyword = outcome.keyword_hits.len(),
        hits = outcome.hits.len(),
        "retrieval complete"
    );
    Ok(outcome)
}

/// Retrieval-only path: the ordered hit list, no generation.
///
/// A zero `limit` is rejected with `InvalidQuery`; an empty query is not
/// an error and yields no hits.
pub async fn run_search<S: CorpusStore + ?Sized>(
    store: &S,
    embedder: &EmbeddingClient,
    query: &str,
    search_type: SearchType,
    limit: usize,
    params: &SearchParams,
) -> RetrievalResult<Vec<SearchHit>> {
    if limit == 0 {
        return Err(RetrievalError::invalid("limit must be at least 1"));
    }
    let outcome = retrieve(
        store,
        embedder,
        query,
        search_type,
        limit,
        &SearchFilter::default(),
        params,
    )
    .await?;
    Ok(outcome.hits)
}
