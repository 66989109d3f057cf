//! In-memory [`CorpusStore`] implementation for tests and embedding.
//!
//! Items live in a `BTreeMap` behind `std::sync::RwLock`. Vector search
//! is brute-force cosine distance over every stored embedding; keyword
//! search is TF-IDF over the shared tokenizer. The store can be switched
//! to an unavailable state to exercise backend-failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{RetrievalError, RetrievalResult};
use crate::models::{CorpusItem, ItemId, SearchFilter, SectionReference};
use crate::text::tokenize;

use super::{CorpusStore, LexicalCandidate, VectorCandidate};

#[derive(Default)]
struct Inner {
    items: BTreeMap<ItemId, CorpusItem>,
    /// Term frequencies per item, built from number, title and text.
    terms: HashMap<ItemId, HashMap<String, u32>>,
    /// Number of items containing each term.
    doc_freq: HashMap<String, u32>,
    references: Vec<SectionReference>,
}

/// In-memory corpus for tests and small embedded deployments.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item and re-index its terms.
    pub fn insert_item(&self, item: CorpusItem) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.items.contains_key(&item.id) {
            remove_terms(&mut inner, item.id);
        }

        let mut tf: HashMap<String, u32> = HashMap::new();
        let indexed = format!("{} {} {}", item.number, item.title, item.text);
        for term in tokenize(&indexed) {
            *tf.entry(term).or_default() += 1;
        }
        for term in tf.keys() {
            *inner.doc_freq.entry(term.clone()).or_default() += 1;
        }
        inner.terms.insert(item.id, tf);
        inner.items.insert(item.id, item);
    }

    pub fn insert_reference(&self, reference: SectionReference) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.references.push(reference);
    }

    /// Simulate a backend outage: every query fails with `IndexUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RetrievalResult<RwLockReadGuard<'_, Inner>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RetrievalError::index("in-memory store marked unavailable"));
        }
        Ok(self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }
}

fn remove_terms(inner: &mut Inner, id: ItemId) {
    if let Some(old) = inner.terms.remove(&id) {
        for term in old.keys() {
            if let Some(df) = inner.doc_freq.get_mut(term) {
                *df = df.saturating_sub(1);
            }
        }
    }
}

#[async_trait]
impl CorpusStore for InMemoryStore {
    async fn find_nearest_by_embedding(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> RetrievalResult<Vec<VectorCandidate>> {
        let inner = self.read()?;
        let mut candidates: Vec<VectorCandidate> = inner
            .items
            .values()
            .filter(|item| filter.matches(item))
            .filter_map(|item| {
                item.embedding.as_ref().map(|emb| VectorCandidate {
                    item_id: item.id,
                    kind: item.kind,
                    distance: cosine_distance(query_vec, emb),
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.item_id.cmp(&b.item_id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn find_by_lexical_query(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> RetrievalResult<Vec<LexicalCandidate>> {
        let inner = self.read()?;
        let mut query_terms = tokenize(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let n = inner.items.len() as f64;
        let mut candidates: Vec<LexicalCandidate> = inner
            .items
            .values()
            .filter(|item| filter.matches(item))
            .filter_map(|item| {
                let tf = inner.terms.get(&item.id)?;
                let relevance: f64 = query_terms
                    .iter()
                    .filter_map(|term| {
                        let count = *tf.get(term)? as f64;
                        let df = inner.doc_freq.get(term).copied().unwrap_or(1).max(1) as f64;
                        Some(count * (1.0 + n / df).ln())
                    })
                    .sum();
                (relevance > 0.0).then(|| LexicalCandidate {
                    item_id: item.id,
                    kind: item.kind,
                    relevance,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.item_id.cmp(&b.item_id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn get_item(&self, id: ItemId) -> RetrievalResult<Option<CorpusItem>> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn get_children(&self, section_id: ItemId) -> RetrievalResult<Vec<CorpusItem>> {
        let inner = self.read()?;
        let mut children: Vec<CorpusItem> = inner
            .items
            .values()
            .filter(|item| item.is_section() && item.parent_id == Some(section_id))
            .cloned()
            .collect();
        children.sort_by_key(|c| (c.position, c.id));
        Ok(children)
    }

    async fn get_references(&self, item_id: ItemId) -> RetrievalResult<Vec<SectionReference>> {
        let inner = self.read()?;
        Ok(inner
            .references
            .iter()
            .filter(|r| r.source_id == item_id || r.target_id == Some(item_id))
            .cloned()
            .collect())
    }

    async fn max_depth(&self) -> RetrievalResult<u32> {
        let inner = self.read()?;
        Ok(inner
            .items
            .values()
            .filter(|item| item.is_section())
            .map(|item| item.depth)
            .max()
            .unwrap_or(0))
    }

    async fn find_section(
        &self,
        number: &str,
        chapter_id: Option<i64>,
    ) -> RetrievalResult<Option<CorpusItem>> {
        let inner = self.read()?;
        Ok(inner
            .items
            .values()
            .find(|item| {
                item.is_section()
                    && item.number == number
                    && chapter_id.map_or(true, |c| item.chapter_id == Some(c))
            })
            .cloned())
    }
}
