//! Read-only persistence contract for the corpus.
//!
//! The [`CorpusStore`] trait is the only way the retrieval core touches
//! storage, enabling pluggable backends (SQLite in the app crate,
//! [`memory::InMemoryStore`] for tests and embedding).
//!
//! Implementations must be `Send + Sync` to work with async runtimes and
//! must map backend failures to
//! [`RetrievalError::IndexUnavailable`](crate::error::RetrievalError::IndexUnavailable).

pub mod memory;

use async_trait::async_trait;

use crate::error::RetrievalResult;
use crate::models::{CorpusItem, ItemId, ItemKind, SearchFilter, SectionReference};

/// A candidate returned by the similarity index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorCandidate {
    pub item_id: ItemId,
    pub kind: ItemKind,
    /// Cosine distance to the query vector (lower = closer).
    pub distance: f64,
}

/// A candidate returned by the full-text index.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalCandidate {
    pub item_id: ItemId,
    pub kind: ItemKind,
    /// Lexical relevance (higher = better).
    pub relevance: f64,
}

/// Abstract, read-only corpus backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_nearest_by_embedding`](CorpusStore::find_nearest_by_embedding) | Cosine-distance nearest neighbours |
/// | [`find_by_lexical_query`](CorpusStore::find_by_lexical_query) | Full-text relevance search |
/// | [`get_item`](CorpusStore::get_item) | Fetch one item by id |
/// | [`get_children`](CorpusStore::get_children) | Immediate child sections, in document order |
/// | [`get_references`](CorpusStore::get_references) | References where the item is source or target |
/// | [`max_depth`](CorpusStore::max_depth) | Deepest observed section depth |
/// | [`find_section`](CorpusStore::find_section) | Look a section up by its number |
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Nearest items to `query_vec` by cosine distance, ascending, at most `limit`.
    ///
    /// Items without an embedding are never returned.
    async fn find_nearest_by_embedding(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> RetrievalResult<Vec<VectorCandidate>>;

    /// Highest-relevance items for `query`, descending, at most `limit`.
    ///
    /// `query` is tokenized with [`crate::text::tokenize`].
    async fn find_by_lexical_query(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> RetrievalResult<Vec<LexicalCandidate>>;

    async fn get_item(&self, id: ItemId) -> RetrievalResult<Option<CorpusItem>>;

    /// Immediate children of a section, ordered by sibling position.
    async fn get_children(&self, section_id: ItemId) -> RetrievalResult<Vec<CorpusItem>>;

    /// All references where `item_id` is the source or the target.
    async fn get_references(&self, item_id: ItemId) -> RetrievalResult<Vec<SectionReference>>;

    /// The maximum section depth present in the corpus.
    async fn max_depth(&self) -> RetrievalResult<u32>;

    /// First section (lowest id) whose number equals `number`, optionally
    /// restricted to one chapter.
    async fn find_section(
        &self,
        number: &str,
        chapter_id: Option<i64>,
    ) -> RetrievalResult<Option<CorpusItem>>;
}
