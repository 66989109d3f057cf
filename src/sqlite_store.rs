//! SQLite-backed [`CorpusStore`] implementation.
//!
//! Reads the corpus tables written by the ingestion pipeline:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `corpus_items` | sections, tables and figures, with an optional f32 BLOB embedding |
//! | `corpus_fts` | FTS5 index over item number, title and text, keyed by `item_id` |
//! | `section_references` | cross-reference edges; `target_id` is NULL when unresolved |
//!
//! FTS5's `unicode61` tokenizer splits `101.1` into `101` and `1`, while
//! the shared tokenizer keeps dotted numbers whole. MATCH is therefore
//! only a candidate filter: each candidate is re-checked against
//! [`tokenize`] over its number, title and text, so `101` never matches
//! `101.1` or `Table 101.2`.
//!
//! Every `sqlx` failure is reported as
//! [`RetrievalError::IndexUnavailable`]; malformed rows (unknown kind,
//! negative depth) as [`RetrievalError::CorpusIntegrity`].

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;

use code_harness_core::embedding::{blob_to_vec, cosine_distance};
use code_harness_core::error::{RetrievalError, RetrievalResult};
use code_harness_core::models::{
    CorpusItem, ItemId, ItemKind, ReferenceType, SearchFilter, SectionReference, Span,
};
use code_harness_core::store::{CorpusStore, LexicalCandidate, VectorCandidate};
use code_harness_core::text::tokenize;

const ITEM_COLUMNS: &str =
    "id, kind, title, text, number, chapter_id, parent_id, depth, position, page, embedding";

/// SQLite implementation of the [`CorpusStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn index_err(e: sqlx::Error) -> RetrievalError {
    RetrievalError::index(e.to_string())
}

/// Build an FTS5 MATCH expression from the shared tokenizer.
///
/// Terms are double-quoted and OR-ed, so punctuation in a natural-language
/// question never reaches the FTS5 query parser. Returns `None` when no
/// searchable terms remain.
pub fn fts_query(text: &str) -> Option<String> {
    let terms = query_terms(text);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Distinct query terms in first-seen order.
fn query_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|term| seen.insert(term.clone()))
        .collect()
}

/// Whether any of `fields`, tokenized like the query, contains a term.
fn fields_match(terms: &HashSet<String>, fields: &[&str]) -> bool {
    fields
        .iter()
        .flat_map(|field| tokenize(field))
        .any(|token| terms.contains(&token))
}

/// SQL fragment and bind values restricting `i.kind` / `i.chapter_id`.
fn filter_clause(filter: &SearchFilter) -> (String, Vec<String>, Option<i64>) {
    let mut clause = String::new();
    let kinds: Vec<String> = filter.kinds.iter().map(|k| k.as_str().to_string()).collect();
    if !kinds.is_empty() {
        let placeholders = vec!["?"; kinds.len()].join(", ");
        clause.push_str(&format!(" AND i.kind IN ({})", placeholders));
    }
    if filter.chapter_id.is_some() {
        clause.push_str(" AND i.chapter_id = ?");
    }
    (clause, kinds, filter.chapter_id)
}

fn item_from_row(row: &SqliteRow) -> RetrievalResult<CorpusItem> {
    let kind: String = row.try_get("kind").map_err(index_err)?;
    let depth: i64 = row.try_get("depth").map_err(index_err)?;
    let id: ItemId = row.try_get("id").map_err(index_err)?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding").map_err(index_err)?;

    Ok(CorpusItem {
        id,
        kind: ItemKind::from_str(&kind)?,
        title: row.try_get::<Option<String>, _>("title").map_err(index_err)?.unwrap_or_default(),
        text: row.try_get::<Option<String>, _>("text").map_err(index_err)?.unwrap_or_default(),
        number: row.try_get("number").map_err(index_err)?,
        chapter_id: row.try_get("chapter_id").map_err(index_err)?,
        parent_id: row.try_get("parent_id").map_err(index_err)?,
        depth: u32::try_from(depth).map_err(|_| {
            RetrievalError::integrity(format!("item {} has negative depth {}", id, depth))
        })?,
        position: row.try_get("position").map_err(index_err)?,
        page: row.try_get("page").map_err(index_err)?,
        embedding: embedding.filter(|b| !b.is_empty()).map(|b| blob_to_vec(&b)),
    })
}

fn reference_from_row(row: &SqliteRow) -> RetrievalResult<SectionReference> {
    let reference_type: String = row.try_get("reference_type").map_err(index_err)?;
    let start: Option<i64> = row.try_get("span_start").map_err(index_err)?;
    let end: Option<i64> = row.try_get("span_end").map_err(index_err)?;
    let span = match (start, end) {
        (Some(start), Some(end)) if start >= 0 && end >= start => Some(Span {
            start: start as usize,
            end: end as usize,
        }),
        _ => None,
    };

    Ok(SectionReference {
        source_id: row.try_get("source_id").map_err(index_err)?,
        target_id: row.try_get("target_id").map_err(index_err)?,
        reference_type: ReferenceType::from_str(&reference_type)?,
        reference_text: row.try_get("reference_text").map_err(index_err)?,
        span,
    })
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn find_nearest_by_embedding(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> RetrievalResult<Vec<VectorCandidate>> {
        let (clause, kinds, chapter) = filter_clause(filter);
        let sql = format!(
            "SELECT i.id, i.kind, i.embedding FROM corpus_items i \
             WHERE i.embedding IS NOT NULL{}",
            clause
        );
        let mut query = sqlx::query(&sql);
        for kind in &kinds {
            query = query.bind(kind);
        }
        if let Some(chapter) = chapter {
            query = query.bind(chapter);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(index_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding").map_err(index_err)?;
            if blob.is_empty() {
                continue;
            }
            let kind: String = row.try_get("kind").map_err(index_err)?;
            candidates.push(VectorCandidate {
                item_id: row.try_get("id").map_err(index_err)?,
                kind: ItemKind::from_str(&kind)?,
                distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
            });
        }

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
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let terms: HashSet<String> = query_terms(query).into_iter().collect();
        let (clause, kinds, chapter) = filter_clause(filter);
        let sql = format!(
            "SELECT i.id, i.kind, i.number, i.title, i.text, bm25(corpus_fts) AS score \
             FROM corpus_fts JOIN corpus_items i ON i.id = corpus_fts.item_id \
             WHERE corpus_fts MATCH ?{} \
             ORDER BY score ASC, i.id ASC",
            clause
        );
        let mut q = sqlx::query(&sql).bind(match_expr);
        for kind in &kinds {
            q = q.bind(kind);
        }
        if let Some(chapter) = chapter {
            q = q.bind(chapter);
        }

        let mut rows = q.fetch(&self.pool);
        let mut candidates = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(index_err)? {
            let number: String = row.try_get("number").map_err(index_err)?;
            let title: Option<String> = row.try_get("title").map_err(index_err)?;
            let text: Option<String> = row.try_get("text").map_err(index_err)?;
            let fields = [
                number.as_str(),
                title.as_deref().unwrap_or(""),
                text.as_deref().unwrap_or(""),
            ];
            if !fields_match(&terms, &fields) {
                continue;
            }

            let kind: String = row.try_get("kind").map_err(index_err)?;
            let score: f64 = row.try_get("score").map_err(index_err)?;
            candidates.push(LexicalCandidate {
                item_id: row.try_get("id").map_err(index_err)?,
                kind: ItemKind::from_str(&kind)?,
                // bm25() is lower-is-better
                relevance: -score,
            });
            if candidates.len() == limit {
                break;
            }
        }
        Ok(candidates)
    }

    async fn get_item(&self, id: ItemId) -> RetrievalResult<Option<CorpusItem>> {
        let sql = format!("SELECT {} FROM corpus_items WHERE id = ?", ITEM_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(index_err)?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_children(&self, section_id: ItemId) -> RetrievalResult<Vec<CorpusItem>> {
        let sql = format!(
            "SELECT {} FROM corpus_items \
             WHERE parent_id = ? AND kind = 'section' \
             ORDER BY position ASC, id ASC",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(section_id)
            .fetch_all(&self.pool)
            .await
            .map_err(index_err)?;
        rows.iter().map(item_from_row).collect()
    }

    async fn get_references(&self, item_id: ItemId) -> RetrievalResult<Vec<SectionReference>> {
        let rows = sqlx::query(
            r#"
            SELECT source_id, target_id, reference_type, reference_text, span_start, span_end
            FROM section_references
            WHERE source_id = ? OR target_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(item_id)
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(index_err)?;
        rows.iter().map(reference_from_row).collect()
    }

    async fn max_depth(&self) -> RetrievalResult<u32> {
        let depth: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(depth), 0) FROM corpus_items WHERE kind = 'section'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(index_err)?;
        u32::try_from(depth).map_err(|_| {
            RetrievalError::integrity(format!("corpus reports negative maximum depth {}", depth))
        })
    }

    async fn find_section(
        &self,
        number: &str,
        chapter_id: Option<i64>,
    ) -> RetrievalResult<Option<CorpusItem>> {
        let sql = format!(
            "SELECT {} FROM corpus_items \
             WHERE kind = 'section' AND number = ? AND (? IS NULL OR chapter_id = ?) \
             ORDER BY id ASC LIMIT 1",
            ITEM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(number)
            .bind(chapter_id)
            .bind(chapter_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(index_err)?;
        row.as_ref().map(item_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(
            fts_query("What does section 101.1 cover?").as_deref(),
            Some("\"section\" OR \"101.1\"")
        );
    }

    #[test]
    fn test_fts_query_dedups_repeated_terms() {
        assert_eq!(
            fts_query("egress stairs egress").as_deref(),
            Some("\"egress\" OR \"stairs\"")
        );
    }

    #[test]
    fn test_fields_match_keeps_dotted_numbers_whole() {
        let terms: HashSet<String> = query_terms("section 101").into_iter().collect();
        assert!(fields_match(&terms, &["101", "Scope", ""]));
        assert!(!fields_match(&terms, &["101.1", "Title", "known as the code"]));
        assert!(!fields_match(&terms, &["Table 101.2", "Occupant load", "factors"]));
        assert!(fields_match(&terms, &["102", "", "See Section 101."]));
    }

    #[test]
    fn test_fts_query_all_stopwords() {
        assert_eq!(fts_query("what is the"), None);
        assert_eq!(fts_query("   "), None);
    }

    #[test]
    fn test_filter_clause_binds() {
        let filter = SearchFilter {
            kinds: vec![ItemKind::Table, ItemKind::Figure],
            chapter_id: Some(3),
        };
        let (clause, kinds, chapter) = filter_clause(&filter);
        assert_eq!(clause, " AND i.kind IN (?, ?) AND i.chapter_id = ?");
        assert_eq!(kinds, vec!["table", "figure"]);
        assert_eq!(chapter, Some(3));
        assert_eq!(filter_clause(&SearchFilter::default()).0, "");
    }
}
