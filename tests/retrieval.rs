//! Library-level tests against a seeded SQLite corpus.

mod common;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

use code_harness::db;
use code_harness::harness::Harness;
use code_harness::query::answer_question;
use code_harness::search::{search_corpus, SearchType};
use code_harness::section::get_section;
use code_harness::sqlite_store::SqliteStore;
use code_harness_core::error::RetrievalError;
use code_harness_core::models::{HitSource, ItemKind, SearchFilter};
use code_harness_core::search::{run_search, SearchParams};
use code_harness_core::store::CorpusStore;
use code_harness_core::workflow::{QueryOptions, QueryStatus};

use common::*;

fn retrieval_kind(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<RetrievalError>().map(|e| e.kind())
}

// ============ SqliteStore ============

#[tokio::test]
async fn test_store_reads_items_and_hierarchy() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    let table = store.get_item(4).await.unwrap().unwrap();
    assert_eq!(table.kind, ItemKind::Table);
    assert_eq!(table.parent_id, Some(1));
    assert_eq!(table.page, None);
    assert_eq!(table.embedding.as_ref().map(|e| e.len()), Some(DIMS));

    assert!(store.get_item(99).await.unwrap().is_none());

    // Tables are not child sections.
    let children = store.get_children(1).await.unwrap();
    let ids: Vec<i64> = children.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![2]);

    assert_eq!(store.max_depth().await.unwrap(), 1);
}

#[tokio::test]
async fn test_store_find_section_by_chapter() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    assert_eq!(store.find_section("201", None).await.unwrap().map(|s| s.id), Some(5));
    assert_eq!(store.find_section("201", Some(2)).await.unwrap().map(|s| s.id), Some(5));
    assert!(store.find_section("201", Some(1)).await.unwrap().is_none());
    // Tables are never returned by section lookup.
    assert!(store.find_section("Table 101.2", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_lexical_search_with_filter() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    let all = store
        .find_by_lexical_query("occupant load", 10, &SearchFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].item_id, 4);
    assert!(all[0].relevance > 0.0);

    let sections_only = SearchFilter {
        kinds: vec![ItemKind::Section],
        chapter_id: None,
    };
    let none = store
        .find_by_lexical_query("occupant load", 10, &sections_only)
        .await
        .unwrap();
    assert!(none.is_empty());

    let stopwords = store
        .find_by_lexical_query("what is the", 10, &SearchFilter::default())
        .await
        .unwrap();
    assert!(stopwords.is_empty());
}

#[tokio::test]
async fn test_store_lexical_search_matches_section_numbers() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    let hits = store
        .find_by_lexical_query("102", 10, &SearchFilter::default())
        .await
        .unwrap();
    let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
    assert_eq!(ids, vec![3]);
}

#[tokio::test]
async fn test_store_lexical_terms_match_whole_section_numbers() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    // FTS5 indexes "101.1" and "Table 101.2" as separate "101" tokens.
    let hits = store
        .find_by_lexical_query("101", 10, &SearchFilter::default())
        .await
        .unwrap();
    let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
    assert_eq!(ids, vec![1]);

    let hits = store
        .find_by_lexical_query("101.1", 10, &SearchFilter::default())
        .await
        .unwrap();
    let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
    assert_eq!(ids, vec![2]);

    let hits = store
        .find_by_lexical_query("101.2 occupant", 10, &SearchFilter::default())
        .await
        .unwrap();
    let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
    assert_eq!(ids, vec![4]);
}

#[tokio::test]
async fn test_store_lexical_limit_applies_after_term_check() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    let hits = store
        .find_by_lexical_query("101 scope", 1, &SearchFilter::default())
        .await
        .unwrap();
    let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
    assert_eq!(ids, vec![1]);
    assert!(store
        .find_by_lexical_query("scope", 0, &SearchFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_store_negative_max_depth_is_integrity_error() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("bad.sqlite");
    let pool = schema_pool(&db_path).await;
    sqlx::query(
        "INSERT INTO corpus_items (id, kind, title, text, number, depth, position) \
         VALUES (1, 'section', 'Scope', 'scope text', '101', -1, 0)",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool.close().await;

    let store = SqliteStore::new(db::connect_path(&db_path).await.unwrap());
    let err = store.max_depth().await.unwrap_err();
    assert_eq!(err.kind(), "corpus_integrity");
}

#[tokio::test]
async fn test_store_vector_search_orders_by_distance() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    let query = code_harness_core::embedding::fallback_embedding(APPLICABILITY_TEXT, DIMS);
    let hits = store
        .find_nearest_by_embedding(&query, 10, &SearchFilter::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 5);
    assert_eq!(hits[0].item_id, 3);
    assert!(hits[0].distance.abs() < 1e-6);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    let chapter_two = SearchFilter {
        kinds: Vec::new(),
        chapter_id: Some(2),
    };
    let filtered = store
        .find_nearest_by_embedding(&query, 10, &chapter_two)
        .await
        .unwrap();
    let ids: Vec<i64> = filtered.iter().map(|h| h.item_id).collect();
    assert_eq!(ids, vec![5]);
}

#[tokio::test]
async fn test_store_references_both_directions() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let store = SqliteStore::new(db::connect(&config).await.unwrap());

    let refs = store.get_references(1).await.unwrap();
    assert_eq!(refs.len(), 3);
    assert_eq!(refs[1].target_id, None);
    assert_eq!(refs[1].reference_text, "NFPA 13");
    assert_eq!(refs[2].source_id, 3);
    assert_eq!(refs[0].span.map(|s| s.end), Some("Section 102".len()));
}

#[tokio::test]
async fn test_store_without_tables_is_index_unavailable() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("empty.sqlite");
    let pool = SqlitePoolOptions::new()
        .connect_with(SqliteConnectOptions::new().filename(&db_path).create_if_missing(true))
        .await
        .unwrap();
    pool.close().await;

    let store = SqliteStore::new(db::connect_path(&db_path).await.unwrap());
    let err = store.get_item(1).await.unwrap_err();
    assert_eq!(err.kind(), "index_unavailable");

    let err = store
        .find_by_lexical_query("scope", 5, &SearchFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::IndexUnavailable { .. }));
}

#[tokio::test]
async fn test_connect_missing_database() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp.path().join("missing.sqlite"));

    let Err(err) = Harness::open(&config).await else {
        panic!("opening a missing database should fail");
    };
    assert!(err.to_string().contains("not found"));
    assert!(!tmp.path().join("missing.sqlite").exists());
}

// ============ Search ============

#[tokio::test]
async fn test_search_corpus_hybrid() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let results = search_corpus(&harness, "sprinkler", SearchType::Hybrid, None)
        .await
        .unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results[0].item_id, 1);
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[0].source, HitSource::Fused);
    assert_eq!(results[0].url.as_deref(), Some("https://codes.example/page/11"));
    assert!(results[0].excerpt.starts_with("These provisions govern"));

    let table = results.iter().find(|r| r.item_id == 4).unwrap();
    assert_eq!(table.kind, ItemKind::Table);
    assert!(table.url.is_none());

    let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    harness.close().await;
}

#[tokio::test]
async fn test_search_corpus_vector_exact_text() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let results = search_corpus(&harness, APPLICABILITY_TEXT, SearchType::Vector, Some(2))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].item_id, 3);
    assert_eq!(results[0].source, HitSource::Vector);
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_search_corpus_deterministic() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let first = search_corpus(&harness, "specific requirement", SearchType::Hybrid, None)
        .await
        .unwrap();
    let second = search_corpus(&harness, "specific requirement", SearchType::Hybrid, None)
        .await
        .unwrap();
    let a: Vec<(i64, f64)> = first.iter().map(|r| (r.item_id, r.score)).collect();
    let b: Vec<(i64, f64)> = second.iter().map(|r| (r.item_id, r.score)).collect();
    assert_eq!(a, b);
    assert_eq!(a[0].0, 3);
}

#[tokio::test]
async fn test_search_corpus_empty_query_and_zero_limit() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let empty = search_corpus(&harness, "   ", SearchType::Hybrid, None)
        .await
        .unwrap();
    assert!(empty.is_empty());

    let err = search_corpus(&harness, "scope", SearchType::Hybrid, Some(0))
        .await
        .unwrap_err();
    assert_eq!(retrieval_kind(&err), Some("invalid_query"));
}

#[tokio::test]
async fn test_core_search_over_sqlite_store() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let hits = run_search(
        harness.store(),
        harness.embedder(),
        "occupant load",
        SearchType::Hybrid,
        3,
        &SearchParams::default(),
    )
    .await
    .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].item_id, 4);
    assert!(harness.embedder().uses_fallback());
}

// ============ Query ============

#[tokio::test]
async fn test_answer_question_end_to_end() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let result = answer_question(&harness, "sprinkler systems", &QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, QueryStatus::Extractive);
    assert!(result.used_fallback);
    assert_eq!(result.hits.len(), 5);
    assert_eq!(result.hits[0].item_id, 1);
    assert_eq!(result.hits[0].section_number, "101");
    assert_eq!(
        result.hits[0].url.as_deref(),
        Some("https://codes.example/page/11")
    );
    assert!(result.answer.contains(SCOPE_TEXT));

    let table = result.hits.iter().find(|h| h.item_id == 4).unwrap();
    assert_eq!(table.section_number, "101");

    let block = &result.context_expansions[&1];
    assert!(block.ancestors.is_empty());
    let descendants: Vec<i64> = block.descendants.iter().map(|d| d.id).collect();
    assert_eq!(descendants, vec![2]);

    let table_block = &result.context_expansions[&4];
    let owners: Vec<i64> = table_block.ancestors.iter().map(|a| a.id).collect();
    assert_eq!(owners, vec![1]);

    let refs = &result.references[&1];
    assert_eq!(refs.len(), 3);
    let external = refs.iter().find(|r| r.reference_text == "NFPA 13").unwrap();
    assert!(external.item.is_none());

    let markdown = result.to_markdown();
    assert!(markdown.contains("## References"));
    assert!(markdown.contains("See also: NFPA 13"));

    assert_eq!(result.metadata.fused_hits, 5);
    assert_eq!(result.metadata.keyword_candidates, 1);
    harness.close().await;
}

#[tokio::test]
async fn test_answer_question_ranks_section_by_number() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let result = answer_question(
        &harness,
        "What does section 101 cover?",
        &QueryOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(result.hits[0].item_id, 1);
    assert_eq!(result.hits[0].section_number, "101");
    assert_eq!(result.metadata.keyword_candidates, 1);
    let descendants: Vec<i64> = result.context_expansions[&1]
        .descendants
        .iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(descendants, vec![2]);
}

#[tokio::test]
async fn test_table_hit_cites_owner_without_context() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let options = QueryOptions {
        include_context: false,
        ..QueryOptions::default()
    };
    let result = answer_question(&harness, "occupant load", &options)
        .await
        .unwrap();
    assert!(result.context_expansions.is_empty());
    assert_eq!(result.hits[0].item_id, 4);
    assert_eq!(result.hits[0].kind, ItemKind::Table);
    assert_eq!(result.hits[0].section_number, "101");
}

#[tokio::test]
async fn test_answer_question_no_evidence() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let result = answer_question(&harness, "", &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(result.status, QueryStatus::NoEvidence);
    assert!(result.hits.is_empty());
    assert!(!result.used_fallback);
}

#[tokio::test]
async fn test_answer_question_toggles() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let options = QueryOptions {
        max_hits: 2,
        include_context: false,
        include_references: false,
        ..QueryOptions::default()
    };
    let result = answer_question(&harness, "sprinkler systems", &options)
        .await
        .unwrap();
    assert_eq!(result.hits.len(), 2);
    assert!(result.context_expansions.is_empty());
    assert!(result.references.is_empty());

    let invalid = QueryOptions {
        max_hits: 0,
        ..QueryOptions::default()
    };
    let err = answer_question(&harness, "scope", &invalid).await.unwrap_err();
    assert_eq!(retrieval_kind(&err), Some("invalid_query"));
}

#[tokio::test]
async fn test_concurrent_queries_share_harness() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();
    let options = QueryOptions::default();

    let runs = futures::future::join_all(
        (0..4).map(|_| answer_question(&harness, "occupant load", &options)),
    )
    .await;
    let results: Vec<_> = runs.into_iter().map(|r| r.unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].hits[0].item_id, 4);
}

// ============ Section ============

#[tokio::test]
async fn test_get_section_detail() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let detail = get_section(&harness, "101.1", None).await.unwrap();
    assert_eq!(detail.section.id, 2);
    assert_eq!(detail.parent.as_ref().map(|p| p.id), Some(1));
    assert!(detail.children.is_empty());
    assert_eq!(detail.url.as_deref(), Some("https://codes.example/page/12"));

    let scope = get_section(&harness, "101", Some(1)).await.unwrap();
    assert!(scope.parent.is_none());
    assert_eq!(scope.children.len(), 1);
    assert_eq!(scope.references.len(), 3);
    assert!(scope.references.iter().any(|r| r.is_external()));
}

#[tokio::test]
async fn test_get_section_not_found() {
    let (_tmp, _config_path, config) = setup_corpus().await;
    let harness = Harness::open(&config).await.unwrap();

    let err = get_section(&harness, "999", None).await.unwrap_err();
    assert!(err.to_string().contains("Section 999 not found"));

    let err = get_section(&harness, "201", Some(1)).await.unwrap_err();
    assert!(err.to_string().contains("chapter 1"));
}
