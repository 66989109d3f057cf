//! Retrieval-only search over the corpus.
//!
//! This module provides the application-level entry point for search. The
//! core algorithm (vector and keyword retrieval, Reciprocal Rank Fusion)
//! lives in `code-harness-core::search` and operates through the
//! [`CorpusStore`] trait. This wrapper resolves hit ids to corpus items for
//! display and handles CLI output formatting.
//!
//! # Search Modes
//!
//! - **Hybrid** (default): vector and keyword candidates merged with RRF.
//! - **Vector**: cosine similarity only; fusion is bypassed.

use anyhow::{Context, Result};
use serde::Serialize;

use code_harness_core::error::RetrievalError;
use code_harness_core::models::{HitSource, ItemId, ItemKind};
use code_harness_core::search::run_search as core_run_search;
pub use code_harness_core::search::SearchType;
use code_harness_core::store::CorpusStore;
use code_harness_core::workflow::citation_url;

use crate::config::Config;
use crate::harness::Harness;

/// One search hit with the display fields of its corpus item.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub item_id: ItemId,
    pub kind: ItemKind,
    pub number: String,
    pub title: String,
    pub score: f64,
    pub rank: usize,
    pub source: HitSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub excerpt: String,
}

/// Search the corpus and resolve each hit to its item.
///
/// `limit` defaults to `retrieval.max_hits`. An empty query returns no results.
pub async fn search_corpus(
    harness: &Harness,
    query: &str,
    mode: SearchType,
    limit: Option<usize>,
) -> Result<Vec<SearchResultItem>> {
    let config = harness.config();
    let limit = limit.unwrap_or(config.retrieval.max_hits);

    let hits = core_run_search(
        harness.store(),
        harness.embedder(),
        query,
        mode,
        limit,
        &config.search_params(),
    )
    .await?;

    let template = config.citations.url_template.as_deref();
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let item = harness.store().get_item(hit.item_id).await?.ok_or_else(|| {
            RetrievalError::integrity(format!("search returned missing item {}", hit.item_id))
        })?;
        results.push(SearchResultItem {
            item_id: hit.item_id,
            kind: hit.kind,
            url: citation_url(template, item.page.as_deref()),
            excerpt: excerpt(&item.text, 240),
            number: item.number,
            title: item.title,
            score: hit.score,
            rank: hit.rank,
            source: hit.source,
        });
    }
    Ok(results)
}

/// First `max_chars` characters of `text` on one line.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// CLI entry point: calls [`search_corpus`] and prints results to stdout.
pub async fn run_search(
    config: &Config,
    query: &str,
    mode: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mode: SearchType = mode.parse()?;
    let harness = Harness::open(config).await?;
    let results = search_corpus(&harness, query, mode, limit).await;
    harness.close().await;
    let results = results?;

    if json {
        let out = serde_json::to_string_pretty(&results).context("Failed to encode results")?;
        println!("{}", out);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for result in &results {
        let title_display = if result.title.is_empty() {
            "(untitled)"
        } else {
            result.title.as_str()
        };
        println!(
            "{}. [{:.4}] {} {} / {}",
            result.rank, result.score, result.kind, result.number, title_display
        );
        if let Some(ref url) = result.url {
            println!("    url: {}", url);
        }
        println!("    excerpt: \"{}\"", result.excerpt);
        println!("    id: {}", result.item_id);
        println!();
    }

    Ok(())
}
