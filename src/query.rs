//! Question answering over the corpus.
//!
//! Runs the full query workflow (retrieval, reference resolution, context
//! expansion and answer generation) through the harness's store and
//! providers. Generation falls back to an extractive answer when the
//! provider is missing, times out or is unreachable.

use anyhow::{Context, Result};
use tracing::info;

use code_harness_core::search::SearchType;
use code_harness_core::workflow::{QueryOptions, QueryResult};

use crate::config::Config;
use crate::harness::Harness;

/// Answer `question` with the harness's workflow.
pub async fn answer_question(
    harness: &Harness,
    question: &str,
    options: &QueryOptions,
) -> Result<QueryResult> {
    let result = harness.workflow().run_query(question, options).await?;
    info!(
        status = ?result.status,
        hits = result.hits.len(),
        fallback = result.used_fallback,
        "query answered"
    );
    Ok(result)
}

/// Per-invocation flags for [`run_query`].
#[derive(Debug, Clone)]
pub struct QueryArgs {
    pub mode: String,
    pub max_hits: Option<usize>,
    pub no_context: bool,
    pub no_references: bool,
    pub json: bool,
}

/// CLI entry point: answers a question and prints Markdown or JSON.
pub async fn run_query(config: &Config, question: &str, args: &QueryArgs) -> Result<()> {
    let search_type: SearchType = args.mode.parse()?;
    let options = QueryOptions {
        search_type,
        max_hits: args.max_hits.unwrap_or(config.retrieval.max_hits),
        include_context: !args.no_context,
        include_references: !args.no_references,
    };

    let harness = Harness::open(config).await?;
    let result = answer_question(&harness, question, &options).await;
    harness.close().await;
    let result = result?;

    if args.json {
        let out = serde_json::to_string_pretty(&result).context("Failed to encode answer")?;
        println!("{}", out);
    } else {
        println!("{}", result.to_markdown());
    }
    Ok(())
}
