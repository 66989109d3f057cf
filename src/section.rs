//! Direct section lookup by number.
//!
//! Returns one section with its parent, direct child sections and resolved
//! cross-references, without running retrieval.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use code_harness_core::models::CorpusItem;
use code_harness_core::references::{references_for, ResolvedReference};
use code_harness_core::store::CorpusStore;
use code_harness_core::workflow::citation_url;

use crate::config::Config;
use crate::harness::Harness;

/// A section with its neighbourhood in the hierarchy.
#[derive(Debug, Clone, Serialize)]
pub struct SectionDetail {
    pub section: CorpusItem,
    pub parent: Option<CorpusItem>,
    pub children: Vec<CorpusItem>,
    pub references: Vec<ResolvedReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Look up the section numbered `number`, optionally within `chapter_id`.
///
/// # Errors
///
/// Fails when no such section exists or the store is unavailable.
pub async fn get_section(
    harness: &Harness,
    number: &str,
    chapter_id: Option<i64>,
) -> Result<SectionDetail> {
    let store = harness.store();
    let Some(section) = store.find_section(number, chapter_id).await? else {
        match chapter_id {
            Some(chapter) => bail!("Section {} not found in chapter {}", number, chapter),
            None => bail!("Section {} not found", number),
        }
    };

    let parent = match section.parent_id {
        Some(pid) => store.get_item(pid).await?,
        None => None,
    };
    let children = store.get_children(section.id).await?;
    let references = references_for(store, section.id).await?;
    let url = citation_url(
        harness.config().citations.url_template.as_deref(),
        section.page.as_deref(),
    );

    Ok(SectionDetail {
        section,
        parent,
        children,
        references,
        url,
    })
}

/// CLI entry point: prints one section.
pub async fn run_section(
    config: &Config,
    number: &str,
    chapter_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let harness = Harness::open(config).await?;
    let detail = get_section(&harness, number, chapter_id).await;
    harness.close().await;
    let detail = detail?;

    if json {
        let out = serde_json::to_string_pretty(&detail).context("Failed to encode section")?;
        println!("{}", out);
        return Ok(());
    }

    println!("{}", detail.section.label());
    if let Some(ref parent) = detail.parent {
        println!("parent: {}", parent.label());
    }
    if let Some(ref url) = detail.url {
        println!("url: {}", url);
    }
    println!("---");
    println!("{}", detail.section.text.trim());

    if !detail.children.is_empty() {
        println!("---");
        println!("subsections:");
        for child in &detail.children {
            println!("  - {}", child.label());
        }
    }
    if !detail.references.is_empty() {
        println!("---");
        println!("references:");
        for r in &detail.references {
            match r.item {
                Some(ref item) => println!("  - {:?} {}", r.direction, item.label()),
                None => println!("  - {:?} see also: {}", r.direction, r.reference_text),
            }
        }
    }
    Ok(())
}
