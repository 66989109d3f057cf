//! Core data models for the retrieval pipeline.
//!
//! Corpus records ([`CorpusItem`], [`SectionReference`]) are owned by the
//! persistence layer and read-only here. [`SearchHit`] is the ephemeral
//! output of a search stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RetrievalError;

/// Stable integer identity of a corpus item.
pub type ItemId = i64;

/// The kind of a retrievable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Section,
    Table,
    Figure,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Section => "section",
            ItemKind::Table => "table",
            ItemKind::Figure => "figure",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "section" => Ok(ItemKind::Section),
            "table" => Ok(ItemKind::Table),
            "figure" => Ok(ItemKind::Figure),
            other => Err(RetrievalError::integrity(format!(
                "unknown corpus item kind: {}",
                other
            ))),
        }
    }
}

/// A section, table or figure in the corpus.
///
/// Sections form a tree through `parent_id`. For tables and figures,
/// `parent_id` names the owning section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusItem {
    pub id: ItemId,
    pub kind: ItemKind,
    /// Display title.
    pub title: String,
    /// Retrievable text. May be empty for tables and figures.
    pub text: String,
    /// Section number (`"101.1"`), or the table/figure identifier.
    pub number: String,
    pub chapter_id: Option<i64>,
    pub parent_id: Option<ItemId>,
    /// Number of ancestors; a chapter root has depth 0.
    pub depth: u32,
    /// Ordered position among siblings.
    pub position: i64,
    /// Page or location reference, substituted into citation URLs.
    pub page: Option<String>,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

impl CorpusItem {
    pub fn is_section(&self) -> bool {
        self.kind == ItemKind::Section
    }

    /// `"Section 101.1 (Scope)"`, `"Table 101.1 (Loads)"`.
    pub fn label(&self) -> String {
        let kind = match self.kind {
            ItemKind::Section => "Section",
            ItemKind::Table => "Table",
            ItemKind::Figure => "Figure",
        };
        if self.title.is_empty() {
            format!("{} {}", kind, self.number)
        } else {
            format!("{} {} ({})", kind, self.number, self.title)
        }
    }
}

/// The target kind of a cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Section,
    Table,
    Figure,
    External,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Section => "section",
            ReferenceType::Table => "table",
            ReferenceType::Figure => "figure",
            ReferenceType::External => "external",
        }
    }
}

impl FromStr for ReferenceType {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "section" => Ok(ReferenceType::Section),
            "table" => Ok(ReferenceType::Table),
            "figure" => Ok(ReferenceType::Figure),
            "external" | "unknown" => Ok(ReferenceType::External),
            other => Err(RetrievalError::integrity(format!(
                "unknown reference type: {}",
                other
            ))),
        }
    }
}

/// Character span of a reference mention within its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A directed cross-reference edge between corpus items.
///
/// `target_id` is `None` when the mention could not be resolved to a
/// corpus item (external or dangling reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReference {
    pub source_id: ItemId,
    pub target_id: Option<ItemId>,
    pub reference_type: ReferenceType,
    pub reference_text: String,
    pub span: Option<Span>,
}

/// Which retrieval path produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    Vector,
    Keyword,
    Fused,
}

/// Ephemeral result of a search stage.
///
/// `score` is higher-is-better for every source: cosine similarity for
/// vector hits, lexical relevance for keyword hits, RRF score for fused
/// hits. `rank` is the 1-based position within the list it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub item_id: ItemId,
    pub kind: ItemKind,
    pub score: f64,
    pub rank: usize,
    pub source: HitSource,
}

/// Optional restrictions applied by the search backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Only return items of these kinds (all kinds when empty).
    #[serde(default)]
    pub kinds: Vec<ItemKind>,
    /// Only return items from this chapter.
    #[serde(default)]
    pub chapter_id: Option<i64>,
}

impl SearchFilter {
    pub fn matches(&self, item: &CorpusItem) -> bool {
        self.allows(item.kind, item.chapter_id)
    }

    /// Filter check for backends that only load the kind and chapter.
    pub fn allows(&self, kind: ItemKind, chapter_id: Option<i64>) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        match self.chapter_id {
            Some(chapter) => chapter_id == Some(chapter),
            None => true,
        }
    }
}
