//! Cross-reference resolution for retrieved items.
//!
//! Each hit gets the references where it is the source (outgoing) or the
//! target (incoming). The other endpoint is resolved to its corpus item
//! when it exists. References with no target, or whose target id names no
//! item, come back as `external` with `item: None` so callers can render
//! "see also" text without a link.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::RetrievalResult;
use crate::models::{CorpusItem, ItemId, ReferenceType, SearchHit, SectionReference, Span};
use crate::store::CorpusStore;

/// Whether the hit is the source or the target of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A reference seen from one hit, with its other endpoint resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedReference {
    pub direction: Direction,
    pub reference_type: ReferenceType,
    pub reference_text: String,
    /// Id of the other endpoint, when the reference names one.
    pub other_id: Option<ItemId>,
    /// The other endpoint; `None` for external or dangling references.
    pub item: Option<CorpusItem>,
    pub span: Option<Span>,
}

impl ResolvedReference {
    pub fn is_external(&self) -> bool {
        self.item.is_none()
    }
}

/// Resolve the references of every distinct hit, keyed by hit item id.
pub async fn resolve_references<S: CorpusStore + ?Sized>(
    store: &S,
    hits: &[SearchHit],
) -> RetrievalResult<BTreeMap<ItemId, Vec<ResolvedReference>>> {
    let mut resolved = BTreeMap::new();
    for hit in hits {
        if resolved.contains_key(&hit.item_id) {
            continue;
        }
        let refs = references_for(store, hit.item_id).await?;
        resolved.insert(hit.item_id, refs);
    }
    Ok(resolved)
}

/// Outgoing and incoming references of one item, in store order.
///
/// Reciprocal pairs (A→B and B→A) collapse into the first one seen, but
/// only when both carry the same type and text.
pub async fn references_for<S: CorpusStore + ?Sized>(
    store: &S,
    item_id: ItemId,
) -> RetrievalResult<Vec<ResolvedReference>> {
    let rows = store.get_references(item_id).await?;
    let mut seen: HashSet<(Option<ItemId>, ReferenceType, String)> = HashSet::new();
    let mut refs = Vec::with_capacity(rows.len());

    for row in rows {
        let (direction, other_id) = if row.source_id == item_id {
            (Direction::Outgoing, row.target_id)
        } else {
            (Direction::Incoming, Some(row.source_id))
        };
        if !seen.insert((other_id, row.reference_type, row.reference_text.clone())) {
            continue;
        }
        refs.push(resolve_one(store, row, direction, other_id).await?);
    }

    debug!(item = item_id, references = refs.len(), "resolved references");
    Ok(refs)
}

async fn resolve_one<S: CorpusStore + ?Sized>(
    store: &S,
    row: SectionReference,
    direction: Direction,
    other_id: Option<ItemId>,
) -> RetrievalResult<ResolvedReference> {
    let item = match other_id {
        Some(id) => store.get_item(id).await?,
        None => None,
    };
    let reference_type = if item.is_some() {
        row.reference_type
    } else {
        ReferenceType::External
    };
    Ok(ResolvedReference {
        direction,
        reference_type,
        reference_text: row.reference_text,
        other_id,
        item,
        span: row.span,
    })
}
