//! Hierarchical context expansion.
//!
//! For every hit, [`build_context`] collects the ancestor chain up to the
//! chapter root and the immediate children of the hit, both in document
//! order. Tables and figures borrow their owning section's chain.
//!
//! The parent walk is bounded by the deepest depth observed in the corpus.
//! Revisiting an item, exceeding the bound, or following a `parent_id` to
//! a missing item is reported as
//! [`RetrievalError::CorpusIntegrity`]; it is never swallowed into an
//! empty result.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::error::{RetrievalError, RetrievalResult};
use crate::models::{CorpusItem, ItemId, SearchHit};
use crate::store::CorpusStore;

/// Which directions to expand.
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    pub include_ancestors: bool,
    pub include_descendants: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            include_ancestors: true,
            include_descendants: true,
        }
    }
}

/// Structural neighbourhood of one hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBlock {
    pub item_id: ItemId,
    /// Root first, immediate parent (or owning section) last.
    pub ancestors: Vec<CorpusItem>,
    /// Immediate child sections, ordered by sibling position.
    pub descendants: Vec<CorpusItem>,
}

/// Expand each hit with its ancestors and immediate descendants.
///
/// Returns one [`ContextBlock`] per distinct hit item, keyed by item id.
pub async fn build_context<S: CorpusStore + ?Sized>(
    store: &S,
    hits: &[SearchHit],
    options: ContextOptions,
) -> RetrievalResult<BTreeMap<ItemId, ContextBlock>> {
    let mut blocks = BTreeMap::new();
    if hits.is_empty() {
        return Ok(blocks);
    }

    let depth_bound = store.max_depth().await?;

    for hit in hits {
        if blocks.contains_key(&hit.item_id) {
            continue;
        }
        let item = store.get_item(hit.item_id).await?.ok_or_else(|| {
            RetrievalError::integrity(format!("hit {} has no corpus item", hit.item_id))
        })?;

        let ancestors = if options.include_ancestors {
            ancestor_chain(store, &item, depth_bound).await?
        } else {
            Vec::new()
        };

        let descendants = if options.include_descendants && item.is_section() {
            let mut children = store.get_children(item.id).await?;
            children.sort_by_key(|c| (c.position, c.id));
            children
        } else {
            Vec::new()
        };

        debug!(
            item = item.id,
            ancestors = ancestors.len(),
            descendants = descendants.len(),
            "expanded context"
        );
        blocks.insert(
            item.id,
            ContextBlock {
                item_id: item.id,
                ancestors,
                descendants,
            },
        );
    }

    Ok(blocks)
}

/// Walk `parent_id` links from `item` to the root.
///
/// A section may have at most `depth_bound` ancestors; a table or figure
/// one more (its owning section). Returns the chain root first.
pub async fn ancestor_chain<S: CorpusStore + ?Sized>(
    store: &S,
    item: &CorpusItem,
    depth_bound: u32,
) -> RetrievalResult<Vec<CorpusItem>> {
    let max_steps = depth_bound as usize + usize::from(!item.is_section());
    let mut visited: HashSet<ItemId> = HashSet::from([item.id]);
    let mut chain = Vec::new();
    let mut next = item.parent_id;

    while let Some(parent_id) = next {
        if !visited.insert(parent_id) {
            return Err(RetrievalError::integrity(format!(
                "parent cycle through item {} while expanding item {}",
                parent_id, item.id
            )));
        }
        if chain.len() == max_steps {
            return Err(RetrievalError::integrity(format!(
                "ancestor chain of item {} exceeds maximum depth {}",
                item.id, depth_bound
            )));
        }
        let parent = store.get_item(parent_id).await?.ok_or_else(|| {
            RetrievalError::integrity(format!(
                "item {} points at missing parent {}",
                item.id, parent_id
            ))
        })?;
        next = parent.parent_id;
        chain.push(parent);
    }

    if item.is_section() && chain.len() != item.depth as usize {
        warn!(
            item = item.id,
            depth = item.depth,
            ancestors = chain.len(),
            "section depth disagrees with its ancestor count"
        );
    }

    chain.reverse();
    Ok(chain)
}

/// The section a table or figure belongs to.
///
/// Follows `parent_id` through any non-section parents (a figure inside a
/// table) until a section is reached. Sections own themselves; an item
/// with no parent has no owner.
pub async fn owning_section<S: CorpusStore + ?Sized>(
    store: &S,
    item: &CorpusItem,
) -> RetrievalResult<Option<CorpusItem>> {
    if item.is_section() {
        return Ok(Some(item.clone()));
    }
    let mut visited: HashSet<ItemId> = HashSet::from([item.id]);
    let mut next = item.parent_id;

    while let Some(parent_id) = next {
        if !visited.insert(parent_id) {
            return Err(RetrievalError::integrity(format!(
                "parent cycle through item {} while resolving the owner of item {}",
                parent_id, item.id
            )));
        }
        let parent = store.get_item(parent_id).await?.ok_or_else(|| {
            RetrievalError::integrity(format!(
                "item {} points at missing parent {}",
                item.id, parent_id
            ))
        })?;
        if parent.is_section() {
            return Ok(Some(parent));
        }
        next = parent.parent_id;
    }
    Ok(None)
}
