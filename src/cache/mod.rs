//! Node cache: the in-memory mirror of touched pages, keyed by page id.
//!
//! Unbounded and never evicted during a writer's lifetime — large workloads
//! may eventually want an eviction policy, but nothing in this design
//! requires one yet (§9 open question).

pub mod node;

pub use node::{Inode, Node};

use crate::error::Result;
use crate::storage::FileBacking;
use crate::types::PageId;
use std::collections::HashMap;

/// Page id → node. A plain `HashMap` rather than a bespoke cache type so the
/// tree can borrow it and the file backing disjointly (see `node()` below).
pub type NodeCache = HashMap<PageId, Node>;

/// Fetch the cached node for `id`, materializing it from `backing` on first
/// touch and recording `parent` on it. Free function rather than a method
/// on a struct owning both `cache` and `backing` so callers can borrow the
/// two fields of `BTree` independently.
pub fn node<'a>(
    cache: &'a mut NodeCache,
    backing: &FileBacking,
    id: PageId,
    parent: Option<PageId>,
) -> Result<&'a Node> {
    if !cache.contains_key(&id) {
        let loaded = backing.read_page(id, |bytes| Node::from_page(bytes, id))??;
        cache.insert(id, loaded);
    }
    let entry = cache.get_mut(&id).expect("just inserted");
    if parent.is_some() {
        entry.parent = parent;
    }
    Ok(cache.get(&id).expect("just inserted"))
}

/// Same as `node`, but returns a mutable handle.
pub fn node_mut<'a>(
    cache: &'a mut NodeCache,
    backing: &FileBacking,
    id: PageId,
    parent: Option<PageId>,
) -> Result<&'a mut Node> {
    if !cache.contains_key(&id) {
        let loaded = backing.read_page(id, |bytes| Node::from_page(bytes, id))??;
        cache.insert(id, loaded);
    }
    let entry = cache.get_mut(&id).expect("just inserted");
    if parent.is_some() {
        entry.parent = parent;
    }
    Ok(entry)
}
