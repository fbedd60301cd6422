//! B+tree cursor: root-to-leaf descent.
//!
//! A cursor holds the stack of `(page id, slot)` frames visited on the way
//! to a key. The leaf frame is used directly for reads and for in-place
//! mutation.

use crate::cache::{self, NodeCache};
use crate::error::Result;
use crate::storage::FileBacking;
use crate::types::PageId;

/// Path from root to the frame holding (or that would hold) a search key.
#[derive(Debug, Default)]
pub struct Cursor {
    stack: Vec<(PageId, usize)>,
}

impl Cursor {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Descend from `root` toward `key`, per §4.4: at each branch, pick the
    /// largest separator `<= key` (or slot 0); at the leaf, binary search.
    /// Returns whether the leaf holds an exact match.
    pub fn seek(
        &mut self,
        cache: &mut NodeCache,
        backing: &FileBacking,
        root: PageId,
        key: &[u8],
    ) -> Result<bool> {
        self.stack.clear();
        let mut current = root;
        let mut parent = None;
        loop {
            let node = cache::node(cache, backing, current, parent)?;
            if node.is_leaf {
                return match node.search(key) {
                    Ok(slot) => {
                        self.stack.push((current, slot));
                        Ok(true)
                    }
                    Err(slot) => {
                        self.stack.push((current, slot));
                        Ok(false)
                    }
                };
            }
            let slot = node.branch_slot_for(key);
            let child = node.inodes[slot].pgid;
            self.stack.push((current, slot));
            parent = Some(current);
            current = child;
        }
    }

    /// The leaf frame of the most recent `seek`.
    pub fn leaf(&self) -> Option<(PageId, usize)> {
        self.stack.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::BTree;
    use tempfile::tempdir;

    #[test]
    fn test_seek_miss_on_empty_tree() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut tree = BTree::open(&path, false)?;
        assert_eq!(tree.get(b"missing")?, None);
        Ok(())
    }
}
