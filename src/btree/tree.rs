//! The B+tree itself: lookup, insert, delete, split/merge rebalancing, and
//! commit.

use crate::btree::cursor::Cursor;
use crate::cache::{self, Inode, Node, NodeCache};
use crate::error::{Result, StorageError};
use crate::page::Meta;
use crate::storage::FileBacking;
use crate::types::{PageId, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use std::collections::HashSet;
use std::path::Path;

/// A durable, memory-mapped B+tree key/value index.
///
/// Nodes are cached by page id in an unbounded, never-evicted map (§4.3);
/// a `put`/`delete` mutates cached nodes in place and `commit` flushes the
/// dirty set plus a freshly checksummed meta page at the end of the call.
pub struct BTree {
    backing: FileBacking,
    cache: NodeCache,
    dirty: HashSet<PageId>,
    root: PageId,
    max_pgid: PageId,
}

impl BTree {
    /// Open (creating if necessary) the index file at `path`.
    pub fn open(path: &Path, read_only: bool) -> Result<Self> {
        let backing = FileBacking::open(path, read_only)?;
        let meta = backing.read_meta()?;
        Ok(Self {
            backing,
            cache: NodeCache::new(),
            dirty: HashSet::new(),
            root: meta.root,
            max_pgid: meta.max_pgid,
        })
    }

    pub fn root_page(&self) -> PageId {
        self.root
    }

    pub fn is_read_only(&self) -> bool {
        self.backing.read_only()
    }

    /// Number of pages ever allocated (including the meta page); pages freed
    /// by merges are not reused and are counted here as leaked (§9).
    pub fn page_count(&self) -> u64 {
        self.max_pgid.value() + 1
    }

    /// Number of levels between the root and a leaf, inclusive of both.
    pub fn height(&mut self) -> Result<u32> {
        let mut h = 1;
        let mut current = self.root;
        loop {
            let node = cache::node(&mut self.cache, &self.backing, current, None)?;
            if node.is_leaf {
                return Ok(h);
            }
            current = node.inodes[0].pgid;
            h += 1;
        }
    }

    /// Look up `key`. Never fails for a well-formed key (§6.2).
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut cursor = Cursor::new();
        let found = cursor.seek(&mut self.cache, &self.backing, self.root, key)?;
        if !found {
            return Ok(None);
        }
        let (leaf_pgid, slot) = cursor.leaf().expect("seek always leaves a leaf frame");
        let node = cache::node(&mut self.cache, &self.backing, leaf_pgid, None)?;
        Ok(Some(node.inodes[slot].value.clone()))
    }

    pub fn contains(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Like `get`, but also returns a human-readable trace of the pages and
    /// slots visited, for debugging a tree that looks inconsistent.
    pub fn debug_get(&mut self, key: &[u8]) -> Result<(Option<Vec<u8>>, Vec<String>)> {
        let mut trace = Vec::new();
        let mut current = self.root;
        let mut parent = None;
        loop {
            let node = cache::node(&mut self.cache, &self.backing, current, parent)?;
            if node.is_leaf {
                return match node.search(key) {
                    Ok(slot) => {
                        trace.push(format!("leaf {current} slot {slot} (match)"));
                        Ok((Some(node.inodes[slot].value.clone()), trace))
                    }
                    Err(slot) => {
                        trace.push(format!("leaf {current} slot {slot} (miss)"));
                        Ok((None, trace))
                    }
                };
            }
            let slot = node.branch_slot_for(key);
            let child = node.inodes[slot].pgid;
            trace.push(format!("branch {current} slot {slot} -> page {child}"));
            parent = Some(current);
            current = child;
        }
    }

    /// Insert or overwrite `key` with `value` (§4.5).
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        if self.backing.read_only() {
            return Err(StorageError::ReadOnly);
        }
        if key.is_empty() {
            return Err(StorageError::KeyRequired);
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(StorageError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(StorageError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }

        let mut cursor = Cursor::new();
        let found = cursor.seek(&mut self.cache, &self.backing, self.root, &key)?;
        let (leaf_pgid, slot) = cursor.leaf().expect("seek always leaves a leaf frame");

        {
            let node = cache::node_mut(&mut self.cache, &self.backing, leaf_pgid, None)?;
            if found {
                node.inodes[slot].value = value;
            } else {
                node.inodes.insert(slot, Inode::leaf(key, value));
            }
        }
        self.dirty.insert(leaf_pgid);
        self.rebalance_after_insert(leaf_pgid)?;
        self.commit()
    }

    /// Remove `key`, silently doing nothing if it is not present (§4.7).
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        if self.backing.read_only() {
            return Err(StorageError::ReadOnly);
        }

        let mut cursor = Cursor::new();
        let found = cursor.seek(&mut self.cache, &self.backing, self.root, key)?;
        if !found {
            return Ok(());
        }
        let (leaf_pgid, slot) = cursor.leaf().expect("seek always leaves a leaf frame");

        {
            let node = cache::node_mut(&mut self.cache, &self.backing, leaf_pgid, None)?;
            node.inodes.remove(slot);
        }
        self.dirty.insert(leaf_pgid);
        self.rebalance_after_delete(leaf_pgid)?;
        self.sync_leftmost_spine()?;
        self.commit()
    }

    // -- split (post-insert rebalance), §4.6 -------------------------------

    fn rebalance_after_insert(&mut self, start: PageId) -> Result<()> {
        let mut current = start;
        loop {
            let size = {
                let node = cache::node(&mut self.cache, &self.backing, current, None)?;
                node.serialized_size()
            };
            if size <= self.backing.page_size() {
                return Ok(());
            }
            current = self.split(current)?;
        }
    }

    fn split(&mut self, pgid: PageId) -> Result<PageId> {
        let node = cache::node(&mut self.cache, &self.backing, pgid, None)?.clone();
        let total = node.serialized_size();
        let idx = node.split_index(total);

        let right_pgid = self.allocate_page();
        let mut right = if node.is_leaf {
            Node::new_leaf(right_pgid)
        } else {
            Node::new_branch(right_pgid)
        };
        right.inodes = node.inodes[idx..].to_vec();

        {
            let left = cache::node_mut(&mut self.cache, &self.backing, pgid, None)?;
            left.inodes.truncate(idx);
        }

        if !node.is_leaf {
            for inode in &right.inodes {
                if let Some(child) = self.cache.get_mut(&inode.pgid) {
                    child.parent = Some(right_pgid);
                }
            }
        }

        let left_min = node.inodes[0].key.clone();
        let right_min = right.inodes[0].key.clone();
        self.cache.insert(right_pgid, right);
        self.dirty.insert(pgid);
        self.dirty.insert(right_pgid);

        let parent_pgid = match node.parent {
            Some(p) => p,
            None => {
                let new_root_pgid = self.allocate_page();
                let mut new_root = Node::new_branch(new_root_pgid);
                new_root.inodes.push(Inode::branch(left_min.clone(), pgid));
                self.cache.insert(new_root_pgid, new_root);
                self.dirty.insert(new_root_pgid);
                self.root = new_root_pgid;
                if let Some(left_cached) = self.cache.get_mut(&pgid) {
                    left_cached.parent = Some(new_root_pgid);
                }
                new_root_pgid
            }
        };

        if let Some(right_cached) = self.cache.get_mut(&right_pgid) {
            right_cached.parent = Some(parent_pgid);
        }

        let parent = cache::node_mut(&mut self.cache, &self.backing, parent_pgid, None)?;
        if let Some(pos) = parent.inodes.iter().position(|i| i.pgid == pgid) {
            parent.inodes[pos].key = left_min;
        }
        let insert_pos = parent
            .inodes
            .partition_point(|i| i.key.as_slice() < right_min.as_slice());
        parent
            .inodes
            .insert(insert_pos, Inode::branch(right_min, right_pgid));
        self.dirty.insert(parent_pgid);

        Ok(parent_pgid)
    }

    // -- merge/adopt (post-delete rebalance), §4.8 -------------------------

    fn rebalance_after_delete(&mut self, start: PageId) -> Result<()> {
        let mut current = start;
        loop {
            let (size, count, is_leaf, parent) = {
                let node = cache::node(&mut self.cache, &self.backing, current, None)?;
                (
                    node.serialized_size(),
                    node.inodes.len(),
                    node.is_leaf,
                    node.parent,
                )
            };
            let is_root = current == self.root;

            if is_root {
                if !is_leaf && count == 1 {
                    self.collapse_root(current)?;
                }
                return Ok(());
            }

            let min_count = if is_leaf { 1 } else { 2 };
            let threshold = self.backing.page_size() / 2;
            if size >= threshold && count >= min_count {
                return Ok(());
            }

            let parent_id = parent.expect("non-root node must have a parent");
            if count == 0 {
                self.remove_child_from_parent(parent_id, current)?;
                self.free_node(current);
                current = parent_id;
                continue;
            }

            current = self.adopt_sibling(current, parent_id)?;
        }
    }

    fn collapse_root(&mut self, root_pgid: PageId) -> Result<()> {
        let child_pgid = {
            let node = cache::node(&mut self.cache, &self.backing, root_pgid, None)?;
            node.inodes[0].pgid
        };
        let child = cache::node(&mut self.cache, &self.backing, child_pgid, None)?.clone();

        {
            let root = cache::node_mut(&mut self.cache, &self.backing, root_pgid, None)?;
            root.is_leaf = child.is_leaf;
            root.inodes = child.inodes.clone();
        }
        if !child.is_leaf {
            for inode in &child.inodes {
                if let Some(gc) = self.cache.get_mut(&inode.pgid) {
                    gc.parent = Some(root_pgid);
                }
            }
        }
        self.free_node(child_pgid);
        self.dirty.insert(root_pgid);
        Ok(())
    }

    fn adopt_sibling(&mut self, pgid: PageId, parent_id: PageId) -> Result<PageId> {
        let idx = {
            let parent = cache::node(&mut self.cache, &self.backing, parent_id, None)?;
            parent
                .inodes
                .iter()
                .position(|i| i.pgid == pgid)
                .expect("child must be listed in its own parent")
        };
        let is_leftmost = idx == 0;
        let sibling_pgid = {
            let parent = cache::node(&mut self.cache, &self.backing, parent_id, None)?;
            if is_leftmost {
                parent.inodes[idx + 1].pgid
            } else {
                parent.inodes[idx - 1].pgid
            }
        };

        if is_leftmost {
            let sibling = cache::node(&mut self.cache, &self.backing, sibling_pgid, None)?.clone();
            {
                let node = cache::node_mut(&mut self.cache, &self.backing, pgid, None)?;
                node.inodes.extend(sibling.inodes.clone());
            }
            if !sibling.is_leaf {
                for inode in &sibling.inodes {
                    if let Some(gc) = self.cache.get_mut(&inode.pgid) {
                        gc.parent = Some(pgid);
                    }
                }
            }
            self.remove_child_from_parent(parent_id, sibling_pgid)?;
            self.free_node(sibling_pgid);
            self.dirty.insert(pgid);
        } else {
            let node = cache::node(&mut self.cache, &self.backing, pgid, None)?.clone();
            {
                let prev = cache::node_mut(&mut self.cache, &self.backing, sibling_pgid, None)?;
                prev.inodes.extend(node.inodes.clone());
            }
            if !node.is_leaf {
                for inode in &node.inodes {
                    if let Some(gc) = self.cache.get_mut(&inode.pgid) {
                        gc.parent = Some(sibling_pgid);
                    }
                }
            }
            self.remove_child_from_parent(parent_id, pgid)?;
            self.free_node(pgid);
            self.dirty.insert(sibling_pgid);
        }

        Ok(parent_id)
    }

    fn remove_child_from_parent(&mut self, parent_id: PageId, child_id: PageId) -> Result<()> {
        let parent = cache::node_mut(&mut self.cache, &self.backing, parent_id, None)?;
        if let Some(pos) = parent.inodes.iter().position(|i| i.pgid == child_id) {
            parent.inodes.remove(pos);
        }
        self.dirty.insert(parent_id);
        Ok(())
    }

    fn free_node(&mut self, pgid: PageId) {
        self.cache.remove(&pgid);
        self.dirty.remove(&pgid);
    }

    /// Re-establish I2 along the leftmost spine: every branch's slot-0 key
    /// must equal its leftmost child's slot-0 key. Run unconditionally
    /// after every delete rather than only when the deleted key was the
    /// tree's minimum — idempotent, O(height), and also covers the
    /// cascading case where a leftmost leaf was merged away entirely.
    fn sync_leftmost_spine(&mut self) -> Result<()> {
        let mut path = Vec::new();
        let mut current = self.root;
        loop {
            path.push(current);
            let node = cache::node(&mut self.cache, &self.backing, current, None)?;
            if node.is_leaf || node.inodes.is_empty() {
                break;
            }
            current = node.inodes[0].pgid;
        }

        for pair in path.windows(2).rev() {
            let (parent_id, child_id) = (pair[0], pair[1]);
            let child_min = {
                let child = cache::node(&mut self.cache, &self.backing, child_id, None)?;
                if child.inodes.is_empty() {
                    continue;
                }
                child.inodes[0].key.clone()
            };
            let parent = cache::node_mut(&mut self.cache, &self.backing, parent_id, None)?;
            if parent.inodes.is_empty() {
                continue;
            }
            if parent.inodes[0].key != child_min {
                parent.inodes[0].key = child_min;
                self.dirty.insert(parent_id);
            }
        }
        Ok(())
    }

    fn allocate_page(&mut self) -> PageId {
        self.max_pgid = self.max_pgid.next();
        self.max_pgid
    }

    // -- commit, §4.9 -------------------------------------------------------

    fn commit(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let page_size = self.backing.page_size();
        let dirty: Vec<PageId> = self.dirty.drain().collect();
        for pgid in dirty {
            if let Some(node) = self.cache.get(&pgid) {
                let mut buf = vec![0u8; page_size];
                node.to_page(&mut buf);
                self.backing.write_page(pgid, &buf)?;
            }
        }

        let mut meta_buf = vec![0u8; page_size];
        Meta {
            page_size: page_size as u32,
            root: self.root,
            max_pgid: self.max_pgid,
        }
        .write(&mut meta_buf);
        self.backing.write_page(PageId::META, &meta_buf)?;
        self.backing.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_then_get() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut tree = BTree::open(&path, false)?;

        tree.put(b"hello".to_vec(), b"world".to_vec())?;
        assert_eq!(tree.get(b"hello")?, Some(b"world".to_vec()));
        assert_eq!(tree.get(b"missing")?, None);
        Ok(())
    }

    #[test]
    fn test_overwrite_keeps_single_inode() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut tree = BTree::open(&path, false)?;

        tree.put(b"k".to_vec(), b"v1".to_vec())?;
        tree.put(b"k".to_vec(), b"v2".to_vec())?;
        assert_eq!(tree.get(b"k")?, Some(b"v2".to_vec()));

        let root = cache::node(&mut tree.cache, &tree.backing, tree.root, None)?;
        assert_eq!(root.inodes.len(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_leftmost_updates_root_min_key() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut tree = BTree::open(&path, false)?;

        for i in 1000..1010 {
            tree.put(format!("hello{i}").into_bytes(), format!("world{i}").into_bytes())?;
        }
        tree.delete(b"hello1000")?;
        assert_eq!(tree.get(b"hello1000")?, None);
        assert_eq!(tree.get(b"hello1001")?, Some(b"world1001".to_vec()));
        Ok(())
    }

    #[test]
    fn test_reopen_persists_data() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut tree = BTree::open(&path, false)?;
            tree.put(b"a".to_vec(), b"1".to_vec())?;
            tree.put(b"b".to_vec(), b"2".to_vec())?;
        }

        let mut tree = BTree::open(&path, true)?;
        assert_eq!(tree.get(b"a")?, Some(b"1".to_vec()));
        assert_eq!(tree.get(b"b")?, Some(b"2".to_vec()));
        Ok(())
    }
}
