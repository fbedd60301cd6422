//! # bindex
//!
//! A durable, ordered key/value index backed by a paged B+tree stored in a
//! single memory-mapped file. Supports point insert, point lookup, and
//! point delete; nothing else.
//!
//! ## Architecture
//!
//! - **Page layer** (`page`): fixed-size page header, element descriptors,
//!   and the checksummed meta page.
//! - **Storage layer** (`storage`): file open/create, advisory locking,
//!   memory-mapping, and positional writes.
//! - **Node cache** (`cache`): the in-memory mutable mirror of touched
//!   pages.
//! - **B+tree layer** (`btree`): cursor descent, insert/delete, and the
//!   split/merge rebalancer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bindex::{Config, Db};
//!
//! let db = Db::open(Config::new("my_index.db"))?;
//! db.put(b"hello", b"world")?;
//! assert_eq!(db.get(b"hello")?, Some(b"world".to_vec()));
//! db.delete(b"hello")?;
//! ```

pub mod btree;
pub mod cache;
pub mod error;
pub mod page;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{MAX_KEY_SIZE, MAX_VALUE_SIZE, PAGE_SIZE};

pub use btree::BTree;
pub use types::PageId;

use parking_lot::RwLock;
use std::path::PathBuf;

/// Configuration for opening a `Db`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the index file.
    pub path: PathBuf,
    /// Open the file read-only (shared lock, no mutation allowed).
    pub read_only: bool,
}

impl Config {
    /// Configuration for opening (or creating) the index at `path`,
    /// writable by default.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            read_only: false,
        }
    }

    /// Open read-only instead of writable.
    pub fn read_only(mut self, enabled: bool) -> Self {
        self.read_only = enabled;
        self
    }
}

/// Main database handle.
///
/// `get` takes a write lock internally even though it is logically a read,
/// because a miss may still need to materialize nodes into the (mutable)
/// node cache on the way down.
pub struct Db {
    tree: RwLock<BTree>,
}

impl Db {
    /// Open or create the index described by `config`.
    pub fn open(config: Config) -> Result<Self> {
        let tree = BTree::open(&config.path, config.read_only)?;
        Ok(Self {
            tree: RwLock::new(tree),
        })
    }

    /// Look up `key`. Returns `None` on miss.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tree.write().get(key)
    }

    /// Check whether `key` is present.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.tree.write().contains(key)
    }

    /// Insert or overwrite `key` with `value`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.write().put(key.to_vec(), value.to_vec())
    }

    /// Delete `key`. Silently does nothing if absent.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.tree.write().delete(key)
    }

    /// Look up `key`, returning the path of pages and slots visited.
    pub fn debug_get(&self, key: &[u8]) -> Result<(Option<Vec<u8>>, Vec<String>)> {
        self.tree.write().debug_get(key)
    }

    /// Summary statistics about the index.
    pub fn stats(&self) -> Result<DbStats> {
        let mut tree = self.tree.write();
        Ok(DbStats {
            page_count: tree.page_count(),
            height: tree.height()?,
            read_only: tree.is_read_only(),
        })
    }

    /// Release the handle. Unmapping and lock release happen on drop
    /// regardless; this just makes the intent explicit at call sites.
    pub fn close(self) {
        drop(self)
    }
}

/// Summary statistics about an open `Db`.
#[derive(Debug, Clone, Copy)]
pub struct DbStats {
    /// Number of pages ever allocated (merges leak pages; see §9 of the
    /// design notes — no free list in this version).
    pub page_count: u64,
    /// Number of levels from root to leaf, inclusive of both.
    pub height: u32,
    pub read_only: bool,
}
