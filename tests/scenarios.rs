//! Crate-level scenario and property tests, grounding spec.md §8's
//! testable properties and concrete scenarios S1-S6 against the public
//! `Db` surface.

use bindex::{Config, Db, StorageError};
use rand::prelude::*;
use serial_test::serial;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn open(path: &std::path::Path) -> Db {
    Db::open(Config::new(path)).unwrap()
}

#[test]
fn s1_sequential_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s1.db");
    let db = open(&path);

    for i in 1000..1231 {
        db.put(format!("hello{i}").as_bytes(), format!("world{i}").as_bytes())
            .unwrap();
    }

    assert_eq!(db.get(b"hello1115").unwrap(), Some(b"world1115".to_vec()));
    assert_eq!(db.get(b"hello999").unwrap(), None);
    assert_eq!(db.get(b"hello1231").unwrap(), None);
}

#[test]
fn s2_deletion_of_leftmost() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s2.db");
    let db = open(&path);

    for i in 1000..1231 {
        db.put(format!("hello{i}").as_bytes(), format!("world{i}").as_bytes())
            .unwrap();
    }
    db.delete(b"hello1000").unwrap();

    assert_eq!(db.get(b"hello1000").unwrap(), None);
    assert_eq!(db.get(b"hello1001").unwrap(), Some(b"world1001".to_vec()));

    // The old minimum is gone and every other key is still reachable, which
    // only holds if the leftmost spine's separators were rewritten to the
    // new minimum rather than left pointing at a vanished key.
    for i in 1001..1231 {
        assert_eq!(
            db.get(format!("hello{i}").as_bytes()).unwrap(),
            Some(format!("world{i}").into_bytes())
        );
    }
}

#[test]
fn s3_overwrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s3.db");
    let db = open(&path);

    db.put(b"k", b"v1").unwrap();
    db.put(b"k", b"v2").unwrap();
    assert_eq!(db.get(b"k").unwrap(), Some(b"v2".to_vec()));

    let stats = db.stats().unwrap();
    assert_eq!(stats.height, 1);
}

#[test]
fn s4_root_split() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s4.db");
    let db = open(&path);

    // The page size is fixed at 4096 bytes and isn't part of the public
    // surface (§10.3), so the split is forced with enough ~20-byte entries
    // to exceed a page rather than by shrinking the page itself.
    let mut expected = Vec::new();
    for i in 0..400 {
        let key = format!("key{i:06}");
        let value = format!("value{i:06}");
        db.put(key.as_bytes(), value.as_bytes()).unwrap();
        expected.push((key, value));
    }

    let stats = db.stats().unwrap();
    assert!(stats.height >= 2, "enough entries must force at least one split");

    for (key, value) in &expected {
        assert_eq!(db.get(key.as_bytes()).unwrap(), Some(value.clone().into_bytes()));
    }
}

#[test]
fn s5_root_collapse() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s5.db");
    let db = open(&path);

    let keys: Vec<String> = (0..400).map(|i| format!("key{i:06}")).collect();
    for k in &keys {
        db.put(k.as_bytes(), b"v").unwrap();
    }
    let grown = db.stats().unwrap();
    assert!(grown.height >= 2);

    // Delete everything but a handful of keys; the root branch should
    // shrink back down to a single child and collapse into a leaf.
    for k in &keys[..keys.len() - 3] {
        db.delete(k.as_bytes()).unwrap();
    }

    let shrunk = db.stats().unwrap();
    assert_eq!(shrunk.height, 1);
    for k in &keys[keys.len() - 3..] {
        assert_eq!(db.get(k.as_bytes()).unwrap(), Some(b"v".to_vec()));
    }
}

#[test]
#[serial]
fn s6_persistence_and_lock_busy() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s6.db");

    {
        let db = open(&path);
        for i in 0..100 {
            db.put(format!("k{i:04}").as_bytes(), format!("v{i:04}").as_bytes())
                .unwrap();
        }
    }

    let reader = Db::open(Config::new(&path).read_only(true)).unwrap();
    for i in 0..100 {
        assert_eq!(
            reader.get(format!("k{i:04}").as_bytes()).unwrap(),
            Some(format!("v{i:04}").into_bytes())
        );
    }

    // A second writable open while the first (reader) handle is still
    // live must fail: the reader holds a shared lock, which conflicts
    // with the exclusive lock a writer needs.
    let second = Db::open(Config::new(&path));
    assert!(matches!(second, Err(StorageError::LockBusy)));
}

#[test]
fn p1_random_operations_match_oracle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("p1.db");
    let db = open(&path);

    let mut oracle: BTreeMap<String, String> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..2000 {
        let key = format!("k{:04}", rng.gen_range(0..300));
        if rng.gen_bool(0.7) {
            let value = format!("v{}", rng.gen_range(0..1_000_000));
            db.put(key.as_bytes(), value.as_bytes()).unwrap();
            oracle.insert(key, value);
        } else {
            db.delete(key.as_bytes()).unwrap();
            oracle.remove(&key);
        }
    }

    for (key, value) in &oracle {
        assert_eq!(db.get(key.as_bytes()).unwrap(), Some(value.clone().into_bytes()));
    }
    for i in 0..300 {
        let key = format!("k{i:04}");
        if !oracle.contains_key(&key) {
            assert_eq!(db.get(key.as_bytes()).unwrap(), None);
        }
    }
}

#[test]
fn p4_min_inode_invariant_holds_after_churn() {
    // Exercised indirectly through the public surface: a tree that never
    // violates the per-kind minimum never loses or duplicates a live key
    // across heavy split/merge churn, since a malformed tree would either
    // strand keys behind a collapsed branch or duplicate them across a
    // badly merged sibling. The structural invariant itself (every leaf
    // >= 1 inode, every non-root branch >= 2) is asserted directly in
    // `cache::node`'s and `btree::tree`'s own unit tests, which have
    // access to the private `Node` type this crate doesn't expose.
    let dir = tempdir().unwrap();
    let path = dir.path().join("p4.db");
    let db = open(&path);

    let keys: Vec<String> = (0..500).map(|i| format!("churn{i:05}")).collect();
    for k in &keys {
        db.put(k.as_bytes(), b"x").unwrap();
    }
    for k in keys.iter().step_by(2) {
        db.delete(k.as_bytes()).unwrap();
    }
    for k in keys.iter().step_by(2) {
        db.put(k.as_bytes(), b"y").unwrap();
    }

    for (i, k) in keys.iter().enumerate() {
        let expected: &[u8] = if i % 2 == 0 { b"y" } else { b"x" };
        assert_eq!(db.get(k.as_bytes()).unwrap(), Some(expected.to_vec()));
    }
}
