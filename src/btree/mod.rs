//! B+tree implementation: point lookup, insert, delete, and the rebalancer
//! that keeps the tree's structural invariants after each.

mod cursor;
mod tree;

pub use cursor::Cursor;
pub use tree::BTree;
