//! Page layer: the fixed-size on-disk page format.
//!
//! A page is a page-sized byte block with a 12-byte header followed by an
//! array of fixed-size element descriptors and a heap of inline key/value
//! bytes. Page 0 is special-cased as the meta page (`meta`); data pages are
//! leaves or branches (`header`, `element`).

pub mod element;
pub mod header;
pub mod meta;

pub use element::{BranchElement, LeafElement, BRANCH_ELEMENT_SIZE, LEAF_ELEMENT_SIZE};
pub use header::{PageHeader, FLAG_BRANCH, FLAG_LEAF, FLAG_META, HEADER_SIZE};
pub use meta::{fnv1a64, Meta, META_SIZE};
