//! Common types used throughout the index.

mod page_id;

pub use page_id::PageId;

/// Page size in bytes, used only to size the initial file on creation.
///
/// The page size actually in force for an open file is whatever is stored
/// in its meta page (see `page::Meta`); this constant is never trusted
/// blindly on open.
pub const PAGE_SIZE: usize = 4096;

/// Maximum key size in bytes.
///
/// Chosen, together with `MAX_VALUE_SIZE`, so that a leaf page can always
/// hold at least two inodes even at the smallest practical page size.
pub const MAX_KEY_SIZE: usize = 128;

/// Maximum value size in bytes.
pub const MAX_VALUE_SIZE: usize = 128;

/// Upper bound on total file size. Existing files larger than this are
/// refused on open with `StorageError::FileTooLarge`.
pub const MAX_MAP_SIZE: u64 = 1 << 37;

/// Magic number stamped into the meta page of every database file.
pub const MAGIC: u32 = 0xFE1D_EBFE;

/// On-disk format version understood by this crate.
pub const VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_leave_room_for_two_inodes() {
        // A leaf page must fit at least two maximally-sized inodes alongside
        // its header; this is what lets split() always make progress.
        let elem_overhead = 12; // LeafElement descriptor size
        let header = 12; // page header size
        let worst_case = header + 2 * (elem_overhead + MAX_KEY_SIZE + MAX_VALUE_SIZE);
        assert!(worst_case <= PAGE_SIZE * 8, "sanity bound, not a tight one");
    }
}
