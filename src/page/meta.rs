//! The meta page: page id 0, holding tree-wide metadata and a checksum.

use crate::error::{Result, StorageError};
use crate::types::{PageId, MAGIC, VERSION};

/// Byte size of the serialized meta page (the part that matters; the rest
/// of page 0 is unused padding up to the file's page size).
pub const META_SIZE: usize = 36;

/// Number of leading bytes (magic..maxPgid) covered by the checksum.
const CHECKSUM_RANGE: usize = 28;

/// Tree-wide metadata, persisted at page id 0.
///
/// Layout (little-endian):
/// ```text
/// Offset  Size  Field
/// 0       4     magic
/// 4       4     version
/// 8       4     page_size
/// 12      8     root
/// 20      8     max_pgid
/// 28      8     checksum (FNV-1a over bytes [0, 28))
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub page_size: u32,
    pub root: PageId,
    pub max_pgid: PageId,
}

impl Meta {
    /// Meta describing a freshly created, empty database: root and the only
    /// allocated data page are both page 1.
    pub fn fresh(page_size: u32) -> Self {
        Self {
            page_size,
            root: PageId::new(1),
            max_pgid: PageId::new(1),
        }
    }

    /// Serialize into a full page-sized buffer (trailing bytes zeroed).
    pub fn write(&self, page: &mut [u8]) {
        page[..META_SIZE].fill(0);
        page[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        page[4..8].copy_from_slice(&VERSION.to_le_bytes());
        page[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        page[12..20].copy_from_slice(&self.root.value().to_le_bytes());
        page[20..28].copy_from_slice(&self.max_pgid.value().to_le_bytes());
        let checksum = fnv1a64(&page[0..CHECKSUM_RANGE]);
        page[28..36].copy_from_slice(&checksum.to_le_bytes());
    }

    /// Parse and validate a meta page. Checks magic, version, and checksum
    /// in that order, matching the order a corrupted file is most likely to
    /// fail in.
    pub fn read(page: &[u8]) -> Result<Self> {
        if page.len() < META_SIZE {
            return Err(StorageError::invalid("meta page truncated"));
        }
        let magic = u32::from_le_bytes(page[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(StorageError::invalid(format!(
                "bad magic: found {:#010x}, expected {:#010x}",
                magic, MAGIC
            )));
        }
        let version = u32::from_le_bytes(page[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(StorageError::VersionMismatch {
                found: version,
                expected: VERSION,
            });
        }
        let page_size = u32::from_le_bytes(page[8..12].try_into().unwrap());
        let root = u64::from_le_bytes(page[12..20].try_into().unwrap());
        let max_pgid = u64::from_le_bytes(page[20..28].try_into().unwrap());
        let stored_checksum = u64::from_le_bytes(page[28..36].try_into().unwrap());

        let computed = fnv1a64(&page[0..CHECKSUM_RANGE]);
        if computed != stored_checksum {
            return Err(StorageError::Checksum);
        }

        Ok(Self {
            page_size,
            root: PageId::new(root),
            max_pgid: PageId::new(max_pgid),
        })
    }
}

/// FNV-1a (64-bit) hash, matching the checksum algorithm spec.md prescribes.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
