//! File backing: open/create, advisory locking, memory-mapping, and
//! positional writes for the database file.

use crate::error::{Result, StorageError};
use crate::page::{Meta, META_SIZE};
use crate::types::{PageId, MAX_MAP_SIZE, PAGE_SIZE};
use fs2::FileExt;
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

enum Mapping {
    ReadOnly(Mmap),
    Writable(MmapMut),
}

impl Mapping {
    fn as_slice(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(m) => m,
            Mapping::Writable(m) => m,
        }
    }
}

/// Owns the open file handle, its advisory lock, and the current
/// memory-mapping. Pages are read by viewing into the mapping; they are
/// written through positional file writes, after which the mapping is
/// remapped if the write extended the file.
pub struct FileBacking {
    file: File,
    mapping: Mapping,
    read_only: bool,
    page_size: usize,
    path: PathBuf,
}

impl FileBacking {
    /// Open or create the database file at `path`.
    ///
    /// On an empty (freshly created) file, writes the initial two-page
    /// image: meta at page 0 (root = maxPgid = 1) and an empty leaf at
    /// page 1.
    pub fn open(path: &Path, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(path)?;

        if read_only {
            file.try_lock_shared().map_err(|_| StorageError::LockBusy)?;
        } else {
            file.try_lock_exclusive().map_err(|_| StorageError::LockBusy)?;
        }

        let len = file.metadata()?.len();
        if len > MAX_MAP_SIZE {
            return Err(StorageError::FileTooLarge);
        }

        if len == 0 {
            if read_only {
                return Err(StorageError::invalid(
                    "cannot create a new database file in read-only mode",
                ));
            }
            Self::init_empty(&file, PAGE_SIZE)?;
        }

        let mapping = Self::map(&file, read_only)?;
        let meta = Meta::read(&mapping.as_slice()[..META_SIZE])?;

        Ok(Self {
            file,
            mapping,
            read_only,
            page_size: meta.page_size as usize,
            path: path.to_path_buf(),
        })
    }

    fn init_empty(file: &File, page_size: usize) -> Result<()> {
        let mut buf = vec![0u8; page_size * 2];
        Meta::fresh(page_size as u32).write(&mut buf[..page_size]);
        crate::page::PageHeader::new_leaf(PageId::new(1)).write(&mut buf[page_size..page_size + crate::page::HEADER_SIZE]);

        let mut f = file;
        f.seek(SeekFrom::Start(0))?;
        f.write_all(&buf)?;
        f.sync_all()?;
        Ok(())
    }

    fn map(file: &File, read_only: bool) -> Result<Mapping> {
        if read_only {
            let mmap = unsafe { Mmap::map(file)? };
            Ok(Mapping::ReadOnly(mmap))
        } else {
            let mmap = unsafe { MmapMut::map_mut(file)? };
            Ok(Mapping::Writable(mmap))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages currently mapped (including the meta page).
    pub fn mapped_pages(&self) -> u64 {
        self.mapping.as_slice().len() as u64 / self.page_size as u64
    }

    /// Read the current meta page.
    pub fn read_meta(&self) -> Result<Meta> {
        Meta::read(&self.mapping.as_slice()[..META_SIZE])
    }

    /// View the bytes of page `id` through `f`. Scoped access avoids handing
    /// out a slice that aliases the mapping across a later remap.
    pub fn read_page<T>(&self, id: PageId, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        let offset = id.file_offset(self.page_size) as usize;
        let end = offset + self.page_size;
        let slice = self.mapping.as_slice();
        if end > slice.len() {
            return Err(StorageError::PageNotFound(id.value()));
        }
        Ok(f(&slice[offset..end]))
    }

    /// Write `data` (exactly one page's worth of bytes) to page `id`,
    /// growing and remapping the file first if `id` lies past the current
    /// mapping.
    pub fn write_page(&mut self, id: PageId, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.page_size);
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let offset = id.file_offset(self.page_size);
        let required_len = offset + self.page_size as u64;
        if required_len > self.mapping.as_slice().len() as u64 {
            self.grow_to(required_len)?;
        }

        let mut f = &self.file;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }

    fn grow_to(&mut self, len: u64) -> Result<()> {
        if len > MAX_MAP_SIZE {
            return Err(StorageError::FileTooLarge);
        }
        self.file.set_len(len)?;
        self.mapping = unsafe {
            Mapping::Writable(MmapOptions::new().len(len as usize).map_mut(&self.file)?)
        };
        Ok(())
    }

    /// fsync the file.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl Drop for FileBacking {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_initial_image() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let backing = FileBacking::open(&path, false)?;
        let meta = backing.read_meta()?;
        assert_eq!(meta.root.value(), 1);
        assert_eq!(meta.max_pgid.value(), 1);
        Ok(())
    }

    #[test]
    fn test_exclusive_lock_conflicts() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let _first = FileBacking::open(&path, false)?;
        let second = FileBacking::open(&path, false);
        assert!(matches!(second, Err(StorageError::LockBusy)));
        Ok(())
    }

    #[test]
    fn test_write_then_read_page() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut backing = FileBacking::open(&path, false)?;
        let page_size = backing.page_size();
        let mut data = vec![0u8; page_size];
        data[0] = 0xAB;
        backing.write_page(PageId::new(1), &data)?;
        backing.sync()?;

        let first_byte = backing.read_page(PageId::new(1), |bytes| bytes[0])?;
        assert_eq!(first_byte, 0xAB);
        Ok(())
    }

    #[test]
    fn test_grow_on_write_past_end() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut backing = FileBacking::open(&path, false)?;
        let page_size = backing.page_size();
        let data = vec![0u8; page_size];
        backing.write_page(PageId::new(5), &data)?;
        assert!(backing.mapped_pages() >= 6);
        Ok(())
    }
}
