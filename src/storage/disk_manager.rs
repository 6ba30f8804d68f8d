//! Disk manager - single-file disk implementation of the storage port.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};
use crate::storage::Storage;

/// File-backed page storage.
///
/// # File Layout
/// The database is stored as a single file with pages laid out sequentially;
/// page N lives at file offset `N × PAGE_SIZE`.
///
/// # Thread Safety
/// `DiskManager` is single-threaded; the buffer pool serializes access to it.
///
/// # Durability
/// Every write is followed by `fsync()`. Conservative, but this layer has no
/// log to lean on.
pub struct DiskManager {
    file: File,
    /// Number of pages currently persisted in the file.
    page_count: u32,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            page_count: 0,
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self { file, page_count })
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Get the number of pages in the database file.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

impl Storage for DiskManager {
    /// Read a page from disk.
    ///
    /// A page beyond the current file extent has never been written back;
    /// it reads as zeros (pages materialize lazily).
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        if page_id.0 >= self.page_count {
            buf.fill(0);
            return Ok(());
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;

        Ok(())
    }

    /// Write a page to disk, extending the file as needed.
    fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), PAGE_SIZE);

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;

        if page_id.0 >= self.page_count {
            self.page_count = page_id.0 + 1;
        }

        Ok(())
    }

    fn num_pages(&self) -> u32 {
        self.page_count
    }
}
