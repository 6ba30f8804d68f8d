//! In-memory implementation of the storage port.

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};
use crate::storage::Storage;

/// Vec-backed page storage for tests and tooling.
///
/// Pages are stored as boxed byte arrays indexed by page id; the store grows
/// on write. Reads of never-written pages yield zeros, matching the port
/// contract.
pub struct MemoryStorage {
    pages: Vec<Option<Box<[u8; PAGE_SIZE]>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        match self.pages.get(page_id.0 as usize) {
            Some(Some(page)) => buf.copy_from_slice(&page[..]),
            _ => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), PAGE_SIZE);

        let idx = page_id.0 as usize;
        if idx >= self.pages.len() {
            self.pages.resize_with(idx + 1, || None);
        }

        let mut page = Box::new([0u8; PAGE_SIZE]);
        page.copy_from_slice(data);
        self.pages[idx] = Some(page);
        Ok(())
    }

    fn num_pages(&self) -> u32 {
        self.pages.len() as u32
    }
}
