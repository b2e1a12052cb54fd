use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use log::{debug, warn};

use super::buffer_pool::{BufferPool, ReplacementPolicy};
use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, FileManager};
use super::stats::Stats;
use super::{DEFAULT_POOL_SIZE, PAGE_SIZE, PageId};

/// Sentinel for the end of the on-disk free-page chain
const NO_FREE_PAGE: i32 = -1;

/// File header stored in page 0
///
/// The layout is frozen: `first_free` as a little-endian i32 at offset 0,
/// `num_pages` (total pages including the header) at offset 4. Free pages
/// thread their successor's number through their first 4 bytes.
#[derive(Debug, Clone, Copy)]
struct FileHeader {
    first_free: i32,
    num_pages: i32,
}

impl FileHeader {
    const SIZE: usize = 8;

    fn serialize(&self) -> [u8; Self::SIZE] {
        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&self.first_free.to_le_bytes());
        result[4..8].copy_from_slice(&self.num_pages.to_le_bytes());
        result
    }

    fn deserialize(data: &[u8]) -> Self {
        let first_free = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let num_pages = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Self {
            first_free,
            num_pages,
        }
    }
}

/// Bookkeeping for one open paged file
struct OpenFile {
    /// Cached header, written back at close when dirty
    header: FileHeader,
    header_dirty: bool,
    /// Per-file replacement policy; None falls through to the pool default
    policy: Option<ReplacementPolicy>,
    /// Pages currently on the free list, seeded from disk at open
    free_pages: HashSet<PageId>,
}

/// File-level page API over the buffer pool
///
/// Adds per-file semantics to the frame cache: the header page, the on-disk
/// free-page list, page allocation and disposal, ordered iteration over
/// user pages, and pin-leak detection at close. Header and free-list
/// maintenance bypass the pool and its counters; only cached page traffic
/// is measured.
pub struct PagedFileManager {
    pool: BufferPool,
    open_files: HashMap<FileHandle, OpenFile>,
}

impl PagedFileManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_SIZE)
    }

    /// Create a manager whose pool has `capacity` frames
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: BufferPool::new(FileManager::new(), capacity),
            open_files: HashMap::new(),
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    /// Change the buffer pool capacity; only legal with no files open
    pub fn set_pool_capacity(&mut self, capacity: usize) -> FileResult<()> {
        if !self.open_files.is_empty() {
            return Err(FileError::PoolNotEmpty);
        }
        self.pool.set_capacity(capacity)
    }

    /// Change the pool-wide default policy; only legal with no files open
    pub fn set_default_policy(&mut self, policy: ReplacementPolicy) -> FileResult<()> {
        if !self.open_files.is_empty() || self.pool.resident_count() > 0 {
            return Err(FileError::PoolNotEmpty);
        }
        self.pool.set_default_policy(policy);
        Ok(())
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> Stats {
        *self.pool.stats()
    }

    pub fn reset_stats(&mut self) {
        self.pool.reset_stats();
    }

    pub fn print_stats<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.pool.stats().print_to(out)
    }

    /// Create an empty paged file with an initialized header page
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let fm = self.pool.file_manager_mut();
        fm.create_file(&path)?;
        let handle = fm.open_file(&path)?;

        let header = FileHeader {
            first_free: NO_FREE_PAGE,
            num_pages: 1,
        };
        let mut buf = vec![0u8; PAGE_SIZE];
        buf[..FileHeader::SIZE].copy_from_slice(&header.serialize());

        let result = fm
            .write_page(handle, 0, &buf)
            .and_then(|_| fm.sync_file(handle));
        let _ = fm.close_file(handle);
        result
    }

    /// Remove a paged file from persistent storage
    pub fn destroy_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if self.pool.file_manager().is_path_open(path) {
            return Err(FileError::FileOpen(path.display().to_string()));
        }
        self.pool.file_manager_mut().remove_file(path)
    }

    /// Open a paged file using the pool's default replacement policy
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        self.open_impl(path.as_ref(), None)
    }

    /// Open a paged file with a per-file replacement policy
    pub fn open_file_with_policy<P: AsRef<Path>>(
        &mut self,
        path: P,
        policy: ReplacementPolicy,
    ) -> FileResult<FileHandle> {
        self.open_impl(path.as_ref(), Some(policy))
    }

    fn open_impl(
        &mut self,
        path: &Path,
        policy: Option<ReplacementPolicy>,
    ) -> FileResult<FileHandle> {
        let handle = self.pool.file_manager_mut().open_file(path)?;
        if self.open_files.contains_key(&handle) {
            return Err(FileError::FileOpen(path.display().to_string()));
        }

        match Self::read_file_state(self.pool.file_manager_mut(), handle) {
            Ok((header, free_pages)) => {
                self.open_files.insert(
                    handle,
                    OpenFile {
                        header,
                        header_dirty: false,
                        policy,
                        free_pages,
                    },
                );
                Ok(handle)
            }
            Err(e) => {
                let _ = self.pool.file_manager_mut().close_file(handle);
                Err(e)
            }
        }
    }

    /// Read the header and walk the on-disk free chain
    fn read_file_state(
        fm: &mut FileManager,
        handle: FileHandle,
    ) -> FileResult<(FileHeader, HashSet<PageId>)> {
        let mut buf = vec![0u8; PAGE_SIZE];
        fm.read_page(handle, 0, &mut buf)?;
        let header = FileHeader::deserialize(&buf);

        if header.num_pages < 1 {
            return Err(FileError::InvalidFile(handle.as_usize()));
        }

        let mut free_pages = HashSet::new();
        let mut next = header.first_free;
        while next != NO_FREE_PAGE {
            if next < 0 || next as i64 >= header.num_pages as i64 {
                return Err(FileError::InvalidPage(next.max(0) as usize));
            }
            let page = next as usize;
            if page == 0 || !free_pages.insert(page) {
                return Err(FileError::InvalidPage(page));
            }
            fm.read_page(handle, page, &mut buf)?;
            next = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        }

        Ok((header, free_pages))
    }

    /// Flush the file's frames, write back the header and release the entry
    ///
    /// Reports `PagesStillFixed` (leaving the file open) if the caller has
    /// leaked pins.
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        if !self.open_files.contains_key(&handle) {
            return Err(FileError::InvalidFile(handle.as_usize()));
        }

        self.pool.flush_file(handle)?;

        let entry = self.open_files.remove(&handle).unwrap();
        if entry.header_dirty {
            let mut buf = vec![0u8; PAGE_SIZE];
            buf[..FileHeader::SIZE].copy_from_slice(&entry.header.serialize());
            self.pool.file_manager_mut().write_page(handle, 0, &buf)?;
        }
        self.pool.file_manager_mut().sync_file(handle)?;
        self.pool.file_manager_mut().close_file(handle)?;
        Ok(())
    }

    /// Override the replacement policy for subsequent misses on this file
    pub fn set_file_policy(
        &mut self,
        handle: FileHandle,
        policy: ReplacementPolicy,
    ) -> FileResult<()> {
        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidFile(handle.as_usize()))?;
        entry.policy = Some(policy);
        Ok(())
    }

    /// Total pages in the file, including the header page
    pub fn num_pages(&self, handle: FileHandle) -> FileResult<usize> {
        let entry = self
            .open_files
            .get(&handle)
            .ok_or(FileError::InvalidFile(handle.as_usize()))?;
        Ok(entry.header.num_pages as usize)
    }

    /// Number of pages currently on the file's free list
    pub fn free_page_count(&self, handle: FileHandle) -> FileResult<usize> {
        let entry = self
            .open_files
            .get(&handle)
            .ok_or(FileError::InvalidFile(handle.as_usize()))?;
        Ok(entry.free_pages.len())
    }

    /// Allocate a page, reusing the free-list head when possible
    ///
    /// The returned buffer is pinned and zeroed; the caller initializes it.
    pub fn alloc_page(&mut self, handle: FileHandle) -> FileResult<(PageId, &mut [u8])> {
        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidFile(handle.as_usize()))?;

        let page_id;
        if entry.header.first_free != NO_FREE_PAGE {
            page_id = entry.header.first_free as usize;
            let mut buf = vec![0u8; PAGE_SIZE];
            self.pool
                .file_manager_mut()
                .read_page(handle, page_id, &mut buf)?;
            entry.header.first_free = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            entry.free_pages.remove(&page_id);
            debug!("alloc reuses free page {} (file {:?})", page_id, handle);
        } else {
            page_id = entry.header.num_pages as usize;
            entry.header.num_pages += 1;
        }
        entry.header_dirty = true;

        let policy = entry.policy.unwrap_or(self.pool.default_policy());
        let idx = self.pool.alloc(handle, page_id, policy)?;
        Ok((page_id, self.pool.page_data_mut(idx)))
    }

    /// Put an unpinned page on the file's free list
    ///
    /// Fetching a disposed page afterwards is an error until it is
    /// reallocated.
    pub fn dispose_page(&mut self, handle: FileHandle, page_id: PageId) -> FileResult<()> {
        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidFile(handle.as_usize()))?;

        let num_pages = entry.header.num_pages as usize;
        if page_id == 0 || page_id >= num_pages || entry.free_pages.contains(&page_id) {
            return Err(FileError::InvalidPage(page_id));
        }

        // The page's contents are dead; drop any resident frame unwritten
        self.pool.discard_page(handle, page_id)?;

        let mut buf = vec![0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&entry.header.first_free.to_le_bytes());
        self.pool
            .file_manager_mut()
            .write_page(handle, page_id, &buf)?;

        entry.header.first_free = page_id as i32;
        entry.free_pages.insert(page_id);
        entry.header_dirty = true;
        Ok(())
    }

    /// Fetch a specific user page, pinned
    ///
    /// `PageFixed` is the one recoverable error: the page is already pinned
    /// and the existing pin count is left untouched. Every other failure is
    /// fatal to the operation.
    pub fn get_this_page(&mut self, handle: FileHandle, page_id: PageId) -> FileResult<&mut [u8]> {
        let entry = self
            .open_files
            .get(&handle)
            .ok_or(FileError::InvalidFile(handle.as_usize()))?;

        let num_pages = entry.header.num_pages as usize;
        if page_id == 0 || page_id >= num_pages || entry.free_pages.contains(&page_id) {
            return Err(FileError::InvalidPage(page_id));
        }
        if self.pool.pin_count(handle, page_id) > 0 {
            warn!("page {} already fixed (file {:?})", page_id, handle);
            return Err(FileError::PageFixed(page_id));
        }

        let policy = entry.policy.unwrap_or(self.pool.default_policy());
        let idx = self.pool.get(handle, page_id, policy)?;
        self.pool.stats_mut().record_logical_read();
        Ok(self.pool.page_data_mut(idx))
    }

    /// Fetch the lowest-numbered user page not on the free list
    pub fn get_first_page(&mut self, handle: FileHandle) -> FileResult<(PageId, &mut [u8])> {
        self.get_next_page(handle, 0)
    }

    /// Fetch the next user page after `prev`
    ///
    /// The caller may unfix `prev` before or after this call; the two pages
    /// are distinct so both orderings are safe.
    pub fn get_next_page(
        &mut self,
        handle: FileHandle,
        prev: PageId,
    ) -> FileResult<(PageId, &mut [u8])> {
        match self.next_user_page(handle, prev)? {
            Some(page_id) => {
                let buf = self.get_this_page(handle, page_id)?;
                Ok((page_id, buf))
            }
            None => Err(FileError::EndOfFile),
        }
    }

    /// Lowest user page greater than `prev`, skipping free pages; no I/O
    fn next_user_page(&self, handle: FileHandle, prev: PageId) -> FileResult<Option<PageId>> {
        let entry = self
            .open_files
            .get(&handle)
            .ok_or(FileError::InvalidFile(handle.as_usize()))?;

        let num_pages = entry.header.num_pages as usize;
        Ok(((prev + 1)..num_pages).find(|p| !entry.free_pages.contains(p)))
    }

    /// Release one pin, optionally marking the page dirty
    pub fn unfix_page(&mut self, handle: FileHandle, page_id: PageId, dirty: bool) -> FileResult<()> {
        if !self.open_files.contains_key(&handle) {
            return Err(FileError::InvalidFile(handle.as_usize()));
        }
        self.pool.unfix(handle, page_id, dirty)?;
        if dirty {
            self.pool.stats_mut().record_logical_write();
        }
        Ok(())
    }

    /// Mark a pinned page dirty without releasing it
    pub fn mark_dirty(&mut self, handle: FileHandle, page_id: PageId) -> FileResult<()> {
        if !self.open_files.contains_key(&handle) {
            return Err(FileError::InvalidFile(handle.as_usize()));
        }
        self.pool.mark_dirty(handle, page_id)
    }

    /// Start a scan over the file's user pages
    pub fn scan(&mut self, handle: FileHandle) -> PageScan<'_> {
        PageScan {
            mgr: self,
            handle,
            current: None,
            fixed: false,
        }
    }
}

impl Default for PagedFileManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy, non-restartable walk over a file's user pages
///
/// Each yielded page is pinned. The caller either calls
/// [`PageScan::unfix_current`] explicitly (to mark the page dirty) or lets
/// the next [`PageScan::next`] release it clean.
pub struct PageScan<'a> {
    mgr: &'a mut PagedFileManager,
    handle: FileHandle,
    current: Option<PageId>,
    fixed: bool,
}

impl PageScan<'_> {
    /// Advance to the next user page, releasing the previous one if needed
    ///
    /// Returns `Ok(None)` once the file is exhausted.
    pub fn next(&mut self) -> FileResult<Option<(PageId, &mut [u8])>> {
        if self.fixed {
            if let Some(page) = self.current {
                self.mgr.unfix_page(self.handle, page, false)?;
            }
            self.fixed = false;
        }

        let prev = self.current.unwrap_or(0);
        let page_id = match self.mgr.next_user_page(self.handle, prev)? {
            Some(page_id) => page_id,
            None => return Ok(None),
        };

        self.current = Some(page_id);
        self.fixed = true;
        match self.mgr.get_this_page(self.handle, page_id) {
            Ok(buf) => Ok(Some((page_id, buf))),
            Err(e) => {
                self.fixed = false;
                Err(e)
            }
        }
    }

    /// Release the currently yielded page
    pub fn unfix_current(&mut self, dirty: bool) -> FileResult<()> {
        let page = match self.current {
            Some(page) if self.fixed => page,
            Some(page) => return Err(FileError::PageUnfixed(page)),
            None => return Err(FileError::EndOfFile),
        };
        self.mgr.unfix_page(self.handle, page, dirty)?;
        self.fixed = false;
        Ok(())
    }
}

impl Drop for PageScan<'_> {
    fn drop(&mut self) {
        if self.fixed {
            if let Some(page) = self.current {
                let _ = self.mgr.unfix_page(self.handle, page, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(capacity: usize) -> (TempDir, PagedFileManager, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.pf");

        let mut mgr = PagedFileManager::with_capacity(capacity);
        mgr.create_file(&test_file).unwrap();
        let handle = mgr.open_file(&test_file).unwrap();

        (temp_dir, mgr, handle)
    }

    /// Allocate `n` pages tagged with their page number, unfixed dirty
    fn alloc_pages(mgr: &mut PagedFileManager, handle: FileHandle, n: usize) -> Vec<PageId> {
        let mut pages = Vec::new();
        for _ in 0..n {
            let (page_id, buf) = mgr.alloc_page(handle).unwrap();
            buf[0..4].copy_from_slice(&(page_id as i32).to_le_bytes());
            mgr.unfix_page(handle, page_id, true).unwrap();
            pages.push(page_id);
        }
        pages
    }

    #[test]
    fn test_create_writes_header() {
        let (_dir, mut mgr, handle) = setup(4);
        assert_eq!(mgr.num_pages(handle).unwrap(), 1);
        assert_eq!(mgr.free_page_count(handle).unwrap(), 0);
    }

    #[test]
    fn test_create_existing_file_fails() {
        let (dir, mut mgr, _handle) = setup(4);
        let result = mgr.create_file(dir.path().join("test.pf"));
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_alloc_appends_pages() {
        let (_dir, mut mgr, handle) = setup(4);
        let pages = alloc_pages(&mut mgr, handle, 3);
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(mgr.num_pages(handle).unwrap(), 4);
    }

    #[test]
    fn test_dispose_and_realloc_is_lifo() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 3);

        mgr.dispose_page(handle, 1).unwrap();
        mgr.dispose_page(handle, 2).unwrap();
        assert_eq!(mgr.free_page_count(handle).unwrap(), 2);

        let (page_id, _) = mgr.alloc_page(handle).unwrap();
        assert_eq!(page_id, 2);
        mgr.unfix_page(handle, page_id, false).unwrap();

        let (page_id, _) = mgr.alloc_page(handle).unwrap();
        assert_eq!(page_id, 1);
        mgr.unfix_page(handle, page_id, false).unwrap();

        // Free list drained, back to appending
        let (page_id, _) = mgr.alloc_page(handle).unwrap();
        assert_eq!(page_id, 4);
        mgr.unfix_page(handle, page_id, false).unwrap();
    }

    #[test]
    fn test_dispose_rejects_pinned_and_free_pages() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 2);

        mgr.get_this_page(handle, 1).unwrap();
        assert!(matches!(
            mgr.dispose_page(handle, 1),
            Err(FileError::PageFixed(1))
        ));
        mgr.unfix_page(handle, 1, false).unwrap();

        mgr.dispose_page(handle, 1).unwrap();
        assert!(matches!(
            mgr.dispose_page(handle, 1),
            Err(FileError::InvalidPage(1))
        ));
    }

    #[test]
    fn test_get_this_validates_page_number() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 2);

        assert!(matches!(
            mgr.get_this_page(handle, 0),
            Err(FileError::InvalidPage(0))
        ));
        assert!(matches!(
            mgr.get_this_page(handle, 9),
            Err(FileError::InvalidPage(9))
        ));

        mgr.dispose_page(handle, 2).unwrap();
        assert!(matches!(
            mgr.get_this_page(handle, 2),
            Err(FileError::InvalidPage(2))
        ));
    }

    #[test]
    fn test_refetching_fixed_page_is_recoverable() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 1);

        mgr.get_this_page(handle, 1).unwrap();
        assert!(matches!(
            mgr.get_this_page(handle, 1),
            Err(FileError::PageFixed(1))
        ));
        // Pre-existing pin untouched: one unfix balances, a second errors
        assert_eq!(mgr.pool().pin_count(handle, 1), 1);
        mgr.unfix_page(handle, 1, false).unwrap();
        assert!(matches!(
            mgr.unfix_page(handle, 1, false),
            Err(FileError::PageUnfixed(1))
        ));
    }

    #[test]
    fn test_iteration_skips_free_pages() {
        let (_dir, mut mgr, handle) = setup(8);
        alloc_pages(&mut mgr, handle, 4);
        mgr.dispose_page(handle, 2).unwrap();

        let mut seen = Vec::new();
        let (mut page_id, _) = mgr.get_first_page(handle).unwrap();
        loop {
            seen.push(page_id);
            mgr.unfix_page(handle, page_id, false).unwrap();
            match mgr.get_next_page(handle, page_id) {
                Ok((next, _)) => page_id = next,
                Err(FileError::EndOfFile) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(seen, vec![1, 3, 4]);
    }

    #[test]
    fn test_iteration_tolerates_unfix_after_next() {
        // The caller may hold the previous page across the next fetch and
        // release it afterwards.
        let (_dir, mut mgr, handle) = setup(8);
        alloc_pages(&mut mgr, handle, 3);

        let (mut prev, _) = mgr.get_first_page(handle).unwrap();
        loop {
            match mgr.get_next_page(handle, prev) {
                Ok((next, _)) => {
                    mgr.unfix_page(handle, prev, false).unwrap();
                    prev = next;
                }
                Err(FileError::EndOfFile) => {
                    mgr.unfix_page(handle, prev, false).unwrap();
                    break;
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        mgr.close_file(handle).unwrap();
    }

    #[test]
    fn test_mark_dirty_without_unpinning() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 1);
        mgr.reset_stats();

        let buf = mgr.get_this_page(handle, 1).unwrap();
        buf[100] = 0x42;
        mgr.mark_dirty(handle, 1).unwrap();
        assert_eq!(mgr.pool().pin_count(handle, 1), 1);
        // Clean release still persists the marked page
        mgr.unfix_page(handle, 1, false).unwrap();
        mgr.close_file(handle).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.dirty_marks, 1);
        assert_eq!(stats.physical_writes, 1);
        assert_eq!(stats.logical_writes, 0);
    }

    #[test]
    fn test_get_first_page_empty_file() {
        let (_dir, mut mgr, handle) = setup(4);
        assert!(matches!(
            mgr.get_first_page(handle),
            Err(FileError::EndOfFile)
        ));
    }

    #[test]
    fn test_close_detects_pin_leak() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 1);

        mgr.get_this_page(handle, 1).unwrap();
        assert!(matches!(
            mgr.close_file(handle),
            Err(FileError::PagesStillFixed(1))
        ));

        mgr.unfix_page(handle, 1, false).unwrap();
        mgr.close_file(handle).unwrap();
    }

    #[test]
    fn test_header_and_free_list_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.pf");

        let mut mgr = PagedFileManager::with_capacity(4);
        mgr.create_file(&path).unwrap();
        let handle = mgr.open_file(&path).unwrap();
        alloc_pages(&mut mgr, handle, 3);
        mgr.dispose_page(handle, 2).unwrap();
        mgr.close_file(handle).unwrap();

        let handle = mgr.open_file(&path).unwrap();
        assert_eq!(mgr.num_pages(handle).unwrap(), 4);
        assert_eq!(mgr.free_page_count(handle).unwrap(), 1);

        let (page_id, _) = mgr.alloc_page(handle).unwrap();
        assert_eq!(page_id, 2);
        mgr.unfix_page(handle, page_id, false).unwrap();
        mgr.close_file(handle).unwrap();
    }

    #[test]
    fn test_round_trip_through_pool_turnover() {
        // Pool far smaller than the page set: every page is evicted and
        // read back from disk at least once.
        let (_dir, mut mgr, handle) = setup(2);
        let pages = alloc_pages(&mut mgr, handle, 6);

        for &page_id in &pages {
            let buf = mgr.get_this_page(handle, page_id).unwrap();
            let tag = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            assert_eq!(tag, page_id as i32);
            mgr.unfix_page(handle, page_id, false).unwrap();
        }
        assert!(mgr.stats().physical_writes >= 4);
        mgr.close_file(handle).unwrap();
    }

    #[test]
    fn test_logical_counter_semantics() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 2);
        mgr.reset_stats();

        mgr.get_this_page(handle, 1).unwrap();
        mgr.unfix_page(handle, 1, true).unwrap();
        mgr.get_this_page(handle, 2).unwrap();
        mgr.unfix_page(handle, 2, false).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.logical_reads, 2);
        assert_eq!(stats.logical_writes, 1);

        // alloc_page is not a logical read
        let (page_id, _) = mgr.alloc_page(handle).unwrap();
        mgr.unfix_page(handle, page_id, false).unwrap();
        assert_eq!(mgr.stats().logical_reads, 2);
    }

    #[test]
    fn test_scan_yields_all_live_pages() {
        let (_dir, mut mgr, handle) = setup(8);
        alloc_pages(&mut mgr, handle, 4);
        mgr.dispose_page(handle, 3).unwrap();

        let mut seen = Vec::new();
        let mut scan = mgr.scan(handle);
        while let Some((page_id, buf)) = scan.next().unwrap() {
            let tag = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
            assert_eq!(tag, page_id as i32);
            seen.push(page_id);
        }
        drop(scan);

        assert_eq!(seen, vec![1, 2, 4]);
        // Scan released every pin, so close succeeds
        mgr.close_file(handle).unwrap();
    }

    #[test]
    fn test_scan_unfix_current_dirty() {
        let (_dir, mut mgr, handle) = setup(4);
        alloc_pages(&mut mgr, handle, 2);
        mgr.reset_stats();

        let mut scan = mgr.scan(handle);
        while let Some((_, buf)) = scan.next().unwrap() {
            buf[8] = 0xEE;
            scan.unfix_current(true).unwrap();
        }
        drop(scan);

        let stats = mgr.stats();
        assert_eq!(stats.logical_writes, 2);
        assert_eq!(stats.dirty_marks, 2);
    }

    #[test]
    fn test_destroy_open_file_fails() {
        let (dir, mut mgr, handle) = setup(4);
        let path = dir.path().join("test.pf");

        assert!(matches!(
            mgr.destroy_file(&path),
            Err(FileError::FileOpen(_))
        ));

        mgr.close_file(handle).unwrap();
        mgr.destroy_file(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_config_rejected_while_file_open() {
        let (_dir, mut mgr, handle) = setup(4);

        assert!(matches!(
            mgr.set_pool_capacity(8),
            Err(FileError::PoolNotEmpty)
        ));
        assert!(matches!(
            mgr.set_default_policy(ReplacementPolicy::Mru),
            Err(FileError::PoolNotEmpty)
        ));

        mgr.close_file(handle).unwrap();
        mgr.set_pool_capacity(8).unwrap();
        mgr.set_default_policy(ReplacementPolicy::Mru).unwrap();
    }

    #[test]
    fn test_file_policy_override_takes_effect() {
        // With an MRU override on the file, a 3-frame pool scanning 0..6
        // twice re-reads only one page on the second pass instead of all.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mru.pf");

        let mut mgr = PagedFileManager::with_capacity(5);
        mgr.create_file(&path).unwrap();
        let handle = mgr.open_file_with_policy(&path, ReplacementPolicy::Mru).unwrap();
        let pages = alloc_pages(&mut mgr, handle, 6);

        for &page_id in &pages {
            mgr.get_this_page(handle, page_id).unwrap();
            mgr.unfix_page(handle, page_id, false).unwrap();
        }
        mgr.reset_stats();
        for &page_id in &pages {
            mgr.get_this_page(handle, page_id).unwrap();
            mgr.unfix_page(handle, page_id, false).unwrap();
        }
        assert_eq!(mgr.stats().physical_reads, 1);
        mgr.close_file(handle).unwrap();
    }
}
