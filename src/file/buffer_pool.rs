use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::debug;

use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, FileManager};
use super::stats::Stats;
use super::{PAGE_SIZE, PageId};

/// Victim-selection policy for the buffer pool
///
/// Both policies maintain the same usage order (head = most recently
/// touched); they differ only in which end of the order is harvested at
/// eviction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Evict the least recently touched unpinned frame
    Lru,
    /// Evict the most recently touched unpinned frame
    Mru,
}

impl ReplacementPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ReplacementPolicy::Lru => "lru",
            ReplacementPolicy::Mru => "mru",
        }
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReplacementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(ReplacementPolicy::Lru),
            "mru" => Ok(ReplacementPolicy::Mru),
            other => Err(format!("unknown replacement policy: {}", other)),
        }
    }
}

/// Sentinel for absent usage-list links
const NIL: usize = usize::MAX;

/// A slot in the buffer pool holding one page
///
/// Frames live for the pool's lifetime; only their contents are swapped in
/// and out. `prev` points toward the most recently touched end of the usage
/// order, `next` toward the least recently touched end.
struct Frame {
    key: Option<(FileHandle, PageId)>,
    pin_count: u32,
    dirty: bool,
    prev: usize,
    next: usize,
    data: Box<[u8]>,
}

impl Frame {
    fn new() -> Self {
        Self {
            key: None,
            pin_count: 0,
            dirty: false,
            prev: NIL,
            next: NIL,
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        }
    }

    fn clear(&mut self) {
        self.key = None;
        self.pin_count = 0;
        self.dirty = false;
        self.prev = NIL;
        self.next = NIL;
    }
}

/// Fixed-capacity page cache with pin discipline and selectable eviction
///
/// The frame array is an arena addressed by frame index; the hash index
/// maps `(file, page)` to a frame index and lists a frame iff that frame
/// holds a page. Empty frames sit on the free list and appear in neither
/// the hash index nor the usage order.
pub struct BufferPool {
    /// Underlying raw file I/O
    file_manager: FileManager,
    /// Frame arena
    frames: Vec<Frame>,
    /// Hash index over resident pages
    page_table: HashMap<(FileHandle, PageId), usize>,
    /// Indices of empty frames
    free_frames: Vec<usize>,
    /// Most recently touched resident frame
    head: usize,
    /// Least recently touched resident frame
    tail: usize,
    /// Policy used when the caller does not supply one
    default_policy: ReplacementPolicy,
    /// Activity counters
    stats: Stats,
}

impl BufferPool {
    /// Create a pool with `capacity` frames
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(file_manager: FileManager, capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be > 0");

        Self {
            file_manager,
            frames: (0..capacity).map(|_| Frame::new()).collect(),
            page_table: HashMap::new(),
            free_frames: (0..capacity).rev().collect(),
            head: NIL,
            tail: NIL,
            default_policy: ReplacementPolicy::Lru,
            stats: Stats::new(),
        }
    }

    pub fn file_manager(&self) -> &FileManager {
        &self.file_manager
    }

    pub fn file_manager_mut(&mut self) -> &mut FileManager {
        &mut self.file_manager
    }

    /// Change the number of frames
    ///
    /// Rejected unless the pool holds no pages.
    pub fn set_capacity(&mut self, capacity: usize) -> FileResult<()> {
        assert!(capacity > 0, "pool capacity must be > 0");

        if !self.page_table.is_empty() {
            return Err(FileError::PoolNotEmpty);
        }

        self.frames = (0..capacity).map(|_| Frame::new()).collect();
        self.free_frames = (0..capacity).rev().collect();
        self.head = NIL;
        self.tail = NIL;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames currently holding a page
    pub fn resident_count(&self) -> usize {
        self.page_table.len()
    }

    pub fn default_policy(&self) -> ReplacementPolicy {
        self.default_policy
    }

    /// Change the policy used for fetches that do not override it
    pub fn set_default_policy(&mut self, policy: ReplacementPolicy) {
        self.default_policy = policy;
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Fetch a page, pinned, reading it from disk on a miss
    pub fn get(
        &mut self,
        file: FileHandle,
        page_id: PageId,
        policy: ReplacementPolicy,
    ) -> FileResult<usize> {
        let key = (file, page_id);

        if let Some(&idx) = self.page_table.get(&key) {
            self.touch(idx);
            self.frames[idx].pin_count += 1;
            self.stats.record_page_fix();
            return Ok(idx);
        }

        let idx = self.take_frame(policy)?;
        if let Err(e) = self
            .file_manager
            .read_page(file, page_id, &mut self.frames[idx].data)
        {
            self.free_frames.push(idx);
            return Err(e);
        }
        self.stats.record_physical_read();
        self.install(idx, key);
        Ok(idx)
    }

    /// Fetch a frame for a page without reading from disk
    ///
    /// Used when the file layer has just extended a file; the buffer comes
    /// back zeroed and pinned.
    pub fn alloc(
        &mut self,
        file: FileHandle,
        page_id: PageId,
        policy: ReplacementPolicy,
    ) -> FileResult<usize> {
        let key = (file, page_id);

        if let Some(&idx) = self.page_table.get(&key) {
            self.touch(idx);
            self.frames[idx].pin_count += 1;
            self.stats.record_page_fix();
            return Ok(idx);
        }

        let idx = self.take_frame(policy)?;
        self.frames[idx].data.fill(0);
        self.install(idx, key);
        Ok(idx)
    }

    /// Decrement a page's pin count, optionally marking it dirty
    pub fn unfix(&mut self, file: FileHandle, page_id: PageId, dirty: bool) -> FileResult<()> {
        let idx = *self
            .page_table
            .get(&(file, page_id))
            .ok_or(FileError::PageNotInBuf(page_id))?;

        let frame = &mut self.frames[idx];
        if frame.pin_count == 0 {
            return Err(FileError::PageUnfixed(page_id));
        }
        if dirty && !frame.dirty {
            frame.dirty = true;
            self.stats.record_dirty_mark();
        }
        frame.pin_count -= 1;
        Ok(())
    }

    /// Mark a pinned page dirty without unpinning it
    pub fn mark_dirty(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let idx = *self
            .page_table
            .get(&(file, page_id))
            .ok_or(FileError::PageNotInBuf(page_id))?;

        let frame = &mut self.frames[idx];
        if frame.pin_count == 0 {
            return Err(FileError::PageUnfixed(page_id));
        }
        if !frame.dirty {
            frame.dirty = true;
            self.stats.record_dirty_mark();
        }
        Ok(())
    }

    /// Write back all dirty frames of a file and evict every frame of it
    ///
    /// Fails without touching anything if any frame of the file is pinned.
    pub fn flush_file(&mut self, file: FileHandle) -> FileResult<()> {
        let entries: Vec<(PageId, usize)> = self
            .page_table
            .iter()
            .filter(|((f, _), _)| *f == file)
            .map(|((_, page), &idx)| (*page, idx))
            .collect();

        let pinned = entries
            .iter()
            .filter(|(_, idx)| self.frames[*idx].pin_count > 0)
            .count();
        if pinned > 0 {
            return Err(FileError::PagesStillFixed(pinned));
        }

        for (page, idx) in entries {
            if self.frames[idx].dirty {
                self.file_manager
                    .write_page(file, page, &self.frames[idx].data)?;
                self.stats.record_physical_write();
            }
            self.page_table.remove(&(file, page));
            self.unlink(idx);
            self.frames[idx].clear();
            self.free_frames.push(idx);
        }
        Ok(())
    }

    /// Drop a resident page without writing it back
    ///
    /// Used when the page's contents are dead (it is being put on the file's
    /// free list). Fails if the page is pinned; absent pages are a no-op.
    pub fn discard_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let idx = match self.page_table.get(&(file, page_id)) {
            Some(&idx) => idx,
            None => return Ok(()),
        };

        if self.frames[idx].pin_count > 0 {
            return Err(FileError::PageFixed(page_id));
        }

        self.page_table.remove(&(file, page_id));
        self.unlink(idx);
        self.frames[idx].clear();
        self.free_frames.push(idx);
        Ok(())
    }

    /// Current pin count of a page, 0 if not resident
    pub fn pin_count(&self, file: FileHandle, page_id: PageId) -> u32 {
        self.page_table
            .get(&(file, page_id))
            .map(|&idx| self.frames[idx].pin_count)
            .unwrap_or(0)
    }

    pub fn is_resident(&self, file: FileHandle, page_id: PageId) -> bool {
        self.page_table.contains_key(&(file, page_id))
    }

    pub fn page_data(&self, frame_idx: usize) -> &[u8] {
        &self.frames[frame_idx].data
    }

    pub fn page_data_mut(&mut self, frame_idx: usize) -> &mut [u8] {
        &mut self.frames[frame_idx].data
    }

    /// Obtain an empty frame, evicting a victim if no frame is free
    fn take_frame(&mut self, policy: ReplacementPolicy) -> FileResult<usize> {
        if let Some(idx) = self.free_frames.pop() {
            return Ok(idx);
        }
        let idx = self.select_victim(policy)?;
        self.evict(idx)?;
        Ok(idx)
    }

    /// Pick the frame the policy sacrifices, skipping pinned frames
    fn select_victim(&self, policy: ReplacementPolicy) -> FileResult<usize> {
        let mut cur = match policy {
            ReplacementPolicy::Lru => self.tail,
            ReplacementPolicy::Mru => self.head,
        };

        while cur != NIL {
            if self.frames[cur].pin_count == 0 {
                return Ok(cur);
            }
            cur = match policy {
                ReplacementPolicy::Lru => self.frames[cur].prev,
                ReplacementPolicy::Mru => self.frames[cur].next,
            };
        }
        Err(FileError::BufferExhausted)
    }

    /// Write back (if dirty) and empty the chosen victim frame
    fn evict(&mut self, idx: usize) -> FileResult<()> {
        let (file, page) = self.frames[idx].key.unwrap();

        if self.frames[idx].dirty {
            debug!("evicting dirty page {} (file {:?})", page, file);
            self.file_manager
                .write_page(file, page, &self.frames[idx].data)?;
            self.stats.record_physical_write();
        }

        self.page_table.remove(&(file, page));
        self.unlink(idx);
        self.frames[idx].clear();
        Ok(())
    }

    /// Give an empty frame its new identity, pinned at the usage-order head
    fn install(&mut self, idx: usize, key: (FileHandle, PageId)) {
        let frame = &mut self.frames[idx];
        frame.key = Some(key);
        frame.dirty = false;
        frame.pin_count = 1;
        self.push_head(idx);
        self.page_table.insert(key, idx);
        self.stats.record_page_fix();
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.frames[idx].prev, self.frames[idx].next);

        if prev != NIL {
            self.frames[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.frames[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.frames[idx].prev = NIL;
        self.frames[idx].next = NIL;
    }

    fn push_head(&mut self, idx: usize) {
        self.frames[idx].prev = NIL;
        self.frames[idx].next = self.head;
        if self.head != NIL {
            self.frames[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    /// Move a resident frame to the most-recently-touched position
    fn touch(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_head(idx);
    }
}
