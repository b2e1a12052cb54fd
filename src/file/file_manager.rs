use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageId};

/// Handle to an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Raw page-granular file I/O
///
/// Keeps the table of open OS files and moves whole pages between disk and
/// caller-supplied buffers. Everything above this (caching, headers, free
/// lists) belongs to the buffer pool and the paged-file layer.
pub struct FileManager {
    /// Map from file handles to open files
    open_files: HashMap<FileHandle, FileEntry>,
    /// Map from file paths to handles (for checking if already open)
    path_to_handle: HashMap<PathBuf, FileHandle>,
    /// Next available file handle
    next_handle: usize,
    /// Maximum number of open files
    max_open_files: usize,
}

struct FileEntry {
    file: File,
    path: PathBuf,
}

impl FileManager {
    pub fn new() -> Self {
        Self::with_max_files(128)
    }

    /// Create a file manager with the specified open-file limit
    pub fn with_max_files(max_open_files: usize) -> Self {
        Self {
            open_files: HashMap::new(),
            path_to_handle: HashMap::new(),
            next_handle: 0,
            max_open_files,
        }
    }

    /// Create a new, empty file
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        File::create(path)?;
        Ok(())
    }

    /// Open an existing file
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        // Opening an already-open path yields the existing handle
        if let Some(&handle) = self.path_to_handle.get(&path) {
            return Ok(handle);
        }

        if self.open_files.len() >= self.max_open_files {
            return Err(FileError::TooManyOpenFiles);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let handle = FileHandle(self.next_handle);
        self.next_handle += 1;

        self.open_files.insert(
            handle,
            FileEntry {
                file,
                path: path.clone(),
            },
        );
        self.path_to_handle.insert(path, handle);

        Ok(handle)
    }

    /// Close a file
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let entry = self
            .open_files
            .remove(&handle)
            .ok_or(FileError::InvalidFile(handle.0))?;

        self.path_to_handle.remove(&entry.path);
        Ok(())
    }

    /// Remove (delete) a file from persistent storage
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if let Ok(canonical_path) = path.canonicalize() {
            if let Some(&handle) = self.path_to_handle.get(&canonical_path) {
                self.close_file(handle)?;
            }
        }

        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Check whether a path is currently open
    pub fn is_path_open<P: AsRef<Path>>(&self, path: P) -> bool {
        match path.as_ref().canonicalize() {
            Ok(canonical) => self.path_to_handle.contains_key(&canonical),
            Err(_) => false,
        }
    }

    /// Read a page into the supplied buffer
    ///
    /// Reading past the end of the file yields zero bytes, matching the
    /// contents a freshly extended page would have.
    pub fn read_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        if buffer.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidFile(handle.0))?;

        let offset = (page_id * PAGE_SIZE) as u64;
        entry.file.seek(SeekFrom::Start(offset))?;

        let bytes_read = entry.file.read(buffer)?;
        if bytes_read < PAGE_SIZE {
            buffer[bytes_read..].fill(0);
        }

        Ok(())
    }

    /// Write a page from the supplied buffer
    pub fn write_page(
        &mut self,
        handle: FileHandle,
        page_id: PageId,
        buffer: &[u8],
    ) -> FileResult<()> {
        if buffer.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidFile(handle.0))?;

        let offset = (page_id * PAGE_SIZE) as u64;
        let required_size = offset + PAGE_SIZE as u64;

        // Extend the file if necessary so the write lands in bounds
        let current_size = entry.file.metadata()?.len();
        if current_size < required_size {
            entry.file.set_len(required_size)?;
        }

        entry.file.seek(SeekFrom::Start(offset))?;
        entry.file.write_all(buffer)?;

        Ok(())
    }

    /// Get the number of pages in a file
    pub fn page_count(&mut self, handle: FileHandle) -> FileResult<usize> {
        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidFile(handle.0))?;

        let file_size = entry.file.metadata()?.len();
        Ok(file_size.div_ceil(PAGE_SIZE as u64) as usize)
    }

    /// Sync a file to disk (flush all OS buffers)
    pub fn sync_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidFile(handle.0))?;

        entry.file.sync_data()?;
        Ok(())
    }

    /// Check if a file is open
    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.open_files.contains_key(&handle)
    }

    /// Get the number of currently open files
    pub fn open_file_count(&self) -> usize {
        self.open_files.len()
    }
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tagged_page(tag: u8) -> Vec<u8> {
        let mut buf = vec![0u8; PAGE_SIZE];
        buf[0] = tag;
        buf[PAGE_SIZE - 1] = tag;
        buf
    }

    fn setup_file(name: &str) -> (TempDir, FileManager, FileHandle) {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = FileManager::new();
        let path = dir.path().join(name);
        manager.create_file(&path).unwrap();
        let handle = manager.open_file(&path).unwrap();
        (dir, manager, handle)
    }

    #[test]
    fn test_sparse_write_extends_with_zeroed_gap() {
        // The paged layer writes the header at page 0 and data pages out
        // of order; the gap a high write opens must read back as zeros.
        let (_dir, mut manager, handle) = setup_file("sparse.pf");

        manager.write_page(handle, 5, &tagged_page(0x55)).unwrap();
        assert_eq!(manager.page_count(handle).unwrap(), 6);

        let mut buf = vec![0xFFu8; PAGE_SIZE];
        manager.read_page(handle, 3, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        manager.read_page(handle, 5, &mut buf).unwrap();
        assert_eq!(buf[0], 0x55);
        assert_eq!(buf[PAGE_SIZE - 1], 0x55);
    }

    #[test]
    fn test_read_past_end_is_all_zeros() {
        // Free-list bootstrap reads pages that may not exist yet
        let (_dir, mut manager, handle) = setup_file("short.pf");

        let mut buf = vec![0xEEu8; PAGE_SIZE];
        manager.read_page(handle, 42, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(manager.page_count(handle).unwrap(), 0);
    }

    #[test]
    fn test_overwrite_in_place_keeps_file_size() {
        let (_dir, mut manager, handle) = setup_file("rw.pf");

        manager.write_page(handle, 2, &tagged_page(0x11)).unwrap();
        manager.write_page(handle, 2, &tagged_page(0x22)).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        manager.read_page(handle, 2, &mut buf).unwrap();
        assert_eq!(buf[0], 0x22);
        assert_eq!(manager.page_count(handle).unwrap(), 3);
    }

    #[test]
    fn test_handles_are_not_reused_after_close() {
        // A close/open cycle must hand out a fresh handle; the stale one
        // keeps failing instead of aliasing the new entry.
        let (dir, mut manager, stale) = setup_file("cycle.pf");
        let path = dir.path().join("cycle.pf");

        manager.write_page(stale, 1, &tagged_page(0x33)).unwrap();
        manager.close_file(stale).unwrap();

        let fresh = manager.open_file(&path).unwrap();
        assert_ne!(stale, fresh);

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            manager.read_page(stale, 1, &mut buf),
            Err(FileError::InvalidFile(_))
        ));
        assert!(matches!(
            manager.sync_file(stale),
            Err(FileError::InvalidFile(_))
        ));

        manager.read_page(fresh, 1, &mut buf).unwrap();
        assert_eq!(buf[0], 0x33);
    }

    #[test]
    fn test_open_dedups_through_canonicalization() {
        let (dir, mut manager, handle) = setup_file("canon.pf");

        // A dotted spelling of the same path resolves to the same entry
        let dotted = dir.path().join(".").join("canon.pf");
        assert_eq!(manager.open_file(&dotted).unwrap(), handle);
        assert_eq!(manager.open_file_count(), 1);
        assert!(manager.is_path_open(&dotted));

        manager.close_file(handle).unwrap();
        assert!(!manager.is_path_open(&dotted));
        assert_eq!(manager.open_file_count(), 0);
    }

    #[test]
    fn test_same_page_number_in_two_files_stays_separate() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = FileManager::new();

        let mut handles = Vec::new();
        for (name, tag) in [("a.pf", 0xA0), ("b.pf", 0xB0)] {
            let path = dir.path().join(name);
            manager.create_file(&path).unwrap();
            let handle = manager.open_file(&path).unwrap();
            manager.write_page(handle, 1, &tagged_page(tag)).unwrap();
            handles.push((handle, tag));
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        for (handle, tag) in handles {
            manager.read_page(handle, 1, &mut buf).unwrap();
            assert_eq!(buf[0], tag);
        }
    }

    #[test]
    fn test_remove_file_invalidates_open_handle() {
        let (dir, mut manager, handle) = setup_file("gone.pf");
        let path = dir.path().join("gone.pf");

        manager.remove_file(&path).unwrap();
        assert!(!path.exists());
        assert!(!manager.is_file_open(handle));
        assert!(matches!(
            manager.write_page(handle, 0, &tagged_page(1)),
            Err(FileError::InvalidFile(_))
        ));
    }

    #[test]
    fn test_persistence_across_manager_instances() {
        // Reopening relies on nothing but the on-disk state
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.pf");

        let mut manager = FileManager::new();
        manager.create_file(&path).unwrap();
        let handle = manager.open_file(&path).unwrap();
        manager.write_page(handle, 0, &tagged_page(0x77)).unwrap();
        manager.sync_file(handle).unwrap();
        manager.close_file(handle).unwrap();
        drop(manager);

        let mut manager = FileManager::new();
        let handle = manager.open_file(&path).unwrap();
        let mut buf = vec![0u8; PAGE_SIZE];
        manager.read_page(handle, 0, &mut buf).unwrap();
        assert_eq!(buf[0], 0x77);
    }

    #[test]
    fn test_error_surface() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = FileManager::with_max_files(1);
        let first = dir.path().join("first.pf");
        let second = dir.path().join("second.pf");

        // Create refuses to clobber, open refuses what is not there
        manager.create_file(&first).unwrap();
        assert!(matches!(
            manager.create_file(&first),
            Err(FileError::FileAlreadyExists(_))
        ));
        assert!(matches!(
            manager.open_file(&second),
            Err(FileError::FileNotFound(_))
        ));

        // One slot: a second distinct file is over the limit
        let handle = manager.open_file(&first).unwrap();
        manager.create_file(&second).unwrap();
        assert!(matches!(
            manager.open_file(&second),
            Err(FileError::TooManyOpenFiles)
        ));

        // Page transfers insist on exactly one page worth of buffer
        let mut short = vec![0u8; PAGE_SIZE - 1];
        assert!(matches!(
            manager.read_page(handle, 0, &mut short),
            Err(FileError::InvalidPageSize { .. })
        ));
        assert!(matches!(
            manager.write_page(handle, 0, &vec![0u8; PAGE_SIZE + 1]),
            Err(FileError::InvalidPageSize { .. })
        ));
    }
}
