//! Disk backing store for paged-out buffers.
//!
//! Each page file is a flat byte array with no header. Byte ranges are handed
//! out first-fit from a per-file free-list and otherwise appended at the file's
//! high-water mark. When a file would grow past its ceiling, a new numbered
//! file (`page_<N>.bin`) is created.
//!
//! Locking: all bookkeeping (file table, free-lists, high-water marks) sits
//! behind one manager mutex. Raw I/O on a file sits behind that file's own
//! mutex, so different files can be read and written concurrently.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tempfile::TempDir;

use super::error::PageFileError;
use crate::telemetry;

/// Default per-file ceiling (~1.8 GiB).
pub const DEFAULT_MAX_PAGE_FILE_SIZE: u64 = 1_932_735_283;

/// Location of one paged-out byte range.
///
/// An `offset` of -1 marks an invalid (unallocated) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferPageHandle {
    page_file_id: u32,
    size: u64,
    offset: i64,
}

impl BufferPageHandle {
    pub const INVALID: Self = Self { page_file_id: 0, size: 0, offset: -1 };

    fn new(page_file_id: u32, size: u64, offset: u64) -> Self {
        Self { page_file_id, size, offset: offset as i64 }
    }

    pub fn is_valid(&self) -> bool {
        self.offset >= 0
    }

    pub fn page_file_id(&self) -> u32 {
        self.page_file_id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Byte offset inside the page file, or `None` for an invalid handle.
    pub fn offset(&self) -> Option<u64> {
        u64::try_from(self.offset).ok()
    }
}

impl Default for BufferPageHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Page-file manager configuration.
#[derive(Debug, Clone)]
pub struct PageFileConfig {
    /// Directory for page files. `None` creates a private temp directory.
    pub directory: Option<PathBuf>,
    /// Hard ceiling for a single page file in bytes.
    pub max_file_size: u64,
    /// Maximum number of page files (0 = unlimited).
    pub max_files: usize,
}

impl Default for PageFileConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_file_size: DEFAULT_MAX_PAGE_FILE_SIZE,
            max_files: 0,
        }
    }
}

/// Point-in-time view of disk usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageFileStats {
    pub page_files: usize,
    /// Sum of every file's high-water mark.
    pub high_water_bytes: u64,
    /// Bytes sitting in free-lists.
    pub free_bytes: u64,
    /// Bytes covered by live handles.
    pub allocated_bytes: u64,
    /// Number of coalesced free ranges.
    pub free_ranges: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeRange {
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

/// Raw I/O side of one page file.
#[derive(Debug)]
struct PageFileIo {
    path: PathBuf,
    file: Mutex<File>,
}

impl PageFileIo {
    fn create(path: PathBuf) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()
    }

    /// Fill `out` from `offset`; returns the number of bytes actually read.
    fn read_at(&self, offset: u64, out: &mut [u8]) -> std::io::Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < out.len() {
            match file.read(&mut out[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Allocation bookkeeping for one page file.
#[derive(Debug)]
pub(crate) struct PageFileEntry {
    free_list: Vec<FreeRange>,
    next_offset: u64,
    dirty: bool,
}

impl PageFileEntry {
    pub(crate) fn new() -> Self {
        Self { free_list: Vec::new(), next_offset: 0, dirty: false }
    }

    /// Sort by offset, merge touching ranges, drop empty ones.
    pub(crate) fn consolidate(&mut self) {
        if !self.dirty {
            return;
        }
        self.free_list.sort_by_key(|r| r.offset);

        let mut merged: Vec<FreeRange> = Vec::with_capacity(self.free_list.len());
        for range in self.free_list.drain(..) {
            match merged.last_mut() {
                Some(last) if last.offset + last.size == range.offset => last.size += range.size,
                _ => merged.push(range),
            }
        }
        merged.retain(|r| r.size > 0);

        self.free_list = merged;
        self.dirty = false;
    }

    /// First-fit search of the free-list. Splits oversized gaps.
    pub(crate) fn take_gap(&mut self, size: u64) -> Option<u64> {
        self.consolidate();
        let idx = self.free_list.iter().position(|r| r.size >= size)?;
        let range = &mut self.free_list[idx];
        let offset = range.offset;
        if range.size == size {
            self.free_list.remove(idx);
        } else {
            range.offset += size;
            range.size -= size;
        }
        Some(offset)
    }

    /// Bump allocation at the high-water mark.
    pub(crate) fn append(&mut self, size: u64, max_file_size: u64) -> Option<u64> {
        let end = self.next_offset.checked_add(size)?;
        if end > max_file_size {
            return None;
        }
        let offset = self.next_offset;
        self.next_offset = end;
        Some(offset)
    }

    /// Return a range to the free-list. A range overlapping one that is
    /// already free is refused and `false` returned.
    pub(crate) fn release(&mut self, offset: u64, size: u64) -> bool {
        let end = offset.saturating_add(size);
        let overlaps = size > 0
            && self
                .free_list
                .iter()
                .any(|r| r.size > 0 && offset < r.offset + r.size && r.offset < end);
        if overlaps {
            return false;
        }
        self.free_list.push(FreeRange { offset, size });
        self.dirty = true;
        true
    }

    pub(crate) fn free_bytes(&mut self) -> u64 {
        self.consolidate();
        self.free_list.iter().map(|r| r.size).sum()
    }

    pub(crate) fn free_ranges(&mut self) -> &[FreeRange] {
        self.consolidate();
        &self.free_list
    }

    pub(crate) fn next_offset(&self) -> u64 {
        self.next_offset
    }
}

struct PageFileSlot {
    entry: PageFileEntry,
    io: Arc<PageFileIo>,
}

#[derive(Default)]
struct PageFileTable {
    files: Vec<PageFileSlot>,
    current: Option<usize>,
}

/// Owns the page files and hands out byte ranges in them.
pub struct PageFileManager {
    directory: PathBuf,
    max_file_size: u64,
    max_files: usize,
    created_directory: bool,
    table: Mutex<PageFileTable>,
    // Declared last so it is removed after the files in `Drop`.
    _temp_dir: Option<TempDir>,
}

impl PageFileManager {
    pub fn new(config: PageFileConfig) -> Self {
        let max_file_size = config.max_file_size.max(1);
        let (directory, temp_dir, created_directory) = match config.directory {
            Some(dir) => {
                let existed = dir.exists();
                (dir, None, !existed)
            }
            None => match tempfile::Builder::new().prefix("hd-pager-").tempdir() {
                Ok(temp) => (temp.path().to_path_buf(), Some(temp), false),
                Err(e) => {
                    let fallback = std::env::temp_dir().join("hd-pager");
                    tracing::warn!(error = %e, dir = %fallback.display(), "temp page directory unavailable, using fallback");
                    (fallback, None, true)
                }
            },
        };

        Self {
            directory,
            max_file_size,
            max_files: config.max_files,
            created_directory,
            table: Mutex::new(PageFileTable::default()),
            _temp_dir: temp_dir,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn page_file_count(&self) -> usize {
        self.table.lock().files.len()
    }

    /// Allocate a range for `data` and write it synchronously.
    pub fn create_page_handle(&self, data: &[u8]) -> Result<BufferPageHandle, PageFileError> {
        let size = data.len() as u64;
        if size > self.max_file_size {
            return Err(PageFileError::PageTooLarge { size, max: self.max_file_size });
        }

        let (file_id, offset, io) = {
            let mut table = self.table.lock();
            self.allocate(&mut table, size)?
        };

        if let Err(e) = io.write_at(offset, data) {
            tracing::warn!(file = %io.path.display(), offset, size, error = %e, "page write failed");
            let mut table = self.table.lock();
            if let Some(slot) = table.files.get_mut(file_id as usize) {
                let _ = slot.entry.release(offset, size);
            }
            return Err(PageFileError::Io(e));
        }

        telemetry::record_page_write(size);
        tracing::trace!(file_id, offset, size, "page written");
        Ok(BufferPageHandle::new(file_id, size, offset))
    }

    /// Read the range behind `handle` into `out`. `out` must be exactly
    /// `handle.size()` bytes long.
    pub fn load_page(&self, handle: &BufferPageHandle, out: &mut [u8]) -> Result<(), PageFileError> {
        let offset = handle.offset().ok_or(PageFileError::InvalidHandle)?;
        if out.len() as u64 != handle.size {
            return Err(PageFileError::SizeMismatch { expected: handle.size, actual: out.len() as u64 });
        }

        let io = self.file_io(handle.page_file_id)?;
        let read = io.read_at(offset, out)? as u64;
        if read != handle.size {
            return Err(PageFileError::ShortRead { expected: handle.size, actual: read });
        }

        telemetry::record_page_read(read);
        Ok(())
    }

    /// Read the range behind `handle` into a fresh vector.
    pub fn read_page(&self, handle: &BufferPageHandle) -> Result<Vec<u8>, PageFileError> {
        let mut out = vec![0u8; handle.size as usize];
        self.load_page(handle, &mut out)?;
        Ok(out)
    }

    /// Overwrite the range in place. No reallocation happens.
    pub fn update_page(&self, handle: &BufferPageHandle, data: &[u8]) -> Result<(), PageFileError> {
        let offset = handle.offset().ok_or(PageFileError::InvalidHandle)?;
        if data.len() as u64 != handle.size {
            return Err(PageFileError::SizeMismatch { expected: handle.size, actual: data.len() as u64 });
        }

        let io = self.file_io(handle.page_file_id)?;
        io.write_at(offset, data)?;
        telemetry::record_page_write(handle.size);
        Ok(())
    }

    /// Return the range to its file's free-list. Bytes are not zeroed.
    pub fn delete_page(&self, handle: &BufferPageHandle) {
        let Some(offset) = handle.offset() else {
            return;
        };
        let mut table = self.table.lock();
        match table.files.get_mut(handle.page_file_id as usize) {
            Some(slot) => {
                if !slot.entry.release(offset, handle.size) {
                    tracing::warn!(file_id = handle.page_file_id, offset, size = handle.size, "page range already free");
                }
            }
            None => tracing::warn!(file_id = handle.page_file_id, "delete for unknown page file"),
        }
    }

    pub fn stats(&self) -> PageFileStats {
        let mut table = self.table.lock();
        let mut stats = PageFileStats { page_files: table.files.len(), ..Default::default() };
        for slot in table.files.iter_mut() {
            let high_water = slot.entry.next_offset();
            let free = slot.entry.free_bytes();
            stats.high_water_bytes += high_water;
            stats.free_bytes += free;
            stats.allocated_bytes += high_water - free;
            stats.free_ranges += slot.entry.free_ranges().len();
        }
        stats
    }

    fn file_io(&self, id: u32) -> Result<Arc<PageFileIo>, PageFileError> {
        self.table
            .lock()
            .files
            .get(id as usize)
            .map(|slot| slot.io.clone())
            .ok_or(PageFileError::UnknownPageFile(id))
    }

    fn allocate(
        &self,
        table: &mut PageFileTable,
        size: u64,
    ) -> Result<(u32, u64, Arc<PageFileIo>), PageFileError> {
        if size > 0 {
            // Current file first, then any older file with a reusable gap.
            let current = table.current;
            let order: Vec<usize> = current
                .into_iter()
                .chain((0..table.files.len()).filter(|&i| Some(i) != current))
                .collect();
            for idx in order {
                let slot = &mut table.files[idx];
                if let Some(offset) = slot.entry.take_gap(size) {
                    return Ok((idx as u32, offset, slot.io.clone()));
                }
            }
        }

        if let Some(idx) = table.current {
            let slot = &mut table.files[idx];
            if let Some(offset) = slot.entry.append(size, self.max_file_size) {
                return Ok((idx as u32, offset, slot.io.clone()));
            }
        }

        let idx = self.create_page_file(table)?;
        let slot = &mut table.files[idx];
        let offset = slot
            .entry
            .append(size, self.max_file_size)
            .ok_or(PageFileError::PageTooLarge { size, max: self.max_file_size })?;
        Ok((idx as u32, offset, slot.io.clone()))
    }

    fn create_page_file(&self, table: &mut PageFileTable) -> Result<usize, PageFileError> {
        if self.max_files != 0 && table.files.len() >= self.max_files {
            tracing::warn!(files = table.files.len(), "page file limit reached");
            return Err(PageFileError::CapacityExhausted { files: table.files.len() });
        }

        let idx = table.files.len();
        let path = self.directory.join(format!("page_{}.bin", idx));
        let io = fs::create_dir_all(&self.directory)
            .and_then(|_| PageFileIo::create(path.clone()))
            .map_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to create page file");
                PageFileError::Io(e)
            })?;

        tracing::info!(path = %path.display(), "page file created");
        telemetry::record_page_file_created();
        table.files.push(PageFileSlot { entry: PageFileEntry::new(), io: Arc::new(io) });
        table.current = Some(idx);
        Ok(idx)
    }
}

impl Drop for PageFileManager {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        for slot in table.files.drain(..) {
            if let Err(e) = fs::remove_file(&slot.io.path) {
                tracing::debug!(path = %slot.io.path.display(), error = %e, "page file cleanup failed");
            }
        }
        if self.created_directory {
            // Only succeeds if nothing else was put there.
            let _ = fs::remove_dir(&self.directory);
        }
    }
}
