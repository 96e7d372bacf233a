//! The paged file.
//!
//! A byte-addressable array of fixed-size pages on disk. Both the record
//! heap and the B+Tree index sit on top of this abstraction; whatever a
//! page means is decided by its owner. Page numbers are dense and pages
//! are never freed, so `end_pid` doubles as the allocator: the next fresh
//! page is always `end_pid()`.

use crate::errors::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 1024;

/// A non-negative page index. `-1` is used by owners to mean "none".
pub type PageId = i32;

/// One in-memory page image.
pub type PageBuf = [u8; PAGE_SIZE];

/// How to open a paged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file for reading only.
    Read,
    /// Open for reading and writing, creating the file if it is missing.
    Write,
}

pub struct PageFile {
    file: File,
    end_pid: PageId,
}

impl PageFile {
    /// Opens the paged file at `path`.
    ///
    /// The end page id is derived from the current file length; a file
    /// whose length is not a whole number of pages is rejected.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = match mode {
            OpenMode::Read => File::open(path)
                .map_err(|e| err!(FileRead, "Cannot open '{}': {}", path.display(), e))?,
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)
                .map_err(|e| err!(FileWrite, "Cannot open '{}': {}", path.display(), e))?,
        };

        let len = file
            .metadata()
            .map_err(|e| err!(FileRead, "Cannot stat '{}': {}", path.display(), e))?
            .len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Storage,
                "'{}' is not page-aligned ({} bytes)",
                path.display(),
                len
            ));
        }

        let end_pid = (len / PAGE_SIZE as u64) as PageId;
        debug!(path = %path.display(), end_pid, "Opened page file");
        Ok(PageFile { file, end_pid })
    }

    /// One past the largest page id ever written.
    pub fn end_pid(&self) -> PageId {
        self.end_pid
    }

    /// Reads page `pid` into `buf`.
    pub fn read(&mut self, pid: PageId, buf: &mut PageBuf) -> Result<(), Error> {
        if pid < 0 || pid >= self.end_pid {
            return Err(err!(
                FileRead,
                "Page {} out of range (end pid {})",
                pid,
                self.end_pid
            ));
        }
        self.file
            .seek(SeekFrom::Start(pid as u64 * PAGE_SIZE as u64))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|e| err!(FileRead, "Page {}: {}", pid, e))
    }

    /// Writes `buf` to page `pid`, extending the file if needed.
    pub fn write(&mut self, pid: PageId, buf: &PageBuf) -> Result<(), Error> {
        if pid < 0 {
            return Err(err!(FileWrite, "Negative page id {}", pid));
        }
        self.file
            .seek(SeekFrom::Start(pid as u64 * PAGE_SIZE as u64))
            .and_then(|_| self.file.write_all(buf))
            .map_err(|e| err!(FileWrite, "Page {}: {}", pid, e))?;
        if pid >= self.end_pid {
            self.end_pid = pid + 1;
        }
        Ok(())
    }

    /// Flushes buffered writes and closes the file.
    pub fn close(mut self) -> Result<(), Error> {
        self.file
            .flush()
            .map_err(|e| err!(FileWrite, "Flush: {}", e))
    }
}
