//! The record heap.
//!
//! A table is a heap of fixed-width tuples `(i32 key, String value)`
//! stored over a [`PageFile`]. Every page is a data page:
//!
//! ```text
//! offset 0 : record count in this page (i32, little-endian)
//! offset 4 : slot[0] .. slot[RECORDS_PER_PAGE-1]
//! ```
//!
//! A slot is a 4-byte key, a 1-byte value length and `MAX_VALUE` value
//! bytes. Records are append-only and addressed by [`RecordId`]; the id
//! order is the physical order, so scanning from `(0, 0)` up to
//! [`RecordFile::end_rid`] visits every tuple exactly once.

use crate::errors::Error;
use crate::storage::pagefile::{OpenMode, PageBuf, PageFile, PAGE_SIZE};
use std::path::Path;
use tracing::debug;

/// Longest value a slot can hold, in bytes.
pub const MAX_VALUE: usize = 99;

const RECORD_SIZE: usize = 4 + 1 + MAX_VALUE;

/// Records per data page.
pub const RECORDS_PER_PAGE: usize = (PAGE_SIZE - 4) / RECORD_SIZE;

/// Address of a tuple in the heap: page number and slot number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordId {
    pub pid: i32,
    pub sid: i32,
}

impl RecordId {
    /// The next record address in scan order, wrapping to the following
    /// page after the last slot.
    pub fn next(self) -> RecordId {
        if self.sid + 1 >= RECORDS_PER_PAGE as i32 {
            RecordId {
                pid: self.pid + 1,
                sid: 0,
            }
        } else {
            RecordId {
                pid: self.pid,
                sid: self.sid + 1,
            }
        }
    }
}

pub struct RecordFile {
    pf: PageFile,
    end_rid: RecordId,
}

impl RecordFile {
    /// Opens the table file at `path`; `Write` mode creates it.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, Error> {
        let mut pf = PageFile::open(path, mode)?;

        let end_rid = if pf.end_pid() == 0 {
            RecordId::default()
        } else {
            let last = pf.end_pid() - 1;
            let mut buf = [0u8; PAGE_SIZE];
            pf.read(last, &mut buf)?;
            let count = read_i32(&buf, 0);
            if count < 0 || count as usize > RECORDS_PER_PAGE {
                return Err(err!(Storage, "Corrupt record count {} in page {}", count, last));
            }
            if count as usize == RECORDS_PER_PAGE {
                RecordId { pid: last + 1, sid: 0 }
            } else {
                RecordId { pid: last, sid: count }
            }
        };

        debug!(?end_rid, "Opened record file");
        Ok(RecordFile { pf, end_rid })
    }

    /// One past the last stored record.
    pub fn end_rid(&self) -> RecordId {
        self.end_rid
    }

    /// Appends a tuple and returns its address. Values longer than
    /// [`MAX_VALUE`] bytes are truncated at a character boundary.
    pub fn append(&mut self, key: i32, value: &str) -> Result<RecordId, Error> {
        let rid = self.end_rid;

        let mut buf = [0u8; PAGE_SIZE];
        if rid.sid > 0 {
            self.pf.read(rid.pid, &mut buf)?;
        }

        let mut vlen = value.len().min(MAX_VALUE);
        while !value.is_char_boundary(vlen) {
            vlen -= 1;
        }

        let off = 4 + rid.sid as usize * RECORD_SIZE;
        buf[off..off + 4].copy_from_slice(&key.to_le_bytes());
        buf[off + 4] = vlen as u8;
        buf[off + 5..off + 5 + vlen].copy_from_slice(&value.as_bytes()[..vlen]);
        write_i32(&mut buf, 0, rid.sid + 1);

        self.pf.write(rid.pid, &buf)?;
        self.end_rid = rid.next();
        Ok(rid)
    }

    /// Reads the tuple at `rid`.
    pub fn read(&mut self, rid: RecordId) -> Result<(i32, String), Error> {
        if rid.sid < 0 || rid.sid as usize >= RECORDS_PER_PAGE || rid >= self.end_rid {
            return Err(Error::NoSuchRecord);
        }

        let mut buf = [0u8; PAGE_SIZE];
        self.pf.read(rid.pid, &mut buf)?;

        if rid.sid >= read_i32(&buf, 0) {
            return Err(Error::NoSuchRecord);
        }

        let off = 4 + rid.sid as usize * RECORD_SIZE;
        let key = read_i32(&buf, off);
        let vlen = (buf[off + 4] as usize).min(MAX_VALUE);
        let value = String::from_utf8_lossy(&buf[off + 5..off + 5 + vlen]).into_owned();
        Ok((key, value))
    }

    /// Flushes and closes the underlying page file.
    pub fn close(self) -> Result<(), Error> {
        self.pf.close()
    }
}

fn read_i32(buf: &PageBuf, off: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[off..off + 4]);
    i32::from_le_bytes(raw)
}

fn write_i32(buf: &mut PageBuf, off: usize, v: i32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}
