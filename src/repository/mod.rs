//! Append-only, size-delimited document byte store (spec.md §3, §4.6
//! supplement in SPEC_FULL.md §2).

use parking_lot::Mutex;

use crate::core::error::{Error, Result};
use crate::core::types::RepoPointer;
use crate::fdset::{Fd, FdSet, TypeNo, Whence};

/// Record framing: `length: u32 LE` then `crc32: u32 LE` then `length`
/// bytes of document content.
const RECORD_HEADER_LEN: u64 = 8;

struct RepoState {
    current_fileno: u32,
    current_offset: u64,
    current_fd: Option<Fd>,
}

pub struct Repository {
    fdset: FdSet,
    typeno: TypeNo,
    max_file_size: u64,
    state: Mutex<RepoState>,
}

impl Repository {
    pub fn create(fdset: FdSet, typeno: TypeNo, template: &str, max_file_size: u64) -> Result<Self> {
        fdset.register_type(typeno, template, true)?;
        Ok(Repository {
            fdset,
            typeno,
            max_file_size,
            state: Mutex::new(RepoState { current_fileno: 0, current_offset: 0, current_fd: None }),
        })
    }

    pub fn open_existing(
        fdset: FdSet,
        typeno: TypeNo,
        template: &str,
        max_file_size: u64,
        last_fileno: u32,
        last_offset: u64,
    ) -> Result<Self> {
        fdset.register_type(typeno, template, true)?;
        Ok(Repository {
            fdset,
            typeno,
            max_file_size,
            state: Mutex::new(RepoState {
                current_fileno: last_fileno,
                current_offset: last_offset,
                current_fd: None,
            }),
        })
    }

    /// Appends one size-delimited record, starting a new repository file
    /// first if the write would exceed `max_file_size` (invariant 5).
    pub fn append(&self, bytes: &[u8]) -> Result<RepoPointer> {
        let mut state = self.state.lock();
        let record_len = RECORD_HEADER_LEN + bytes.len() as u64;

        if state.current_fd.is_none() {
            let fd = self.fdset.create(self.typeno, state.current_fileno)?;
            state.current_fd = Some(fd);
            state.current_offset = 0;
        } else if state.current_offset + record_len > self.max_file_size {
            self.fdset.unpin(state.current_fd.as_ref().unwrap())?;
            state.current_fileno += 1;
            let fd = self.fdset.create(self.typeno, state.current_fileno)?;
            state.current_fd = Some(fd);
            state.current_offset = 0;
        }

        let fileno = state.current_fileno;
        let offset = state.current_offset;
        let fd = state.current_fd.as_ref().unwrap();

        let mut record = Vec::with_capacity(record_len as usize);
        record.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        record.extend_from_slice(&crc32fast::hash(bytes).to_le_bytes());
        record.extend_from_slice(bytes);
        self.fdset.write_at(fd, offset, &record)?;

        state.current_offset += record_len;
        Ok(RepoPointer { fileno, offset, length: bytes.len() as u32 })
    }

    /// Reads and checksum-verifies the full document at `pointer`.
    pub fn read(&self, pointer: RepoPointer) -> Result<Vec<u8>> {
        let fd = self.fdset.pin(self.typeno, pointer.fileno, 0, Whence::Start)?;
        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        self.fdset.read_at(&fd, pointer.offset, &mut header)?;
        let len = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let crc = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if len != pointer.length {
            self.fdset.unpin(&fd)?;
            return Err(Error::format_invalid("repository record length mismatch"));
        }
        let mut buf = vec![0u8; len as usize];
        self.fdset.read_at(&fd, pointer.offset + RECORD_HEADER_LEN, &mut buf)?;
        self.fdset.unpin(&fd)?;
        if crc32fast::hash(&buf) != crc {
            return Err(Error::format_invalid("repository record checksum mismatch"));
        }
        Ok(buf)
    }

    /// Streaming retrieval for the `[cache:N]` query case (spec.md §4.10):
    /// reads up to `buf.len()` bytes starting at byte `skip` within the
    /// document, returning `0` at end-of-document.
    pub fn retrieve(&self, pointer: RepoPointer, skip: u64, buf: &mut [u8]) -> Result<usize> {
        if skip >= pointer.length as u64 {
            return Ok(0);
        }
        let remaining = pointer.length as u64 - skip;
        let want = buf.len().min(remaining as usize);
        let fd = self.fdset.pin(self.typeno, pointer.fileno, 0, Whence::Start)?;
        let n = self.fdset.read_at(&fd, pointer.offset + RECORD_HEADER_LEN + skip, &mut buf[..want])?;
        self.fdset.unpin(&fd)?;
        Ok(n)
    }

    pub fn current_fileno(&self) -> u32 {
        self.state.lock().current_fileno
    }

    pub fn current_offset(&self) -> u64 {
        self.state.lock().current_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        let repo = Repository::create(
            fdset,
            1,
            dir.path().join("P.repos.%u").to_str().unwrap(),
            1 << 20,
        )
        .unwrap();
        let ptr = repo.append(b"the quick brown fox").unwrap();
        assert_eq!(repo.read(ptr).unwrap(), b"the quick brown fox");
    }

    #[test]
    fn starts_new_file_before_exceeding_max_size() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        let repo = Repository::create(
            fdset,
            1,
            dir.path().join("P.repos.%u").to_str().unwrap(),
            32,
        )
        .unwrap();
        let p1 = repo.append(b"0123456789").unwrap();
        let p2 = repo.append(b"0123456789").unwrap();
        assert_eq!(p1.fileno, 0);
        assert!(p2.fileno >= p1.fileno);
        assert_eq!(repo.read(p1).unwrap(), b"0123456789");
        assert_eq!(repo.read(p2).unwrap(), b"0123456789");
    }

    #[test]
    fn retrieve_streams_until_eof() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        let repo = Repository::create(
            fdset,
            1,
            dir.path().join("P.repos.%u").to_str().unwrap(),
            1 << 20,
        )
        .unwrap();
        let ptr = repo.append(b"hello world").unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = repo.retrieve(ptr, out.len() as u64, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
    }
}
