//! Typed, pinnable file-descriptor pool with clock-approximation LRU
//! eviction, enforcing a process-wide open-file limit (spec.md §4.1).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::core::error::{Error, Result};

/// Default counter value a descriptor is given back on `unpin` before it
/// becomes eligible for eviction.
const DEFAULT_REFERENCE_COUNT: u8 = 3;

pub type TypeNo = u32;
pub type FileNo = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

struct TypeEntry {
    template: String,
    writable: bool,
}

struct OpenEntry {
    key: (TypeNo, FileNo),
    file: File,
    /// `None` means pinned (never evicted); `Some(n)` is the clock counter.
    counter: Option<u8>,
}

struct Inner {
    types: HashMap<TypeNo, TypeEntry>,
    overrides: HashMap<(TypeNo, FileNo), PathBuf>,
    /// Open descriptors, indexed the same way a circular clock buffer would
    /// be; we use a `Vec` plus a `HashMap` index instead of raw pointers.
    slots: Vec<Option<OpenEntry>>,
    index: HashMap<(TypeNo, FileNo), usize>,
    clock_hand: usize,
    limit: usize,
}

/// The descriptor pool itself. Cheaply clonable; all state lives behind one
/// mutex, matching the single coarse lock the concurrency model specifies
/// for fdset (spec.md §5).
#[derive(Clone)]
pub struct FdSet {
    inner: std::sync::Arc<Mutex<Inner>>,
}

/// An open, positioned descriptor handed back to the caller. Does not
/// implement `Drop`-based auto-unpin: callers must call `unpin` explicitly,
/// matching the reference contract's pin/unpin pairing.
pub struct Fd {
    pub typeno: TypeNo,
    pub fileno: FileNo,
}

impl FdSet {
    pub fn new(limit: usize) -> Self {
        FdSet {
            inner: std::sync::Arc::new(Mutex::new(Inner {
                types: HashMap::new(),
                overrides: HashMap::new(),
                slots: Vec::new(),
                index: HashMap::new(),
                clock_hand: 0,
                limit,
            })),
        }
    }

    pub fn register_type(&self, typeno: TypeNo, template: &str, writable: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.types.contains_key(&typeno) {
            return Err(Error::conflicting_state(format!(
                "type {} already registered",
                typeno
            )));
        }
        inner.types.insert(typeno, TypeEntry { template: template.to_string(), writable });
        Ok(())
    }

    pub fn override_name(&self, typeno: TypeNo, fileno: FileNo, path: PathBuf) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.overrides.contains_key(&(typeno, fileno)) {
            return Err(Error::conflicting_state("name already overridden"));
        }
        inner.overrides.insert((typeno, fileno), path);
        Ok(())
    }

    fn resolve_path(inner: &Inner, typeno: TypeNo, fileno: FileNo) -> Result<PathBuf> {
        if let Some(path) = inner.overrides.get(&(typeno, fileno)) {
            return Ok(path.clone());
        }
        let ty = inner
            .types
            .get(&typeno)
            .ok_or_else(|| Error::invalid_argument(format!("unregistered type {}", typeno)))?;
        Ok(PathBuf::from(ty.template.replace("%u", &fileno.to_string())))
    }

    /// Opens with `O_CREAT|O_EXCL`; pins the returned descriptor.
    pub fn create(&self, typeno: TypeNo, fileno: FileNo) -> Result<Fd> {
        let mut inner = self.inner.lock();
        let path = Self::resolve_path(&inner, typeno, fileno)?;
        if inner.index.contains_key(&(typeno, fileno)) {
            return Err(Error::conflicting_state("file already open"));
        }
        Self::ensure_capacity(&mut inner)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::conflicting_state(format!("{:?} already exists", path))
                } else {
                    Error::from(e)
                }
            })?;
        Self::insert_pinned(&mut inner, typeno, fileno, file)?;
        log::trace!("fdset: created ({}, {})", typeno, fileno);
        Ok(Fd { typeno, fileno })
    }

    /// Opens if needed, seeks, returns a pinned descriptor; pinned
    /// descriptors are never evicted.
    pub fn pin(&self, typeno: TypeNo, fileno: FileNo, offset: u64, whence: Whence) -> Result<Fd> {
        let mut inner = self.inner.lock();
        if let Some(&slot) = inner.index.get(&(typeno, fileno)) {
            let entry = inner.slots[slot].as_mut().unwrap();
            entry.counter = None;
            Self::seek(&mut entry.file, offset, whence)?;
            return Ok(Fd { typeno, fileno });
        }
        let path = Self::resolve_path(&inner, typeno, fileno)?;
        let writable = inner.types.get(&typeno).map(|t| t.writable).unwrap_or(false);
        Self::ensure_capacity(&mut inner)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(writable)
            .open(&path)?;
        Self::seek(&mut file, offset, whence)?;
        Self::insert_pinned(&mut inner, typeno, fileno, file)?;
        log::trace!("fdset: pinned ({}, {}) at {:?}", typeno, fileno, offset);
        Ok(Fd { typeno, fileno })
    }

    fn seek(file: &mut File, offset: u64, whence: Whence) -> Result<u64> {
        let pos = match whence {
            Whence::Start => SeekFrom::Start(offset),
            Whence::Current => SeekFrom::Current(offset as i64),
            Whence::End => SeekFrom::End(offset as i64),
        };
        Ok(file.seek(pos)?)
    }

    fn insert_pinned(inner: &mut Inner, typeno: TypeNo, fileno: FileNo, file: File) -> Result<()> {
        let slot = OpenEntry { key: (typeno, fileno), file, counter: None };
        let idx = inner.slots.iter().position(|s| s.is_none());
        let idx = match idx {
            Some(i) => {
                inner.slots[i] = Some(slot);
                i
            }
            None => {
                inner.slots.push(Some(slot));
                inner.slots.len() - 1
            }
        };
        inner.index.insert((typeno, fileno), idx);
        Ok(())
    }

    /// Returns the descriptor to the LRU pool with the default reference
    /// count, making it eligible for eviction again.
    pub fn unpin(&self, fd: &Fd) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = *inner
            .index
            .get(&(fd.typeno, fd.fileno))
            .ok_or_else(|| Error::invalid_argument("unpin of unknown descriptor"))?;
        inner.slots[slot].as_mut().unwrap().counter = Some(DEFAULT_REFERENCE_COUNT);
        Ok(())
    }

    /// Clock-sweep eviction: visits entries from the last clock position,
    /// closing the first zero-counter unpinned entry found, decrementing
    /// others along the way. Runs only when the pool is at `limit`.
    fn ensure_capacity(inner: &mut Inner) -> Result<()> {
        let open_count = inner.slots.iter().filter(|s| s.is_some()).count();
        if open_count < inner.limit || inner.limit == 0 {
            return Ok(());
        }
        let n = inner.slots.len();
        if n == 0 {
            return Ok(());
        }
        loop {
            let mut victim = None;
            for step in 0..n {
                let idx = (inner.clock_hand + step) % n;
                let Some(entry) = inner.slots[idx].as_mut() else { continue };
                match entry.counter {
                    None => continue, // pinned
                    Some(0) => {
                        victim = Some(idx);
                        break;
                    }
                    Some(ref mut c) => *c -= 1,
                }
            }
            if let Some(idx) = victim {
                let entry = inner.slots[idx].take().unwrap();
                inner.index.remove(&entry.key);
                inner.clock_hand = (idx + 1) % n;
                log::debug!("fdset: evicted {:?}", entry.key);
                return Ok(());
            }
            let all_pinned = inner.slots.iter().flatten().all(|e| e.counter.is_none());
            if all_pinned {
                return Err(Error::resource_exhausted("fdset exhausted: all descriptors pinned"));
            }
            // Every unpinned entry had a nonzero counter; the decrements
            // above will eventually bring one to zero. Loop again.
        }
    }

    /// Closes all open descriptors for `(typeno, fileno)`. Refuses if any
    /// are pinned.
    pub fn close_file(&self, typeno: TypeNo, fileno: FileNo) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(&slot) = inner.index.get(&(typeno, fileno)) {
            let entry = inner.slots[slot].as_ref().unwrap();
            if entry.counter.is_none() {
                return Err(Error::conflicting_state("file is pinned"));
            }
            inner.slots[slot] = None;
            inner.index.remove(&(typeno, fileno));
        }
        Ok(())
    }

    pub fn unlink(&self, typeno: TypeNo, fileno: FileNo) -> Result<()> {
        self.close_file(typeno, fileno)?;
        let inner = self.inner.lock();
        let path = Self::resolve_path(&inner, typeno, fileno)?;
        drop(inner);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::from(e)),
        }
    }

    pub fn read_at(&self, fd: &Fd, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let slot = *inner
            .index
            .get(&(fd.typeno, fd.fileno))
            .ok_or_else(|| Error::invalid_argument("read of unknown descriptor"))?;
        let entry = inner.slots[slot].as_mut().unwrap();
        entry.file.seek(SeekFrom::Start(offset))?;
        Ok(entry.file.read(buf)?)
    }

    pub fn write_at(&self, fd: &Fd, offset: u64, buf: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = *inner
            .index
            .get(&(fd.typeno, fd.fileno))
            .ok_or_else(|| Error::invalid_argument("write of unknown descriptor"))?;
        let entry = inner.slots[slot].as_mut().unwrap();
        entry.file.seek(SeekFrom::Start(offset))?;
        entry.file.write_all(buf)?;
        Ok(())
    }

    pub fn append(&self, fd: &Fd, buf: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let slot = *inner
            .index
            .get(&(fd.typeno, fd.fileno))
            .ok_or_else(|| Error::invalid_argument("append to unknown descriptor"))?;
        let entry = inner.slots[slot].as_mut().unwrap();
        let offset = entry.file.seek(SeekFrom::End(0))?;
        entry.file.write_all(buf)?;
        Ok(offset)
    }

    pub fn len(&self, fd: &Fd) -> Result<u64> {
        let mut inner = self.inner.lock();
        let slot = *inner
            .index
            .get(&(fd.typeno, fd.fileno))
            .ok_or_else(|| Error::invalid_argument("len of unknown descriptor"))?;
        let entry = inner.slots[slot].as_mut().unwrap();
        Ok(entry.file.metadata()?.len())
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn pinned_count(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .flatten()
            .filter(|e| e.counter.is_none())
            .count()
    }
}
