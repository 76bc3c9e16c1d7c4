//! Paged, prefix-compressed B+tree over a single paged file (spec.md §4.3).

use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::core::error::{Error, Result};
use crate::fdset::{Fd, FdSet, TypeNo, Whence};
use crate::iobtree::page::{
    discriminator, DiscriminatorAlgorithm, Header, InternalPage, LeafPage, PageBody, PageId,
};

#[derive(Debug, Clone, Copy)]
pub struct IoBtreeConfig {
    pub pagesize: u32,
    pub cache_pages: usize,
    pub discriminator: DiscriminatorAlgorithm,
}

impl Default for IoBtreeConfig {
    fn default() -> Self {
        IoBtreeConfig { pagesize: 8192, cache_pages: 256, discriminator: DiscriminatorAlgorithm::CommonPrefix }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BtreeStats {
    pub num_keys: u64,
    pub num_pages: u64,
    pub pagesize: u32,
}

struct State {
    header: Header,
    cache: LruCache<PageId, PageBody>,
    dirty: HashSet<PageId>,
}

/// Single-writer, multi-reader vocabulary B+tree (spec.md §4.3, §5). All
/// mutable state is behind one mutex, matching the coarse lock the
/// concurrency model specifies for vocabulary lookups.
pub struct IoBtree {
    fdset: FdSet,
    fd: Fd,
    config: IoBtreeConfig,
    state: Mutex<State>,
}

const HEADER_PAGE: PageId = 0;

impl IoBtree {
    pub fn create(fdset: FdSet, typeno: TypeNo, fileno: u32, config: IoBtreeConfig) -> Result<Self> {
        let fd = fdset.create(typeno, fileno)?;
        let header = Header { root: 1, next_page: 2, num_keys: 0, pagesize: config.pagesize };
        let tree = IoBtree {
            fdset,
            fd,
            config,
            state: Mutex::new(State {
                header,
                cache: LruCache::new(NonZeroUsize::new(config.cache_pages.max(1)).unwrap()),
                dirty: HashSet::new(),
            }),
        };
        tree.write_page_locked(&mut tree.state.lock(), 1, PageBody::Leaf(LeafPage::empty()))?;
        tree.write_header()?;
        Ok(tree)
    }

    pub fn open(fdset: FdSet, typeno: TypeNo, fileno: u32, config: IoBtreeConfig) -> Result<Self> {
        let fd = fdset.pin(typeno, fileno, 0, Whence::Start)?;
        let mut buf = vec![0u8; config.pagesize as usize];
        fdset.read_at(&fd, HEADER_PAGE * config.pagesize as u64, &mut buf)?;
        let header: Header = bincode::deserialize(&buf)
            .map_err(|e| Error::format_invalid(format!("bad iobtree header: {}", e)))?;
        Ok(IoBtree {
            fdset,
            fd,
            config,
            state: Mutex::new(State {
                header,
                cache: LruCache::new(NonZeroUsize::new(config.cache_pages.max(1)).unwrap()),
                dirty: HashSet::new(),
            }),
        })
    }

    fn write_header(&self) -> Result<()> {
        let state = self.state.lock();
        let mut buf = bincode::serialize(&state.header)
            .map_err(|e| Error::format_invalid(e.to_string()))?;
        buf.resize(self.config.pagesize as usize, 0);
        self.fdset.write_at(&self.fd, HEADER_PAGE * self.config.pagesize as u64, &buf)
    }

    fn alloc_page(&self, state: &mut State) -> PageId {
        let id = state.header.next_page;
        state.header.next_page += 1;
        id
    }

    fn read_page(&self, state: &mut State, id: PageId) -> Result<PageBody> {
        if let Some(page) = state.cache.get(&id) {
            return Ok(page.clone());
        }
        let mut buf = vec![0u8; self.config.pagesize as usize];
        self.fdset.read_at(&self.fd, id * self.config.pagesize as u64, &mut buf)?;
        let body: PageBody = bincode::deserialize(&buf)
            .map_err(|e| Error::format_invalid(format!("corrupt page {}: {}", id, e)))?;
        state.cache.put(id, body.clone());
        Ok(body)
    }

    fn write_page_locked(&self, state: &mut State, id: PageId, body: PageBody) -> Result<()> {
        if let Some((evicted_id, evicted_body)) = state.cache.push(id, body) {
            if state.dirty.remove(&evicted_id) {
                self.flush_page(evicted_id, &evicted_body)?;
            }
        }
        state.dirty.insert(id);
        Ok(())
    }

    fn flush_page(&self, id: PageId, body: &PageBody) -> Result<()> {
        let mut buf = bincode::serialize(body).map_err(|e| Error::format_invalid(e.to_string()))?;
        if buf.len() > self.config.pagesize as usize {
            return Err(Error::resource_exhausted(format!(
                "page {} serialized to {} bytes, exceeds pagesize {}",
                id,
                buf.len(),
                self.config.pagesize
            )));
        }
        buf.resize(self.config.pagesize as usize, 0);
        self.fdset.write_at(&self.fd, id * self.config.pagesize as u64, &buf)
    }

    /// Writes back every dirty cached page plus the header. Called on
    /// close and may be called explicitly by callers that want a durable
    /// checkpoint mid-build.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        let dirty: Vec<PageId> = state.dirty.drain().collect();
        for id in dirty {
            if let Some(body) = state.cache.get(&id).cloned() {
                self.flush_page(id, &body)?;
            }
        }
        drop(state);
        self.write_header()
    }

    pub fn find(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        let mut page_id = state.header.root;
        loop {
            match self.read_page(&mut state, page_id)? {
                PageBody::Leaf(leaf) => {
                    for (suffix, value) in &leaf.entries {
                        if leaf.full_key(suffix) == key {
                            return Ok(Some(value.clone()));
                        }
                    }
                    return Ok(None);
                }
                PageBody::Internal(internal) => {
                    page_id = internal.child_for(key);
                }
            }
        }
    }

    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.find(key)?.is_some() {
            return Err(Error::conflicting_state("duplicate key"));
        }
        let mut state = self.state.lock();
        let root = state.header.root;
        if let Some((sep, new_child)) = self.insert_into(&mut state, root, key, value)? {
            let new_root_id = self.alloc_page(&mut state);
            let new_root = InternalPage { common_prefix: Vec::new(), leftmost_child: root, routes: vec![(sep, new_child)] };
            self.write_page_locked(&mut state, new_root_id, PageBody::Internal(new_root))?;
            state.header.root = new_root_id;
        }
        state.header.num_keys += 1;
        drop(state);
        self.write_header()
    }

    fn insert_into(
        &self,
        state: &mut State,
        page_id: PageId,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<(Vec<u8>, PageId)>> {
        match self.read_page(state, page_id)? {
            PageBody::Leaf(leaf) => {
                let mut full: Vec<(Vec<u8>, Vec<u8>)> =
                    leaf.entries.iter().map(|(s, v)| (leaf.full_key(s), v.clone())).collect();
                let idx = full.partition_point(|(k, _)| k.as_slice() < key);
                full.insert(idx, (key.to_vec(), value.to_vec()));

                let mut new_leaf = LeafPage { common_prefix: Vec::new(), entries: full, next: leaf.next };
                new_leaf.restripe();

                if self.serialized_len(&PageBody::Leaf(new_leaf.clone())) <= self.config.pagesize as usize {
                    self.write_page_locked(state, page_id, PageBody::Leaf(new_leaf))?;
                    return Ok(None);
                }

                // Split: rebuild full keys (post-restripe suffixes), halve.
                let all: Vec<(Vec<u8>, Vec<u8>)> =
                    new_leaf.entries.iter().map(|(s, v)| (new_leaf.full_key(s), v.clone())).collect();
                let mid = all.len() / 2;
                let left_full = &all[..mid];
                let right_full = &all[mid..];
                let sep = discriminator(
                    self.config.discriminator,
                    &left_full.last().unwrap().0,
                    &right_full.first().unwrap().0,
                )
                .unwrap_or_else(|| right_full.first().unwrap().0.clone());

                let right_id = self.alloc_page(state);
                let mut right_leaf = LeafPage {
                    common_prefix: Vec::new(),
                    entries: right_full.to_vec(),
                    next: new_leaf.next,
                };
                right_leaf.restripe();

                let mut left_leaf = LeafPage {
                    common_prefix: Vec::new(),
                    entries: left_full.to_vec(),
                    next: Some(right_id),
                };
                left_leaf.restripe();

                self.write_page_locked(state, page_id, PageBody::Leaf(left_leaf))?;
                self.write_page_locked(state, right_id, PageBody::Leaf(right_leaf))?;
                Ok(Some((sep, right_id)))
            }
            PageBody::Internal(internal) => {
                let child = internal.child_for(key);
                let Some((sep, new_child)) = self.insert_into(state, child, key, value)? else {
                    return Ok(None);
                };

                let mut full: Vec<(Vec<u8>, PageId)> =
                    internal.routes.iter().map(|(s, c)| (internal.full_key(s), *c)).collect();
                let idx = full.partition_point(|(k, _)| k.as_slice() < sep.as_slice());
                full.insert(idx, (sep, new_child));

                let mut new_internal =
                    InternalPage { common_prefix: Vec::new(), leftmost_child: internal.leftmost_child, routes: full };
                new_internal.restripe();

                if self.serialized_len(&PageBody::Internal(new_internal.clone())) <= self.config.pagesize as usize {
                    self.write_page_locked(state, page_id, PageBody::Internal(new_internal))?;
                    return Ok(None);
                }

                let all: Vec<(Vec<u8>, PageId)> = new_internal
                    .routes
                    .iter()
                    .map(|(s, c)| (new_internal.full_key(s), *c))
                    .collect();
                let mid = all.len() / 2;
                let promoted = all[mid].clone();
                let left_routes = all[..mid].to_vec();
                let right_routes = all[mid + 1..].to_vec();

                let right_id = self.alloc_page(state);
                let mut right_internal =
                    InternalPage { common_prefix: Vec::new(), leftmost_child: promoted.1, routes: right_routes };
                right_internal.restripe();

                let mut left_internal = InternalPage {
                    common_prefix: Vec::new(),
                    leftmost_child: new_internal.leftmost_child,
                    routes: left_routes,
                };
                left_internal.restripe();

                self.write_page_locked(state, page_id, PageBody::Internal(left_internal))?;
                self.write_page_locked(state, right_id, PageBody::Internal(right_internal))?;
                Ok(Some((promoted.0, right_id)))
            }
        }
    }

    fn serialized_len(&self, body: &PageBody) -> usize {
        bincode::serialized_size(body).unwrap_or(u64::MAX) as usize
    }

    /// Ordered iteration starting at the first key `>= key`, following
    /// leaf sibling pointers. Materialized eagerly for simplicity.
    pub fn iterate_from(&self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut state = self.state.lock();
        let mut page_id = state.header.root;
        let mut leaf = loop {
            match self.read_page(&mut state, page_id)? {
                PageBody::Leaf(leaf) => break leaf,
                PageBody::Internal(internal) => page_id = internal.child_for(key),
            }
        };
        let mut out = Vec::new();
        loop {
            for (suffix, value) in &leaf.entries {
                let full = leaf.full_key(suffix);
                if full.as_slice() >= key {
                    out.push((full, value.clone()));
                }
            }
            match leaf.next {
                Some(next_id) => {
                    leaf = match self.read_page(&mut state, next_id)? {
                        PageBody::Leaf(l) => l,
                        PageBody::Internal(_) => {
                            return Err(Error::format_invalid("sibling pointer led to internal page"))
                        }
                    };
                }
                None => break,
            }
        }
        Ok(out)
    }

    pub fn size(&self) -> u64 {
        self.state.lock().header.num_keys
    }

    pub fn stats(&self) -> BtreeStats {
        let state = self.state.lock();
        BtreeStats {
            num_keys: state.header.num_keys,
            num_pages: state.header.next_page,
            pagesize: self.config.pagesize,
        }
    }
}
