//! Per-document metadata, cached by policy (spec.md §3 "Docmap").

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{DocmapCachePolicy, ExternalId, MimeClass, RepoPointer};
use crate::fdset::{FdSet, TypeNo, Whence};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocmapEntry {
    pub external_id: ExternalId,
    pub repo_pointer: RepoPointer,
    pub length: u32,
    pub weight: f32,
    pub mime: MimeClass,
    pub aux: Option<String>,
}

/// Appends entries during build; internal docnos are assigned densely by
/// push order (invariant 4).
#[derive(Default)]
pub struct DocmapBuilder {
    entries: Vec<DocmapEntry>,
}

impl DocmapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a builder with an already-committed index's entries, for the
    /// `-a` append path: new docnos continue densely from `entries.len()`
    /// (invariant 4), matching a single combined ingest.
    pub fn from_existing(entries: Vec<DocmapEntry>) -> Self {
        DocmapBuilder { entries }
    }

    pub fn push(&mut self, entry: DocmapEntry) -> u32 {
        self.entries.push(entry);
        (self.entries.len() - 1) as u32
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_docmap(self, policy: DocmapCachePolicy) -> Docmap {
        Docmap { entries: self.entries, policy }
    }
}

/// Read-only at query time (spec.md §5); which columns a caller is meant
/// to treat as resident is governed by `policy`, matching
/// `load.docmap-cache`.
pub struct Docmap {
    entries: Vec<DocmapEntry>,
    policy: DocmapCachePolicy,
}

impl Docmap {
    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recovers the raw entries, so the `-a` append path can seed a fresh
    /// `DocmapBuilder` without re-deriving per-document metadata.
    pub fn into_entries(self) -> Vec<DocmapEntry> {
        self.entries
    }

    pub fn repo_pointer(&self, docno: u32) -> Option<RepoPointer> {
        self.entries.get(docno as usize).map(|e| e.repo_pointer)
    }

    pub fn length(&self, docno: u32) -> Option<u32> {
        self.entries.get(docno as usize).map(|e| e.length)
    }

    pub fn external_id(&self, docno: u32) -> Option<&ExternalId> {
        if matches!(self.policy, DocmapCachePolicy::ExternalId | DocmapCachePolicy::Both) {
            self.entries.get(docno as usize).map(|e| &e.external_id)
        } else {
            None
        }
    }

    pub fn weight(&self, docno: u32) -> Option<f32> {
        if matches!(self.policy, DocmapCachePolicy::Weight | DocmapCachePolicy::Both) {
            self.entries.get(docno as usize).map(|e| e.weight)
        } else {
            None
        }
    }

    pub fn avg_length(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.iter().map(|e| e.length as u64).sum::<u64>() as f64 / self.entries.len() as f64
    }

    pub fn save(&self, fdset: &FdSet, typeno: TypeNo, fileno: u32) -> Result<()> {
        let bytes = bincode::serialize(&self.entries)?;
        let fd = fdset.create(typeno, fileno)?;
        fdset.write_at(&fd, 0, &bytes)?;
        fdset.unpin(&fd)
    }

    pub fn load(
        fdset: &FdSet,
        typeno: TypeNo,
        fileno: u32,
        policy: DocmapCachePolicy,
    ) -> Result<Self> {
        let fd = fdset.pin(typeno, fileno, 0, Whence::Start)?;
        let len = fdset.len(&fd)?;
        let mut buf = vec![0u8; len as usize];
        fdset.read_at(&fd, 0, &mut buf)?;
        fdset.unpin(&fd)?;
        let entries: Vec<DocmapEntry> = bincode::deserialize(&buf)?;
        Ok(Docmap { entries, policy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: &str, len: u32) -> DocmapEntry {
        DocmapEntry {
            external_id: ExternalId(id.to_string()),
            repo_pointer: RepoPointer { fileno: 0, offset: 0, length: len },
            length: len,
            weight: 1.0,
            mime: MimeClass::Text,
            aux: None,
        }
    }

    #[test]
    fn save_and_load_round_trip_with_policy() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(8);
        fdset.register_type(1, dir.path().join("P.docmap.%u").to_str().unwrap(), true).unwrap();
        let mut builder = DocmapBuilder::new();
        builder.push(entry("DOC1", 4));
        builder.push(entry("DOC2", 3));
        let docmap = builder.into_docmap(DocmapCachePolicy::Both);
        docmap.save(&fdset, 1, 0).unwrap();

        let loaded = Docmap::load(&fdset, 1, 0, DocmapCachePolicy::ExternalId).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.external_id(0).unwrap().0, "DOC1");
        assert_eq!(loaded.weight(0), None); // policy excludes weight
    }

    #[test]
    fn avg_length_matches_simple_mean() {
        let mut builder = DocmapBuilder::new();
        builder.push(entry("A", 10));
        builder.push(entry("B", 20));
        let docmap = builder.into_docmap(DocmapCachePolicy::None);
        assert_eq!(docmap.avg_length(), 15.0);
    }
}
