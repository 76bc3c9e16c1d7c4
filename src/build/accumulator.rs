//! In-memory posting accumulator with bounded memory (spec.md §4.5).

use std::collections::HashMap;

use crate::codec::vbyte;

/// Rough per-entry bookkeeping overhead charged against the memory budget,
/// on top of the term bytes and buffer length (hashtable node, `String`
/// allocation header, etc).
const ENTRY_OVERHEAD: usize = 64;

#[derive(Debug, Default)]
pub struct AccumulatorEntry {
    pub docs: u32,
    pub occurs: u32,
    pub last_doc: u32,
    pub buf: Vec<u8>,
    last_tf: u32,
    last_tf_offset: usize,
}

/// `term -> { docs, occurs, last_doc, buf }` (spec.md §4.5), bounded by a
/// memory budget `M` and an independent per-batch document cap.
pub struct Accumulator {
    entries: HashMap<String, AccumulatorEntry>,
    memory_used: usize,
    memory_budget: usize,
    docs_in_batch: u32,
    accdoc_limit: u32,
}

impl Accumulator {
    pub fn new(memory_budget: usize, accdoc_limit: u32) -> Self {
        Accumulator {
            entries: HashMap::new(),
            memory_used: 0,
            memory_budget,
            docs_in_batch: 0,
            accdoc_limit,
        }
    }

    /// Called once per document, before its postings are recorded.
    /// Returns `true` once the per-batch document cap (`accdoc`) is hit.
    pub fn note_document(&mut self) -> bool {
        self.docs_in_batch += 1;
        self.docs_in_batch >= self.accdoc_limit
    }

    /// Records one `(term, docno, tf=1)` posting emitted by the parser.
    pub fn record_posting(&mut self, term: &str, docno: u32) {
        if !self.entries.contains_key(term) {
            self.memory_used += term.len() + ENTRY_OVERHEAD;
            self.entries.insert(term.to_string(), AccumulatorEntry::default());
        }
        let entry = self.entries.get_mut(term).unwrap();

        if entry.docs > 0 && entry.last_doc == docno {
            entry.buf.truncate(entry.last_tf_offset);
            let before = entry.buf.len();
            entry.last_tf += 1;
            vbyte::encode_into(entry.last_tf as u64, &mut entry.buf);
            self.memory_used += entry.buf.len() - before;
        } else {
            let gap = if entry.docs == 0 { docno } else { docno - entry.last_doc };
            let before = entry.buf.len();
            vbyte::encode_into(gap as u64, &mut entry.buf);
            entry.last_tf_offset = entry.buf.len();
            entry.last_tf = 1;
            vbyte::encode_into(1, &mut entry.buf);
            self.memory_used += entry.buf.len() - before;
            entry.last_doc = docno;
            entry.docs += 1;
        }
        entry.occurs += 1;
    }

    pub fn should_dump(&self) -> bool {
        self.memory_used >= self.memory_budget
    }

    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains the accumulator, returning entries sorted by term for the
    /// run dumper (spec.md §4.6), and resets all bounds tracking.
    pub fn take_sorted(&mut self) -> Vec<(String, AccumulatorEntry)> {
        let mut entries: Vec<(String, AccumulatorEntry)> = self.entries.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.memory_used = 0;
        self.docs_in_batch = 0;
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::list::decode_docwp;

    #[test]
    fn repeated_posting_in_same_document_increments_tf_without_growing_entry_count() {
        let mut acc = Accumulator::new(usize::MAX, u32::MAX);
        acc.record_posting("fox", 0);
        acc.record_posting("fox", 0);
        acc.record_posting("fox", 0);
        let entries = acc.take_sorted();
        assert_eq!(entries.len(), 1);
        let (_, entry) = &entries[0];
        assert_eq!(entry.docs, 1);
        assert_eq!(entry.occurs, 3);
        let postings = decode_docwp(&entry.buf).unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].tf, 3);
    }

    #[test]
    fn distinct_documents_produce_increasing_docno_gaps() {
        let mut acc = Accumulator::new(usize::MAX, u32::MAX);
        acc.record_posting("fox", 0);
        acc.record_posting("fox", 4);
        acc.record_posting("fox", 4);
        acc.record_posting("fox", 10);
        let entries = acc.take_sorted();
        let (_, entry) = &entries[0];
        let postings = decode_docwp(&entry.buf).unwrap();
        assert_eq!(postings.len(), 3);
        assert_eq!(postings[0].docno, 0);
        assert_eq!(postings[1].docno, 4);
        assert_eq!(postings[1].tf, 2);
        assert_eq!(postings[2].docno, 10);
    }

    #[test]
    fn take_sorted_orders_terms_lexicographically() {
        let mut acc = Accumulator::new(usize::MAX, u32::MAX);
        acc.record_posting("zebra", 0);
        acc.record_posting("apple", 0);
        acc.record_posting("mango", 0);
        let entries = acc.take_sorted();
        let terms: Vec<&str> = entries.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(terms, vec!["apple", "mango", "zebra"]);
        assert!(acc.is_empty());
    }

    #[test]
    fn note_document_enforces_accdoc_limit() {
        let mut acc = Accumulator::new(usize::MAX, 2);
        assert!(!acc.note_document());
        assert!(acc.note_document());
    }
}
