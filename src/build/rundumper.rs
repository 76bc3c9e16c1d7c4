//! Sorted on-disk run writer/reader (spec.md §4.6): accumulator batches are
//! flushed to a run file in term order once memory or the per-batch
//! document cap is exhausted, and later consumed by the merger.

use crate::build::accumulator::AccumulatorEntry;
use crate::codec::vbyte;
use crate::core::error::Result;
use crate::fdset::{FdSet, FileNo, TypeNo, Whence};

/// One term's postings as recovered from a run file.
pub struct RunEntry {
    pub term: String,
    pub docs: u32,
    pub occurs: u32,
    pub buf: Vec<u8>,
}

/// Record layout, repeated until EOF:
/// `vbyte(term_len) | term bytes | vbyte(docs) | vbyte(occurs) | vbyte(buf_len) | buf bytes`.
fn encode_entry(term: &str, entry: &AccumulatorEntry, out: &mut Vec<u8>) {
    vbyte::encode_into(term.len() as u64, out);
    out.extend_from_slice(term.as_bytes());
    vbyte::encode_into(entry.docs as u64, out);
    vbyte::encode_into(entry.occurs as u64, out);
    vbyte::encode_into(entry.buf.len() as u64, out);
    out.extend_from_slice(&entry.buf);
}

fn decode_entry(bytes: &[u8], pos: &mut usize) -> Result<RunEntry> {
    let (term_len, n) = vbyte::decode(&bytes[*pos..])?;
    *pos += n;
    let term = String::from_utf8_lossy(&bytes[*pos..*pos + term_len as usize]).into_owned();
    *pos += term_len as usize;

    let (docs, n) = vbyte::decode(&bytes[*pos..])?;
    *pos += n;
    let (occurs, n) = vbyte::decode(&bytes[*pos..])?;
    *pos += n;
    let (buf_len, n) = vbyte::decode(&bytes[*pos..])?;
    *pos += n;
    let buf = bytes[*pos..*pos + buf_len as usize].to_vec();
    *pos += buf_len as usize;

    Ok(RunEntry { term, docs: docs as u32, occurs: occurs as u32, buf })
}

/// Writes one sorted batch (as produced by `Accumulator::take_sorted`) to
/// a fresh run file. Returns the number of terms written.
pub fn dump_run(
    fdset: &FdSet,
    typeno: TypeNo,
    fileno: FileNo,
    entries: &[(String, AccumulatorEntry)],
) -> Result<usize> {
    let fd = fdset.create(typeno, fileno)?;
    let mut bytes = Vec::new();
    for (term, entry) in entries {
        encode_entry(term, entry, &mut bytes);
    }
    fdset.append(&fd, &bytes)?;
    fdset.unpin(&fd)?;
    Ok(entries.len())
}

/// Reads an entire run file back into memory, term order preserved. Runs
/// are batch-sized to fit comfortably in `accumulation_memory`, so eager
/// decoding (matching `IoBtree::iterate_from`'s approach) is adequate.
pub fn read_run(fdset: &FdSet, typeno: TypeNo, fileno: FileNo) -> Result<Vec<RunEntry>> {
    let fd = fdset.pin(typeno, fileno, 0, Whence::Start)?;
    let len = fdset.len(&fd)? as usize;
    let mut bytes = vec![0u8; len];
    let mut read_total = 0;
    while read_total < len {
        let n = fdset.read_at(&fd, read_total as u64, &mut bytes[read_total..])?;
        if n == 0 {
            break;
        }
        read_total += n;
    }
    fdset.unpin(&fd)?;

    let mut out = Vec::new();
    let mut pos = 0;
    while pos < read_total {
        out.push(decode_entry(&bytes, &mut pos)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::accumulator::Accumulator;
    use tempfile::tempdir;

    #[test]
    fn dump_then_read_round_trips_terms_and_postings() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(8);
        fdset.register_type(1, dir.path().join("run.%u").to_str().unwrap(), true).unwrap();

        let mut acc = Accumulator::new(usize::MAX, u32::MAX);
        acc.record_posting("apple", 0);
        acc.record_posting("apple", 2);
        acc.record_posting("banana", 1);
        let entries = acc.take_sorted();

        let written = dump_run(&fdset, 1, 0, &entries).unwrap();
        assert_eq!(written, 2);

        let read_back = read_run(&fdset, 1, 0).unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].term, "apple");
        assert_eq!(read_back[0].docs, 2);
        assert_eq!(read_back[1].term, "banana");
        assert_eq!(read_back[1].occurs, 1);
    }
}
