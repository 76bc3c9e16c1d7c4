//! K-way merge of sorted runs into the vector file and the set of
//! vocabulary entries the caller hands to `IoBtree` (spec.md §4.7).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::build::rundumper::RunEntry;
use crate::codec::header::{VectorHeader, VectorPayload};
use crate::codec::list::{decode_docwp, encode_docwp, ImpactGroup, Posting};
use crate::core::error::Result;
use crate::core::types::VectorType;
use crate::fdset::{FdSet, FileNo, TypeNo};

pub struct MergedTerm {
    pub term: String,
    /// Docwp header, always present, plus an impact header when the
    /// collection is built `--anh-impact` (spec.md §4.7: both vectors are
    /// stored under the same key so non-impact metrics stay queryable).
    pub headers: Vec<VectorHeader>,
}

/// Groups sorted-by-docno postings into impact buckets by their term
/// frequency, the merge-time stand-in for `--anh-impact`'s quantized
/// similarity contribution: documents with equal `tf` share a bucket,
/// buckets ordered by descending `tf`.
fn to_impact_groups(postings: &[Posting]) -> Vec<ImpactGroup> {
    let mut by_tf: Vec<(u32, Vec<u32>)> = Vec::new();
    for p in postings {
        if let Some(last) = by_tf.last_mut() {
            if last.0 == p.tf {
                last.1.push(p.docno);
                continue;
            }
        }
        by_tf.push((p.tf, vec![p.docno]));
    }
    by_tf.sort_by(|a, b| b.0.cmp(&a.0));
    by_tf
        .into_iter()
        .map(|(impact, mut docnos)| {
            docnos.sort_unstable();
            ImpactGroup { impact, docnos }
        })
        .collect()
}

/// Merges `runs` (each already sorted by term, as produced by
/// `rundumper::read_run`) into a single vector file, writing each merged
/// term's postings as one contiguous payload. Postings for the same term
/// across runs are concatenated in run order, which is valid because
/// `Accumulator` records postings against the caller's global docno space,
/// so docnos only increase from one batch's run to the next.
pub fn merge_runs(
    fdset: &FdSet,
    vector_typeno: TypeNo,
    vector_fileno: FileNo,
    runs: Vec<Vec<RunEntry>>,
    inline_threshold: usize,
    impact_ordered: bool,
) -> Result<Vec<MergedTerm>> {
    let vector_fd = fdset.create(vector_typeno, vector_fileno)?;
    let raw = merge_runs_raw(runs)?;
    let mut out = Vec::with_capacity(raw.len());
    for (term, postings) in raw {
        out.push(finalize_term(fdset, vector_fileno, &vector_fd, term, postings, inline_threshold, impact_ordered)?);
    }
    fdset.unpin(&vector_fd)?;
    Ok(out)
}

/// The k-way merge proper, stopping short of deciding inline-vs-spilled
/// storage: returns each term's fully concatenated, docno-sorted posting
/// list. Split out from `merge_runs` so the `-a` append path can fold a
/// term's new postings into its already-committed ones (invariant 6)
/// before the inline/spill and impact-bucketing decisions are made.
pub fn merge_runs_raw(runs: Vec<Vec<RunEntry>>) -> Result<Vec<(String, Vec<Posting>)>> {
    let mut positions = vec![0usize; runs.len()];
    let mut heap: BinaryHeap<Reverse<(String, usize)>> = BinaryHeap::new();
    for (i, run) in runs.iter().enumerate() {
        if !run.is_empty() {
            heap.push(Reverse((run[0].term.clone(), i)));
        }
    }

    let mut out = Vec::new();
    while let Some(Reverse((term, first_run))) = heap.pop() {
        let mut matched = vec![first_run];
        positions[first_run] += 1;
        if positions[first_run] < runs[first_run].len() {
            heap.push(Reverse((runs[first_run][positions[first_run]].term.clone(), first_run)));
        }
        while let Some(&Reverse((ref t, _))) = heap.peek() {
            if *t != term {
                break;
            }
            let Reverse((_, run_idx)) = heap.pop().unwrap();
            matched.push(run_idx);
            positions[run_idx] += 1;
            if positions[run_idx] < runs[run_idx].len() {
                heap.push(Reverse((runs[run_idx][positions[run_idx]].term.clone(), run_idx)));
            }
        }
        matched.sort_unstable();

        let mut postings = Vec::new();
        for run_idx in matched {
            let entry = &runs[run_idx][positions[run_idx] - 1];
            postings.extend(decode_docwp(&entry.buf)?);
        }
        out.push((term, postings));
    }
    Ok(out)
}

/// Flattens impact buckets back into one docno-sorted posting list, each
/// posting's `tf` field standing in for the bucket's quantized impact.
/// Needed when folding an appended batch into an already-impact-ordered
/// vocabulary entry, since impact buckets must be recomputed over the
/// union of old and new postings rather than merged bucket-by-bucket.
pub fn flatten_impact_groups(groups: &[ImpactGroup]) -> Vec<Posting> {
    let mut out: Vec<Posting> = groups
        .iter()
        .flat_map(|g| g.docnos.iter().map(move |&docno| Posting { docno, tf: g.impact }))
        .collect();
    out.sort_by_key(|p| p.docno);
    out
}

/// Builds one encoding's vector header: inline-vs-vector-file placement
/// by `inline_threshold` (spec.md §4.7).
fn build_one_header(
    fdset: &FdSet,
    vector_fileno: FileNo,
    vector_fd: &crate::fdset::Fd,
    vtype: VectorType,
    bytes: Vec<u8>,
    f_t: u32,
    big_f_t: u64,
    inline_threshold: usize,
) -> Result<VectorHeader> {
    let payload = if bytes.len() <= inline_threshold {
        VectorPayload::Inline(bytes.clone())
    } else {
        let offset = fdset.append(vector_fd, &bytes)?;
        VectorPayload::InVectorFile { fileno: vector_fileno, offset }
    };
    Ok(VectorHeader { vtype, f_t, big_f_t, payload_size: bytes.len() as u64, payload })
}

/// Builds the vector header(s) for one term's final posting list. Always
/// produces a docwp header; when the collection is built `--anh-impact`
/// also produces an impact header over the same postings, so a non-impact
/// metric can still be queried against an impact-ordered collection
/// (spec.md §4.7).
pub fn build_vector_headers(
    fdset: &FdSet,
    vector_fileno: FileNo,
    vector_fd: &crate::fdset::Fd,
    postings: &[Posting],
    inline_threshold: usize,
    impact_ordered: bool,
) -> Result<Vec<VectorHeader>> {
    let f_t = postings.len() as u32;
    let big_f_t: u64 = postings.iter().map(|p| p.tf as u64).sum();

    let docwp = build_one_header(
        fdset,
        vector_fileno,
        vector_fd,
        VectorType::Docwp,
        encode_docwp(postings),
        f_t,
        big_f_t,
        inline_threshold,
    )?;
    if !impact_ordered {
        return Ok(vec![docwp]);
    }
    let groups = to_impact_groups(postings);
    let impact = build_one_header(
        fdset,
        vector_fileno,
        vector_fd,
        VectorType::Impact,
        crate::codec::list::encode_impact(&groups),
        f_t,
        big_f_t,
        inline_threshold,
    )?;
    Ok(vec![docwp, impact])
}

/// Builds one term's `MergedTerm` from its concatenated postings.
pub fn finalize_term(
    fdset: &FdSet,
    vector_fileno: FileNo,
    vector_fd: &crate::fdset::Fd,
    term: String,
    postings: Vec<Posting>,
    inline_threshold: usize,
    impact_ordered: bool,
) -> Result<MergedTerm> {
    let headers = build_vector_headers(fdset, vector_fileno, vector_fd, &postings, inline_threshold, impact_ordered)?;
    Ok(MergedTerm { term, headers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::accumulator::Accumulator;
    use crate::build::rundumper::{dump_run, read_run};
    use tempfile::tempdir;

    fn make_run(fdset: &FdSet, typeno: TypeNo, fileno: FileNo, postings: &[(&str, u32)]) {
        let mut acc = Accumulator::new(usize::MAX, u32::MAX);
        for (term, docno) in postings {
            acc.record_posting(term, *docno);
        }
        dump_run(fdset, typeno, fileno, &acc.take_sorted()).unwrap();
    }

    #[test]
    fn merges_same_term_across_two_runs_preserving_docno_order() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        fdset.register_type(1, dir.path().join("run.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.path().join("vec.%u").to_str().unwrap(), true).unwrap();

        make_run(&fdset, 1, 0, &[("fox", 0), ("fox", 2), ("zebra", 1)]);
        make_run(&fdset, 1, 1, &[("fox", 5), ("mango", 6)]);

        let run0 = read_run(&fdset, 1, 0).unwrap();
        let run1 = read_run(&fdset, 1, 1).unwrap();

        let merged = merge_runs(&fdset, 2, 0, vec![run0, run1], 4096, false).unwrap();
        let terms: Vec<&str> = merged.iter().map(|m| m.term.as_str()).collect();
        assert_eq!(terms, vec!["fox", "mango", "zebra"]);

        let fox = &merged[0];
        assert_eq!(fox.headers.len(), 1);
        assert_eq!(fox.headers[0].f_t, 3);
        let VectorPayload::Inline(bytes) = &fox.headers[0].payload else { panic!("expected inline") };
        let postings = decode_docwp(bytes).unwrap();
        assert_eq!(postings.iter().map(|p| p.docno).collect::<Vec<_>>(), vec![0, 2, 5]);
    }

    #[test]
    fn large_payload_spills_to_vector_file() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        fdset.register_type(1, dir.path().join("run.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.path().join("vec.%u").to_str().unwrap(), true).unwrap();

        let postings: Vec<(&str, u32)> = (0..200).map(|_| ("common", 0)).collect();
        // build a single run with many distinct docnos instead of repeats
        let mut acc = Accumulator::new(usize::MAX, u32::MAX);
        for docno in 0..200u32 {
            acc.record_posting("common", docno);
        }
        dump_run(&fdset, 1, 0, &acc.take_sorted()).unwrap();
        let _ = postings;

        let run0 = read_run(&fdset, 1, 0).unwrap();
        let merged = merge_runs(&fdset, 2, 0, vec![run0], 16, false).unwrap();
        let VectorPayload::InVectorFile { .. } = &merged[0].headers[0].payload else {
            panic!("expected spilled payload")
        };
    }

    #[test]
    fn impact_build_stores_both_docwp_and_impact_headers() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        fdset.register_type(1, dir.path().join("run.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.path().join("vec.%u").to_str().unwrap(), true).unwrap();

        make_run(&fdset, 1, 0, &[("fox", 0), ("fox", 0), ("fox", 2)]);
        let run0 = read_run(&fdset, 1, 0).unwrap();
        let merged = merge_runs(&fdset, 2, 0, vec![run0], 4096, true).unwrap();

        let fox = &merged[0];
        assert_eq!(fox.headers.len(), 2);
        assert_eq!(fox.headers[0].vtype, VectorType::Docwp);
        assert_eq!(fox.headers[1].vtype, VectorType::Impact);
        assert_eq!(fox.headers[0].f_t, fox.headers[1].f_t);

        let VectorPayload::Inline(docwp_bytes) = &fox.headers[0].payload else { panic!("expected inline") };
        let postings = decode_docwp(docwp_bytes).unwrap();
        assert_eq!(postings.iter().map(|p| p.docno).collect::<Vec<_>>(), vec![0, 2]);
    }
}
