//! Docwp and impact posting-list codecs (spec.md §4.2).

use crate::codec::vbyte;
use crate::core::error::{Error, Result};

/// One `(docno, term-frequency)` posting, as decoded from a docwp list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub docno: u32,
    pub tf: u32,
}

/// `[first-docno, tf0, gap1, tf1, ...]`, all varbyte (spec.md §4.2).
/// `postings` must be sorted by strictly increasing `docno` (invariant 1).
pub fn encode_docwp(postings: &[Posting]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut last_docno = 0u32;
    for (i, p) in postings.iter().enumerate() {
        if i == 0 {
            vbyte::encode_into(p.docno as u64, &mut out);
        } else {
            vbyte::encode_into((p.docno - last_docno) as u64, &mut out);
        }
        vbyte::encode_into(p.tf as u64, &mut out);
        last_docno = p.docno;
    }
    out
}

pub fn decode_docwp(bytes: &[u8]) -> Result<Vec<Posting>> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut docno: u32 = 0;
    let mut first = true;
    while pos < bytes.len() {
        let (gap, n1) = vbyte::decode(&bytes[pos..])?;
        pos += n1;
        let (tf, n2) = vbyte::decode(&bytes[pos..])?;
        pos += n2;
        docno = if first {
            first = false;
            gap as u32
        } else {
            docno
                .checked_add(gap as u32)
                .ok_or_else(|| Error::format_invalid("docno overflow decoding docwp list"))?
        };
        out.push(Posting { docno, tf: tf as u32 });
    }
    Ok(out)
}

/// Rebases a docwp list's first docno by `offset`, used by the merger when
/// combining runs produced by batches with different docno bases
/// (spec.md §4.7).
pub fn rebase_docwp(bytes: &[u8], offset: u32) -> Result<Vec<u8>> {
    let postings = decode_docwp(bytes)?;
    let rebased: Vec<Posting> = postings
        .into_iter()
        .map(|p| Posting { docno: p.docno + offset, tf: p.tf })
        .collect();
    Ok(encode_docwp(&rebased))
}

/// One impact bucket: all documents sharing an impact value, sorted by
/// ascending docno within the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactGroup {
    pub impact: u32,
    pub docnos: Vec<u32>,
}

/// `[impact, count, first-docno, gap1, ..., gapN, impact', count', ...]`,
/// terminated by `impact == 0`. Groups must already be ordered by
/// descending impact, then ascending docno within a group.
pub fn encode_impact(groups: &[ImpactGroup]) -> Vec<u8> {
    let mut out = Vec::new();
    for g in groups {
        debug_assert!(g.impact != 0, "impact group with impact 0 is the terminator");
        vbyte::encode_into(g.impact as u64, &mut out);
        vbyte::encode_into(g.docnos.len() as u64, &mut out);
        let mut last = 0u32;
        for (i, &d) in g.docnos.iter().enumerate() {
            let gap = if i == 0 { d } else { d - last };
            vbyte::encode_into(gap as u64, &mut out);
            last = d;
        }
    }
    vbyte::encode_into(0, &mut out);
    out
}

pub fn decode_impact(bytes: &[u8]) -> Result<Vec<ImpactGroup>> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let (impact, n) = vbyte::decode(&bytes[pos..])?;
        pos += n;
        if impact == 0 {
            break;
        }
        let (count, n) = vbyte::decode(&bytes[pos..])?;
        pos += n;
        let mut docnos = Vec::with_capacity(count as usize);
        let mut docno = 0u32;
        for i in 0..count {
            let (gap, n) = vbyte::decode(&bytes[pos..])?;
            pos += n;
            docno = if i == 0 { gap as u32 } else { docno + gap as u32 };
            docnos.push(docno);
        }
        out.push(ImpactGroup { impact: impact as u32, docnos });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docwp_round_trips() {
        let postings = vec![
            Posting { docno: 0, tf: 3 },
            Posting { docno: 4, tf: 1 },
            Posting { docno: 10, tf: 2 },
        ];
        let bytes = encode_docwp(&postings);
        assert_eq!(decode_docwp(&bytes).unwrap(), postings);
    }

    #[test]
    fn docwp_decodes_strictly_increasing_docnos() {
        let postings = vec![Posting { docno: 5, tf: 1 }, Posting { docno: 9, tf: 1 }];
        let bytes = encode_docwp(&postings);
        let decoded = decode_docwp(&bytes).unwrap();
        for w in decoded.windows(2) {
            assert!(w[0].docno < w[1].docno);
        }
    }

    #[test]
    fn rebase_shifts_every_docno() {
        let postings = vec![Posting { docno: 0, tf: 1 }, Posting { docno: 2, tf: 1 }];
        let bytes = encode_docwp(&postings);
        let rebased = rebase_docwp(&bytes, 100).unwrap();
        let decoded = decode_docwp(&rebased).unwrap();
        assert_eq!(decoded[0].docno, 100);
        assert_eq!(decoded[1].docno, 102);
    }

    #[test]
    fn impact_round_trips_and_terminates_at_zero() {
        let groups = vec![
            ImpactGroup { impact: 5, docnos: vec![0, 3, 7] },
            ImpactGroup { impact: 2, docnos: vec![1, 2] },
        ];
        let bytes = encode_impact(&groups);
        assert_eq!(decode_impact(&bytes).unwrap(), groups);
    }
}
