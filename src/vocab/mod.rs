//! Ties `IoBtree` (term -> vector header) and the vector file together
//! into the single "vocabulary" collaborators the build and query sides
//! share (spec.md §4.3, §4.7).

use crate::build::merger::MergedTerm;
use crate::codec::header::{decode_headers, encode_headers, VectorHeader, VectorPayload};
use crate::codec::list::{decode_docwp, decode_impact, ImpactGroup, Posting};
use crate::core::error::Result;
use crate::core::types::VectorType;
use crate::fdset::{FdSet, FileNo, TypeNo, Whence};
use crate::iobtree::{IoBtree, IoBtreeConfig};

pub struct Vocab {
    btree: IoBtree,
    fdset: FdSet,
    vector_typeno: TypeNo,
}

/// Either flavour of posting list a vocabulary entry may resolve to,
/// depending on whether the collection was built `--anh-impact`.
pub enum PostingList {
    Docwp(Vec<Posting>),
    Impact(Vec<ImpactGroup>),
}

impl Vocab {
    pub fn create(
        fdset: &FdSet,
        vocab_typeno: TypeNo,
        vocab_fileno: FileNo,
        vector_typeno: TypeNo,
        config: IoBtreeConfig,
    ) -> Result<Self> {
        let btree = IoBtree::create(fdset.clone(), vocab_typeno, vocab_fileno, config)?;
        Ok(Vocab { btree, fdset: fdset.clone(), vector_typeno })
    }

    pub fn open(
        fdset: &FdSet,
        vocab_typeno: TypeNo,
        vocab_fileno: FileNo,
        vector_typeno: TypeNo,
        config: IoBtreeConfig,
    ) -> Result<Self> {
        let btree = IoBtree::open(fdset.clone(), vocab_typeno, vocab_fileno, config)?;
        Ok(Vocab { btree, fdset: fdset.clone(), vector_typeno })
    }

    pub fn insert(&self, term: &str, header: &VectorHeader) -> Result<()> {
        self.insert_headers(term, std::slice::from_ref(header))
    }

    /// Stores every header passed under one key (spec.md §4.7: an
    /// impact-ordered build stores both a docwp and an impact header so
    /// the term stays queryable by either family of similarity measure).
    pub fn insert_headers(&self, term: &str, headers: &[VectorHeader]) -> Result<()> {
        self.btree.insert(term.as_bytes(), &encode_headers(headers))
    }

    /// Bulk-loads the merger's output. Terms arrive already sorted, but
    /// `IoBtree::insert` does its own key comparison so order isn't load
    /// bearing here.
    pub fn insert_merged(&self, terms: &[MergedTerm]) -> Result<()> {
        for term in terms {
            self.insert_headers(&term.term, &term.headers)?;
        }
        Ok(())
    }

    fn headers(&self, term: &str) -> Result<Option<Vec<VectorHeader>>> {
        match self.btree.find(term.as_bytes())? {
            Some(bytes) => Ok(Some(decode_headers(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The term's docwp header if one is stored, else whichever header is
    /// present. `f_t`/`big_f_t` are collection stats shared by both
    /// headers of a term, so either is safe to use for IDF purposes.
    pub fn header(&self, term: &str) -> Result<Option<VectorHeader>> {
        let Some(headers) = self.headers(term)? else { return Ok(None) };
        Ok(headers
            .iter()
            .find(|h| h.vtype == VectorType::Docwp)
            .or_else(|| headers.first())
            .cloned())
    }

    fn payload_bytes(&self, header: &VectorHeader) -> Result<Vec<u8>> {
        match &header.payload {
            VectorPayload::Inline(bytes) => Ok(bytes.clone()),
            VectorPayload::InVectorFile { fileno, offset } => {
                let fd = self.fdset.pin(self.vector_typeno, *fileno, 0, Whence::Start)?;
                let mut buf = vec![0u8; header.payload_size as usize];
                let mut read_total = 0;
                while read_total < buf.len() {
                    let n = self.fdset.read_at(&fd, offset + read_total as u64, &mut buf[read_total..])?;
                    if n == 0 {
                        break;
                    }
                    read_total += n;
                }
                self.fdset.unpin(&fd)?;
                Ok(buf)
            }
        }
    }

    /// Looks up a term's posting list, decoded according to its stored
    /// vector type. Prefers the docwp header when both are present
    /// (`header`'s own preference), so callers that don't care about
    /// impact-ordering get the docwp list regardless of build mode.
    pub fn postings(&self, term: &str) -> Result<Option<(VectorHeader, PostingList)>> {
        let Some(header) = self.header(term)? else { return Ok(None) };
        let bytes = self.payload_bytes(&header)?;
        let list = match header.vtype {
            VectorType::Docwp => PostingList::Docwp(decode_docwp(&bytes)?),
            VectorType::Impact => PostingList::Impact(decode_impact(&bytes)?),
        };
        Ok(Some((header, list)))
    }

    /// Looks up a term's impact-ordered posting list specifically, for the
    /// `--anh-impact` early-termination traversal. Returns `None` for a
    /// term that was only ever built docwp (`--anh-impact` off at build
    /// time), even if a docwp header exists under the same key.
    pub fn impact_postings(&self, term: &str) -> Result<Option<(VectorHeader, Vec<ImpactGroup>)>> {
        let Some(headers) = self.headers(term)? else { return Ok(None) };
        let Some(header) = headers.into_iter().find(|h| h.vtype == VectorType::Impact) else {
            return Ok(None);
        };
        let bytes = self.payload_bytes(&header)?;
        let groups = decode_impact(&bytes)?;
        Ok(Some((header, groups)))
    }

    pub fn flush(&self) -> Result<()> {
        self.btree.flush()
    }

    pub fn term_count(&self) -> u64 {
        self.btree.stats().num_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::list::encode_docwp;
    use tempfile::tempdir;

    fn inline_header(docs: u32, occurs: u64, postings: &[Posting]) -> VectorHeader {
        let bytes = encode_docwp(postings);
        VectorHeader {
            vtype: VectorType::Docwp,
            f_t: docs,
            big_f_t: occurs,
            payload_size: bytes.len() as u64,
            payload: VectorPayload::Inline(bytes),
        }
    }

    #[test]
    fn insert_then_lookup_round_trips_inline_postings() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        fdset.register_type(1, dir.path().join("vocab.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.path().join("vec.%u").to_str().unwrap(), true).unwrap();
        let vocab = Vocab::create(&fdset, 1, 0, 2, IoBtreeConfig::default()).unwrap();

        let postings = vec![Posting { docno: 0, tf: 2 }, Posting { docno: 3, tf: 1 }];
        vocab.insert("fox", &inline_header(2, 3, &postings)).unwrap();

        let (header, list) = vocab.postings("fox").unwrap().unwrap();
        assert_eq!(header.f_t, 2);
        match list {
            PostingList::Docwp(p) => assert_eq!(p, postings),
            PostingList::Impact(_) => panic!("expected docwp"),
        }
        assert!(vocab.header("missing").unwrap().is_none());
    }

    #[test]
    fn reads_spilled_payload_from_vector_file() {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        fdset.register_type(1, dir.path().join("vocab.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.path().join("vec.%u").to_str().unwrap(), true).unwrap();
        let vocab = Vocab::create(&fdset, 1, 0, 2, IoBtreeConfig::default()).unwrap();

        let postings: Vec<Posting> = (0..50).map(|i| Posting { docno: i, tf: 1 }).collect();
        let bytes = encode_docwp(&postings);
        let vector_fd = fdset.pin(2, 0, 0, Whence::Start).unwrap();
        let offset = fdset.append(&vector_fd, &bytes).unwrap();
        fdset.unpin(&vector_fd).unwrap();

        let header = VectorHeader {
            vtype: VectorType::Docwp,
            f_t: 50,
            big_f_t: 50,
            payload_size: bytes.len() as u64,
            payload: VectorPayload::InVectorFile { fileno: 0, offset },
        };
        vocab.insert("common", &header).unwrap();

        let (_, list) = vocab.postings("common").unwrap().unwrap();
        match list {
            PostingList::Docwp(p) => assert_eq!(p.len(), 50),
            PostingList::Impact(_) => panic!("expected docwp"),
        }
    }

    #[test]
    fn dual_header_term_answers_both_docwp_and_impact_lookups() {
        use crate::codec::list::{encode_impact, ImpactGroup};

        let dir = tempdir().unwrap();
        let fdset = FdSet::new(16);
        fdset.register_type(1, dir.path().join("vocab.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.path().join("vec.%u").to_str().unwrap(), true).unwrap();
        let vocab = Vocab::create(&fdset, 1, 0, 2, IoBtreeConfig::default()).unwrap();

        let postings = vec![Posting { docno: 0, tf: 2 }, Posting { docno: 1, tf: 1 }];
        let docwp_header = inline_header(2, 3, &postings);
        let impact_bytes = encode_impact(&[ImpactGroup { impact: 2, docnos: vec![0] }, ImpactGroup { impact: 1, docnos: vec![1] }]);
        let impact_header = VectorHeader {
            vtype: VectorType::Impact,
            f_t: 2,
            big_f_t: 3,
            payload_size: impact_bytes.len() as u64,
            payload: VectorPayload::Inline(impact_bytes),
        };
        vocab.insert_headers("fox", &[docwp_header, impact_header]).unwrap();

        let (_, list) = vocab.postings("fox").unwrap().unwrap();
        match list {
            PostingList::Docwp(p) => assert_eq!(p, postings),
            PostingList::Impact(_) => panic!("expected docwp to win header preference"),
        }

        let (_, groups) = vocab.impact_postings("fox").unwrap().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].impact, 2);

        assert!(vocab.impact_postings("missing").unwrap().is_none());
    }
}
