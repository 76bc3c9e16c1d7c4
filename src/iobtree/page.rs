//! On-disk page layout for the vocabulary B+tree (spec.md §4.3).

use serde::{Deserialize, Serialize};

pub type PageId = u64;

/// Header occupying page 0: root pointer, free-page counter, and key count
/// (used by `IoBtree::size`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub root: PageId,
    pub next_page: PageId,
    pub num_keys: u64,
    pub pagesize: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafPage {
    pub common_prefix: Vec<u8>,
    /// `(key-suffix, value-bytes)`, sorted by suffix.
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    pub next: Option<PageId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalPage {
    pub common_prefix: Vec<u8>,
    pub leftmost_child: PageId,
    /// `(separator-suffix, child)`: keys `>= separator` route to `child`.
    pub routes: Vec<(Vec<u8>, PageId)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PageBody {
    Leaf(LeafPage),
    Internal(InternalPage),
}

impl LeafPage {
    pub fn empty() -> Self {
        LeafPage { common_prefix: Vec::new(), entries: Vec::new(), next: None }
    }

    pub fn full_key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut k = self.common_prefix.clone();
        k.extend_from_slice(suffix);
        k
    }

    /// Recomputes `common_prefix` across all current entries and
    /// re-strips every key, keeping storage minimal (spec.md §4.3).
    pub fn restripe(&mut self) {
        let keys: Vec<Vec<u8>> =
            self.entries.iter().map(|(s, _)| self.full_key(s)).collect();
        let new_prefix = longest_common_prefix(&keys);
        let new_entries = keys
            .into_iter()
            .zip(self.entries.iter().map(|(_, v)| v.clone()))
            .map(|(k, v)| (k[new_prefix.len()..].to_vec(), v))
            .collect();
        self.common_prefix = new_prefix;
        self.entries = new_entries;
    }
}

impl InternalPage {
    pub fn full_key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut k = self.common_prefix.clone();
        k.extend_from_slice(suffix);
        k
    }

    pub fn restripe(&mut self) {
        let mut keys: Vec<Vec<u8>> = self.routes.iter().map(|(s, _)| self.full_key(s)).collect();
        if keys.is_empty() {
            return;
        }
        let new_prefix = longest_common_prefix(&keys);
        for (k, (s, _)) in keys.drain(..).zip(self.routes.iter_mut()) {
            *s = k[new_prefix.len()..].to_vec();
        }
        self.common_prefix = new_prefix;
    }

    /// Finds the child whose subtree would contain `key`.
    pub fn child_for(&self, key: &[u8]) -> PageId {
        let mut child = self.leftmost_child;
        for (suffix, c) in &self.routes {
            let sep = self.full_key(suffix);
            if key >= sep.as_slice() {
                child = *c;
            } else {
                break;
            }
        }
        child
    }
}

pub fn longest_common_prefix(keys: &[Vec<u8>]) -> Vec<u8> {
    if keys.is_empty() {
        return Vec::new();
    }
    let mut prefix = keys[0].clone();
    for k in &keys[1..] {
        let n = prefix.iter().zip(k.iter()).take_while(|(a, b)| a == b).count();
        prefix.truncate(n);
        if prefix.is_empty() {
            break;
        }
    }
    // Cap at 127 bytes per spec.md §4.3 ("≤127 bytes").
    prefix.truncate(127);
    prefix
}

/// Shortest-discriminator algorithms for leaf splits (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscriminatorAlgorithm {
    CommonPrefix,
    SplitTerm,
}

/// `common_prefix(ki, ki+1)`: the longest byte sequence `<= ki+1`, prefixed
/// by the two keys' common prefix, preferring `last-common-byte + 1`.
pub fn common_prefix_discriminator(a: &[u8], b: &[u8]) -> Option<Vec<u8>> {
    let cp = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    if cp == a.len() && cp == b.len() {
        return None; // identical keys: split impossible
    }
    if cp == a.len() {
        // a is a strict prefix of b: a itself would equal ki, and
        // child_for routes key >= sep to the right child, so returning a
        // verbatim sends ki's own leaf key right. Extend a by b's next
        // byte instead, the shortest separator with ki < d <= ki+1.
        let mut d = a.to_vec();
        d.push(b[cp]);
        return Some(d);
    }
    let mut d = a[..cp].to_vec();
    d.push(a[cp].saturating_add(1));
    Some(d)
}

/// `split_term(ki, ki+1)`: midpoint-biased discriminator at the first
/// differing byte.
pub fn split_term_discriminator(a: &[u8], b: &[u8]) -> Option<Vec<u8>> {
    let minlen = a.len().min(b.len());
    for p in 0..minlen {
        if a[p] != b[p] {
            let lastchar = ((a[p] as u16 + b[p] as u16 + 1) / 2) as u8;
            let mut d = a[..p].to_vec();
            d.push(lastchar);
            return Some(d);
        }
    }
    if a.len() == b.len() {
        return None;
    }
    let (shorter, longer) = if a.len() < b.len() { (a, b) } else { (b, a) };
    let nextbyte = longer[shorter.len()];
    let newbyte = ((nextbyte as u16 + 1) / 2) as u8;
    let mut d = shorter.to_vec();
    d.push(newbyte);
    Some(d)
}

pub fn discriminator(algo: DiscriminatorAlgorithm, a: &[u8], b: &[u8]) -> Option<Vec<u8>> {
    match algo {
        DiscriminatorAlgorithm::CommonPrefix => common_prefix_discriminator(a, b),
        DiscriminatorAlgorithm::SplitTerm => split_term_discriminator(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_discriminator_is_tight() {
        let d = common_prefix_discriminator(b"apple", b"apply").unwrap();
        assert!(d.as_slice() >= b"apple".as_slice());
        assert!(d.as_slice() < b"apply".as_slice());
    }

    #[test]
    fn common_prefix_discriminator_handles_prefix_case() {
        let d = common_prefix_discriminator(b"app", b"apple").unwrap();
        assert_eq!(d, b"appl".to_vec());
        assert!(d.as_slice() > b"app".as_slice());
        assert!(d.as_slice() <= b"apple".as_slice());
    }

    #[test]
    fn split_term_discriminator_midpoints() {
        let d = split_term_discriminator(b"a", b"c").unwrap();
        assert_eq!(d, vec![b'b']);
    }

    #[test]
    fn discriminators_refuse_identical_keys() {
        assert!(common_prefix_discriminator(b"same", b"same").is_none());
        assert!(split_term_discriminator(b"same", b"same").is_none());
    }

    #[test]
    fn longest_common_prefix_across_many_keys() {
        let keys = vec![b"abcdef".to_vec(), b"abcxyz".to_vec(), b"abc".to_vec()];
        assert_eq!(longest_common_prefix(&keys), b"abc".to_vec());
    }
}
