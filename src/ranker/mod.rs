//! Query-time ranking (spec.md §4.10): turns a `QueryPlan` into an ordered
//! list of document hits. Runs document-at-a-time over `docwp` lists for
//! plain/AND/EXCLUDE/PHRASE conjuncts, or the impact-ordered early-exit
//! traversal over `impact` lists when the collection was built
//! `--anh-impact`.

pub mod similarity;

use std::collections::HashMap;
use std::collections::HashSet;

use crate::analysis::analyzer::Analyzer;
use crate::codec::list::Posting;
use crate::core::config::{SearchConfig, Similarity};
use crate::core::error::Result;
use crate::core::stats::CollectionStats;
use crate::core::types::ExternalId;
use crate::docmap::Docmap;
use crate::query::ast::{Conjunct, ConjunctKind, QueryPlan};
use crate::repository::Repository;
use crate::vocab::{PostingList, Vocab};

/// Fraction of `accumulator_limit` kept once the accumulator table
/// overflows; the discarded tail's highest score becomes the admission
/// threshold for subsequent postings (spec.md §4.10 "Bounds").
const ACCUMULATOR_KEEP_FRACTION: f64 = 0.9;

pub struct ScoredHit {
    pub docno: u32,
    pub score: f64,
    pub external_id: Option<ExternalId>,
}

#[derive(Default)]
pub struct SearchResults {
    pub hits: Vec<ScoredHit>,
    pub estimated_total: u64,
}

/// Bounded term -> score map with dynamic-threshold pruning: once the
/// table overflows `capacity`, the lowest-scoring tail is dropped and its
/// highest discarded score becomes a floor below which new postings are
/// rejected outright, so later terms in a long plan stop paying the cost
/// of accumulating documents that can no longer make the top results.
struct AccumulatorTable {
    scores: HashMap<u32, f64>,
    capacity: usize,
    threshold: f64,
}

impl AccumulatorTable {
    fn new(capacity: usize) -> Self {
        AccumulatorTable { scores: HashMap::new(), capacity, threshold: f64::MIN }
    }

    fn add(&mut self, docno: u32, delta: f64) {
        if !self.scores.contains_key(&docno) && delta < self.threshold {
            return;
        }
        *self.scores.entry(docno).or_insert(0.0) += delta;
        if self.scores.len() > self.capacity {
            self.prune();
        }
    }

    fn prune(&mut self) {
        let keep = ((self.capacity as f64) * ACCUMULATOR_KEEP_FRACTION).max(1.0) as usize;
        if self.scores.len() <= keep {
            return;
        }
        let mut ranked: Vec<(u32, f64)> = self.scores.iter().map(|(&k, &v)| (k, v)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        self.threshold = ranked[keep].1;
        self.scores = ranked.into_iter().take(keep).collect();
    }

    fn into_hits(self) -> Vec<(u32, f64)> {
        self.scores.into_iter().collect()
    }
}

pub struct Ranker<'a> {
    vocab: &'a Vocab,
    docmap: &'a Docmap,
    repository: &'a Repository,
    analyzer: &'a Analyzer,
    stats: &'a CollectionStats,
    config: &'a SearchConfig,
}

impl<'a> Ranker<'a> {
    pub fn new(
        vocab: &'a Vocab,
        docmap: &'a Docmap,
        repository: &'a Repository,
        analyzer: &'a Analyzer,
        stats: &'a CollectionStats,
        config: &'a SearchConfig,
    ) -> Self {
        Ranker { vocab, docmap, repository, analyzer, stats, config }
    }

    pub fn search(&self, plan: &QueryPlan) -> Result<SearchResults> {
        if plan.conjuncts.is_empty() {
            return Ok(SearchResults::default());
        }
        if self.config.metric.uses_impact_ordering() {
            self.search_impact_ordered(plan)
        } else {
            self.search_document_at_a_time(plan)
        }
    }

    fn word_postings(&self, term: &str) -> Result<Option<(u32, u64, Vec<Posting>)>> {
        match self.vocab.postings(term)? {
            Some((header, PostingList::Docwp(postings))) => Ok(Some((header.f_t, header.big_f_t, postings))),
            Some((_, PostingList::Impact(_))) => Ok(None),
            None => Ok(None),
        }
    }

    fn build_exclusions(&self, plan: &QueryPlan) -> Result<HashSet<u32>> {
        let mut excluded = HashSet::new();
        for conjunct in &plan.conjuncts {
            if conjunct.kind == ConjunctKind::Exclude {
                if let Some(term) = conjunct.terms.first() {
                    if let Some((_, _, postings)) = self.word_postings(term)? {
                        excluded.extend(postings.into_iter().map(|p| p.docno));
                    }
                }
            }
        }
        Ok(excluded)
    }

    fn score_term(&self, docno: u32, f_t: u32, big_f_t: u64, tf: u32, qtf: u32) -> f64 {
        let n = self.stats.doc_count.max(1);
        let avdl = self.stats.avg_doc_length.max(1.0);
        let dl = self.docmap.length(docno).unwrap_or(1).max(1);
        match self.config.metric {
            Similarity::Okapi { k1, k3, b } => similarity::okapi_bm25(f_t, n, tf, dl, avdl, qtf, k1, k3, b),
            Similarity::Cosine => {
                let weight = self.docmap.weight(docno).map(|w| w as f64).unwrap_or(1.0);
                similarity::cosine(f_t, n, tf, weight)
            }
            Similarity::PivotedCosine { pivot } => similarity::pivoted_cosine(f_t, n, tf, dl, avdl, pivot),
            Similarity::Dirichlet { mu } => similarity::dirichlet(tf, dl, big_f_t, self.stats.total_terms, mu),
            Similarity::Hawkapi { alpha } => similarity::hawkapi(f_t, n, tf, dl, avdl, alpha, 1.2, 0.75),
            Similarity::AnhImpact => 0.0,
        }
    }

    fn accumulate_word(&self, acc: &mut AccumulatorTable, term: &str, qtf: u32, excluded: &HashSet<u32>) -> Result<()> {
        let Some((f_t, big_f_t, postings)) = self.word_postings(term)? else { return Ok(()) };
        for p in postings {
            if excluded.contains(&p.docno) {
                continue;
            }
            let score = self.score_term(p.docno, f_t, big_f_t, p.tf, qtf);
            acc.add(p.docno, score);
        }
        Ok(())
    }

    /// Co-occurrence conjunct: drives off the shortest term's postings and
    /// checks the rest by binary search (`docwp` lists are sorted by
    /// invariant 1), adding each matched term's own score contribution.
    fn accumulate_and(&self, acc: &mut AccumulatorTable, conjunct: &Conjunct, excluded: &HashSet<u32>) -> Result<()> {
        let mut lists = Vec::with_capacity(conjunct.terms.len());
        for term in &conjunct.terms {
            match self.word_postings(term)? {
                Some(entry) => lists.push(entry),
                None => return Ok(()),
            }
        }
        lists.sort_by_key(|(_, _, postings)| postings.len());
        let (driver_f_t, driver_big_f_t, driver_postings) = (&lists[0].0, &lists[0].1, &lists[0].2);

        'doc: for p in driver_postings {
            if excluded.contains(&p.docno) {
                continue;
            }
            let mut total = self.score_term(p.docno, *driver_f_t, *driver_big_f_t, p.tf, conjunct.f_qt);
            for (f_t, big_f_t, postings) in &lists[1..] {
                match postings.binary_search_by_key(&p.docno, |q| q.docno) {
                    Ok(idx) => total += self.score_term(p.docno, *f_t, *big_f_t, postings[idx].tf, conjunct.f_qt),
                    Err(_) => continue 'doc,
                }
            }
            acc.add(p.docno, total);
        }
        Ok(())
    }

    /// Phrase conjunct: restricts to the docno intersection of every
    /// term's postings (no list here carries positions, spec.md §4.2), then
    /// verifies word order by re-tokenizing the candidate's repository
    /// bytes with the same analyzer used at build time.
    fn accumulate_phrase(&self, acc: &mut AccumulatorTable, conjunct: &Conjunct, excluded: &HashSet<u32>) -> Result<()> {
        let mut lists = Vec::with_capacity(conjunct.terms.len());
        for term in &conjunct.terms {
            match self.word_postings(term)? {
                Some(entry) => lists.push(entry),
                None => return Ok(()),
            }
        }
        lists.sort_by_key(|(_, _, postings)| postings.len());
        let (driver_f_t, driver_big_f_t, driver_postings) = (&lists[0].0, &lists[0].1, &lists[0].2);
        let slop = conjunct.sloppy.unwrap_or(0) as usize;

        for p in driver_postings {
            if excluded.contains(&p.docno) {
                continue;
            }
            let all_present = lists[1..]
                .iter()
                .all(|(_, _, postings)| postings.binary_search_by_key(&p.docno, |q| q.docno).is_ok());
            if !all_present {
                continue;
            }
            let Some(pointer) = self.docmap.repo_pointer(p.docno) else { continue };
            let bytes = self.repository.read(pointer)?;
            let text = String::from_utf8_lossy(&bytes);
            let tokens = self.analyzer.analyze(&text);
            let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
            let occurrences = count_phrase_occurrences(&words, &conjunct.terms, slop);
            if occurrences == 0 {
                continue;
            }
            let score = self.score_term(p.docno, *driver_f_t, *driver_big_f_t, occurrences as u32, conjunct.f_qt);
            acc.add(p.docno, score);
        }
        Ok(())
    }

    fn search_document_at_a_time(&self, plan: &QueryPlan) -> Result<SearchResults> {
        let excluded = self.build_exclusions(plan)?;
        let mut acc = AccumulatorTable::new(self.config.accumulator_limit.max(1));
        for conjunct in &plan.conjuncts {
            match conjunct.kind {
                ConjunctKind::Word => {
                    if let Some(term) = conjunct.terms.first() {
                        self.accumulate_word(&mut acc, term, conjunct.f_qt, &excluded)?;
                    }
                }
                ConjunctKind::And => self.accumulate_and(&mut acc, conjunct, &excluded)?,
                ConjunctKind::Phrase => self.accumulate_phrase(&mut acc, conjunct, &excluded)?,
                ConjunctKind::Exclude => {}
            }
        }
        Ok(self.finish(acc.into_hits()))
    }

    /// Impact-ordered traversal (`--anh-impact` collections only): merges
    /// every conjunct's impact groups by descending impact and stops once
    /// no remaining impact value could lift a document past the current
    /// k-th best (spec.md §4.10 "impact-ordered early termination").
    /// AND/PHRASE conjuncts aren't meaningful over impact-quantized lists
    /// (no per-posting `tf` survives quantization) and are skipped here.
    fn search_impact_ordered(&self, plan: &QueryPlan) -> Result<SearchResults> {
        let excluded = self.build_exclusions(plan)?;
        let mut entries: Vec<(u32, u32)> = Vec::new();
        for conjunct in &plan.conjuncts {
            if conjunct.kind != ConjunctKind::Word {
                continue;
            }
            let Some(term) = conjunct.terms.first() else { continue };
            if let Some((_, groups)) = self.vocab.impact_postings(term)? {
                for g in groups {
                    for docno in g.docnos {
                        if !excluded.contains(&docno) {
                            entries.push((g.impact, docno));
                        }
                    }
                }
            }
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));

        let k = (self.config.start + self.config.requested).max(1);
        let mut scores: HashMap<u32, f64> = HashMap::new();
        let mut kth_bound = 0.0f64;
        for (impact, docno) in entries {
            if scores.len() >= k && (impact as f64) <= kth_bound && !scores.contains_key(&docno) {
                break;
            }
            *scores.entry(docno).or_insert(0.0) += impact as f64;
            if scores.len() >= k {
                let mut top: Vec<f64> = scores.values().copied().collect();
                top.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
                kth_bound = top[k - 1];
            }
        }
        Ok(self.finish(scores.into_iter().collect()))
    }

    fn finish(&self, scores: Vec<(u32, f64)>) -> SearchResults {
        let mut hits: Vec<ScoredHit> = scores
            .into_iter()
            .map(|(docno, score)| ScoredHit { docno, score, external_id: self.docmap.external_id(docno).cloned() })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.docno.cmp(&b.docno))
        });
        let estimated_total = hits.len() as u64;
        let windowed = hits.into_iter().skip(self.config.start).take(self.config.requested).collect();
        SearchResults { hits: windowed, estimated_total }
    }
}

/// Counts non-overlapping-start occurrences of `terms` as an in-order,
/// `slop`-tolerant subsequence of `words`: each successive term must occur
/// within `slop` words after the previous match, `slop == 0` meaning
/// strict adjacency.
fn count_phrase_occurrences(words: &[&str], terms: &[String], slop: usize) -> usize {
    if terms.is_empty() {
        return 0;
    }
    let mut count = 0;
    for start in 0..words.len() {
        if words[start] != terms[0] {
            continue;
        }
        let mut pos = start;
        let mut matched = true;
        for term in &terms[1..] {
            let window_end = (pos + 1 + slop).min(words.len().saturating_sub(1));
            let found = (pos + 1..=window_end).find(|&next| words[next] == term);
            match found {
                Some(next) => pos = next,
                None => {
                    matched = false;
                    break;
                }
            }
        }
        if matched {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::{VectorHeader, VectorPayload};
    use crate::codec::list::encode_docwp;
    use crate::core::config::Stemmer;
    use crate::core::types::{DocmapCachePolicy, MimeClass, VectorType};
    use crate::docmap::{DocmapBuilder, DocmapEntry};
    use crate::fdset::FdSet;
    use crate::iobtree::IoBtreeConfig;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        vocab: Vocab,
        docmap: Docmap,
        repository: Repository,
        analyzer: Analyzer,
        stats: CollectionStats,
    }

    fn docwp_header(postings: &[Posting]) -> VectorHeader {
        let bytes = encode_docwp(postings);
        let f_t = postings.len() as u32;
        let big_f_t: u64 = postings.iter().map(|p| p.tf as u64).sum();
        VectorHeader {
            vtype: VectorType::Docwp,
            f_t,
            big_f_t,
            payload_size: bytes.len() as u64,
            payload: VectorPayload::Inline(bytes),
        }
    }

    fn build_fixture(docs: &[(&str, &str)]) -> Fixture {
        let dir = tempdir().unwrap();
        let fdset = FdSet::new(32);
        fdset.register_type(1, dir.path().join("P.vocab.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.path().join("P.vec.%u").to_str().unwrap(), true).unwrap();

        let repository = Repository::create(fdset.clone(), 3, dir.path().join("P.repos.%u").to_str().unwrap(), 1 << 30).unwrap();
        let analyzer = Analyzer::for_build(Stemmer::None, None);

        let mut builder = DocmapBuilder::new();
        let mut postings_by_term: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut stats = CollectionStats::default();

        for (external_id, body) in docs {
            let pointer = repository.append(body.as_bytes()).unwrap();
            let tokens = analyzer.analyze(body);
            let docno = builder.push(DocmapEntry {
                external_id: crate::core::types::ExternalId(external_id.to_string()),
                repo_pointer: pointer,
                length: tokens.len() as u32,
                weight: 1.0,
                mime: MimeClass::Text,
                aux: None,
            });
            stats.record_document(tokens.len() as u32);
            let mut seen = HashSet::new();
            for token in &tokens {
                if seen.insert(token.text.clone()) {
                    postings_by_term.entry(token.text.clone()).or_default().push(Posting { docno, tf: 1 });
                }
            }
        }
        let docmap = builder.into_docmap(DocmapCachePolicy::Both);

        let vocab = Vocab::create(&fdset, 1, 0, 2, IoBtreeConfig::default()).unwrap();
        for (term, postings) in &postings_by_term {
            vocab.insert(term, &docwp_header(postings)).unwrap();
        }

        Fixture { _dir: dir, vocab, docmap, repository, analyzer, stats }
    }

    #[test]
    fn ranks_the_document_containing_both_terms_first() {
        let fixture = build_fixture(&[
            ("DOC1", "the quick fox jumps"),
            ("DOC2", "a quick brown dog runs"),
            ("DOC3", "fox and dog together"),
            ("DOC4", "quick brown rabbit hops"),
            ("DOC5", "quick cat sleeps"),
            ("DOC6", "brown bird flies"),
        ]);
        let config = SearchConfig::default();
        let ranker = Ranker::new(&fixture.vocab, &fixture.docmap, &fixture.repository, &fixture.analyzer, &fixture.stats, &config);

        let plan = QueryPlan {
            conjuncts: vec![
                Conjunct::word("fox".to_string(), fixture.vocab.header("fox").unwrap()),
                Conjunct::word("dog".to_string(), fixture.vocab.header("dog").unwrap()),
            ],
        };
        let results = ranker.search(&plan).unwrap();
        assert_eq!(results.hits[0].docno, 2); // DOC3 has both terms
    }

    #[test]
    fn phrase_conjunct_matches_only_the_exact_word_order() {
        let fixture = build_fixture(&[("DOC1", "the quick fox dog ran"), ("DOC2", "the dog fox ran away")]);
        let config = SearchConfig::default();
        let ranker = Ranker::new(&fixture.vocab, &fixture.docmap, &fixture.repository, &fixture.analyzer, &fixture.stats, &config);

        let plan = QueryPlan {
            conjuncts: vec![Conjunct {
                kind: ConjunctKind::Phrase,
                terms: vec!["fox".to_string(), "dog".to_string()],
                f_qt: 1,
                headers: vec![fixture.vocab.header("fox").unwrap(), fixture.vocab.header("dog").unwrap()],
                sloppy: None,
                cutoff: None,
            }],
        };
        let results = ranker.search(&plan).unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].docno, 0);
    }

    #[test]
    fn exclude_conjunct_removes_matching_documents() {
        let fixture = build_fixture(&[("DOC1", "fox and cat"), ("DOC2", "fox alone")]);
        let config = SearchConfig::default();
        let ranker = Ranker::new(&fixture.vocab, &fixture.docmap, &fixture.repository, &fixture.analyzer, &fixture.stats, &config);

        let plan = QueryPlan {
            conjuncts: vec![
                Conjunct::word("fox".to_string(), fixture.vocab.header("fox").unwrap()),
                Conjunct::exclude("cat".to_string(), fixture.vocab.header("cat").unwrap()),
            ],
        };
        let results = ranker.search(&plan).unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0].docno, 1);
    }

    #[test]
    fn count_phrase_occurrences_respects_slop() {
        let words = vec!["the", "quick", "brown", "fox", "dog"];
        let terms = vec!["fox".to_string(), "dog".to_string()];
        assert_eq!(count_phrase_occurrences(&words, &terms, 0), 1);

        let words = vec!["fox", "ran", "past", "dog"];
        assert_eq!(count_phrase_occurrences(&words, &terms, 0), 0);
        assert_eq!(count_phrase_occurrences(&words, &terms, 2), 1);
    }
}
