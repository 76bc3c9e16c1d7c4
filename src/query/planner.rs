//! Consumes parser events and produces a query plan (spec.md §4.9).

use std::collections::HashSet;

use crate::analysis::filters::stemmer::stem_word;
use crate::core::config::Stemmer;
use crate::core::error::Result;
use crate::query::ast::{Conjunct, ConjunctKind, QueryPlan};
use crate::query::types::ParserEvent;
use crate::vocab::Vocab;

/// The planner's verdict: either a normal ranked-query plan, or the
/// special `[cache:N]`-only query recognized as a repository-retrieval
/// request (spec.md §4.10, "Cache query").
pub enum PlanOutcome {
    Plan(QueryPlan),
    CacheRequest(u32),
}

pub struct QueryPlanner<'a> {
    vocab: &'a Vocab,
    stemmer: Stemmer,
    stop_words: Option<HashSet<String>>,
    capacity: usize,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(vocab: &'a Vocab, stemmer: Stemmer, stop_words: Option<Vec<String>>, capacity: usize) -> Self {
        QueryPlanner {
            vocab,
            stemmer,
            stop_words: stop_words.map(|words| words.into_iter().collect()),
            capacity,
        }
    }

    pub fn plan(&self, events: &[ParserEvent]) -> Result<PlanOutcome> {
        if let Some(docno) = cache_request(events) {
            return Ok(PlanOutcome::CacheRequest(docno));
        }

        let mut plan = QueryPlan::default();
        let mut pending_and = false;
        let mut phrase: Option<Vec<String>> = None;

        for event in events {
            match event {
                ParserEvent::Word(term) => {
                    self.push_word(&mut plan, term, true, pending_and)?;
                    pending_and = false;
                }
                ParserEvent::WordNoStop(term) => {
                    self.push_word(&mut plan, term, false, pending_and)?;
                    pending_and = false;
                }
                ParserEvent::WordExclude(term) => {
                    if plan.is_full(self.capacity) {
                        continue;
                    }
                    let normalized = self.normalize(term, true);
                    let header = self.vocab.header(&normalized)?;
                    plan.conjuncts.push(Conjunct::exclude(normalized, header));
                }
                ParserEvent::And => pending_and = true,
                ParserEvent::Or => pending_and = false,
                ParserEvent::StartPhrase => phrase = Some(Vec::new()),
                ParserEvent::PhraseWord(term) => {
                    if let Some(terms) = phrase.as_mut() {
                        terms.push(self.normalize(term, true));
                    }
                }
                ParserEvent::EndSentence => {}
                ParserEvent::EndPhrase => {
                    if let Some(terms) = phrase.take() {
                        self.finish_phrase(&mut plan, terms)?;
                    }
                }
                ParserEvent::StartModifier(_) | ParserEvent::ModifierWord(_) | ParserEvent::EndModifier => {
                    // Modifiers on a term-by-term basis (sloppy/cutoff) are
                    // applied post hoc by `apply_modifier`, called from the
                    // CLI/query driver once the plan exists; the planner
                    // itself only needs to skip these events here.
                }
                ParserEvent::Eof => {}
            }
        }
        Ok(PlanOutcome::Plan(plan))
    }

    fn normalize(&self, term: &str, apply_stop: bool) -> String {
        let stemmed = stem_word(term, self.stemmer);
        if apply_stop {
            if let Some(stop) = &self.stop_words {
                if stop.contains(&stemmed) {
                    return String::new();
                }
            }
        }
        stemmed
    }

    fn push_word(&self, plan: &mut QueryPlan, term: &str, apply_stop: bool, and_with_prev: bool) -> Result<()> {
        if plan.is_full(self.capacity) {
            return Ok(());
        }
        let normalized = self.normalize(term, apply_stop);
        if normalized.is_empty() {
            return Ok(()); // stopped term: leaves its slot empty (spec.md §4.9 step 1)
        }
        let header = self.vocab.header(&normalized)?;

        if and_with_prev {
            if let Some(last) = plan.conjuncts.last_mut() {
                last.kind = ConjunctKind::And;
                last.terms.push(normalized.clone());
                last.headers.push(header);
                if last.headers.iter().all(Option::is_none) {
                    // whole AND group is zero-frequency; drop it entirely
                    plan.conjuncts.pop();
                }
                return Ok(());
            }
        }

        let mut conjunct = Conjunct::word(normalized, header.clone());
        if header.is_none() {
            return Ok(()); // outside AND/PHRASE, zero-frequency is a no-op
        }

        if let Some(existing) = plan
            .conjuncts
            .iter_mut()
            .find(|c| c.kind == ConjunctKind::Word && c.dedup_key() == conjunct.dedup_key())
        {
            existing.f_qt += 1;
        } else {
            conjunct.f_qt = 1;
            plan.conjuncts.push(conjunct);
        }
        Ok(())
    }

    fn finish_phrase(&self, plan: &mut QueryPlan, terms: Vec<String>) -> Result<()> {
        let terms: Vec<String> = terms.into_iter().filter(|t| !t.is_empty()).collect();
        if terms.is_empty() {
            return Ok(());
        }
        let mut headers = Vec::with_capacity(terms.len());
        for term in &terms {
            headers.push(self.vocab.header(term)?);
        }

        // Invalidate missing terms; a phrase collapses to a plain WORD once
        // only one surviving term remains (spec.md §4.9 step 4).
        let surviving: Vec<(String, _)> = terms
            .into_iter()
            .zip(headers)
            .filter(|(_, h)| h.is_some())
            .collect();

        if surviving.is_empty() {
            return Ok(());
        }
        if surviving.len() == 1 {
            let (term, header) = surviving.into_iter().next().unwrap();
            if let Some(existing) = plan
                .conjuncts
                .iter_mut()
                .find(|c| c.kind == ConjunctKind::Word && c.terms == vec![term.clone()])
            {
                existing.f_qt += 1;
            } else if !plan.is_full(self.capacity) {
                plan.conjuncts.push(Conjunct::word(term, header));
            }
            return Ok(());
        }

        if plan.is_full(self.capacity) {
            return Ok(());
        }
        let (phrase_terms, phrase_headers): (Vec<_>, Vec<_>) = surviving.into_iter().unzip();
        if let Some(existing) = plan
            .conjuncts
            .iter_mut()
            .find(|c| c.kind == ConjunctKind::Phrase && c.terms == phrase_terms)
        {
            existing.f_qt += 1;
        } else {
            plan.conjuncts.push(Conjunct {
                kind: ConjunctKind::Phrase,
                terms: phrase_terms,
                f_qt: 1,
                headers: phrase_headers,
                sloppy: None,
                cutoff: None,
            });
        }
        Ok(())
    }
}

/// Applies `[sloppy:N]` / `[cutoff:N]` modifiers to the plan built from the
/// same event stream. Runs as a second pass over `events` rather than
/// inline in `plan()`, since a modifier's target is "whichever conjunct it
/// trails," and AND-folding/dedup inside `plan()` make that target's final
/// index in `plan.conjuncts` only knowable after the whole stream is
/// walked once.
pub fn apply_modifiers(plan: &mut QueryPlan, events: &[ParserEvent]) {
    if plan.conjuncts.is_empty() {
        return;
    }
    let mut conjuncts_seen = 0usize;
    let mut target = 0usize;
    let mut i = 0;
    while i < events.len() {
        match &events[i] {
            ParserEvent::Word(_) | ParserEvent::WordNoStop(_) | ParserEvent::WordExclude(_) | ParserEvent::EndPhrase => {
                target = conjuncts_seen.min(plan.conjuncts.len() - 1);
                conjuncts_seen += 1;
            }
            ParserEvent::StartModifier(name) => {
                let mut value: Option<u32> = None;
                i += 1;
                while i < events.len() && !matches!(events[i], ParserEvent::EndModifier) {
                    if let ParserEvent::ModifierWord(word) = &events[i] {
                        if value.is_none() {
                            value = word.parse().ok();
                        }
                    }
                    i += 1;
                }
                if let Some(value) = value {
                    if let Some(conjunct) = plan.conjuncts.get_mut(target) {
                        match name.as_str() {
                            "sloppy" => conjunct.sloppy = Some(value),
                            "cutoff" => conjunct.cutoff = Some(value),
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
}

/// Recognizes the exact event shape spec.md §4.10 defines as a cache
/// query: `START_MODIFIER("cache"), WORD(digits), END_MODIFIER, EOF`.
fn cache_request(events: &[ParserEvent]) -> Option<u32> {
    if let [ParserEvent::StartModifier(name), ParserEvent::ModifierWord(word), ParserEvent::EndModifier, ParserEvent::Eof] =
        events
    {
        if name == "cache" {
            return word.parse().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::{VectorHeader, VectorPayload};
    use crate::codec::list::encode_docwp;
    use crate::core::types::VectorType;
    use crate::fdset::FdSet;
    use crate::iobtree::IoBtreeConfig;
    use tempfile::tempdir;

    fn vocab_with(dir: &std::path::Path, terms: &[&str]) -> Vocab {
        let fdset = FdSet::new(16);
        fdset.register_type(1, dir.join("vocab.%u").to_str().unwrap(), true).unwrap();
        fdset.register_type(2, dir.join("vec.%u").to_str().unwrap(), true).unwrap();
        let vocab = Vocab::create(&fdset, 1, 0, 2, IoBtreeConfig::default()).unwrap();
        for term in terms {
            let bytes = encode_docwp(&[crate::codec::list::Posting { docno: 0, tf: 1 }]);
            let header = VectorHeader {
                vtype: VectorType::Docwp,
                f_t: 1,
                big_f_t: 1,
                payload_size: bytes.len() as u64,
                payload: VectorPayload::Inline(bytes),
            };
            vocab.insert(term, &header).unwrap();
        }
        vocab
    }

    #[test]
    fn plain_words_become_word_conjuncts() {
        let dir = tempdir().unwrap();
        let vocab = vocab_with(dir.path(), &["fox", "dog"]);
        let parser = crate::query::parser::QueryParser::new(64);
        let (events, _) = parser.parse("fox dog");
        let planner = QueryPlanner::new(&vocab, Stemmer::None, None, 16);
        let PlanOutcome::Plan(plan) = planner.plan(&events).unwrap() else { panic!("expected plan") };
        assert_eq!(plan.conjuncts.len(), 2);
        assert!(plan.conjuncts.iter().all(|c| c.kind == ConjunctKind::Word));
    }

    #[test]
    fn duplicate_word_increments_f_qt_instead_of_appending() {
        let dir = tempdir().unwrap();
        let vocab = vocab_with(dir.path(), &["fox"]);
        let parser = crate::query::parser::QueryParser::new(64);
        let (events, _) = parser.parse("fox fox fox");
        let planner = QueryPlanner::new(&vocab, Stemmer::None, None, 16);
        let PlanOutcome::Plan(plan) = planner.plan(&events).unwrap() else { panic!("expected plan") };
        assert_eq!(plan.conjuncts.len(), 1);
        assert_eq!(plan.conjuncts[0].f_qt, 3);
    }

    #[test]
    fn zero_frequency_word_is_a_no_op_outside_and() {
        let dir = tempdir().unwrap();
        let vocab = vocab_with(dir.path(), &["fox"]);
        let parser = crate::query::parser::QueryParser::new(64);
        let (events, _) = parser.parse("fox unknownterm");
        let planner = QueryPlanner::new(&vocab, Stemmer::None, None, 16);
        let PlanOutcome::Plan(plan) = planner.plan(&events).unwrap() else { panic!("expected plan") };
        assert_eq!(plan.conjuncts.len(), 1);
    }

    #[test]
    fn phrase_with_one_survivor_demotes_to_word() {
        let dir = tempdir().unwrap();
        let vocab = vocab_with(dir.path(), &["fox"]);
        let parser = crate::query::parser::QueryParser::new(64);
        let (events, _) = parser.parse("\"missing fox\"");
        let planner = QueryPlanner::new(&vocab, Stemmer::None, None, 16);
        let PlanOutcome::Plan(plan) = planner.plan(&events).unwrap() else { panic!("expected plan") };
        assert_eq!(plan.conjuncts.len(), 1);
        assert_eq!(plan.conjuncts[0].kind, ConjunctKind::Word);
        assert_eq!(plan.conjuncts[0].terms, vec!["fox".to_string()]);
    }

    #[test]
    fn recognizes_cache_query() {
        let dir = tempdir().unwrap();
        let vocab = vocab_with(dir.path(), &[]);
        let parser = crate::query::parser::QueryParser::new(64);
        let (events, _) = parser.parse("[cache:42]");
        let planner = QueryPlanner::new(&vocab, Stemmer::None, None, 16);
        match planner.plan(&events).unwrap() {
            PlanOutcome::CacheRequest(docno) => assert_eq!(docno, 42),
            PlanOutcome::Plan(_) => panic!("expected cache request"),
        }
    }

    #[test]
    fn apply_modifiers_sets_sloppy_on_preceding_phrase() {
        let dir = tempdir().unwrap();
        let vocab = vocab_with(dir.path(), &["fox", "dog"]);
        let parser = crate::query::parser::QueryParser::new(64);
        let (events, _) = parser.parse("\"fox dog\" [sloppy:2]");
        let planner = QueryPlanner::new(&vocab, Stemmer::None, None, 16);
        let PlanOutcome::Plan(mut plan) = planner.plan(&events).unwrap() else { panic!("expected plan") };
        apply_modifiers(&mut plan, &events);
        assert_eq!(plan.conjuncts[0].sloppy, Some(2));
    }

    #[test]
    fn stopword_leaves_slot_empty() {
        let dir = tempdir().unwrap();
        let vocab = vocab_with(dir.path(), &["the", "fox"]);
        let parser = crate::query::parser::QueryParser::new(64);
        let (events, _) = parser.parse("the fox");
        let planner = QueryPlanner::new(&vocab, Stemmer::None, Some(vec!["the".to_string()]), 16);
        let PlanOutcome::Plan(plan) = planner.plan(&events).unwrap() else { panic!("expected plan") };
        assert_eq!(plan.conjuncts.len(), 1);
        assert_eq!(plan.conjuncts[0].terms, vec!["fox".to_string()]);
    }
}
