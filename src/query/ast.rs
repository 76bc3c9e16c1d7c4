//! Query plan conjuncts (spec.md §4.9): the planner's output, consumed by
//! the ranker.

use crate::codec::header::VectorHeader;

/// A vocabulary lookup result recorded against a conjunct, or `None` for a
/// zero-frequency term that still occupies a slot (spec.md §4.9 step 2).
pub type VocabHit = Option<VectorHeader>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConjunctKind {
    Word,
    /// Conjunctive AND of several terms that must co-occur; `f_qt` tracks
    /// how many identical AND groups were folded together.
    And,
    Phrase,
    Exclude,
}

/// One slot in the query plan. `terms` holds the stemmed, lowercased term
/// text: one entry for `Word`/`Exclude`, the ordered sequence for
/// `Phrase`/`And`.
#[derive(Debug, Clone)]
pub struct Conjunct {
    pub kind: ConjunctKind,
    pub terms: Vec<String>,
    /// Query term frequency: how many times this exact conjunct (same
    /// kind, same vocab pointer) occurred in the query.
    pub f_qt: u32,
    pub headers: Vec<VocabHit>,
    pub sloppy: Option<u32>,
    pub cutoff: Option<u32>,
}

impl Conjunct {
    pub fn word(term: String, header: VocabHit) -> Self {
        Conjunct {
            kind: ConjunctKind::Word,
            terms: vec![term],
            f_qt: 1,
            headers: vec![header],
            sloppy: None,
            cutoff: None,
        }
    }

    pub fn exclude(term: String, header: VocabHit) -> Self {
        Conjunct {
            kind: ConjunctKind::Exclude,
            terms: vec![term],
            f_qt: 1,
            headers: vec![header],
            sloppy: None,
            cutoff: None,
        }
    }

    /// Identifies this conjunct for dedup purposes: same kind, same term
    /// text, and the same vocab pointer identity (spec.md §4.9 step 3).
    pub fn dedup_key(&self) -> Option<(ConjunctKind, Vec<String>)> {
        Some((self.kind.clone(), self.terms.clone()))
    }

    /// Drops the first surviving term from a zero-frequency lookup,
    /// decrementing `f_qt`; returns `true` if the conjunct should be
    /// discarded entirely (spec.md §4.9 step 2: "if 1, drop the conjunct").
    pub fn invalidate_one(&mut self) -> bool {
        if self.f_qt <= 1 {
            true
        } else {
            self.f_qt -= 1;
            false
        }
    }
}

/// The full query plan: an ordered, capacity-bounded list of conjuncts
/// (spec.md §4.9, plan-size cap `maxterms`).
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub conjuncts: Vec<Conjunct>,
}

impl QueryPlan {
    pub fn is_full(&self, capacity: usize) -> bool {
        self.conjuncts.len() >= capacity
    }
}
