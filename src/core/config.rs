use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `new.*` / `-i`, `-a`, `--stem`, memory knobs from the CLI surface.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub index_root: PathBuf,
    pub append: bool,
    pub file_list: Option<PathBuf>,
    pub stemmer: Stemmer,
    pub build_stop: Option<PathBuf>,
    pub anh_impact: bool,
    pub big_and_fast: bool,
    /// `-m` / `--accumulation-memory`: bytes before the accumulator dumps
    /// to a run (spec.md §4.5 "Bounds").
    pub accumulation_memory: usize,
    pub dump_memory: usize,
    pub parse_buffer: usize,
    pub tablesize: usize,
    pub max_file_size: u64,
    pub inline_threshold: usize,
    pub maxwordlen: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            index_root: PathBuf::from("./index"),
            append: false,
            file_list: None,
            stemmer: Stemmer::None,
            build_stop: None,
            anh_impact: false,
            big_and_fast: false,
            accumulation_memory: 64 * 1024 * 1024,
            dump_memory: 16 * 1024 * 1024,
            parse_buffer: 64 * 1024,
            tablesize: 1 << 20,
            max_file_size: 2 * 1024 * 1024 * 1024,
            inline_threshold: 64,
            maxwordlen: 256,
        }
    }
}

/// `load.*`: options controlling how an existing index is opened.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub ignore_version: bool,
    pub parsebuf: usize,
    pub tablesize: usize,
    pub vocab_size: usize,
    pub maxflist_size: usize,
    pub docmap_cache: crate::core::types::DocmapCachePolicy,
    pub qstop: Option<PathBuf>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            ignore_version: false,
            parsebuf: 64 * 1024,
            tablesize: 1 << 16,
            vocab_size: 1 << 16,
            maxflist_size: 1 << 20,
            docmap_cache: Default::default(),
            qstop: None,
        }
    }
}

/// `search.*`: per-query knobs from the CLI surface.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub requested: usize,
    pub start: usize,
    pub summary: SummaryType,
    pub metric: Similarity,
    pub accumulator_limit: usize,
    /// `search.word-limit`: a ceiling enforced by the query parser,
    /// distinct from `plan_capacity` (spec.md §9 open ambiguity; see
    /// DESIGN.md for the resolution).
    pub query_word_limit: usize,
    /// `maxterms`: the hard cap on plan length (`plan.terms < maxterms`).
    pub plan_capacity: usize,
    /// `None` disables query-time stopping; `Some("default")` selects the
    /// compiled-in default list; any other path loads a custom list.
    pub query_stop: Option<String>,
    pub query_list: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            requested: 20,
            start: 0,
            summary: SummaryType::None,
            metric: Similarity::Okapi { k1: 1.2, k3: 1e10, b: 0.75 },
            accumulator_limit: 20_000,
            query_word_limit: 1024,
            plan_capacity: 1024,
            query_stop: None,
            query_list: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stemmer {
    None,
    Eds,
    Light,
    Porters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryType {
    None,
    Plain,
    Capitalise,
    Tag,
}

/// `search.metric`: the similarity measure selected for a query
/// (spec.md §4.10). Constants are tunable; semantics are pinned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Similarity {
    Okapi { k1: f64, k3: f64, b: f64 },
    Cosine,
    PivotedCosine { pivot: f64 },
    Dirichlet { mu: f64 },
    Hawkapi { alpha: f64 },
    AnhImpact,
}

impl Similarity {
    pub fn uses_impact_ordering(&self) -> bool {
        matches!(self, Similarity::AnhImpact)
    }
}
