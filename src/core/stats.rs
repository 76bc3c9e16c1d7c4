use serde::{Deserialize, Serialize};

use crate::core::config::Stemmer;

/// Collection-wide statistics accumulated during build and persisted in the
/// parameters file so query time doesn't need to rescan the docmap to
/// compute `avdl` for BM25/Dirichlet (SPEC_FULL.md §2 supplement).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub doc_count: u32,
    pub total_terms: u64,
    pub avg_doc_length: f64,
}

impl CollectionStats {
    pub fn record_document(&mut self, term_count: u32) {
        self.doc_count += 1;
        self.total_terms += term_count as u64;
        self.avg_doc_length = self.total_terms as f64 / self.doc_count.max(1) as f64;
    }
}

/// Current on-disk parameters format. Bumped whenever the layout of
/// `Parameters` changes incompatibly.
pub const PARAMETERS_FORMAT_VERSION: u32 = 1;

/// The parameters file (spec.md §3): a self-describing record of the
/// index's build-time invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub version: u32,
    pub maxwordlen: usize,
    pub max_file_size: u64,
    pub stemmer: Stemmer,
    pub stopword_list_id: Option<String>,
    /// The resolved `--build-stop` word list itself (not just its label),
    /// so query-time phrase verification can re-tokenize a document with
    /// the exact filter pipeline that produced its indexed terms.
    pub build_stop_words: Option<Vec<String>>,
    pub vector_header_version: u32,
    pub impact_ordered: bool,
    pub vocab_listsize: usize,
    pub inline_threshold: usize,
    pub stats: CollectionStats,
    /// Repository write cursor at commit time, so `-a` append can resume
    /// the same repository file set via `Repository::open_existing`.
    pub repo_last_fileno: u32,
    pub repo_last_offset: u64,
    /// Next unused vector-file fileno; fileno 0 is the initial merge's
    /// vector file, each subsequent `-a` append claims the next one.
    pub vector_next_fileno: u32,
}

impl Parameters {
    pub fn new(
        maxwordlen: usize,
        max_file_size: u64,
        stemmer: Stemmer,
        stopword_list_id: Option<String>,
        impact_ordered: bool,
        inline_threshold: usize,
    ) -> Self {
        Parameters {
            version: PARAMETERS_FORMAT_VERSION,
            maxwordlen,
            max_file_size,
            stemmer,
            stopword_list_id,
            build_stop_words: None,
            vector_header_version: 1,
            impact_ordered,
            vocab_listsize: 0,
            inline_threshold,
            stats: CollectionStats::default(),
            repo_last_fileno: 0,
            repo_last_offset: 0,
            vector_next_fileno: 0,
        }
    }

    pub fn to_bytes(&self) -> crate::core::error::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8], ignore_version: bool) -> crate::core::error::Result<Self> {
        let params: Parameters = bincode::deserialize(bytes)?;
        if !ignore_version && params.version != PARAMETERS_FORMAT_VERSION {
            return Err(crate::core::error::Error::format_invalid(format!(
                "parameters file version {} does not match expected {}",
                params.version, PARAMETERS_FORMAT_VERSION
            )));
        }
        Ok(params)
    }
}
