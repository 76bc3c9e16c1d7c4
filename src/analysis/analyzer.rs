use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::config::Stemmer;

/// Text analysis pipeline: the minimal token-stream contract the build
/// pipeline requires from the parser/MIME-classifier external collaborator
/// (spec.md §4.4) — word boundaries, case folding, an optional stemmer and
/// stopword filter.
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
    pub name: String,
}

impl Analyzer {
    pub fn new(name: String, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer { tokenizer, filters: Vec::new(), name }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);
        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }
        tokens
    }

    /// Builds the analyzer implied by `--stem` and `--build-stop`
    /// (spec.md §6): lowercase folding always, then an optional stemmer,
    /// then an optional stopword filter.
    pub fn for_build(stemmer: Stemmer, stopwords: Option<Vec<String>>) -> Self {
        let mut analyzer = Analyzer::new("build".to_string(), Box::new(StandardTokenizer::default()))
            .add_filter(Box::new(LowercaseFilter));
        if let Some(filter) = StemmerFilter::from_config(stemmer) {
            analyzer = analyzer.add_filter(filter);
        }
        if let Some(words) = stopwords {
            analyzer = analyzer.add_filter(Box::new(StopWordFilter::new(words)));
        }
        analyzer
    }
}
