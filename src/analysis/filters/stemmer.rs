use rust_stemmers::{Algorithm, Stemmer};

use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;
use crate::core::config::Stemmer as StemmerConfig;

/// Porter (Snowball English) stemming via `rust_stemmers`.
pub struct StemmerFilter {
    pub algorithm: Algorithm,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter { algorithm }
    }

    /// Builds the filter chain implied by `--stem` (spec.md §6). `None`
    /// means no stemming filter is added at all.
    pub fn from_config(stemmer: StemmerConfig) -> Option<Box<dyn TokenFilter>> {
        match stemmer {
            StemmerConfig::None => None,
            StemmerConfig::Porters => Some(Box::new(StemmerFilter::new(Algorithm::English))),
            StemmerConfig::Light => Some(Box::new(LightStemmerFilter)),
            StemmerConfig::Eds => Some(Box::new(EdsStemmerFilter)),
        }
    }
}

impl TokenFilter for StemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        let stemmer = Stemmer::create(self.algorithm);

        tokens
            .into_iter()
            .map(|mut token| {
                token.text = stemmer.stem(&token.text).to_string();
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "stemmer"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(StemmerFilter { algorithm: self.algorithm })
    }
}

/// A conservative inflectional-suffix stripper, standing in for the
/// reference engine's "light" stemmer (plurals and common verb endings
/// only, no Porter-style recursive rewriting).
pub struct LightStemmerFilter;

impl TokenFilter for LightStemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|mut token| {
                token.text = light_stem(&token.text);
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "light_stemmer"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(LightStemmerFilter)
    }
}

/// Stems one already-tokenized word, for callers that operate outside the
/// `Tokenizer`/`TokenFilter` pipeline (the query planner's term handling).
pub fn stem_word(word: &str, stemmer: StemmerConfig) -> String {
    match stemmer {
        StemmerConfig::None => word.to_string(),
        StemmerConfig::Porters => Stemmer::create(Algorithm::English).stem(word).to_string(),
        StemmerConfig::Light => light_stem(word),
        StemmerConfig::Eds => match word.strip_suffix('s') {
            Some(stripped) if stripped.len() >= 3 => stripped.to_string(),
            _ => word.to_string(),
        },
    }
}

fn light_stem(word: &str) -> String {
    for suffix in ["ing", "edly", "ed", "ies", "es", "s"] {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped.to_string();
            }
        }
    }
    word.to_string()
}

/// End-designator stripper: removes a single trailing plural/possessive
/// marker only, the lightest of the three stemmers.
pub struct EdsStemmerFilter;

impl TokenFilter for EdsStemmerFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|mut token| {
                if let Some(stripped) = token.text.strip_suffix('s') {
                    if stripped.len() >= 3 {
                        token.text = stripped.to_string();
                    }
                }
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "eds_stemmer"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(EdsStemmerFilter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_stemmer_strips_common_suffixes() {
        assert_eq!(light_stem("jumps"), "jump");
        assert_eq!(light_stem("running"), "runn");
        assert_eq!(light_stem("fox"), "fox");
    }
}
