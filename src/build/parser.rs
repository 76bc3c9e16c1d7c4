//! Minimal parser/MIME-classifier contract the build pipeline needs from
//! its external collaborator (spec.md §4.4): a token stream plus
//! document-start/end and identifier-tag detection.

use crate::analysis::analyzer::Analyzer;
use crate::analysis::token::Token;
use crate::core::types::{ExternalId, MimeClass};

pub struct ParsedDocument {
    pub external_id: ExternalId,
    pub mime: MimeClass,
    pub body: Vec<u8>,
    pub tokens: Vec<Token>,
}

pub struct DocumentParser {
    analyzer: Analyzer,
}

impl DocumentParser {
    pub fn new(analyzer: Analyzer) -> Self {
        DocumentParser { analyzer }
    }

    /// Splits one source file into its constituent documents. TREC/INEX
    /// sources carry multiple `<DOC>...</DOC>` records; everything else is
    /// treated as a single document, identified by `fallback_id` (the
    /// build driver's per-file counter).
    pub fn parse_source(&self, bytes: &[u8], fallback_id: &str) -> Vec<ParsedDocument> {
        let mime = MimeClass::sniff(bytes);
        match mime {
            MimeClass::Trec | MimeClass::Inex => self.parse_tagged(bytes, mime),
            _ => vec![self.parse_single(bytes, mime, fallback_id)],
        }
    }

    fn parse_single(&self, bytes: &[u8], mime: MimeClass, fallback_id: &str) -> ParsedDocument {
        let text = String::from_utf8_lossy(bytes);
        let tokens = self.analyzer.analyze(&text);
        ParsedDocument {
            external_id: ExternalId(fallback_id.to_string()),
            mime,
            body: bytes.to_vec(),
            tokens,
        }
    }

    fn parse_tagged(&self, bytes: &[u8], mime: MimeClass) -> Vec<ParsedDocument> {
        let text = String::from_utf8_lossy(bytes);
        let mut out = Vec::new();
        let mut rest = text.as_ref();
        let mut seq = 0usize;
        while let Some(start) = rest.find("<DOC>") {
            let after_start = &rest[start + 5..];
            let Some(end) = after_start.find("</DOC>") else { break };
            let block = &after_start[..end];
            let external_id = extract_tag(block, "DOCNO")
                .unwrap_or_else(|| format!("UNTITLED-{}", seq));
            let tokens = self.analyzer.analyze(block);
            out.push(ParsedDocument {
                external_id: ExternalId(external_id),
                mime,
                body: block.as_bytes().to_vec(),
                tokens,
            });
            rest = &after_start[end + 6..];
            seq += 1;
        }
        out
    }
}

fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    Some(block[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_text_document() {
        let parser = DocumentParser::new(Analyzer::for_build(crate::core::config::Stemmer::None, None));
        let docs = parser.parse_source(b"the quick brown fox", "DOC0");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].external_id.0, "DOC0");
        assert_eq!(docs[0].tokens.len(), 4);
    }

    #[test]
    fn splits_trec_documents_and_extracts_docno() {
        let parser = DocumentParser::new(Analyzer::for_build(crate::core::config::Stemmer::None, None));
        let src = b"<DOC>\n<DOCNO>D1</DOCNO>\nthe lazy dog\n</DOC>\n<DOC>\n<DOCNO>D2</DOCNO>\nquick fox jumps\n</DOC>";
        let docs = parser.parse_source(src, "ignored");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].external_id.0, "D1");
        assert_eq!(docs[1].external_id.0, "D2");
    }
}
