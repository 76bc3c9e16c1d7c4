use serde::{Deserialize, Serialize};

/// Zero-based internal document identifier, dense in `[0, N)` after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocNo(pub u32);

impl DocNo {
    pub fn new(id: u32) -> Self {
        DocNo(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DocNo {
    fn from(id: u32) -> Self {
        DocNo(id)
    }
}

/// Source-assigned document identifier (e.g. TREC `<DOCNO>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalId(pub String);

/// `(fileno, offset, length)` locating original document bytes in a
/// repository file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPointer {
    pub fileno: u32,
    pub offset: u64,
    pub length: u32,
}

/// Top-level MIME classification recorded per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MimeClass {
    Text,
    Html,
    Trec,
    Inex,
    Unknown,
}

impl MimeClass {
    /// Sniffs the first bytes of a source file, as the external MIME
    /// classifier collaborator is specified to do (spec.md §4.4).
    pub fn sniff(prefix: &[u8]) -> Self {
        let head = &prefix[..prefix.len().min(16)];
        let text = String::from_utf8_lossy(head);
        let trimmed = text.trim_start();
        if trimmed.starts_with("<!DOCTYPE html") || trimmed.starts_with("<html") {
            MimeClass::Html
        } else if trimmed.starts_with("<DOC>") || trimmed.starts_with("<doc>") {
            MimeClass::Trec
        } else if trimmed.starts_with("<inex") || trimmed.starts_with("<article") {
            MimeClass::Inex
        } else if head.iter().all(|b| *b == 0 || b.is_ascii()) {
            MimeClass::Text
        } else {
            MimeClass::Unknown
        }
    }
}

/// `type` tag of a vector (posting list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorType {
    Docwp,
    Impact,
}

/// `location` tag of a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorLocation {
    Inline,
    InVectorFile,
}

/// Which docmap columns are kept memory-resident (`load.docmap-cache`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DocmapCachePolicy {
    #[default]
    None,
    ExternalId,
    Weight,
    Both,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_html() {
        assert_eq!(MimeClass::sniff(b"<html><head>"), MimeClass::Html);
    }

    #[test]
    fn sniffs_trec() {
        assert_eq!(MimeClass::sniff(b"<DOC>\n<DOCNO>"), MimeClass::Trec);
    }

    #[test]
    fn falls_back_to_text() {
        assert_eq!(MimeClass::sniff(b"the quick brown fox"), MimeClass::Text);
    }
}
