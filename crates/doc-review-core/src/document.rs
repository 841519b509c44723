use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extractor::SourceError;
use crate::model::DocumentType;

static ID_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"/document/d/([a-zA-Z0-9_-]+)").expect("static regex"),
        Regex::new(r"/presentation/d/([a-zA-Z0-9_-]+)").expect("static regex"),
        Regex::new(r"/d/([a-zA-Z0-9_-]+)").expect("static regex"),
        Regex::new(r"^([a-zA-Z0-9_-]+)$").expect("static regex"),
    ]
});

/// Where a document's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    GoogleDoc,
    GoogleSlides,
    Transcript,
    LocalFile,
}

impl DocumentKind {
    /// Classify a user-supplied source string (URL or path).
    pub fn detect(source: &str) -> Result<Self, SourceError> {
        if source.contains("/presentation/") {
            Ok(Self::GoogleSlides)
        } else if source.contains("/document/") {
            Ok(Self::GoogleDoc)
        } else if Path::new(source).is_file() {
            Ok(Self::LocalFile)
        } else {
            Err(SourceError::Unsupported(source.to_string()))
        }
    }
}

/// Heading found while extracting a structured document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub style: String,
    pub text: String,
}

/// Extracted plain text plus the metadata the analyzer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub kind: DocumentKind,
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Document {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Document type implied by the source when the caller gives none.
    pub fn inferred_type(&self) -> DocumentType {
        infer_document_type(self.kind, &self.source)
    }
}

/// Extract a Google file id from a Docs/Slides URL or a bare id.
pub fn extract_file_id(url: &str) -> Result<String, SourceError> {
    ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SourceError::InvalidId(url.to_string()))
}

/// Slides mentioning a kickoff are kickoff decks, everything else is a proposal.
pub fn infer_document_type(kind: DocumentKind, source: &str) -> DocumentType {
    let lower = source.to_lowercase();
    match kind {
        DocumentKind::GoogleSlides if lower.contains("kickoff") || lower.contains("kick-off") => {
            DocumentType::Kickoff
        }
        _ => DocumentType::Proposal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ids_from_common_url_shapes() {
        assert_eq!(
            extract_file_id("https://docs.google.com/document/d/1AbC_-9/edit#heading=h.1").unwrap(),
            "1AbC_-9"
        );
        assert_eq!(
            extract_file_id("https://docs.google.com/presentation/d/SlideId42/edit").unwrap(),
            "SlideId42"
        );
        assert_eq!(
            extract_file_id("https://drive.google.com/file/d/xyz/view").unwrap(),
            "xyz"
        );
        assert_eq!(extract_file_id("bare_id-1").unwrap(), "bare_id-1");
    }

    #[test]
    fn rejects_urls_without_id() {
        let err = extract_file_id("https://example.com/some page").unwrap_err();
        assert!(matches!(err, SourceError::InvalidId(_)));
    }

    #[test]
    fn detects_kind_from_url() {
        assert_eq!(
            DocumentKind::detect("https://docs.google.com/presentation/d/a/edit").unwrap(),
            DocumentKind::GoogleSlides
        );
        assert_eq!(
            DocumentKind::detect("https://docs.google.com/document/d/a/edit").unwrap(),
            DocumentKind::GoogleDoc
        );
        assert!(DocumentKind::detect("https://example.com/report.pdf").is_err());
    }

    #[test]
    fn detects_local_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(DocumentKind::detect(path).unwrap(), DocumentKind::LocalFile);
    }

    #[test]
    fn infers_kickoff_only_for_slides() {
        assert_eq!(
            infer_document_type(
                DocumentKind::GoogleSlides,
                "https://docs.google.com/presentation/d/Acme-Kick-Off/edit"
            ),
            DocumentType::Kickoff
        );
        assert_eq!(
            infer_document_type(
                DocumentKind::GoogleDoc,
                "https://docs.google.com/document/d/kickoff/edit"
            ),
            DocumentType::Proposal
        );
        assert_eq!(
            infer_document_type(DocumentKind::GoogleSlides, "https://docs.google.com/presentation/d/x"),
            DocumentType::Proposal
        );
    }
}
