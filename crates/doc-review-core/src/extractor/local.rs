use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{CommentReceipt, DocumentSource, SourceError};
use crate::document::{Document, DocumentKind};

/// Reads UTF-8 text files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSource;

#[async_trait]
impl DocumentSource for LocalFileSource {
    async fn fetch(&self, source: &str) -> Result<Document> {
        let path = Path::new(source);
        if !path.is_file() {
            return Err(SourceError::NotFound(source.to_string()).into());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read document at {}", path.display()))?;
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string());
        Ok(Document {
            source: source.to_string(),
            kind: DocumentKind::LocalFile,
            id: source.to_string(),
            title,
            text: text.trim().to_string(),
            sections: Vec::new(),
        })
    }

    async fn add_comment(&self, source: &str, _content: &str) -> Result<CommentReceipt> {
        Err(SourceError::CommentsUnsupported(format!("local file {source}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_and_uses_stem_as_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme-proposal.md");
        std::fs::write(&path, "\n# Executive Summary\nWe propose...\n").unwrap();

        let doc = LocalFileSource.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(doc.title, "acme-proposal");
        assert_eq!(doc.text, "# Executive Summary\nWe propose...");
        assert_eq!(doc.word_count(), 5);
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let err = LocalFileSource.fetch("/definitely/not/here.txt").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn comments_are_unsupported() {
        let err = LocalFileSource
            .add_comment("notes.txt", "hello")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("comments are not supported"));
    }
}
