//! Document sources: Google Workspace files and local text files.

mod google;
mod local;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{Document, DocumentKind};

pub use google::{GoogleEndpoints, GoogleWorkspaceSource};
pub use local::LocalFileSource;

/// Typed failures when resolving or fetching a document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("unsupported document source `{0}`: expected a Google Docs/Slides URL or a local file")]
    Unsupported(String),
    #[error("could not extract a document id from `{0}`")]
    InvalidId(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("access denied to document: {0}")]
    AccessDenied(String),
    #[error("comments are not supported for {0}")]
    CommentsUnsupported(String),
    #[error("Google access token missing: set GOOGLE_ACCESS_TOKEN or google.access_token")]
    MissingCredentials,
}

/// Identifier of a comment added to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentReceipt {
    pub document_id: String,
    pub comment_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Anything that can produce document text and accept comments.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Document>;

    /// Add an unanchored comment to the document.
    async fn add_comment(&self, source: &str, content: &str) -> Result<CommentReceipt>;
}

/// Dispatches to Google or the local filesystem by the shape of the source.
#[derive(Clone)]
pub struct RoutingSource {
    google: Arc<dyn DocumentSource>,
    local: Arc<dyn DocumentSource>,
}

impl RoutingSource {
    pub fn new(google: Arc<dyn DocumentSource>, local: Arc<dyn DocumentSource>) -> Self {
        Self { google, local }
    }

    fn route(&self, source: &str) -> Result<&Arc<dyn DocumentSource>> {
        match DocumentKind::detect(source)? {
            DocumentKind::GoogleDoc | DocumentKind::GoogleSlides => Ok(&self.google),
            DocumentKind::LocalFile | DocumentKind::Transcript => Ok(&self.local),
        }
    }
}

#[async_trait]
impl DocumentSource for RoutingSource {
    async fn fetch(&self, source: &str) -> Result<Document> {
        self.route(source)?.fetch(source).await
    }

    async fn add_comment(&self, source: &str, content: &str) -> Result<CommentReceipt> {
        self.route(source)?.add_comment(source, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct FixedSource(&'static str);

    #[async_trait]
    impl DocumentSource for FixedSource {
        async fn fetch(&self, source: &str) -> Result<Document> {
            Ok(Document {
                source: source.to_string(),
                kind: DocumentKind::GoogleDoc,
                id: "fixed".into(),
                title: self.0.into(),
                text: String::new(),
                sections: Vec::new(),
            })
        }

        async fn add_comment(&self, _source: &str, _content: &str) -> Result<CommentReceipt> {
            Ok(CommentReceipt {
                document_id: "fixed".into(),
                comment_id: self.0.into(),
                created_at: None,
            })
        }
    }

    #[tokio::test]
    async fn routes_google_urls_and_local_paths() {
        let router = RoutingSource::new(
            Arc::new(FixedSource("google")),
            Arc::new(LocalFileSource),
        );
        let doc = router
            .fetch("https://docs.google.com/document/d/abc/edit")
            .await
            .unwrap();
        assert_eq!(doc.title, "google");

        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "Executive summary").unwrap();
        let local = router.fetch(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(local.kind, DocumentKind::LocalFile);
        assert_eq!(local.text, "Executive summary");
    }

    #[test]
    fn rejects_unsupported_sources() {
        let router = RoutingSource::new(
            Arc::new(FixedSource("google")),
            Arc::new(LocalFileSource),
        );
        let err = futures::executor::block_on(router.fetch("ftp://nowhere/doc")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SourceError>(),
            Some(SourceError::Unsupported(_))
        ));
    }
}
