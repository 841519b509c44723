use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use super::{CommentReceipt, DocumentSource, SourceError};
use crate::document::{extract_file_id, Document, DocumentKind, Section};

/// Base URLs for the Docs, Slides and Drive APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub docs: String,
    pub slides: String,
    pub drive: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            docs: "https://docs.googleapis.com/v1".into(),
            slides: "https://slides.googleapis.com/v1".into(),
            drive: "https://www.googleapis.com/drive/v3".into(),
        }
    }
}

impl GoogleEndpoints {
    /// Route every API to one base URL (mock servers, proxies).
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            docs: base.clone(),
            slides: base.clone(),
            drive: base,
        }
    }
}

/// Fetches Google Docs and Slides text and posts Drive comments using a
/// pre-issued OAuth bearer token.
#[derive(Debug, Clone)]
pub struct GoogleWorkspaceSource {
    http: Client,
    access_token: Option<String>,
    endpoints: GoogleEndpoints,
}

impl GoogleWorkspaceSource {
    pub fn new(access_token: Option<String>, endpoints: GoogleEndpoints) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("doc-review/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build Google HTTP client")?;
        Ok(Self {
            http,
            access_token: access_token.filter(|token| !token.trim().is_empty()),
            endpoints,
        })
    }

    fn token(&self) -> Result<&str, SourceError> {
        self.access_token
            .as_deref()
            .ok_or(SourceError::MissingCredentials)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, id: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(self.token()?)
            .send()
            .await
            .with_context(|| format!("failed to call Google API at {url}"))?;
        let response = check_status(response, id).await?;
        response
            .json()
            .await
            .with_context(|| format!("failed to parse Google API response from {url}"))
    }

    async fn fetch_doc(&self, source: &str, id: String) -> Result<Document> {
        let url = format!("{}/documents/{}", self.endpoints.docs, id);
        let doc: DocsDocument = self.get_json(&url, &id).await?;
        let (text, sections) = docs_text(&doc);
        Ok(Document {
            source: source.to_string(),
            kind: DocumentKind::GoogleDoc,
            id,
            title: doc.title.unwrap_or_else(|| "Untitled".into()),
            text,
            sections,
        })
    }

    async fn fetch_slides(&self, source: &str, id: String) -> Result<Document> {
        let url = format!("{}/presentations/{}", self.endpoints.slides, id);
        let deck: Presentation = self.get_json(&url, &id).await?;
        Ok(Document {
            source: source.to_string(),
            kind: DocumentKind::GoogleSlides,
            id,
            text: slides_text(&deck),
            title: deck.title.unwrap_or_else(|| "Untitled".into()),
            sections: Vec::new(),
        })
    }
}

async fn check_status(response: Response, id: &str) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(SourceError::NotFound(id.to_string()).into()),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            Err(SourceError::AccessDenied(id.to_string()).into())
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Google API error ({status}) for {id}: {body}")
        }
    }
}

#[async_trait]
impl DocumentSource for GoogleWorkspaceSource {
    #[instrument(name = "google_fetch", skip(self))]
    async fn fetch(&self, source: &str) -> Result<Document> {
        let kind = DocumentKind::detect(source)?;
        let id = extract_file_id(source)?;
        debug!(%id, ?kind, "fetching Google document");
        match kind {
            DocumentKind::GoogleSlides => self.fetch_slides(source, id).await,
            DocumentKind::GoogleDoc => self.fetch_doc(source, id).await,
            DocumentKind::LocalFile | DocumentKind::Transcript => {
                Err(SourceError::Unsupported(source.to_string()).into())
            }
        }
    }

    #[instrument(name = "google_comment", skip(self, content))]
    async fn add_comment(&self, source: &str, content: &str) -> Result<CommentReceipt> {
        let id = extract_file_id(source)?;
        let url = format!("{}/files/{}/comments", self.endpoints.drive, id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token()?)
            .query(&[("fields", "id,content,createdTime")])
            .json(&json!({ "content": content }))
            .send()
            .await
            .context("failed to call Drive comments API")?;
        let comment: DriveComment = check_status(response, &id)
            .await?
            .json()
            .await
            .context("failed to parse Drive comment response")?;
        info!(document_id = %id, comment_id = %comment.id, "comment added");
        Ok(CommentReceipt {
            document_id: id,
            comment_id: comment.id,
            created_at: comment.created_time,
        })
    }
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    paragraph
        .elements
        .iter()
        .filter_map(|element| element.text_run.as_ref())
        .map(|run| run.content.as_str())
        .collect::<String>()
        .trim()
        .to_string()
}

fn docs_text(doc: &DocsDocument) -> (String, Vec<Section>) {
    let mut lines = Vec::new();
    let mut sections = Vec::new();
    for element in doc.body.iter().flat_map(|body| &body.content) {
        if let Some(paragraph) = &element.paragraph {
            let text = paragraph_text(paragraph);
            if text.is_empty() {
                continue;
            }
            let style = paragraph
                .paragraph_style
                .as_ref()
                .and_then(|style| style.named_style_type.as_deref())
                .unwrap_or("NORMAL_TEXT");
            if style.starts_with("HEADING") {
                sections.push(Section {
                    style: style.to_string(),
                    text: text.clone(),
                });
            }
            lines.push(text);
        } else if let Some(table) = &element.table {
            let rows: Vec<String> = table
                .table_rows
                .iter()
                .map(|row| {
                    row.table_cells
                        .iter()
                        .map(|cell| {
                            cell.content
                                .iter()
                                .filter_map(|c| c.paragraph.as_ref())
                                .map(paragraph_text)
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect();
            let table_text = rows.join("\n");
            if !table_text.trim().is_empty() {
                lines.push(table_text);
            }
        }
    }
    (lines.join("\n"), sections)
}

fn shape_text(text: &SlidesText) -> String {
    text.text_elements
        .iter()
        .filter_map(|element| element.text_run.as_ref())
        .map(|run| run.content.as_str())
        .collect::<String>()
        .trim()
        .to_string()
}

fn slides_text(deck: &Presentation) -> String {
    deck.slides
        .iter()
        .enumerate()
        .map(|(idx, slide)| {
            let mut texts = Vec::new();
            for element in &slide.page_elements {
                if let Some(text) = element.shape.as_ref().and_then(|s| s.text.as_ref()) {
                    texts.push(shape_text(text));
                }
                if let Some(table) = &element.table {
                    for cell in table.table_rows.iter().flat_map(|row| &row.table_cells) {
                        if let Some(text) = &cell.text {
                            texts.push(shape_text(text));
                        }
                    }
                }
            }
            texts.retain(|text| !text.is_empty());
            format!("--- Slide {} ---\n{}", idx + 1, texts.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Deserialize)]
struct DocsDocument {
    title: Option<String>,
    body: Option<DocsBody>,
}

#[derive(Deserialize)]
struct DocsBody {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuralElement {
    paragraph: Option<Paragraph>,
    table: Option<DocsTable>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paragraph {
    #[serde(default)]
    elements: Vec<ParagraphElement>,
    paragraph_style: Option<ParagraphStyle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphStyle {
    named_style_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParagraphElement {
    text_run: Option<TextRun>,
}

#[derive(Deserialize)]
struct TextRun {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocsTable {
    #[serde(default)]
    table_rows: Vec<DocsTableRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocsTableRow {
    #[serde(default)]
    table_cells: Vec<DocsTableCell>,
}

#[derive(Deserialize)]
struct DocsTableCell {
    #[serde(default)]
    content: Vec<StructuralElement>,
}

#[derive(Deserialize)]
struct Presentation {
    title: Option<String>,
    #[serde(default)]
    slides: Vec<Page>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    page_elements: Vec<PageElement>,
}

#[derive(Deserialize)]
struct PageElement {
    shape: Option<Shape>,
    table: Option<SlidesTable>,
}

#[derive(Deserialize)]
struct Shape {
    text: Option<SlidesText>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlidesText {
    #[serde(default)]
    text_elements: Vec<ParagraphElement>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlidesTable {
    #[serde(default)]
    table_rows: Vec<SlidesTableRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlidesTableRow {
    #[serde(default)]
    table_cells: Vec<SlidesTableCell>,
}

#[derive(Deserialize)]
struct SlidesTableCell {
    text: Option<SlidesText>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveComment {
    id: String,
    created_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn run(text: &str) -> serde_json::Value {
        json!({"textRun": {"content": text}})
    }

    #[test]
    fn flattens_docs_paragraphs_headings_and_tables() {
        let doc: DocsDocument = serde_json::from_value(json!({
            "title": "Acme Proposal",
            "body": {"content": [
                {"sectionBreak": {}},
                {"paragraph": {
                    "elements": [run("Executive "), run("Summary\n")],
                    "paragraphStyle": {"namedStyleType": "HEADING_1"}
                }},
                {"paragraph": {"elements": [run("\n")]}},
                {"paragraph": {
                    "elements": [run("We will deliver.\n")],
                    "paragraphStyle": {"namedStyleType": "NORMAL_TEXT"}
                }},
                {"table": {"tableRows": [
                    {"tableCells": [
                        {"content": [{"paragraph": {"elements": [run("Phase\n")]}}]},
                        {"content": [{"paragraph": {"elements": [run("Cost\n")]}}]}
                    ]},
                    {"tableCells": [
                        {"content": [{"paragraph": {"elements": [run("Build\n")]}}]},
                        {"content": [{"paragraph": {"elements": [run("$10,000\n")]}}]}
                    ]}
                ]}}
            ]}
        }))
        .unwrap();

        let (text, sections) = docs_text(&doc);
        assert_eq!(
            text,
            "Executive Summary\nWe will deliver.\nPhase | Cost\nBuild | $10,000"
        );
        assert_eq!(
            sections,
            vec![Section {
                style: "HEADING_1".into(),
                text: "Executive Summary".into()
            }]
        );
    }

    #[test]
    fn renders_slides_with_markers() {
        let deck: Presentation = serde_json::from_value(json!({
            "title": "Kickoff",
            "slides": [
                {"pageElements": [
                    {"shape": {"text": {"textElements": [run("Welcome\n")]}}},
                    {"shape": {}},
                    {"table": {"tableRows": [{"tableCells": [
                        {"text": {"textElements": [run("Goal\n")]}},
                        {}
                    ]}]}}
                ]},
                {"pageElements": []}
            ]
        }))
        .unwrap();

        assert_eq!(
            slides_text(&deck),
            "--- Slide 1 ---\nWelcome\nGoal\n\n--- Slide 2 ---\n"
        );
    }

    #[test]
    fn missing_token_is_reported_before_any_request() {
        let source = GoogleWorkspaceSource::new(None, GoogleEndpoints::single("http://127.0.0.1:9")).unwrap();
        let err = futures::executor::block_on(
            source.fetch("https://docs.google.com/document/d/abc/edit"),
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SourceError>(),
            Some(&SourceError::MissingCredentials)
        );
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn fetches_document_with_bearer_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/documents/doc123")
                .header("authorization", "Bearer token-1");
            then.status(200).json_body(json!({
                "title": "Statement of Work",
                "body": {"content": [{"paragraph": {"elements": [{"textRun": {"content": "Scope\n"}}]}}]}
            }));
        });

        let source = GoogleWorkspaceSource::new(
            Some("token-1".into()),
            GoogleEndpoints::single(&server.base_url()),
        )
        .unwrap();
        let doc = source
            .fetch("https://docs.google.com/document/d/doc123/edit")
            .await
            .unwrap();
        assert_eq!(doc.title, "Statement of Work");
        assert_eq!(doc.text, "Scope");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn maps_403_to_access_denied() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/presentations/deck9");
            then.status(403);
        });

        let source = GoogleWorkspaceSource::new(
            Some("token-1".into()),
            GoogleEndpoints::single(&server.base_url()),
        )
        .unwrap();
        let err = source
            .fetch("https://docs.google.com/presentation/d/deck9/edit")
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SourceError>(),
            Some(&SourceError::AccessDenied("deck9".into()))
        );
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn posts_unanchored_comment() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/files/doc123/comments")
                .json_body(json!({"content": "Score: 88/100"}));
            then.status(200)
                .json_body(json!({"id": "c-1", "createdTime": "2024-05-01T10:00:00Z"}));
        });

        let source = GoogleWorkspaceSource::new(
            Some("token-1".into()),
            GoogleEndpoints::single(&server.base_url()),
        )
        .unwrap();
        let receipt = source
            .add_comment("https://docs.google.com/document/d/doc123/edit", "Score: 88/100")
            .await
            .unwrap();
        assert_eq!(receipt.comment_id, "c-1");
        assert_eq!(receipt.created_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        mock.assert();
    }
}
