//! Slack notifications for finished analyses and new Fathom recordings.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::fathom::WebhookPayload;
use crate::llm::truncate;
use crate::model::{AnalysisResult, ConnectionCheck};

pub const DEFAULT_CHANNEL: &str = "document-analyzer-test";
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";
const TOP_ISSUES: usize = 10;
const SUMMARY_CHARS: usize = 500;
const ACTION_ITEMS: usize = 5;

/// Where a message went, or what would have been sent in dry-run mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub dry_run: bool,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Plain-text rendering, only for dry runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

/// Destination for analysis results and recording notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_analysis(&self, result: &AnalysisResult) -> Result<PostReceipt>;

    async fn post_fathom_recording(&self, payload: &WebhookPayload) -> Result<PostReceipt>;

    /// Verify the credentials without posting anything.
    async fn test_connection(&self) -> ConnectionCheck;
}

#[derive(Debug, Error)]
#[error("Slack {method} failed: {error}")]
pub struct SlackApiError {
    pub method: &'static str,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct SlackSettings {
    /// Without a token the notifier only logs what it would send.
    pub bot_token: Option<String>,
    pub channel: String,
    /// Appended as `cc <mention>` when set.
    pub mention: Option<String>,
    /// e.g. `https://acme.slack.com`, used to build message permalinks.
    pub workspace_url: Option<String>,
    pub api_base: String,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel: DEFAULT_CHANNEL.into(),
            mention: None,
            workspace_url: None,
            api_base: DEFAULT_API_BASE.into(),
        }
    }
}

/// Posts Block Kit messages through `chat.postMessage`.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    http: Client,
    settings: SlackSettings,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

impl SlackNotifier {
    pub fn new(settings: SlackSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("doc-review/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build Slack HTTP client")?;
        Ok(Self { http, settings })
    }

    pub fn is_dry_run(&self) -> bool {
        self.token().is_none()
    }

    fn token(&self) -> Option<&str> {
        self.settings
            .bot_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }

    fn message_url(&self, channel: &str, ts: &str) -> Option<String> {
        self.settings.workspace_url.as_deref().map(|base| {
            format!(
                "{}/archives/{channel}/p{}",
                base.trim_end_matches('/'),
                ts.replace('.', "")
            )
        })
    }

    fn dry_run(&self, preview: String) -> PostReceipt {
        info!(channel = %self.settings.channel, "dry run, Slack message not sent:\n{preview}");
        PostReceipt {
            dry_run: true,
            channel: self.settings.channel.clone(),
            ts: None,
            url: None,
            preview: Some(preview),
        }
    }

    async fn auth_test(&self, token: &str) -> Result<AuthTestResponse> {
        let url = format!("{}/auth.test", self.settings.api_base.trim_end_matches('/'));
        self.http
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("failed to reach Slack")?
            .error_for_status()
            .context("Slack returned an HTTP error")?
            .json()
            .await
            .context("failed to parse Slack response")
    }

    async fn post_message(&self, token: &str, blocks: Vec<Value>, text: String) -> Result<PostReceipt> {
        let url = format!("{}/chat.postMessage", self.settings.api_base.trim_end_matches('/'));
        let body = json!({
            "channel": self.settings.channel,
            "blocks": blocks,
            "text": text,
        });
        let response: PostMessageResponse = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("failed to reach Slack")?
            .error_for_status()
            .context("Slack returned an HTTP error")?
            .json()
            .await
            .context("failed to parse Slack response")?;
        if !response.ok {
            return Err(SlackApiError {
                method: "chat.postMessage",
                error: response.error.unwrap_or_else(|| "unknown_error".into()),
            }
            .into());
        }
        let channel = response
            .channel
            .unwrap_or_else(|| self.settings.channel.clone());
        let url = response
            .ts
            .as_deref()
            .and_then(|ts| self.message_url(&channel, ts));
        debug!(%channel, ts = ?response.ts, "Slack message posted");
        Ok(PostReceipt {
            dry_run: false,
            channel,
            ts: response.ts,
            url,
            preview: None,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    #[instrument(name = "slack_post_analysis", skip(self, result), fields(title = %result.document_title))]
    async fn post_analysis(&self, result: &AnalysisResult) -> Result<PostReceipt> {
        let mention = self.settings.mention.as_deref();
        match self.token() {
            None => Ok(self.dry_run(analysis_text(result, mention))),
            Some(token) => {
                self.post_message(
                    token,
                    analysis_blocks(result, mention),
                    format!("Document Analysis: {}", result.document_title),
                )
                .await
            }
        }
    }

    #[instrument(name = "slack_post_recording", skip(self, payload), fields(recording_id = %payload.recording_id))]
    async fn post_fathom_recording(&self, payload: &WebhookPayload) -> Result<PostReceipt> {
        match self.token() {
            None => Ok(self.dry_run(format!("New Fathom Recording: {}", payload.title))),
            Some(token) => {
                self.post_message(
                    token,
                    recording_blocks(payload, self.settings.mention.as_deref()),
                    format!("New Fathom Recording: {}", payload.title),
                )
                .await
            }
        }
    }

    async fn test_connection(&self) -> ConnectionCheck {
        let Some(token) = self.token() else {
            return ConnectionCheck::failed("no bot token configured");
        };
        match self.auth_test(token).await {
            Ok(response) if response.ok => ConnectionCheck::ok(format!(
                "team {} as {}",
                response.team.as_deref().unwrap_or("unknown"),
                response.user.as_deref().unwrap_or("unknown")
            )),
            Ok(response) => ConnectionCheck::failed(
                SlackApiError {
                    method: "auth.test",
                    error: response.error.unwrap_or_else(|| "unknown_error".into()),
                }
                .to_string(),
            ),
            Err(err) => ConnectionCheck::failed(format!("{err:#}")),
        }
    }
}

pub fn score_emoji(score: u8) -> &'static str {
    match score {
        90.. => "🟢",
        70..=89 => "🟡",
        50..=69 => "🟠",
        _ => "🔴",
    }
}

fn mrkdwn_section(text: String) -> Value {
    json!({"type": "section", "text": {"type": "mrkdwn", "text": text}})
}

fn fields_section(fields: [String; 2]) -> Value {
    json!({
        "type": "section",
        "fields": fields
            .iter()
            .map(|text| json!({"type": "mrkdwn", "text": text}))
            .collect::<Vec<_>>(),
    })
}

fn header(text: &str) -> Value {
    json!({"type": "header", "text": {"type": "plain_text", "text": text}})
}

fn mention_context(mention: &str) -> Value {
    json!({"type": "context", "elements": [{"type": "mrkdwn", "text": format!("cc {mention}")}]})
}

fn bannt_lines(result: &AnalysisResult) -> Option<(u8, String)> {
    let bannt = result.bannt_score.as_ref()?;
    let fallbacks = [
        "Not discussed",
        "Not identified",
        "Not articulated",
        "Not scheduled",
        "Not discussed",
    ];
    let lines: Vec<String> = bannt
        .elements()
        .into_iter()
        .zip(fallbacks)
        .map(|((label, covered, notes), fallback)| {
            let mark = if covered { "✅" } else { "❌" };
            let notes = if notes.trim().is_empty() { fallback } else { notes };
            format!("{mark} {label}: {notes}")
        })
        .collect();
    Some((bannt.score(), lines.join("\n")))
}

/// Block Kit layout for a finished analysis.
pub fn analysis_blocks(result: &AnalysisResult, mention: Option<&str>) -> Vec<Value> {
    let mut blocks = vec![
        header("Document Analysis Complete"),
        fields_section([
            format!("*Document:*\n{}", result.document_title),
            format!("*Type:*\n{}", result.document_type),
        ]),
    ];
    if let Some(score) = result.overall_score() {
        blocks.push(mrkdwn_section(format!(
            "*Score:* {} {score}/100",
            score_emoji(score)
        )));
    }
    if let Some((score, lines)) = bannt_lines(result) {
        blocks.push(mrkdwn_section(format!("*BANNT Score: {score}/5*\n{lines}")));
    }
    blocks.push(mrkdwn_section(format!(
        "<{}|View Document>",
        result.document_url
    )));

    if !result.issues.is_empty() {
        blocks.push(json!({"type": "divider"}));
        blocks.push(mrkdwn_section(format!(
            "*Issues Found ({}):*",
            result.issues.len()
        )));
        let mut lines: Vec<String> = result
            .issues
            .iter()
            .take(TOP_ISSUES)
            .map(|issue| {
                let mut line = format!(
                    "{} *{}*: {}",
                    issue.severity.icon(),
                    issue.category,
                    issue.title
                );
                if let Some(location) = &issue.location {
                    line.push_str(&format!(" _(line {location})_"));
                }
                if let Some(suggestion) = &issue.suggestion {
                    line.push_str(&format!("\n     → {suggestion}"));
                }
                line
            })
            .collect();
        if result.issues.len() > TOP_ISSUES {
            lines.push(format!("_... and {} more_", result.issues.len() - TOP_ISSUES));
        }
        blocks.push(mrkdwn_section(lines.join("\n")));
    }

    if let Some(mention) = mention {
        blocks.push(mention_context(mention));
    }
    blocks
}

/// Plain-text rendering used for dry runs.
pub fn analysis_text(result: &AnalysisResult, mention: Option<&str>) -> String {
    let mut lines = vec![
        "Document Analysis Complete".to_string(),
        String::new(),
        format!("Document: {}", result.document_title),
        format!("Type: {}", result.document_type),
    ];
    if let Some(score) = result.overall_score() {
        lines.push(format!("Score: {score}/100"));
    }
    if let Some(bannt) = &result.bannt_score {
        lines.push(format!("BANNT Score: {}/5", bannt.score()));
    }
    lines.push(format!("Link: {}", result.document_url));
    lines.push(String::new());
    lines.push("Issues Found:".into());
    for issue in result.issues.iter().take(TOP_ISSUES) {
        lines.push(format!(
            "  {} {}: {}",
            issue.severity.icon(),
            issue.category,
            issue.title
        ));
        if let Some(suggestion) = &issue.suggestion {
            lines.push(format!("      Suggestion: {suggestion}"));
        }
    }
    if result.issues.len() > TOP_ISSUES {
        lines.push(format!("  ... and {} more", result.issues.len() - TOP_ISSUES));
    }
    if let Some(mention) = mention {
        lines.push(String::new());
        lines.push(format!("cc {mention}"));
    }
    lines.join("\n")
}

/// Block Kit layout announcing a new Fathom recording.
pub fn recording_blocks(payload: &WebhookPayload, mention: Option<&str>) -> Vec<Value> {
    let call_type = if payload.is_external() {
        "External"
    } else {
        "Internal"
    };
    let mut blocks = vec![
        header("New Fathom Recording"),
        fields_section([
            format!("*Meeting:*\n{}", payload.title),
            format!("*Type:*\n{call_type}"),
        ]),
        fields_section([
            format!("*Attendees:*\n{}", payload.attendee_summary()),
            format!("*Recording ID:*\n{}", payload.recording_id),
        ]),
        mrkdwn_section(format!(
            "<{}|View Recording>",
            payload.link().unwrap_or("No link available")
        )),
    ];

    let summary = payload
        .default_summary
        .as_ref()
        .and_then(|summary| summary.markdown_formatted.as_deref())
        .filter(|summary| !summary.trim().is_empty());
    if let Some(summary) = summary {
        let mut shown: String = summary.chars().take(SUMMARY_CHARS).collect();
        if summary.chars().count() > SUMMARY_CHARS {
            shown.push_str("...");
        }
        blocks.push(mrkdwn_section(format!("\n\n*Summary:*\n{shown}")));
    }

    if let Some(items) = payload.action_items.as_deref().filter(|items| !items.is_empty()) {
        let mut text = String::from("\n\n*Action Items:*\n");
        let listed: Vec<String> = items
            .iter()
            .take(ACTION_ITEMS)
            .map(|item| {
                format!(
                    "• {}",
                    truncate(item.description.as_deref().unwrap_or("Unknown"), 200)
                )
            })
            .collect();
        text.push_str(&listed.join("\n"));
        if items.len() > ACTION_ITEMS {
            text.push_str(&format!("\n_+{} more_", items.len() - ACTION_ITEMS));
        }
        blocks.push(mrkdwn_section(text));
    }

    if let Some(mention) = mention {
        blocks.push(mention_context(mention));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fathom::{ActionItem, CalendarInvitee, FathomSummary};
    use crate::model::{
        BanntScore, DocumentType, Issue, IssueCategory, IssueSeverity, ScoreBreakdown,
    };
    use chrono::Utc;
    use httpmock::prelude::*;

    fn result(issue_count: usize) -> AnalysisResult {
        AnalysisResult {
            document_url: "https://docs.google.com/document/d/abc/edit".into(),
            document_title: "Acme Proposal".into(),
            document_type: DocumentType::Proposal,
            analyzed_at: Utc::now(),
            llm_provider: "openai/gpt-4o-mini".into(),
            score: Some(ScoreBreakdown {
                spelling_grammar: 80,
                required_content: 70,
                math_accuracy: 100,
                overall: 78,
            }),
            bannt_score: None,
            issues: (1..=issue_count)
                .map(|n| {
                    Issue::new(
                        IssueCategory::Grammar,
                        IssueSeverity::High,
                        format!("Issue {n}"),
                        "",
                    )
                    .with_location(Some(n.to_string()))
                    .with_suggestion(Some("Rephrase".into()))
                })
                .collect(),
            text_length: 100,
        }
    }

    fn payload() -> WebhookPayload {
        serde_json::from_value(json!({
            "recording_id": 4242,
            "title": "Acme discovery",
            "share_url": "https://fathom.video/share/xyz",
            "calendar_invitees_domains_type": "one_or_more_external"
        }))
        .unwrap()
    }

    fn block_texts(blocks: &[Value]) -> Vec<String> {
        blocks
            .iter()
            .filter_map(|block| block["text"]["text"].as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn score_emoji_bands() {
        assert_eq!(score_emoji(100), "🟢");
        assert_eq!(score_emoji(90), "🟢");
        assert_eq!(score_emoji(89), "🟡");
        assert_eq!(score_emoji(70), "🟡");
        assert_eq!(score_emoji(50), "🟠");
        assert_eq!(score_emoji(49), "🔴");
    }

    #[test]
    fn analysis_blocks_list_top_issues() {
        let blocks = analysis_blocks(&result(12), Some("@reviewer"));
        assert_eq!(blocks[0]["text"]["text"], "Document Analysis Complete");
        assert_eq!(blocks[1]["fields"][0]["text"], "*Document:*\nAcme Proposal");
        assert_eq!(blocks[1]["fields"][1]["text"], "*Type:*\nproposal");

        let texts = block_texts(&blocks);
        assert!(texts.contains(&"*Score:* 🟡 78/100".to_string()));
        assert!(texts.contains(&"<https://docs.google.com/document/d/abc/edit|View Document>".to_string()));
        assert!(texts.contains(&"*Issues Found (12):*".to_string()));
        let issues = texts.iter().find(|t| t.starts_with("🟠 *grammar*")).unwrap();
        assert!(issues.starts_with("🟠 *grammar*: Issue 1 _(line 1)_\n     → Rephrase"));
        assert!(issues.ends_with("_... and 2 more_"));
        assert!(!issues.contains("Issue 11"));

        let last = blocks.last().unwrap();
        assert_eq!(last["type"], "context");
        assert_eq!(last["elements"][0]["text"], "cc @reviewer");
    }

    #[test]
    fn analysis_blocks_show_bannt_checklist_without_issues() {
        let mut result = result(0);
        result.score = None;
        result.bannt_score = Some(BanntScore {
            need: true,
            need_notes: "Manual reporting".into(),
            ..BanntScore::default()
        });
        let blocks = analysis_blocks(&result, None);
        let texts = block_texts(&blocks);
        assert_eq!(
            texts[1],
            "*BANNT Score: 1/5*\n❌ Budget: Not discussed\n❌ Authority: Not identified\n✅ Need: Manual reporting\n❌ Next Steps: Not scheduled\n❌ Timeline: Not discussed"
        );
        assert!(!blocks.iter().any(|b| b["type"] == "divider"));
        assert!(!blocks.iter().any(|b| b["type"] == "context"));
    }

    #[test]
    fn plain_text_rendering() {
        let text = analysis_text(&result(1), Some("@reviewer"));
        assert_eq!(
            text,
            "Document Analysis Complete\n\nDocument: Acme Proposal\nType: proposal\nScore: 78/100\nLink: https://docs.google.com/document/d/abc/edit\n\nIssues Found:\n  🟠 grammar: Issue 1\n      Suggestion: Rephrase\n\ncc @reviewer"
        );
    }

    #[test]
    fn recording_blocks_cap_summary_and_action_items() {
        let mut payload = payload();
        payload.calendar_invitees = Some(vec![CalendarInvitee {
            name: Some("Ana".into()),
            ..CalendarInvitee::default()
        }]);
        payload.default_summary = Some(FathomSummary {
            template_name: None,
            markdown_formatted: Some("x".repeat(600)),
        });
        payload.action_items = Some(
            (1..=7)
                .map(|n| ActionItem {
                    description: Some(format!("Task {n}")),
                    ..ActionItem::default()
                })
                .collect(),
        );

        let blocks = recording_blocks(&payload, None);
        assert_eq!(blocks[1]["fields"][1]["text"], "*Type:*\nExternal");
        assert_eq!(blocks[2]["fields"][0]["text"], "*Attendees:*\nAna");
        assert_eq!(blocks[2]["fields"][1]["text"], "*Recording ID:*\n4242");

        let texts = block_texts(&blocks);
        assert_eq!(texts[0], "New Fathom Recording");
        assert_eq!(texts[1], "<https://fathom.video/share/xyz|View Recording>");
        assert_eq!(texts[2], format!("\n\n*Summary:*\n{}...", "x".repeat(500)));
        assert!(texts[3].starts_with("\n\n*Action Items:*\n• Task 1\n"));
        assert!(texts[3].contains("• Task 5"));
        assert!(!texts[3].contains("Task 6"));
        assert!(texts[3].ends_with("\n_+2 more_"));
    }

    #[test]
    fn recording_without_link_or_extras() {
        let mut payload = payload();
        payload.share_url = None;
        payload.calendar_invitees_domains_type = Some("only_internal".into());
        let blocks = recording_blocks(&payload, None);
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[1]["fields"][1]["text"], "*Type:*\nInternal");
        assert_eq!(blocks[3]["text"]["text"], "<No link available|View Recording>");
    }

    #[tokio::test]
    async fn dry_run_without_token() {
        let notifier = SlackNotifier::new(SlackSettings::default()).unwrap();
        assert!(notifier.is_dry_run());
        let receipt = notifier.post_analysis(&result(0)).await.unwrap();
        assert!(receipt.dry_run);
        assert_eq!(receipt.channel, DEFAULT_CHANNEL);
        assert!(receipt.preview.unwrap().starts_with("Document Analysis Complete"));
    }

    fn live_settings(server: &MockServer) -> SlackSettings {
        SlackSettings {
            bot_token: Some("xoxb-test".into()),
            channel: "C123".into(),
            mention: None,
            workspace_url: Some("https://acme.slack.com/".into()),
            api_base: server.base_url(),
        }
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn posts_blocks_and_builds_permalink() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat.postMessage")
                .header("authorization", "Bearer xoxb-test")
                .json_body_partial(r#"{"channel":"C123","text":"Document Analysis: Acme Proposal"}"#);
            then.status(200)
                .json_body(json!({"ok": true, "channel": "C123", "ts": "1712345678.000200"}));
        });

        let notifier = SlackNotifier::new(live_settings(&server)).unwrap();
        let receipt = notifier.post_analysis(&result(2)).await.unwrap();
        mock.assert();
        assert!(!receipt.dry_run);
        assert_eq!(receipt.ts.as_deref(), Some("1712345678.000200"));
        assert_eq!(
            receipt.url.as_deref(),
            Some("https://acme.slack.com/archives/C123/p1712345678000200")
        );
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn api_errors_surface() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat.postMessage");
            then.status(200)
                .json_body(json!({"ok": false, "error": "channel_not_found"}));
        });

        let notifier = SlackNotifier::new(live_settings(&server)).unwrap();
        let err = notifier.post_fathom_recording(&payload()).await.unwrap_err();
        let api = err.downcast_ref::<SlackApiError>().unwrap();
        assert_eq!(api.error, "channel_not_found");
    }

    #[tokio::test]
    async fn connection_check_without_token_fails() {
        let notifier = SlackNotifier::new(SlackSettings::default()).unwrap();
        let check = notifier.test_connection().await;
        assert!(!check.ok);
        assert_eq!(check.error.as_deref(), Some("no bot token configured"));
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn connection_check_calls_auth_test() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/auth.test")
                .header("authorization", "Bearer xoxb-test");
            then.status(200)
                .json_body(json!({"ok": true, "team": "Acme", "user": "doc-review", "bot_id": "B1"}));
        });

        let notifier = SlackNotifier::new(live_settings(&server)).unwrap();
        let check = notifier.test_connection().await;
        mock.assert();
        assert!(check.ok);
        assert_eq!(check.detail.as_deref(), Some("team Acme as doc-review"));
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn connection_check_reports_invalid_token() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth.test");
            then.status(200).json_body(json!({"ok": false, "error": "invalid_auth"}));
        });

        let notifier = SlackNotifier::new(live_settings(&server)).unwrap();
        let check = notifier.test_connection().await;
        assert!(!check.ok);
        assert_eq!(check.error.as_deref(), Some("Slack auth.test failed: invalid_auth"));
    }
}
