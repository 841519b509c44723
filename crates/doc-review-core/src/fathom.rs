//! Fathom meeting recorder: REST client and webhook payloads.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::extractor::SourceError;
use crate::model::ConnectionCheck;

pub const DEFAULT_BASE_URL: &str = "https://api.fathom.ai/external/v1";
const MAX_LISTED_ATTENDEES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FathomSpeaker {
    #[serde(default = "unknown_speaker")]
    pub display_name: String,
    #[serde(default)]
    pub matched_calendar_invitee_email: Option<String>,
}

fn unknown_speaker() -> String {
    "Unknown".into()
}

impl Default for FathomSpeaker {
    fn default() -> Self {
        Self {
            display_name: unknown_speaker(),
            matched_calendar_invitee_email: None,
        }
    }
}

/// One utterance in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    #[serde(default)]
    pub speaker: FathomSpeaker,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FathomSummary {
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub markdown_formatted: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInvitee {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_external: Option<bool>,
}

/// Action item; fields beyond the description are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Render transcript entries as `[timestamp] speaker: text` lines.
pub fn render_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "[{}] {}: {}",
                entry.timestamp, entry.speaker.display_name, entry.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Body Fathom posts when a recording's content is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(deserialize_with = "string_or_number")]
    pub recording_id: String,
    pub title: String,
    #[serde(default)]
    pub meeting_title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub share_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// `only_internal` or `one_or_more_external`.
    #[serde(default)]
    pub calendar_invitees_domains_type: Option<String>,
    #[serde(default)]
    pub transcript: Option<Vec<TranscriptEntry>>,
    #[serde(default)]
    pub default_summary: Option<FathomSummary>,
    #[serde(default)]
    pub action_items: Option<Vec<ActionItem>>,
    #[serde(default)]
    pub calendar_invitees: Option<Vec<CalendarInvitee>>,
}

impl WebhookPayload {
    pub fn full_text(&self) -> String {
        self.transcript
            .as_deref()
            .map(render_transcript)
            .unwrap_or_default()
    }

    pub fn is_external(&self) -> bool {
        self.calendar_invitees_domains_type.as_deref() == Some("one_or_more_external")
    }

    /// Share URL, then recording URL.
    pub fn link(&self) -> Option<&str> {
        self.share_url.as_deref().or(self.url.as_deref())
    }

    /// First five attendee names, then `+N more`.
    pub fn attendee_summary(&self) -> String {
        let invitees = match self.calendar_invitees.as_deref() {
            Some(invitees) if !invitees.is_empty() => invitees,
            _ => return "Unknown attendees".into(),
        };
        let mut names: Vec<String> = invitees
            .iter()
            .take(MAX_LISTED_ATTENDEES)
            .map(|inv| {
                inv.name
                    .clone()
                    .or_else(|| inv.email.clone())
                    .unwrap_or_else(|| "Unknown".into())
            })
            .collect();
        if invitees.len() > MAX_LISTED_ATTENDEES {
            names.push(format!("+{} more", invitees.len() - MAX_LISTED_ATTENDEES));
        }
        names.join(", ")
    }
}

/// A recording with its transcript and optional summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FathomTranscript {
    pub recording_id: String,
    pub title: String,
    pub url: String,
    pub share_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub transcript: Vec<TranscriptEntry>,
    pub summary: Option<String>,
    pub action_items: Vec<ActionItem>,
}

impl FathomTranscript {
    pub fn full_text(&self) -> String {
        render_transcript(&self.transcript)
    }

    /// Share URL, then recording URL, then a placeholder.
    pub fn link(&self) -> String {
        self.share_url
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| Some(self.url.clone()).filter(|url| !url.is_empty()))
            .unwrap_or_else(|| "transcript".into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FathomMeeting {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default = "untitled")]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub calendar_invitees_domains_type: Option<String>,
}

fn untitled() -> String {
    "Untitled".into()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

#[derive(Deserialize)]
struct RecordingDetails {
    #[serde(default = "untitled")]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    share_url: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct TranscriptBody {
    #[serde(default)]
    transcript: Vec<TranscriptEntry>,
}

#[derive(Deserialize, Default)]
struct SummaryBody {
    #[serde(default)]
    default_summary: Option<FathomSummary>,
    #[serde(default)]
    action_items: Vec<ActionItem>,
}

#[derive(Deserialize)]
struct MeetingList {
    #[serde(default, alias = "items")]
    recordings: Vec<FathomMeeting>,
}

/// Fathom REST client authenticated with an `X-Api-Key` header.
#[derive(Debug, Clone)]
pub struct FathomClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl FathomClient {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .context("Fathom API key missing: set FATHOM_API_KEY or fathom.api_key")?;
        let http = Client::builder()
            .user_agent(concat!("doc-review/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build Fathom HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("failed to call Fathom API at {url}"))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, id: &str) -> Result<T> {
        let response = self.get(path, &[]).await?;
        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .with_context(|| format!("failed to parse Fathom response from {path}")),
            StatusCode::NOT_FOUND => Err(SourceError::NotFound(format!("recording {id}")).into()),
            StatusCode::UNAUTHORIZED => bail!("Fathom rejected the API key"),
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("Fathom API error ({status}): {body}")
            }
        }
    }

    /// Recording details, transcript and (when available) summary.
    #[instrument(name = "fathom_transcript", skip(self))]
    pub async fn get_transcript(&self, recording_id: &str) -> Result<FathomTranscript> {
        let details: RecordingDetails = self
            .get_json(&format!("/recordings/{recording_id}"), recording_id)
            .await?;
        let transcript: TranscriptBody = self
            .get_json(&format!("/recordings/{recording_id}/transcript"), recording_id)
            .await?;
        let summary = match self
            .get(&format!("/recordings/{recording_id}/summary"), &[])
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => {
                response.json::<SummaryBody>().await.unwrap_or_default()
            }
            Ok(response) => {
                debug!(status = %response.status(), "no Fathom summary available");
                SummaryBody::default()
            }
            Err(err) => {
                debug!(error = %err, "Fathom summary request failed");
                SummaryBody::default()
            }
        };

        Ok(FathomTranscript {
            recording_id: recording_id.to_string(),
            title: details.title,
            url: details.url,
            share_url: details.share_url,
            created_at: details.created_at,
            transcript: transcript.transcript,
            summary: summary.default_summary.and_then(|s| s.markdown_formatted),
            action_items: summary.action_items,
        })
    }

    pub async fn list_meetings(&self, limit: usize) -> Result<Vec<FathomMeeting>> {
        let response = self.get("/meetings", &[("limit", limit.to_string())]).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Fathom API error ({status}): {body}");
        }
        let list: MeetingList = response
            .json()
            .await
            .context("failed to parse Fathom meeting list")?;
        Ok(list.recordings)
    }

    /// Probe the API key with a one-item meeting listing.
    pub async fn test_connection(&self) -> ConnectionCheck {
        let response = match self.get("/meetings", &[("limit", "1".to_string())]).await {
            Ok(response) => response,
            Err(err) => return ConnectionCheck::failed(format!("{err:#}")),
        };
        match response.status() {
            StatusCode::UNAUTHORIZED => ConnectionCheck::failed("invalid API key"),
            status if status.is_success() => {
                let remaining = response
                    .headers()
                    .get("RateLimit-Remaining")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let meetings = response
                    .json::<MeetingList>()
                    .await
                    .map(|list| list.recordings.len())
                    .unwrap_or_default();
                let mut detail = if meetings > 0 {
                    "meetings available".to_string()
                } else {
                    "no meetings yet".to_string()
                };
                if let Some(remaining) = remaining {
                    detail.push_str(&format!(", rate limit remaining {remaining}"));
                }
                ConnectionCheck::ok(detail)
            }
            status => ConnectionCheck::failed(format!("HTTP {status}")),
        }
    }
}
