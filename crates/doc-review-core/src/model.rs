use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kinds of documents the analyzer knows how to review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Proposal,
    Kickoff,
    TranscriptSales,
    TranscriptClient,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Proposal,
        DocumentType::Kickoff,
        DocumentType::TranscriptSales,
        DocumentType::TranscriptClient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Kickoff => "kickoff",
            Self::TranscriptSales => "transcript_sales",
            Self::TranscriptClient => "transcript_client",
        }
    }

    pub fn is_transcript(&self) -> bool {
        matches!(self, Self::TranscriptSales | Self::TranscriptClient)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown document type `{0}` (expected proposal, kickoff, transcript_sales or transcript_client)")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proposal" => Ok(Self::Proposal),
            "kickoff" => Ok(Self::Kickoff),
            "transcript_sales" => Ok(Self::TranscriptSales),
            "transcript_client" => Ok(Self::TranscriptClient),
            other => Err(UnknownDocumentType(other.to_string())),
        }
    }
}

/// Severity levels for detected issues, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl IssueSeverity {
    pub const ALL: [IssueSeverity; 5] = [
        IssueSeverity::Critical,
        IssueSeverity::High,
        IssueSeverity::Medium,
        IssueSeverity::Low,
        IssueSeverity::Info,
    ];

    /// Parse a severity label as emitted by a model, defaulting to `Medium`.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "low" => Self::Low,
            "info" => Self::Info,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Critical => "🔴",
            Self::High => "🟠",
            Self::Medium => "🟡",
            Self::Low => "⚪",
            Self::Info => "ℹ️",
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Spelling,
    Grammar,
    Spacing,
    Formatting,
    Math,
    MissingContent,
    Style,
    Bannt,
    Opportunity,
    Concern,
}

impl IssueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spelling => "spelling",
            Self::Grammar => "grammar",
            Self::Spacing => "spacing",
            Self::Formatting => "formatting",
            Self::Math => "math",
            Self::MissingContent => "missing_content",
            Self::Style => "style",
            Self::Bannt => "bannt",
            Self::Opportunity => "opportunity",
            Self::Concern => "concern",
        }
    }

    /// Categories that count toward the spelling/grammar sub-score.
    pub fn is_spelling_grammar(&self) -> bool {
        matches!(self, Self::Spelling | Self::Grammar | Self::Spacing)
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an issue came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssueSource {
    #[default]
    Llm,
    Rule,
}

/// A detected problem or observation in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub title: String,
    pub description: String,
    /// Line number, slide number or timestamp.
    #[serde(default)]
    pub location: Option<String>,
    /// Surrounding text.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
    pub affects_score: bool,
    #[serde(default)]
    pub source: IssueSource,
    /// Check id, or `section:<name>` for required-section misses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl Issue {
    pub fn new(
        category: IssueCategory,
        severity: IssueSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            title: title.into(),
            description: description.into(),
            location: None,
            context: None,
            suggestion: None,
            affects_score: true,
            source: IssueSource::Llm,
            rule_id: None,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn scored(mut self, affects_score: bool) -> Self {
        self.affects_score = affects_score;
        self
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.source = IssueSource::Rule;
        self.rule_id = Some(rule_id.into());
        self
    }
}

/// Sub-scores and the weighted overall score, each within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub spelling_grammar: u8,
    pub required_content: u8,
    pub math_accuracy: u8,
    pub overall: u8,
}

/// BANNT qualification for sales calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanntScore {
    pub budget: bool,
    pub budget_notes: String,
    pub authority: bool,
    pub authority_notes: String,
    pub need: bool,
    pub need_notes: String,
    pub next_steps: bool,
    pub next_steps_notes: String,
    pub timeline: bool,
    pub timeline_notes: String,
}

impl BanntScore {
    /// Number of covered elements (0-5).
    pub fn score(&self) -> u8 {
        [
            self.budget,
            self.authority,
            self.need,
            self.next_steps,
            self.timeline,
        ]
        .into_iter()
        .filter(|covered| *covered)
        .count() as u8
    }

    /// `(label, covered, notes)` rows in canonical order.
    pub fn elements(&self) -> [(&'static str, bool, &str); 5] {
        [
            ("Budget", self.budget, self.budget_notes.as_str()),
            ("Authority", self.authority, self.authority_notes.as_str()),
            ("Need", self.need, self.need_notes.as_str()),
            ("Next Steps", self.next_steps, self.next_steps_notes.as_str()),
            ("Timeline", self.timeline, self.timeline_notes.as_str()),
        ]
    }
}

/// Result of probing an integration's credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionCheck {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: Some(detail.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of analyzing a single document or transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document_url: String,
    pub document_title: String,
    pub document_type: DocumentType,
    pub analyzed_at: DateTime<Utc>,
    pub llm_provider: String,
    #[serde(default)]
    pub score: Option<ScoreBreakdown>,
    #[serde(default)]
    pub bannt_score: Option<BanntScore>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    pub text_length: usize,
}

impl AnalysisResult {
    pub fn issues_by_severity(&self) -> BTreeMap<IssueSeverity, Vec<&Issue>> {
        let mut grouped: BTreeMap<IssueSeverity, Vec<&Issue>> = IssueSeverity::ALL
            .into_iter()
            .map(|severity| (severity, Vec::new()))
            .collect();
        for issue in &self.issues {
            grouped.entry(issue.severity).or_default().push(issue);
        }
        grouped
    }

    pub fn scored_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| issue.affects_score)
    }

    pub fn flagged_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|issue| !issue.affects_score)
    }

    pub fn overall_score(&self) -> Option<u8> {
        self.score.map(|score| score.overall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(issues: Vec<Issue>) -> AnalysisResult {
        AnalysisResult {
            document_url: "https://docs.google.com/document/d/abc/edit".into(),
            document_title: "Proposal".into(),
            document_type: DocumentType::Proposal,
            analyzed_at: Utc::now(),
            llm_provider: "noop/none".into(),
            score: None,
            bannt_score: None,
            issues,
            text_length: 42,
        }
    }

    #[test]
    fn bannt_score_counts_covered_elements() {
        let bannt = BanntScore {
            budget: true,
            need: true,
            timeline: true,
            ..BanntScore::default()
        };
        assert_eq!(bannt.score(), 3);
        assert_eq!(BanntScore::default().score(), 0);
    }

    #[test]
    fn severity_parsing_defaults_to_medium() {
        assert_eq!(IssueSeverity::parse_lenient("HIGH"), IssueSeverity::High);
        assert_eq!(IssueSeverity::parse_lenient(" low "), IssueSeverity::Low);
        assert_eq!(IssueSeverity::parse_lenient("urgent"), IssueSeverity::Medium);
        assert_eq!(IssueSeverity::parse_lenient(""), IssueSeverity::Medium);
    }

    #[test]
    fn document_type_round_trips_through_str() {
        for doc_type in DocumentType::ALL {
            assert_eq!(doc_type.as_str().parse::<DocumentType>().unwrap(), doc_type);
        }
        assert!("memo".parse::<DocumentType>().is_err());
    }

    #[test]
    fn issues_split_into_scored_and_flagged() {
        let result = sample_result(vec![
            Issue::new(IssueCategory::Spelling, IssueSeverity::High, "typo", "teh"),
            Issue::new(IssueCategory::Style, IssueSeverity::Info, "style", "passive").scored(false),
        ]);
        assert_eq!(result.scored_issues().count(), 1);
        assert_eq!(result.flagged_issues().count(), 1);

        let grouped = result.issues_by_severity();
        assert_eq!(grouped.len(), 5);
        assert_eq!(grouped[&IssueSeverity::High].len(), 1);
        assert!(grouped[&IssueSeverity::Critical].is_empty());
    }

    #[test]
    fn builder_drops_blank_optional_fields() {
        let issue = Issue::new(IssueCategory::Grammar, IssueSeverity::Low, "t", "d")
            .with_location(Some("  ".into()))
            .with_suggestion(Some("fix".into()));
        assert!(issue.location.is_none());
        assert_eq!(issue.suggestion.as_deref(), Some("fix"));
    }
}
