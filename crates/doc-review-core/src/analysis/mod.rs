//! The review pipeline: deterministic checks, model passes, filtering and scoring.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::checks::{find_missing_sections, RuleChecker};
use crate::dictionary::Dictionary;
use crate::document::Document;
use crate::llm::{parse, prompts, LlmClient};
use crate::model::{AnalysisResult, DocumentType, Issue};
use crate::ruleset::{Ruleset, RulesetRepository};

pub mod convert;
pub mod scoring;

pub use scoring::score_issues;

/// Source label recorded for pasted or piped transcripts.
pub const TRANSCRIPT_SOURCE: &str = "transcript";

/// Runs documents and transcripts through one model provider.
#[derive(Clone)]
pub struct Analyzer {
    llm: Arc<dyn LlmClient>,
    rulesets: Arc<dyn RulesetRepository>,
    dictionary: Arc<Dictionary>,
}

impl Analyzer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        rulesets: Arc<dyn RulesetRepository>,
        dictionary: Arc<Dictionary>,
    ) -> Self {
        Self {
            llm,
            rulesets,
            dictionary,
        }
    }

    /// `provider/model` of the client this analyzer sends to.
    pub fn provider(&self) -> String {
        self.llm.name()
    }

    /// Review an extracted document. Transcript types are routed to
    /// [`Analyzer::analyze_transcript`].
    #[instrument(
        name = "analyze_document",
        skip(self, document),
        fields(source = %document.source, provider = %self.llm.name())
    )]
    pub async fn analyze_document(
        &self,
        document: &Document,
        doc_type: Option<DocumentType>,
    ) -> Result<AnalysisResult> {
        let doc_type = doc_type.unwrap_or_else(|| document.inferred_type());
        if doc_type.is_transcript() {
            let mut result = self
                .analyze_transcript(
                    &document.text,
                    doc_type == DocumentType::TranscriptSales,
                    &document.title,
                )
                .await?;
            result.document_url = document.source.clone();
            return Ok(result);
        }

        let ruleset = self.rulesets.get(doc_type).await?;
        let text = document.text.as_str();

        let mut issues: Vec<Issue> = RuleChecker::new(ruleset.disabled_checks.iter().cloned())
            .check_all(text)
            .into_iter()
            .map(|found| found.into_issue(ruleset.score_checks))
            .collect();
        let rule_findings = issues.len();
        issues.extend(
            find_missing_sections(text, &ruleset.required_sections)?
                .into_iter()
                .map(|section| section.into_missing_issue()),
        );
        debug!(
            rule_findings,
            missing_sections = issues.len() - rule_findings,
            "deterministic checks completed"
        );

        let sg_prompt = prompts::spelling_grammar(&self.dictionary.terms());
        let content_prompt = prompts::content(&ruleset);
        // sequential: providers rate-limit per key
        let sg_raw = self.llm.complete(&sg_prompt, text).await?;
        let content_raw = self.llm.complete(&content_prompt, text).await?;

        issues.extend(self.model_issues("spelling/grammar", &sg_raw, |reply| {
            convert::spelling_grammar_issues(reply)
        }));
        issues.extend(self.model_issues("content", &content_raw, |reply| {
            convert::content_issues(reply, &ruleset)
        }));

        let issues = self.dictionary.filter_issues(issues);
        let score = score_issues(&issues, &ruleset);
        info!(
            document_type = %doc_type,
            issues = issues.len(),
            overall = score.overall,
            "document analyzed"
        );

        Ok(AnalysisResult {
            document_url: document.source.clone(),
            document_title: document.title.clone(),
            document_type: doc_type,
            analyzed_at: Utc::now(),
            llm_provider: self.llm.name(),
            score: Some(score),
            bannt_score: None,
            issues,
            text_length: text.chars().count(),
        })
    }

    /// Review a call transcript: BANNT qualification for sales calls,
    /// opportunities and concerns for client calls.
    #[instrument(
        name = "analyze_transcript",
        skip(self, text),
        fields(text_len = text.len(), provider = %self.llm.name())
    )]
    pub async fn analyze_transcript(
        &self,
        text: &str,
        sales: bool,
        title: &str,
    ) -> Result<AnalysisResult> {
        let doc_type = if sales {
            DocumentType::TranscriptSales
        } else {
            DocumentType::TranscriptClient
        };
        let ruleset = self.rulesets.get(doc_type).await?;
        let base = if sales {
            prompts::BANNT
        } else {
            prompts::CLIENT_CALL
        };
        let prompt = with_focus(base, &ruleset);
        let raw = self.llm.complete(&prompt, text).await?;
        let reply = parse::parse_reply(&raw);

        let (bannt_score, issues) = match parse::parse_failure(&reply) {
            Some(error) => {
                warn!(%error, "transcript reply could not be parsed");
                let pass = if sales { "BANNT" } else { "client call" };
                (None, vec![convert::parse_failure_issue(pass, error)])
            }
            None if sales => (
                Some(convert::bannt_score(&reply)),
                convert::bannt_issues(&reply),
            ),
            None => (None, convert::client_call_issues(&reply)),
        };
        info!(
            document_type = %doc_type,
            issues = issues.len(),
            bannt = bannt_score.as_ref().map(|b| b.score()),
            "transcript analyzed"
        );

        Ok(AnalysisResult {
            document_url: TRANSCRIPT_SOURCE.to_string(),
            document_title: title.to_string(),
            document_type: doc_type,
            analyzed_at: Utc::now(),
            llm_provider: self.llm.name(),
            score: None,
            bannt_score,
            issues,
            text_length: text.chars().count(),
        })
    }

    fn model_issues(
        &self,
        pass: &str,
        raw: &str,
        to_issues: impl FnOnce(&Value) -> Vec<Issue>,
    ) -> Vec<Issue> {
        let reply = parse::parse_reply(raw);
        match parse::parse_failure(&reply) {
            Some(error) => {
                warn!(pass, %error, "model reply could not be parsed");
                vec![convert::parse_failure_issue(pass, error)]
            }
            None => to_issues(&reply),
        }
    }
}

fn with_focus(prompt: &str, ruleset: &Ruleset) -> String {
    match ruleset.focus.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(focus) => format!("{prompt}\n\nAdditional guidance: {focus}"),
        None => prompt.to_string(),
    }
}
