use std::fmt::Write;

use serde::Serialize;

use crate::model::{AnalysisResult, Issue, IssueSeverity};
use crate::ruleset::Ruleset;

/// Issues shown per severity group in the terminal report.
const ISSUES_PER_GROUP: usize = 5;
/// Issues written into a document comment.
const COMMENT_ISSUE_LIMIT: usize = 20;
pub const COMMENT_HEADER: &str = "[Document Quality Analyzer]";

/// Format styles supported in default reporter implementations.
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Produce a report string from an `AnalysisResult` using the desired format.
pub fn render_report(result: &AnalysisResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(result),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonReport::from(result))?),
    }
}

fn render_human(result: &AnalysisResult) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Document: {}", result.document_title)?;
    writeln!(out, "Source: {}", result.document_url)?;
    writeln!(out, "Type: {}", result.document_type)?;
    writeln!(out, "Provider: {}", result.llm_provider)?;
    writeln!(out, "Length: {} chars", result.text_length)?;

    if let Some(score) = &result.score {
        writeln!(out)?;
        writeln!(out, "Score: {}/100", score.overall)?;
        writeln!(out, "  Spelling & Grammar: {:>3}/100", score.spelling_grammar)?;
        writeln!(out, "  Required Content:   {:>3}/100", score.required_content)?;
        writeln!(out, "  Math Accuracy:      {:>3}/100", score.math_accuracy)?;
    }

    if let Some(bannt) = &result.bannt_score {
        writeln!(out)?;
        writeln!(out, "BANNT Score: {}/5", bannt.score())?;
        for (label, covered, notes) in bannt.elements() {
            let mark = if covered { "✓" } else { "✗" };
            let notes = if notes.trim().is_empty() { "-" } else { notes };
            writeln!(out, "  {mark} {label:<11} {}", single_line(notes))?;
        }
    }

    writeln!(out)?;
    if result.issues.is_empty() {
        writeln!(out, "No issues found.")?;
        return Ok(out);
    }
    writeln!(
        out,
        "Issues ({} total, {} affect score):",
        result.issues.len(),
        result.scored_issues().count()
    )?;
    for (severity, issues) in result.issues_by_severity() {
        if issues.is_empty() {
            continue;
        }
        writeln!(out, "  {} ({})", severity.as_str().to_uppercase(), issues.len())?;
        for issue in issues.iter().take(ISSUES_PER_GROUP) {
            write_issue_line(&mut out, issue, severity)?;
        }
        if issues.len() > ISSUES_PER_GROUP {
            writeln!(out, "    ... and {} more", issues.len() - ISSUES_PER_GROUP)?;
        }
    }

    Ok(out)
}

fn write_issue_line(out: &mut String, issue: &Issue, severity: IssueSeverity) -> std::fmt::Result {
    write!(
        out,
        "    {} [{}] {}",
        severity.icon(),
        issue.category,
        single_line(&issue.title)
    )?;
    if let Some(location) = &issue.location {
        write!(out, " ({location})")?;
    }
    if !issue.affects_score {
        write!(out, " [not scored]")?;
    }
    writeln!(out)?;
    if let Some(suggestion) = &issue.suggestion {
        writeln!(out, "       → {}", single_line(suggestion))?;
    }
    Ok(())
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    result: &'a AnalysisResult,
    scored_issue_count: usize,
    flagged_issue_count: usize,
}

impl<'a> From<&'a AnalysisResult> for JsonReport<'a> {
    fn from(result: &'a AnalysisResult) -> Self {
        Self {
            result,
            scored_issue_count: result.scored_issues().count(),
            flagged_issue_count: result.flagged_issues().count(),
        }
    }
}

/// One provider's outcome in a side-by-side comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderOutcome {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderOutcome {
    pub fn succeeded(provider: impl Into<String>, result: AnalysisResult) -> Self {
        Self {
            provider: provider.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Table comparing scores across providers; failed providers show their error.
pub fn render_comparison(title: &str, outcomes: &[ProviderOutcome]) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Provider comparison: {title}")?;
    writeln!(out)?;
    writeln!(
        out,
        "{:<40} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "Provider", "Overall", "S&G", "Content", "Math", "Issues"
    )?;
    writeln!(out, "{}", "-".repeat(80))?;
    for outcome in outcomes {
        match (&outcome.result, &outcome.error) {
            (Some(result), _) => {
                let cell = |value: Option<u8>| {
                    value.map_or_else(|| "-".to_string(), |v| v.to_string())
                };
                writeln!(
                    out,
                    "{:<40} {:>7} {:>7} {:>7} {:>7} {:>7}",
                    result.llm_provider,
                    cell(result.score.map(|s| s.overall)),
                    cell(result.score.map(|s| s.spelling_grammar)),
                    cell(result.score.map(|s| s.required_content)),
                    cell(result.score.map(|s| s.math_accuracy)),
                    result.issues.len()
                )?;
            }
            (None, error) => {
                writeln!(
                    out,
                    "{:<40} error: {}",
                    outcome.provider,
                    single_line(error.as_deref().unwrap_or("unknown failure"))
                )?;
            }
        }
    }
    Ok(out)
}

/// Summary table of loaded rulesets.
pub fn render_rulesets(rulesets: &[Ruleset]) -> anyhow::Result<String> {
    let mut out = String::new();
    for ruleset in rulesets {
        writeln!(out, "{}", ruleset.document_type)?;
        if !ruleset.description.is_empty() {
            writeln!(out, "  {}", ruleset.description)?;
        }
        let scoring = &ruleset.scoring;
        writeln!(
            out,
            "  weights: spelling/grammar {:.2}, content {:.2}, math {:.2}",
            scoring.spelling_grammar, scoring.required_content, scoring.math_accuracy
        )?;
        for section in &ruleset.required_sections {
            writeln!(
                out,
                "  - {} (-{} pts): {}",
                section.name,
                section.weight,
                section.keywords.join(", ")
            )?;
        }
        if !ruleset.disabled_checks.is_empty() {
            writeln!(out, "  disabled checks: {}", ruleset.disabled_checks.join(", "))?;
        }
    }
    Ok(out)
}

/// Plain-text body posted as a document comment.
pub fn comment_body(result: &AnalysisResult) -> String {
    let mut lines = vec![COMMENT_HEADER.to_string(), String::new()];
    for issue in result.issues.iter().take(COMMENT_ISSUE_LIMIT) {
        let mut line = format!(
            "{} {}: {}",
            issue.severity.as_str().to_uppercase(),
            issue.category,
            issue.title
        );
        if let Some(location) = &issue.location {
            line.push_str(&format!(" ({location})"));
        }
        lines.push(line);
        if let Some(suggestion) = &issue.suggestion {
            lines.push(format!("   → {suggestion}"));
        }
        lines.push(String::new());
    }
    if result.issues.len() > COMMENT_ISSUE_LIMIT {
        lines.push(format!(
            "... and {} more issues",
            result.issues.len() - COMMENT_ISSUE_LIMIT
        ));
    }
    lines.join("\n").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BanntScore, DocumentType, IssueCategory, ScoreBreakdown};
    use chrono::Utc;

    fn sample_result(issues: Vec<Issue>) -> AnalysisResult {
        AnalysisResult {
            document_url: "https://docs.google.com/document/d/abc123/edit".into(),
            document_title: "Acme Proposal".into(),
            document_type: DocumentType::Proposal,
            analyzed_at: Utc::now(),
            llm_provider: "openai/gpt-4o-mini".into(),
            score: Some(ScoreBreakdown {
                spelling_grammar: 90,
                required_content: 70,
                math_accuracy: 100,
                overall: 83,
            }),
            bannt_score: None,
            issues,
            text_length: 2048,
        }
    }

    fn spelling(n: usize) -> Issue {
        Issue::new(
            IssueCategory::Spelling,
            IssueSeverity::Medium,
            format!("Spelling error: word{n}"),
            "",
        )
        .with_location(Some(format!("Line {n}")))
        .with_suggestion(Some(format!("fix{n}")))
    }

    #[test]
    fn human_report_groups_issues_by_severity() {
        let mut issues: Vec<Issue> = (1..=7).map(spelling).collect();
        issues.push(
            Issue::new(IssueCategory::Style, IssueSeverity::Info, "Style observation", "")
                .scored(false),
        );
        let output = render_report(&sample_result(issues), OutputFormat::Human).unwrap();
        assert!(output.contains("Score: 83/100"));
        assert!(output.contains("  Required Content:    70/100"));
        assert!(output.contains("Issues (8 total, 7 affect score):"));
        assert!(output.contains("  MEDIUM (7)"));
        assert!(output.contains("[spelling] Spelling error: word1 (Line 1)"));
        assert!(output.contains("       → fix1"));
        assert!(!output.contains("word6"));
        assert!(output.contains("    ... and 2 more"));
        assert!(output.contains("[style] Style observation [not scored]"));
        assert!(!output.contains("CRITICAL"));
    }

    #[test]
    fn human_report_shows_bannt_checklist() {
        let mut result = sample_result(Vec::new());
        result.document_type = DocumentType::TranscriptSales;
        result.score = None;
        result.bannt_score = Some(BanntScore {
            budget: true,
            budget_notes: "About $50k".into(),
            ..BanntScore::default()
        });
        let output = render_report(&result, OutputFormat::Human).unwrap();
        assert!(output.contains("BANNT Score: 1/5"));
        assert!(output.contains("  ✓ Budget      About $50k"));
        assert!(output.contains("  ✗ Next Steps  -"));
        assert!(output.contains("No issues found."));
        assert!(!output.contains("Score: 83/100"));
    }

    #[test]
    fn json_report_flattens_result() {
        let result = sample_result(vec![spelling(1)]);
        let output = render_report(&result, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["document_title"], "Acme Proposal");
        assert_eq!(value["score"]["overall"], 83);
        assert_eq!(value["scored_issue_count"], 1);
        assert_eq!(value["flagged_issue_count"], 0);
        assert_eq!(value["issues"][0]["category"], "spelling");
    }

    #[test]
    fn comparison_lists_failures_inline() {
        let outcomes = vec![
            ProviderOutcome::succeeded("openai", sample_result(vec![spelling(1)])),
            ProviderOutcome::failed("anthropic", "anthropic API key missing"),
        ];
        let output = render_comparison("Acme Proposal", &outcomes).unwrap();
        assert!(output.starts_with("Provider comparison: Acme Proposal"));
        assert!(output.contains("openai/gpt-4o-mini"));
        assert!(output.contains("anthropic                                error: anthropic API key missing"));

        let json = serde_json::to_value(&outcomes).unwrap();
        assert!(json[0].get("error").is_none());
        assert!(json[1].get("result").is_none());
    }

    #[test]
    fn comment_body_caps_issue_count() {
        let issues: Vec<Issue> = (1..=23).map(spelling).collect();
        let body = comment_body(&sample_result(issues));
        assert!(body.starts_with("[Document Quality Analyzer]\n\nMEDIUM spelling: Spelling error: word1 (Line 1)\n   → fix1\n"));
        assert!(body.contains("word20"));
        assert!(!body.contains("word21"));
        assert!(body.ends_with("... and 3 more issues"));
    }

    #[test]
    fn comment_body_without_overflow_has_no_trailer() {
        let body = comment_body(&sample_result(vec![spelling(2)]));
        assert_eq!(
            body,
            "[Document Quality Analyzer]\n\nMEDIUM spelling: Spelling error: word2 (Line 2)\n   → fix2"
        );
    }

    #[test]
    fn renders_ruleset_summary() {
        let output = render_rulesets(&[Ruleset::builtin(DocumentType::Proposal)]).unwrap();
        assert!(output.starts_with("proposal\n"));
        assert!(output.contains("weights: spelling/grammar 0.50, content 0.40, math 0.10"));
        assert!(output.contains("  - Budget (-15 pts): budget, pricing, investment, cost"));
    }
}
