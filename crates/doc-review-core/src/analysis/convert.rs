//! Lenient conversion of parsed model replies into issues.

use serde_json::Value;

use crate::llm::truncate;
use crate::model::{BanntScore, Issue, IssueCategory, IssueSeverity};
use crate::ruleset::Ruleset;

/// BANNT element keys paired with the flag the model sets when the element was covered.
const BANNT_ELEMENTS: [(&str, &str); 5] = [
    ("budget", "discussed"),
    ("authority", "identified"),
    ("need", "articulated"),
    ("next_steps", "scheduled"),
    ("timeline", "discussed"),
];

fn text(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn severity(item: &Value) -> IssueSeverity {
    text(item, "severity")
        .map(|label| IssueSeverity::parse_lenient(&label))
        .unwrap_or(IssueSeverity::Medium)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Issues from the spelling/grammar pass. The flagged text is kept as context.
pub fn spelling_grammar_issues(reply: &Value) -> Vec<Issue> {
    array(reply, "issues")
        .iter()
        .map(|item| {
            let category = match text(item, "category").as_deref() {
                Some("grammar") => IssueCategory::Grammar,
                Some("spacing") => IssueCategory::Spacing,
                _ => IssueCategory::Spelling,
            };
            let flagged = text(item, "text").unwrap_or_default();
            Issue::new(
                category,
                severity(item),
                format!(
                    "{} error: {}",
                    capitalize(category.as_str()),
                    truncate(&flagged, 30)
                ),
                format!("Found: '{flagged}'"),
            )
            .with_location(text(item, "location"))
            .with_context(Some(flagged))
            .with_suggestion(text(item, "suggestion"))
        })
        .collect()
}

/// Issues from the content pass.
///
/// Missing sections the ruleset already knows about are skipped because the
/// keyword check reports those.
pub fn content_issues(reply: &Value, ruleset: &Ruleset) -> Vec<Issue> {
    let mut issues = Vec::new();

    for section in array(reply, "required_sections_missing") {
        let Some(name) = section.as_str().map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        if ruleset.section(name).is_some() {
            continue;
        }
        issues.push(
            Issue::new(
                IssueCategory::MissingContent,
                IssueSeverity::High,
                format!("Missing section: {name}"),
                format!("Required section '{name}' was not found in the document"),
            )
            .with_suggestion(Some(format!("Add a section for {name}"))),
        );
    }

    for item in array(reply, "issues") {
        let category = match text(item, "category").as_deref() {
            Some("missing_content") => IssueCategory::MissingContent,
            Some("formatting") => IssueCategory::Formatting,
            Some("math") => IssueCategory::Math,
            _ => IssueCategory::Style,
        };
        let severity = severity(item);
        let affects_score = item
            .get("affects_score")
            .and_then(Value::as_bool)
            .unwrap_or(severity != IssueSeverity::Low);
        issues.push(
            Issue::new(
                category,
                severity,
                text(item, "title").unwrap_or_else(|| "Content issue".into()),
                text(item, "description").unwrap_or_default(),
            )
            .with_location(text(item, "location"))
            .with_suggestion(text(item, "suggestion"))
            .scored(affects_score),
        );
    }

    for observation in array(reply, "style_observations") {
        let description = match observation {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        issues.push(
            Issue::new(
                IssueCategory::Style,
                IssueSeverity::Info,
                "Style observation",
                description,
            )
            .scored(false),
        );
    }

    issues
}

/// Covered flag and notes for one element; notes are `None` when the model omitted them.
fn bannt_element(reply: &Value, key: &str) -> (bool, Option<String>) {
    let data = reply.get(key).unwrap_or(&Value::Null);
    let flag = BANNT_ELEMENTS
        .iter()
        .find(|(element, _)| *element == key)
        .map_or("discussed", |(_, flag)| *flag);
    let covered = data.get(flag).and_then(Value::as_bool).unwrap_or(false);
    (covered, text(data, "notes"))
}

/// BANNT checklist from the sales-call pass.
pub fn bannt_score(reply: &Value) -> BanntScore {
    let (budget, budget_notes) = bannt_element(reply, "budget");
    let budget_notes = budget_notes.unwrap_or_default();
    let (authority, authority_notes) = bannt_element(reply, "authority");
    let authority_notes = authority_notes.unwrap_or_default();
    let (need, need_notes) = bannt_element(reply, "need");
    let need_notes = need_notes.unwrap_or_default();
    let (next_steps, next_steps_notes) = bannt_element(reply, "next_steps");
    let next_steps_notes = next_steps_notes.unwrap_or_default();
    let (timeline, timeline_notes) = bannt_element(reply, "timeline");
    let timeline_notes = timeline_notes.unwrap_or_default();
    BanntScore {
        budget,
        budget_notes,
        authority,
        authority_notes,
        need,
        need_notes,
        next_steps,
        next_steps_notes,
        timeline,
        timeline_notes,
    }
}

/// Gaps and recommendations from the sales-call pass; never scored.
pub fn bannt_issues(reply: &Value) -> Vec<Issue> {
    let gaps = [
        ("budget", "Budget not discussed"),
        ("authority", "Decision maker not identified"),
        ("need", "Pain points not articulated"),
        ("next_steps", "No follow-up scheduled"),
        ("timeline", "Timeline not discussed"),
    ];
    let mut issues: Vec<Issue> = gaps
        .iter()
        .filter_map(|(key, title)| {
            let (covered, notes) = bannt_element(reply, key);
            if covered {
                return None;
            }
            let description = notes.unwrap_or_else(|| "Not covered in call".to_string());
            Some(
                Issue::new(IssueCategory::Bannt, IssueSeverity::Medium, *title, description)
                    .scored(false),
            )
        })
        .collect();

    issues.extend(array(reply, "recommendations").iter().map(|rec| {
        let description = rec.as_str().map(str::to_string).unwrap_or_else(|| rec.to_string());
        Issue::new(
            IssueCategory::Bannt,
            IssueSeverity::Info,
            "Recommendation",
            description,
        )
        .scored(false)
    }));
    issues
}

/// Opportunities and concerns from the client-call pass; never scored.
pub fn client_call_issues(reply: &Value) -> Vec<Issue> {
    let opportunities = array(reply, "opportunities").iter().map(|opp| {
        Issue::new(
            IssueCategory::Opportunity,
            IssueSeverity::Info,
            format!(
                "Opportunity: {}",
                text(opp, "type").unwrap_or_else(|| "unknown".into())
            ),
            text(opp, "description").unwrap_or_default(),
        )
        .with_context(text(opp, "quote"))
        .with_location(text(opp, "timestamp"))
        .scored(false)
    });
    let concerns = array(reply, "concerns").iter().map(|concern| {
        Issue::new(
            IssueCategory::Concern,
            severity(concern),
            format!(
                "Concern: {}",
                text(concern, "type").unwrap_or_else(|| "unknown".into())
            ),
            text(concern, "description").unwrap_or_default(),
        )
        .with_context(text(concern, "quote"))
        .with_location(text(concern, "timestamp"))
        .with_suggestion(text(concern, "recommended_action"))
        .scored(false)
    });
    opportunities.chain(concerns).collect()
}

/// Unscored note recorded when a pass returned unparseable output.
pub fn parse_failure_issue(pass: &str, error: &str) -> Issue {
    Issue::new(
        IssueCategory::Formatting,
        IssueSeverity::Low,
        format!("Could not parse {pass} analysis"),
        error.to_string(),
    )
    .scored(false)
}
