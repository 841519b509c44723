use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::model::{Issue, IssueCategory, IssueSeverity};
use crate::ruleset::RequiredSection;

/// Whether a required section was found, and by which keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPresence {
    pub name: String,
    pub weight: f32,
    pub matched_keyword: Option<String>,
}

impl SectionPresence {
    pub fn is_present(&self) -> bool {
        self.matched_keyword.is_some()
    }

    /// Scored issue for a section the document lacks.
    pub fn into_missing_issue(self) -> Issue {
        Issue::new(
            IssueCategory::MissingContent,
            IssueSeverity::High,
            format!("Missing required section: {}", self.name),
            format!(
                "The document does not appear to contain a {} section.",
                self.name
            ),
        )
        .with_suggestion(Some(format!("Add a {} section.", self.name)))
        .with_rule_id(format!("section:{}", self.name))
    }
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before = start == 0 || !is_word_byte(bytes[start - 1]);
    let after = end >= bytes.len() || !is_word_byte(bytes[end]);
    before && after
}

/// Look up every required section's keywords in one pass over the text.
pub fn detect_sections(text: &str, sections: &[RequiredSection]) -> Result<Vec<SectionPresence>> {
    let mut presence: Vec<SectionPresence> = sections
        .iter()
        .map(|section| SectionPresence {
            name: section.name.clone(),
            weight: section.weight,
            matched_keyword: None,
        })
        .collect();

    let mut owners = Vec::new();
    let mut patterns = Vec::new();
    for (idx, section) in sections.iter().enumerate() {
        for keyword in section.keywords.iter().map(|k| k.trim()) {
            if !keyword.is_empty() {
                owners.push(idx);
                patterns.push(keyword.to_string());
            }
        }
    }
    if patterns.is_empty() {
        return Ok(presence);
    }

    let automaton = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&patterns)
        .context("failed to build section keyword automaton")?;
    for mat in automaton.find_overlapping_iter(text) {
        if !on_word_boundary(text, mat.start(), mat.end()) {
            continue;
        }
        let pattern_idx = mat.pattern().as_usize();
        if let Some(entry) = owners.get(pattern_idx).and_then(|idx| presence.get_mut(*idx)) {
            if entry.matched_keyword.is_none() {
                trace!(section = %entry.name, keyword = %patterns[pattern_idx], "section keyword matched");
                entry.matched_keyword = Some(patterns[pattern_idx].clone());
            }
        }
    }
    Ok(presence)
}

/// Required sections with no keyword anywhere in the text.
pub fn find_missing_sections(
    text: &str,
    sections: &[RequiredSection],
) -> Result<Vec<SectionPresence>> {
    Ok(detect_sections(text, sections)?
        .into_iter()
        .filter(|section| !section.is_present())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, keywords: &[&str]) -> RequiredSection {
        RequiredSection {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            weight: 20.0,
        }
    }

    #[test]
    fn matches_keywords_case_insensitively() {
        let sections = [
            section("Budget", &["budget", "pricing"]),
            section("Timeline", &["timeline"]),
        ];
        let found = detect_sections("PRICING\nTotal: $40,000", &sections).unwrap();
        assert_eq!(found[0].matched_keyword.as_deref(), Some("pricing"));
        assert!(!found[1].is_present());
    }

    #[test]
    fn ignores_keywords_inside_other_words() {
        let sections = [section("Team", &["team"])];
        let missing = find_missing_sections("Our steamroller approach", &sections).unwrap();
        assert_eq!(missing.len(), 1);
        let present = find_missing_sections("Meet the team.", &sections).unwrap();
        assert!(present.is_empty());
    }

    #[test]
    fn overlapping_keywords_credit_each_section() {
        let sections = [
            section("Next Steps", &["next steps"]),
            section("Steps", &["steps"]),
        ];
        let missing = find_missing_sections("Next steps: sign the SOW", &sections).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn missing_section_issue_carries_weight_key() {
        let issue = SectionPresence {
            name: "Budget".into(),
            weight: 25.0,
            matched_keyword: None,
        }
        .into_missing_issue();
        assert_eq!(issue.rule_id.as_deref(), Some("section:Budget"));
        assert_eq!(issue.category, IssueCategory::MissingContent);
        assert!(issue.affects_score);
    }

    #[test]
    fn empty_ruleset_reports_nothing() {
        assert!(find_missing_sections("anything", &[]).unwrap().is_empty());
    }
}
