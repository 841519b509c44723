//! Deterministic text checks that run before any model is consulted.
//!
//! Each check carries a stable id so a ruleset can switch off checks that
//! produce false positives for its document type.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::model::{Issue, IssueCategory, IssueSeverity};

pub mod sections;

pub use sections::{detect_sections, find_missing_sections, SectionPresence};

pub const CHECK_IDS: [&str; 12] = [
    "double-spaces",
    "repeated-words",
    "missing-space-after-punct",
    "space-before-punct",
    "unclosed-brackets",
    "trailing-whitespace",
    "multiple-blank-lines",
    "inconsistent-quotes",
    "tab-characters",
    "double-hyphen-emdash",
    "hidden-characters",
    "straight-vs-curly-quotes",
];

const CONTEXT_CHARS: usize = 30;
const INTENTIONAL_REPEATS: [&str; 5] = ["that", "had", "very", "really", "blah"];
const URL_MARKERS: [&str; 6] = ["http", "www.", "ftp", ".com", ".org", "@"];
const HIDDEN_CHARACTERS: [(char, &str); 6] = [
    ('\u{200b}', "zero-width space"),
    ('\u{200c}', "zero-width non-joiner"),
    ('\u{200d}', "zero-width joiner"),
    ('\u{feff}', "byte order mark"),
    ('\u{00a0}', "non-breaking space"),
    ('\u{2060}', "word joiner"),
];
const CURLY_DOUBLE: [char; 2] = ['\u{201c}', '\u{201d}'];
const CURLY_SINGLE: [char; 2] = ['\u{2018}', '\u{2019}'];

static DOUBLE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("static regex"));
static WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("static regex"));
static MISSING_SPACE_AFTER_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.,;:!?])([A-Za-z])").expect("static regex"));
static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)[ \t]+([.,;:!?])").expect("static regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static DOUBLE_HYPHEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)\s*--\s*(\w)").expect("static regex"));

/// A single finding from a deterministic check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckMatch {
    pub check_id: &'static str,
    pub name: &'static str,
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub text: String,
    pub suggestion: String,
    pub location: String,
    pub context: String,
}

impl CheckMatch {
    /// Convert into an issue; `scored` decides whether it counts toward the score.
    pub fn into_issue(self, scored: bool) -> Issue {
        Issue::new(
            self.category,
            self.severity,
            format!("{}: {}", self.name, self.text),
            self.context.clone(),
        )
        .with_location(Some(self.location))
        .with_context(Some(self.context))
        .with_suggestion(Some(self.suggestion))
        .scored(scored)
        .with_rule_id(self.check_id)
    }
}

/// Runs every enabled check over document text.
#[derive(Debug, Clone, Default)]
pub struct RuleChecker {
    disabled: HashSet<String>,
}

impl RuleChecker {
    pub fn new<I, S>(disabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disabled: disabled.into_iter().map(Into::into).collect(),
        }
    }

    fn enabled(&self, check_id: &str) -> bool {
        !self.disabled.contains(check_id)
    }

    #[instrument(name = "rule_checks", skip(self, text), fields(text_len = text.len()))]
    pub fn check_all(&self, text: &str) -> Vec<CheckMatch> {
        let checks: [(&str, fn(&str) -> Vec<CheckMatch>); 12] = [
            ("double-spaces", double_spaces),
            ("repeated-words", repeated_words),
            ("missing-space-after-punct", missing_space_after_punct),
            ("space-before-punct", space_before_punct),
            ("unclosed-brackets", unclosed_brackets),
            ("trailing-whitespace", trailing_whitespace),
            ("multiple-blank-lines", multiple_blank_lines),
            ("inconsistent-quotes", inconsistent_quotes),
            ("tab-characters", tab_characters),
            ("double-hyphen-emdash", double_hyphen_emdash),
            ("hidden-characters", hidden_characters),
            ("straight-vs-curly-quotes", straight_vs_curly_quotes),
        ];
        let mut matches = Vec::new();
        for (id, check) in checks {
            if self.enabled(id) {
                matches.extend(check(text));
            }
        }
        debug!(matches = matches.len(), "deterministic checks completed");
        matches
    }
}

fn line_number(text: &str, byte_idx: usize) -> usize {
    text[..saturating_char_boundary(text, byte_idx)]
        .matches('\n')
        .count()
        + 1
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let ctx_start = saturating_char_boundary(text, start.saturating_sub(CONTEXT_CHARS));
    let ctx_end = saturating_char_boundary_forward(text, end + CONTEXT_CHARS);
    let prefix = if ctx_start > 0 { "..." } else { "" };
    let suffix = if ctx_end < text.len() { "..." } else { "" };
    format!("{prefix}{}{suffix}", &text[ctx_start..ctx_end])
}

pub(crate) fn saturating_char_boundary(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut cursor = idx;
    while cursor > 0 && !text.is_char_boundary(cursor) {
        cursor -= 1;
    }
    cursor
}

pub(crate) fn saturating_char_boundary_forward(text: &str, idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    let mut cursor = idx;
    while cursor < text.len() && !text.is_char_boundary(cursor) {
        cursor += 1;
    }
    cursor
}

fn double_spaces(text: &str) -> Vec<CheckMatch> {
    DOUBLE_SPACES
        .find_iter(text)
        // leading runs are indentation
        .filter(|m| m.start() > 0 && text.as_bytes()[m.start() - 1] != b'\n')
        .map(|m| CheckMatch {
            check_id: "double-spaces",
            name: "Double Spaces",
            category: IssueCategory::Spacing,
            severity: IssueSeverity::Medium,
            text: format!("{:?}", m.as_str()),
            suggestion: "Replace with single space".into(),
            location: format!("Line {}, position {}", line_number(text, m.start()), m.start()),
            context: context_window(text, m.start(), m.end()),
        })
        .collect()
}

fn repeated_words(text: &str) -> Vec<CheckMatch> {
    let words: Vec<_> = WORDS.find_iter(text).collect();
    words
        .windows(2)
        .filter(|pair| {
            let (first, second) = (pair[0], pair[1]);
            let gap = &text[first.end()..second.start()];
            !gap.is_empty()
                && gap.chars().all(char::is_whitespace)
                && first.as_str().to_lowercase() == second.as_str().to_lowercase()
                && !INTENTIONAL_REPEATS.contains(&first.as_str().to_lowercase().as_str())
        })
        .map(|pair| {
            let (first, second) = (pair[0], pair[1]);
            CheckMatch {
                check_id: "repeated-words",
                name: "Repeated Word",
                category: IssueCategory::Grammar,
                severity: IssueSeverity::High,
                text: text[first.start()..second.end()].to_string(),
                suggestion: format!("Remove duplicate '{}'", first.as_str()),
                location: format!("Line {}", line_number(text, first.start())),
                context: context_window(text, first.start(), second.end()),
            }
        })
        .collect()
}

fn missing_space_after_punct(text: &str) -> Vec<CheckMatch> {
    MISSING_SPACE_AFTER_PUNCT
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let punct = caps.get(1)?.as_str();
            let letter = caps.get(2)?.as_str();
            let token_start = text[..whole.start()]
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .map(|(idx, c)| idx + c.len_utf8())
                .unwrap_or(0);
            let token_end = text[whole.end()..]
                .find(char::is_whitespace)
                .map(|idx| whole.end() + idx)
                .unwrap_or(text.len());
            let token = text[token_start..token_end].to_lowercase();
            if URL_MARKERS.iter().any(|marker| token.contains(marker)) {
                return None;
            }
            // abbreviations such as e.g. / i.e.
            if punct == "." && token.len() <= 5 && token.matches('.').count() >= 2 {
                return None;
            }
            if punct == "."
                && text[..whole.start()]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_ascii_digit())
            {
                return None;
            }
            Some(CheckMatch {
                check_id: "missing-space-after-punct",
                name: "Missing Space After Punctuation",
                category: IssueCategory::Spacing,
                severity: IssueSeverity::Medium,
                text: whole.as_str().to_string(),
                suggestion: format!("{punct} {letter}"),
                location: format!("Line {}", line_number(text, whole.start())),
                context: context_window(text, whole.start(), whole.end()),
            })
        })
        .collect()
}

fn space_before_punct(text: &str) -> Vec<CheckMatch> {
    SPACE_BEFORE_PUNCT
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let word_char = caps.get(1)?.as_str();
            let punct = caps.get(2)?.as_str();
            Some(CheckMatch {
                check_id: "space-before-punct",
                name: "Space Before Punctuation",
                category: IssueCategory::Spacing,
                severity: IssueSeverity::Medium,
                text: whole.as_str().to_string(),
                suggestion: format!("{word_char}{punct}"),
                location: format!("Line {}", line_number(text, whole.start())),
                context: context_window(text, whole.start(), whole.end()),
            })
        })
        .collect()
}

fn unclosed_brackets(text: &str) -> Vec<CheckMatch> {
    let mut matches = Vec::new();
    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        let open_count = text.matches(open).count();
        let close_count = text.matches(close).count();
        if open_count > close_count {
            let diff = open_count - close_count;
            matches.push(CheckMatch {
                check_id: "unclosed-brackets",
                name: "Unclosed Bracket",
                category: IssueCategory::Formatting,
                severity: IssueSeverity::High,
                text: format!("{diff} unclosed '{open}'"),
                suggestion: format!("Add {diff} closing '{close}'"),
                location: "Document-wide".into(),
                context: format!("Found {open_count} '{open}' but only {close_count} '{close}'"),
            });
        } else if close_count > open_count {
            let diff = close_count - open_count;
            matches.push(CheckMatch {
                check_id: "unclosed-brackets",
                name: "Extra Closing Bracket",
                category: IssueCategory::Formatting,
                severity: IssueSeverity::High,
                text: format!("{diff} extra '{close}'"),
                suggestion: format!("Remove {diff} extra '{close}' or add opening '{open}'"),
                location: "Document-wide".into(),
                context: format!("Found {close_count} '{close}' but only {open_count} '{open}'"),
            });
        }
    }
    matches
}

fn trailing_whitespace(text: &str) -> Vec<CheckMatch> {
    let total = text.split('\n').count();
    let trailing = text
        .split('\n')
        .filter(|line| line.len() != line.trim_end().len())
        .count();
    if trailing == 0 {
        return Vec::new();
    }
    vec![CheckMatch {
        check_id: "trailing-whitespace",
        name: "Trailing Whitespace",
        category: IssueCategory::Formatting,
        severity: IssueSeverity::Low,
        text: format!("{trailing} line(s) with trailing whitespace"),
        suggestion: "Remove trailing spaces".into(),
        location: "Multiple lines".into(),
        context: format!("Found in {trailing} of {total} lines"),
    }]
}

fn multiple_blank_lines(text: &str) -> Vec<CheckMatch> {
    BLANK_LINES
        .find_iter(text)
        .map(|m| CheckMatch {
            check_id: "multiple-blank-lines",
            name: "Multiple Blank Lines",
            category: IssueCategory::Formatting,
            severity: IssueSeverity::Low,
            text: format!("{} consecutive blank lines", m.as_str().len() - 1),
            suggestion: "Reduce to single blank line".into(),
            location: format!("Line {}", line_number(text, m.start())),
            context: "Excessive vertical spacing".into(),
        })
        .collect()
}

fn inconsistent_quotes(text: &str) -> Vec<CheckMatch> {
    let straight_double = text.matches('"').count();
    let curly_double = text.matches(CURLY_DOUBLE).count();
    let straight_single = text.matches('\'').count();
    let curly_single = text.matches(CURLY_SINGLE).count();

    let mut matches = Vec::new();
    if straight_double > 0 && curly_double > 0 {
        matches.push(CheckMatch {
            check_id: "inconsistent-quotes",
            name: "Inconsistent Double Quotes",
            category: IssueCategory::Formatting,
            severity: IssueSeverity::Low,
            text: format!("Mix of \" ({straight_double}) and \u{201c}\u{201d} ({curly_double})"),
            suggestion: "Use consistent quote style throughout".into(),
            location: "Document-wide".into(),
            context: "Consider using curly quotes for published documents".into(),
        });
    }
    // apostrophes are common, so only flag a real mix
    if straight_single > 3 && curly_single > 3 {
        matches.push(CheckMatch {
            check_id: "inconsistent-quotes",
            name: "Inconsistent Single Quotes/Apostrophes",
            category: IssueCategory::Formatting,
            severity: IssueSeverity::Low,
            text: format!("Mix of ' ({straight_single}) and \u{2018}\u{2019} ({curly_single})"),
            suggestion: "Use consistent apostrophe style".into(),
            location: "Document-wide".into(),
            context: "May indicate copy-paste from different sources".into(),
        });
    }
    matches
}

fn tab_characters(text: &str) -> Vec<CheckMatch> {
    let tabs = text.matches('\t').count();
    if tabs == 0 {
        return Vec::new();
    }
    vec![CheckMatch {
        check_id: "tab-characters",
        name: "Tab Characters",
        category: IssueCategory::Formatting,
        severity: IssueSeverity::Low,
        text: format!("{tabs} tab character(s)"),
        suggestion: "Replace tabs with spaces for consistent formatting".into(),
        location: "Multiple locations".into(),
        context: "Tabs may render inconsistently across applications".into(),
    }]
}

fn double_hyphen_emdash(text: &str) -> Vec<CheckMatch> {
    DOUBLE_HYPHEN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let before = caps.get(1)?.as_str();
            let after = caps.get(2)?.as_str();
            Some(CheckMatch {
                check_id: "double-hyphen-emdash",
                name: "Double Hyphen Instead of Em-Dash",
                category: IssueCategory::Formatting,
                severity: IssueSeverity::Low,
                text: whole.as_str().to_string(),
                suggestion: format!("{before}\u{2014}{after}"),
                location: format!("Line {}", line_number(text, whole.start())),
                context: context_window(text, whole.start(), whole.end()),
            })
        })
        .collect()
}

fn hidden_characters(text: &str) -> Vec<CheckMatch> {
    let found: Vec<String> = HIDDEN_CHARACTERS
        .iter()
        .filter_map(|(ch, name)| {
            let count = text.matches(*ch).count();
            (count > 0).then(|| format!("{name}: {count}"))
        })
        .collect();
    if found.is_empty() {
        return Vec::new();
    }
    vec![CheckMatch {
        check_id: "hidden-characters",
        name: "Hidden Characters",
        category: IssueCategory::Formatting,
        severity: IssueSeverity::Medium,
        text: "Found hidden characters".into(),
        suggestion: "Remove hidden characters that may cause display issues".into(),
        location: "Document-wide".into(),
        context: found.join(", "),
    }]
}

fn straight_vs_curly_quotes(text: &str) -> Vec<CheckMatch> {
    let straight = text.matches(['"', '\'']).count();
    let curly = text.matches(CURLY_DOUBLE).count() + text.matches(CURLY_SINGLE).count();
    if straight <= 10 || curly > 0 {
        return Vec::new();
    }
    vec![CheckMatch {
        check_id: "straight-vs-curly-quotes",
        name: "Straight Quotes Only",
        category: IssueCategory::Formatting,
        severity: IssueSeverity::Low,
        text: format!("{straight} straight quotes"),
        suggestion: "Consider using curly quotes for professional documents".into(),
        location: "Document-wide".into(),
        context: "Straight quotes are fine for code/technical docs".into(),
    }]
}
