use crate::model::{Issue, IssueCategory, ScoreBreakdown};
use crate::ruleset::Ruleset;

const SECTION_RULE_PREFIX: &str = "section:";

/// Score a document from its issue list. Only issues with `affects_score` count.
pub fn score_issues(issues: &[Issue], ruleset: &Ruleset) -> ScoreBreakdown {
    let scoring = &ruleset.scoring;
    let scored = || issues.iter().filter(|issue| issue.affects_score);

    let sg_count = scored()
        .filter(|issue| issue.category.is_spelling_grammar())
        .count() as f64;
    let spelling_grammar = clamp_points(100.0 - sg_count * f64::from(scoring.spelling_grammar_deduction));

    let content_deduction: f64 = scored()
        .filter(|issue| issue.category == IssueCategory::MissingContent)
        .map(|issue| f64::from(content_deduction(issue, ruleset)))
        .sum();
    let required_content = clamp_points(100.0 - content_deduction);

    let math_count = scored()
        .filter(|issue| issue.category == IssueCategory::Math)
        .count() as f64;
    let math_accuracy = clamp_points(100.0 - math_count * f64::from(scoring.math_deduction));

    let weighted = f64::from(spelling_grammar) * f64::from(scoring.spelling_grammar)
        + f64::from(required_content) * f64::from(scoring.required_content)
        + f64::from(math_accuracy) * f64::from(scoring.math_accuracy);
    // f32 weights such as 0.4 widen to 0.4000000059..., nudge before flooring
    let overall = clamp_points(weighted + 1e-4);

    ScoreBreakdown {
        spelling_grammar,
        required_content,
        math_accuracy,
        overall,
    }
}

fn content_deduction(issue: &Issue, ruleset: &Ruleset) -> f32 {
    issue
        .rule_id
        .as_deref()
        .and_then(|id| id.strip_prefix(SECTION_RULE_PREFIX))
        .and_then(|name| ruleset.section(name))
        .map(|section| section.weight)
        .unwrap_or(ruleset.scoring.missing_content_deduction)
}

fn clamp_points(value: f64) -> u8 {
    value.floor().clamp(0.0, 100.0) as u8
}
