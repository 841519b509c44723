use std::collections::HashSet;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checks::CHECK_IDS;
use crate::model::DocumentType;

pub mod file_repository;

const WEIGHT_SUM_TOLERANCE: f32 = 0.01;

/// A section the document is expected to contain, detected by keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredSection {
    /// Human-readable section name, also used in prompts and issue titles.
    pub name: String,
    /// Case-insensitive phrases; any one of them marks the section present.
    pub keywords: Vec<String>,
    /// Points deducted from the required-content score when missing.
    #[serde(default = "default_section_weight")]
    pub weight: f32,
}

fn default_section_weight() -> f32 {
    15.0
}

/// Category weights and per-issue deductions used by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub spelling_grammar: f32,
    pub required_content: f32,
    pub math_accuracy: f32,
    pub spelling_grammar_deduction: f32,
    pub missing_content_deduction: f32,
    pub math_deduction: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            spelling_grammar: 0.5,
            required_content: 0.4,
            math_accuracy: 0.1,
            spelling_grammar_deduction: 5.0,
            missing_content_deduction: 15.0,
            math_deduction: 10.0,
        }
    }
}

/// Review rules for one document type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub document_type: DocumentType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_sections: Vec<RequiredSection>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Deterministic check ids to skip for this document type.
    #[serde(default)]
    pub disabled_checks: Vec<String>,
    /// Whether deterministic check findings count toward the score.
    #[serde(default)]
    pub score_checks: bool,
    /// Extra reviewer guidance appended to the content prompt.
    #[serde(default)]
    pub focus: Option<String>,
}

impl Ruleset {
    /// Built-in ruleset used when no file exists for a document type.
    pub fn builtin(document_type: DocumentType) -> Self {
        let sections: Vec<(&str, Vec<&str>)> = match document_type {
            DocumentType::Proposal => vec![
                ("Executive Summary", vec!["executive summary", "summary", "overview"]),
                ("Scope", vec!["scope", "deliverables"]),
                ("Timeline", vec!["timeline", "schedule", "milestones"]),
                ("Budget", vec!["budget", "pricing", "investment", "cost"]),
                ("Team", vec!["team", "staffing"]),
                ("Next Steps", vec!["next steps"]),
            ],
            DocumentType::Kickoff => vec![
                ("Introductions", vec!["introductions", "meet the team", "who we are"]),
                ("Project Overview", vec!["project overview", "overview", "background"]),
                ("Goals", vec!["goals", "objectives", "success criteria"]),
                ("Risks", vec!["risks", "risk"]),
                ("Schedule", vec!["schedule", "timeline", "milestones"]),
                ("Next Steps", vec!["next steps"]),
            ],
            DocumentType::TranscriptSales | DocumentType::TranscriptClient => Vec::new(),
        };
        Self {
            document_type,
            description: format!("Default {} review rules", document_type),
            required_sections: sections
                .into_iter()
                .map(|(name, keywords)| RequiredSection {
                    name: name.to_string(),
                    keywords: keywords.into_iter().map(str::to_string).collect(),
                    weight: default_section_weight(),
                })
                .collect(),
            scoring: ScoringConfig::default(),
            disabled_checks: Vec::new(),
            score_checks: false,
            focus: None,
        }
    }

    pub fn is_check_enabled(&self, check_id: &str) -> bool {
        !self.disabled_checks.iter().any(|id| id == check_id)
    }

    pub fn section(&self, name: &str) -> Option<&RequiredSection> {
        self.required_sections
            .iter()
            .find(|section| section.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Validate invariants before the ruleset is used or persisted.
    pub fn validate(&self) -> Result<(), RulesetValidationError> {
        let mut seen = HashSet::new();
        for section in &self.required_sections {
            let name = section.name.trim();
            if name.is_empty() {
                return Err(RulesetValidationError::BlankSectionName);
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(RulesetValidationError::DuplicateSection {
                    name: name.to_string(),
                });
            }
            if section.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(RulesetValidationError::MissingKeywords {
                    name: name.to_string(),
                });
            }
            check_points(&format!("section `{name}` weight"), section.weight)?;
        }

        let scoring = &self.scoring;
        for (label, weight) in [
            ("spelling_grammar", scoring.spelling_grammar),
            ("required_content", scoring.required_content),
            ("math_accuracy", scoring.math_accuracy),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(RulesetValidationError::InvalidCategoryWeight {
                    category: label.to_string(),
                    weight,
                });
            }
        }
        let sum = scoring.spelling_grammar + scoring.required_content + scoring.math_accuracy;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(RulesetValidationError::WeightSum { sum });
        }
        check_points("spelling_grammar_deduction", scoring.spelling_grammar_deduction)?;
        check_points("missing_content_deduction", scoring.missing_content_deduction)?;
        check_points("math_deduction", scoring.math_deduction)?;

        if let Some(unknown) = self
            .disabled_checks
            .iter()
            .find(|id| !CHECK_IDS.contains(&id.as_str()))
        {
            return Err(RulesetValidationError::UnknownCheck {
                check_id: unknown.clone(),
            });
        }
        Ok(())
    }
}

fn check_points(label: &str, value: f32) -> Result<(), RulesetValidationError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(RulesetValidationError::InvalidPoints {
            field: label.to_string(),
            value,
        });
    }
    Ok(())
}

/// Errors emitted while validating ruleset definitions.
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RulesetValidationError {
    #[error("required section name must not be blank")]
    BlankSectionName,
    #[error("required section `{name}` is defined more than once")]
    DuplicateSection { name: String },
    #[error("required section `{name}` must list at least one keyword")]
    MissingKeywords { name: String },
    #[error("{field} must be within 0.0..=100.0 (got {value})")]
    InvalidPoints { field: String, value: f32 },
    #[error("category weight `{category}` must be within 0.0..=1.0 (got {weight})")]
    InvalidCategoryWeight { category: String, weight: f32 },
    #[error("category weights must sum to 1.0 (got {sum})")]
    WeightSum { sum: f32 },
    #[error("unknown check id `{check_id}` in disabled_checks")]
    UnknownCheck { check_id: String },
}

/// Storage backend for rulesets so files, HTTP or in-memory sources can be swapped.
#[async_trait]
pub trait RulesetRepository: Send + Sync {
    /// All active rulesets, one per document type.
    async fn load_all(&self) -> AnyResult<Vec<Ruleset>>;

    /// Ruleset for a document type, falling back to the built-in one.
    async fn get(&self, document_type: DocumentType) -> AnyResult<Ruleset>;

    /// Validate and replace the ruleset for its document type.
    async fn put(&self, ruleset: Ruleset) -> AnyResult<Ruleset>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rulesets_are_valid() {
        for doc_type in DocumentType::ALL {
            Ruleset::builtin(doc_type)
                .validate()
                .unwrap_or_else(|err| panic!("builtin {doc_type} invalid: {err}"));
        }
    }

    #[test]
    fn rejects_duplicate_sections_case_insensitively() {
        let mut ruleset = Ruleset::builtin(DocumentType::Proposal);
        ruleset.required_sections.push(RequiredSection {
            name: "budget".into(),
            keywords: vec!["money".into()],
            weight: 10.0,
        });
        let err = ruleset.validate().expect_err("duplicate should fail");
        assert!(matches!(err, RulesetValidationError::DuplicateSection { name } if name == "budget"));
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let mut ruleset = Ruleset::builtin(DocumentType::Kickoff);
        ruleset.scoring.math_accuracy = 0.3;
        let err = ruleset.validate().expect_err("weights sum to 1.2");
        assert!(matches!(err, RulesetValidationError::WeightSum { .. }));
    }

    #[test]
    fn rejects_out_of_range_section_weight() {
        let mut ruleset = Ruleset::builtin(DocumentType::Proposal);
        ruleset.required_sections[0].weight = 120.0;
        let err = ruleset.validate().expect_err("weight > 100");
        assert!(err.to_string().contains("Executive Summary"));
    }

    #[test]
    fn rejects_unknown_disabled_checks() {
        let mut ruleset = Ruleset::builtin(DocumentType::Proposal);
        ruleset.disabled_checks = vec!["double-spaces".into(), "no-such-check".into()];
        let err = ruleset.validate().expect_err("unknown check");
        assert_eq!(
            err,
            RulesetValidationError::UnknownCheck {
                check_id: "no-such-check".into()
            }
        );
    }

    #[test]
    fn deserializes_minimal_ruleset_with_defaults() {
        let ruleset: Ruleset = serde_json::from_str(
            r#"{"document_type":"proposal","required_sections":[{"name":"Budget","keywords":["budget"]}]}"#,
        )
        .unwrap();
        assert_eq!(ruleset.required_sections[0].weight, 15.0);
        assert_eq!(ruleset.scoring, ScoringConfig::default());
        assert!(ruleset.is_check_enabled("double-spaces"));
        assert!(ruleset.section("BUDGET").is_some());
    }
}
