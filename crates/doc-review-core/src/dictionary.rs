use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard},
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::model::{Issue, IssueCategory};

/// Terms that are never reported as spelling mistakes.
///
/// Lookups are case-insensitive; the first spelling added is the one kept.
#[derive(Debug, Default)]
pub struct Dictionary {
    path: Option<PathBuf>,
    terms: RwLock<BTreeMap<String, String>>,
}

impl Dictionary {
    /// In-memory dictionary seeded with the given terms.
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = BTreeMap::new();
        for term in terms {
            insert_term(&mut map, term.into());
        }
        Self {
            path: None,
            terms: RwLock::new(map),
        }
    }

    /// Load from a JSON array file; a missing file yields an empty dictionary.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut map = BTreeMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read dictionary at {}", path.display()))?;
            let terms: Vec<String> = serde_json::from_str(&raw)
                .with_context(|| format!("invalid dictionary JSON at {}", path.display()))?;
            for term in terms {
                insert_term(&mut map, term);
            }
        }
        Ok(Self {
            path: Some(path),
            terms: RwLock::new(map),
        })
    }

    /// Sorted (case-insensitively) list of terms.
    pub fn terms(&self) -> Vec<String> {
        self.read().values().cloned().collect()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.read().contains_key(&normalize(word))
    }

    /// Add terms and persist; returns how many were new.
    ///
    /// The in-memory set only changes once the file write succeeded.
    pub fn add<I, S>(&self, terms: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = self.terms.write().unwrap_or_else(|poisoned| {
            warn!("dictionary lock poisoned, recovering");
            poisoned.into_inner()
        });
        let mut updated = map.clone();
        let added = terms
            .into_iter()
            .map(|term| insert_term(&mut updated, term.into()))
            .filter(|inserted| *inserted)
            .count();
        if added == 0 {
            return Ok(0);
        }
        if let Some(path) = &self.path {
            save(path, &updated)?;
        }
        *map = updated;
        info!(added, total = map.len(), "dictionary updated");
        Ok(added)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.terms.read().unwrap_or_else(|poisoned| {
            warn!("dictionary lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Drop spelling issues whose flagged text is a dictionary term.
    pub fn filter_issues(&self, issues: Vec<Issue>) -> Vec<Issue> {
        issues
            .into_iter()
            .filter(|issue| {
                if issue.category != IssueCategory::Spelling {
                    return true;
                }
                let flagged = issue
                    .context
                    .as_deref()
                    .unwrap_or(issue.title.as_str());
                !self.contains(flagged.trim_matches(|c: char| !c.is_alphanumeric()))
            })
            .collect()
    }
}

fn save(path: &Path, map: &BTreeMap<String, String>) -> Result<()> {
    let terms: Vec<&String> = map.values().collect();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create dictionary directory {}", parent.display())
        })?;
    }
    fs::write(path, serde_json::to_string_pretty(&terms)?)
        .with_context(|| format!("failed to write dictionary at {}", path.display()))
}

fn normalize(term: &str) -> String {
    term.trim().to_lowercase()
}

fn insert_term(map: &mut BTreeMap<String, String>, term: String) -> bool {
    let key = normalize(&term);
    if key.is_empty() || map.contains_key(&key) {
        return false;
    }
    map.insert(key, term.trim().to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueSeverity;

    fn spelling(word: &str) -> Issue {
        Issue::new(IssueCategory::Spelling, IssueSeverity::Medium, word, "")
            .with_context(Some(word.to_string()))
    }

    #[test]
    fn dedupes_case_insensitively_and_sorts() {
        let dict = Dictionary::from_terms(["Kubernetes", "acme", "kubernetes", " ", "Zapier"]);
        assert_eq!(dict.terms(), vec!["acme", "Kubernetes", "Zapier"]);
        assert!(dict.contains("KUBERNETES"));
    }

    #[test]
    fn persists_added_terms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/dictionary.json");
        let dict = Dictionary::load(&path).unwrap();
        assert_eq!(dict.add(["SaaS", "saas", "Figma"]).unwrap(), 2);
        assert_eq!(dict.add(["figma"]).unwrap(), 0);

        let reloaded = Dictionary::load(&path).unwrap();
        assert_eq!(reloaded.terms(), vec!["Figma", "SaaS"]);
    }

    #[test]
    fn failed_save_leaves_dictionary_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let path = blocker.join("dictionary.json");
        let dict = Dictionary::load(&path).unwrap();

        let err = dict.add(["Acme"]).unwrap_err();
        assert!(format!("{err:#}").contains("failed to create dictionary directory"));
        assert!(!dict.contains("acme"));

        fs::remove_file(&blocker).unwrap();
        assert_eq!(dict.add(["Acme"]).unwrap(), 1);
        assert!(path.exists());
        assert_eq!(Dictionary::load(&path).unwrap().terms(), vec!["Acme"]);
    }

    #[test]
    fn recovers_from_a_poisoned_lock() {
        let dict = std::sync::Arc::new(Dictionary::from_terms(["Acme"]));
        let poisoner = std::sync::Arc::clone(&dict);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.terms.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(dict.contains("acme"));
        assert_eq!(dict.terms(), vec!["Acme"]);
        assert_eq!(dict.add(["Figma"]).unwrap(), 1);
    }

    #[test]
    fn filters_only_spelling_issues() {
        let dict = Dictionary::from_terms(["Savas"]);
        let grammar = Issue::new(IssueCategory::Grammar, IssueSeverity::Low, "savas", "")
            .with_context(Some("savas".into()));
        let kept = dict.filter_issues(vec![spelling("\"savas,\""), spelling("recieve"), grammar]);
        let titles: Vec<_> = kept.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["recieve", "savas"]);
        assert_eq!(kept[1].category, IssueCategory::Grammar);
    }
}
