use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};

use super::{Ruleset, RulesetRepository};
use crate::model::DocumentType;

/// Loads rulesets from `<dir>/<document_type>.json`, falling back to built-ins.
pub struct FileRulesetRepository {
    base_path: PathBuf,
    cache: RwLock<Option<BTreeMap<DocumentType, Ruleset>>>,
}

impl FileRulesetRepository {
    /// Create a repository rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn ruleset_path(&self, document_type: DocumentType) -> PathBuf {
        self.base_path.join(format!("{}.json", document_type))
    }

    fn load_one(&self, document_type: DocumentType) -> Result<Ruleset> {
        let path = self.ruleset_path(document_type);
        if !path.exists() {
            debug!(%document_type, "no ruleset file, using built-in rules");
            return Ok(Ruleset::builtin(document_type));
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read ruleset file at {}", path.display()))?;
        let ruleset: Ruleset = serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON structure in ruleset file at {}", path.display()))?;
        if ruleset.document_type != document_type {
            bail!(
                "ruleset file {} declares document_type `{}`",
                path.display(),
                ruleset.document_type
            );
        }
        ruleset
            .validate()
            .with_context(|| format!("invalid ruleset in {}", path.display()))?;
        Ok(ruleset)
    }

    fn load_from_disk(&self) -> Result<BTreeMap<DocumentType, Ruleset>> {
        let mut loaded = BTreeMap::new();
        for document_type in DocumentType::ALL {
            loaded.insert(document_type, self.load_one(document_type)?);
        }
        Ok(loaded)
    }

    fn load_cached(&self) -> Result<BTreeMap<DocumentType, Ruleset>> {
        if let Some(cached) = self
            .cache
            .read()
            .map_err(|_| anyhow!("ruleset cache lock poisoned"))?
            .as_ref()
        {
            return Ok(cached.clone());
        }
        let mut cache = self
            .cache
            .write()
            .map_err(|_| anyhow!("ruleset cache lock poisoned"))?;
        if let Some(cached) = cache.as_ref() {
            return Ok(cached.clone());
        }
        let loaded = self.load_from_disk()?;
        *cache = Some(loaded.clone());
        Ok(loaded)
    }

    fn write_ruleset(&self, ruleset: &Ruleset) -> Result<()> {
        fs::create_dir_all(&self.base_path).with_context(|| {
            format!(
                "failed to create ruleset directory {}",
                self.base_path.display()
            )
        })?;
        let path = self.ruleset_path(ruleset.document_type);
        let staging = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(ruleset)?;
        fs::write(&staging, body)
            .with_context(|| format!("failed to write ruleset file at {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to replace ruleset file at {}", path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RulesetRepository for FileRulesetRepository {
    async fn load_all(&self) -> Result<Vec<Ruleset>> {
        Ok(self.load_cached()?.into_values().collect())
    }

    async fn get(&self, document_type: DocumentType) -> Result<Ruleset> {
        self.load_cached()?
            .remove(&document_type)
            .ok_or_else(|| anyhow!("no ruleset for document type `{document_type}`"))
    }

    async fn put(&self, ruleset: Ruleset) -> Result<Ruleset> {
        ruleset.validate()?;
        // Held across the file write so concurrent puts cannot overwrite each other's cache entry.
        let mut cache = self
            .cache
            .write()
            .map_err(|_| anyhow!("ruleset cache lock poisoned"))?;
        if cache.is_none() {
            *cache = Some(self.load_from_disk()?);
        }
        self.write_ruleset(&ruleset)?;
        if let Some(rulesets) = cache.as_mut() {
            rulesets.insert(ruleset.document_type, ruleset.clone());
        }
        info!(document_type = %ruleset.document_type, "ruleset updated");
        Ok(ruleset)
    }
}
