use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::model::AnalysisResult;

/// Storage for completed analyses, addressed by generated id.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(&self, result: &AnalysisResult) -> Result<Uuid>;

    /// `None` when no analysis has that id.
    async fn get(&self, id: Uuid) -> Result<Option<AnalysisResult>>;
}

/// One JSON file per analysis: `<dir>/<uuid>.json`.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn save(&self, result: &AnalysisResult) -> Result<Uuid> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create history directory {}", self.dir.display()))?;
        let id = Uuid::new_v4();
        let path = self.path_for(id);
        let body = serde_json::to_vec_pretty(result)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write analysis to {}", path.display()))?;
        debug!(%id, path = %path.display(), "analysis stored");
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisResult>> {
        let path = self.path_for(id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read analysis at {}", path.display()))
            }
        };
        let result = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid analysis JSON at {}", path.display()))?;
        Ok(Some(result))
    }
}

/// Process-local store for tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: RwLock<HashMap<Uuid, AnalysisResult>>,
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save(&self, result: &AnalysisResult) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.entries
            .write()
            .map_err(|_| anyhow!("history lock poisoned"))?
            .insert(id, result.clone());
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisResult>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| anyhow!("history lock poisoned"))?
            .get(&id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentType, ScoreBreakdown};
    use chrono::{TimeZone, Utc};

    fn result() -> AnalysisResult {
        AnalysisResult {
            document_url: "notes.txt".into(),
            document_title: "notes".into(),
            document_type: DocumentType::Proposal,
            analyzed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            llm_provider: "noop/none".into(),
            score: Some(ScoreBreakdown {
                spelling_grammar: 90,
                required_content: 70,
                math_accuracy: 100,
                overall: 83,
            }),
            bannt_score: None,
            issues: Vec::new(),
            text_length: 120,
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_and_misses_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("history"));
        let id = store.save(&result()).await.unwrap();
        assert!(store.dir().join(format!("{id}.json")).exists());
        assert_eq!(store.get(id).await.unwrap(), Some(result()));
        assert_eq!(store.get(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_reports_corrupt_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path());
        let id = Uuid::new_v4();
        std::fs::write(dir.path().join(format!("{id}.json")), "not json").unwrap();
        let err = store.get(id).await.unwrap_err();
        assert!(err.to_string().contains("invalid analysis JSON"));
    }

    #[test]
    fn memory_store_assigns_distinct_ids() {
        let store = MemoryHistoryStore::default();
        let first = futures::executor::block_on(store.save(&result())).unwrap();
        let second = futures::executor::block_on(store.save(&result())).unwrap();
        assert_ne!(first, second);
        assert!(futures::executor::block_on(store.get(first)).unwrap().is_some());
    }
}
