use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use doc_review_core::extractor::{GoogleEndpoints, GoogleWorkspaceSource, LocalFileSource};
use doc_review_core::{
    build_client, Analyzer, AppConfig, Dictionary, DocumentSource, FathomClient,
    FileHistoryStore, FileRulesetRepository, HistoryStore, LlmClient, Notifier, ProviderKind,
    RoutingSource, RulesetRepository, SlackNotifier,
};
use tracing::debug;

/// Builds a model client for a provider on demand, so requests can pick one.
pub trait LlmClientFactory: Send + Sync {
    fn client(&self, provider: ProviderKind) -> Result<Arc<dyn LlmClient>>;
}

/// Factory backed by the provider sections of the loaded configuration.
pub struct ConfiguredClients {
    config: Arc<AppConfig>,
}

impl ConfiguredClients {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

impl LlmClientFactory for ConfiguredClients {
    fn client(&self, provider: ProviderKind) -> Result<Arc<dyn LlmClient>> {
        let settings = self.config.llm_settings(provider)?;
        build_client(&settings)
    }
}

/// Everything a command or request handler needs, shared behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub llm: Arc<dyn LlmClientFactory>,
    pub source: Arc<dyn DocumentSource>,
    pub notifier: Arc<dyn Notifier>,
    pub history: Arc<dyn HistoryStore>,
    pub dictionary: Arc<Dictionary>,
    pub rulesets: Arc<dyn RulesetRepository>,
    /// `None` when no Fathom API key is configured.
    pub fathom: Option<Arc<FathomClient>>,
}

impl AppState {
    /// Wire the production services from configuration.
    pub fn from_config(config: AppConfig, rulesets_dir: Option<PathBuf>) -> Result<Self> {
        let rulesets_dir = rulesets_dir.unwrap_or_else(|| config.storage.rulesets_dir.clone());
        debug!(rulesets_dir = %rulesets_dir.display(), "wiring services");

        let endpoints = config
            .google
            .api_base
            .as_deref()
            .map(GoogleEndpoints::single)
            .unwrap_or_default();
        let google = GoogleWorkspaceSource::new(config.google.access_token.clone(), endpoints)?;
        let source = RoutingSource::new(Arc::new(google), Arc::new(LocalFileSource));
        let notifier = SlackNotifier::new(config.slack_settings())?;
        let dictionary = Dictionary::load(&config.storage.dictionary_path)?;
        let fathom = match config.fathom.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Some(Arc::new(FathomClient::new(
                Some(key.to_string()),
                Some(config.fathom.base_url.clone()),
            )?)),
            _ => None,
        };
        let history = FileHistoryStore::new(config.storage.history_dir.clone());

        let config = Arc::new(config);
        Ok(Self {
            llm: Arc::new(ConfiguredClients::new(Arc::clone(&config))),
            config,
            source: Arc::new(source),
            notifier: Arc::new(notifier),
            history: Arc::new(history),
            dictionary: Arc::new(dictionary),
            rulesets: Arc::new(FileRulesetRepository::new(rulesets_dir)),
            fathom,
        })
    }

    /// Analyzer for the named provider, or the configured default.
    pub fn analyzer(&self, provider: Option<ProviderKind>) -> Result<Analyzer> {
        let provider = provider.unwrap_or(self.config.provider);
        let llm = self
            .llm
            .client(provider)
            .with_context(|| format!("failed to set up the {provider} client"))?;
        Ok(Analyzer::new(
            llm,
            Arc::clone(&self.rulesets),
            Arc::clone(&self.dictionary),
        ))
    }

    pub fn fathom(&self) -> Result<&FathomClient> {
        self.fathom
            .as_deref()
            .context("Fathom API key missing: set FATHOM_API_KEY or fathom.api_key")
    }
}
