//! Layered configuration: optional TOML file, `DOC_REVIEW__*` variables,
//! then the conventional provider variables as fallbacks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fathom;
use crate::llm::{LlmSettings, ProviderKind};
use crate::publish::{self, SlackSettings};

pub const ENV_PREFIX: &str = "DOC_REVIEW";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub openrouter: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub google: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        match kind {
            ProviderKind::OpenAi => Some(&self.openai),
            ProviderKind::OpenRouter => Some(&self.openrouter),
            ProviderKind::Anthropic => Some(&self.anthropic),
            ProviderKind::Google => Some(&self.google),
            ProviderKind::Noop => None,
        }
    }

    fn get_mut(&mut self, kind: ProviderKind) -> Option<&mut ProviderConfig> {
        match kind {
            ProviderKind::OpenAi => Some(&mut self.openai),
            ProviderKind::OpenRouter => Some(&mut self.openrouter),
            ProviderKind::Anthropic => Some(&mut self.anthropic),
            ProviderKind::Google => Some(&mut self.google),
            ProviderKind::Noop => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub bot_token: Option<String>,
    pub channel: String,
    pub mention: Option<String>,
    pub workspace_url: Option<String>,
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel: publish::DEFAULT_CHANNEL.into(),
            mention: None,
            workspace_url: None,
            api_base: publish::DEFAULT_API_BASE.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FathomConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for FathomConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: fathom::DEFAULT_BASE_URL.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// Pre-issued OAuth bearer token.
    pub access_token: Option<String>,
    /// Overrides the Docs, Slides and Drive API hosts at once.
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Humantime duration, e.g. `120s` or `2m`.
    pub request_timeout: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".into(),
            request_timeout: "120s".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub rulesets_dir: PathBuf,
    pub history_dir: PathBuf,
    pub dictionary_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            rulesets_dir: PathBuf::from("rulesets"),
            history_dir: PathBuf::from("data/history"),
            dictionary_path: PathBuf::from("data/dictionary.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Provider used when a command or request names none.
    pub provider: ProviderKind,
    pub providers: ProvidersConfig,
    pub slack: SlackConfig,
    pub fathom: FathomConfig,
    pub google: GoogleConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            providers: ProvidersConfig::default(),
            slack: SlackConfig::default(),
            fathom: FathomConfig::default(),
            google: GoogleConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn fill(slot: &mut Option<String>, vars: &HashMap<String, String>, name: &str) {
    if slot.as_deref().is_some_and(|value| !value.trim().is_empty()) {
        return;
    }
    if let Some(value) = vars.get(name).filter(|value| !value.trim().is_empty()) {
        *slot = Some(value.trim().to_string());
    }
}

impl AppConfig {
    /// Load the optional file and `DOC_REVIEW__*` overrides, then fill gaps
    /// from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR),
        );
        let layered = builder.build().with_context(|| match path {
            Some(path) => format!("failed to load configuration from {}", path.display()),
            None => "failed to load configuration".to_string(),
        })?;
        let mut app: AppConfig = layered
            .try_deserialize()
            .context("invalid configuration")?;
        app.merge_with_env(&std::env::vars().collect());
        Ok(app)
    }

    /// Fill unset secrets and channel from the conventional variable names
    /// (`OPENAI_API_KEY`, `SLACK_BOT_TOKEN`, ...).
    pub fn merge_with_env(&mut self, vars: &HashMap<String, String>) {
        for kind in ProviderKind::ALL {
            if let (Some(env), Some(provider)) = (kind.api_key_env(), self.providers.get_mut(kind)) {
                fill(&mut provider.api_key, vars, env);
            }
        }
        fill(&mut self.slack.bot_token, vars, "SLACK_BOT_TOKEN");
        fill(&mut self.fathom.api_key, vars, "FATHOM_API_KEY");
        fill(&mut self.google.access_token, vars, "GOOGLE_ACCESS_TOKEN");
        if self.slack.channel == publish::DEFAULT_CHANNEL {
            if let Some(channel) = vars.get("SLACK_CHANNEL").filter(|c| !c.trim().is_empty()) {
                self.slack.channel = channel.trim().to_string();
            }
        }
    }

    /// Validated settings for one provider.
    pub fn llm_settings(&self, kind: ProviderKind) -> Result<LlmSettings> {
        let mut settings = LlmSettings::new(kind);
        if let Some(provider) = self.providers.get(kind) {
            settings.api_key = provider.api_key.clone().unwrap_or_default();
            settings.model = provider.model.clone();
            settings.endpoint = provider.endpoint.clone();
            settings.timeout_secs = provider.timeout_secs;
            if let Some(retries) = provider.max_retries {
                settings.max_retries = retries;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn slack_settings(&self) -> SlackSettings {
        SlackSettings {
            bot_token: self.slack.bot_token.clone(),
            channel: self.slack.channel.clone(),
            mention: self.slack.mention.clone(),
            workspace_url: self.slack.workspace_url.clone(),
            api_base: self.slack.api_base.clone(),
        }
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(self.server.request_timeout.trim()).with_context(|| {
            format!(
                "invalid server.request_timeout `{}`",
                self.server.request_timeout
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::env;
    use std::fs::write;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn with_env_lock<F: FnOnce()>(func: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        func();
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.slack.channel, "document-analyzer-test");
        assert_eq!(config.fathom.base_url, "https://api.fathom.ai/external/v1");
        assert_eq!(config.server.addr, "127.0.0.1:8080");
        assert_eq!(config.request_timeout().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn conventional_variables_fill_gaps_only() {
        let mut config = AppConfig::default();
        config.providers.anthropic.api_key = Some("from-file".into());
        config.merge_with_env(&vars(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("ANTHROPIC_API_KEY", "ignored"),
            ("GOOGLE_API_KEY", "  "),
            ("SLACK_BOT_TOKEN", "xoxb-env"),
            ("SLACK_CHANNEL", "sales-alerts"),
            ("FATHOM_API_KEY", "fathom-env"),
            ("GOOGLE_ACCESS_TOKEN", "ya29.token"),
        ]));
        assert_eq!(config.providers.openai.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.providers.anthropic.api_key.as_deref(), Some("from-file"));
        assert!(config.providers.google.api_key.is_none());
        assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb-env"));
        assert_eq!(config.slack.channel, "sales-alerts");
        assert_eq!(config.fathom.api_key.as_deref(), Some("fathom-env"));
        assert_eq!(config.google.access_token.as_deref(), Some("ya29.token"));
    }

    #[test]
    fn llm_settings_validate_keys() {
        let mut config = AppConfig::default();
        let err = config.llm_settings(ProviderKind::Google).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));

        config.providers.google = ProviderConfig {
            api_key: Some("g-key".into()),
            model: Some("gemini-1.5-pro".into()),
            max_retries: Some(4),
            ..ProviderConfig::default()
        };
        let settings = config.llm_settings(ProviderKind::Google).unwrap();
        assert_eq!(settings.model_or_default(), "gemini-1.5-pro");
        assert_eq!(settings.max_retries, 4);

        let noop = config.llm_settings(ProviderKind::Noop).unwrap();
        assert!(noop.api_key.is_empty());
    }

    #[test]
    fn rejects_bad_timeout() {
        let mut config = AppConfig::default();
        config.server.request_timeout = "soon".into();
        assert!(config.request_timeout().is_err());
        config.server.request_timeout = "2m".into();
        assert_eq!(config.request_timeout().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn loads_file_with_prefixed_env_overrides() {
        with_env_lock(|| {
            let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
            write(
                file.path(),
                r#"
provider = "anthropic"

[providers.anthropic]
api_key = "file-key"
model = "claude-3-5-sonnet-latest"

[slack]
channel = "reviews"
mention = "@docs-team"

[server]
addr = "0.0.0.0:9000"
"#,
            )
            .unwrap();
            env::set_var("DOC_REVIEW__SERVER__ADDR", "127.0.0.1:7070");
            env::remove_var("SLACK_CHANNEL");

            let config = AppConfig::load(Some(file.path())).unwrap();
            env::remove_var("DOC_REVIEW__SERVER__ADDR");

            assert_eq!(config.provider, ProviderKind::Anthropic);
            assert_eq!(
                config.providers.anthropic.model.as_deref(),
                Some("claude-3-5-sonnet-latest")
            );
            assert_eq!(config.slack.channel, "reviews");
            assert_eq!(config.slack.mention.as_deref(), Some("@docs-team"));
            assert_eq!(config.server.addr, "127.0.0.1:7070");
            assert_eq!(config.storage.rulesets_dir, PathBuf::from("rulesets"));
        });
    }

    #[test]
    fn missing_config_file_is_an_error() {
        with_env_lock(|| {
            let err = AppConfig::load(Some(Path::new("/nonexistent/doc-review.toml"))).unwrap_err();
            assert!(err.to_string().contains("/nonexistent/doc-review.toml"));
        });
    }
}
